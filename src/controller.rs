//! Force/displacement measurement on the data particles.
//!
//! The [`DataController`] runs once per frame. In manual mode it executes
//! queued [`Task`]s. Its autonomous program alternates between two states:
//!
//! - **Measuring**: keep the data particles locked at their height and sample
//!   the restoring force every frame
//! - **Waiting**: after a height step, let the sheet settle
//!
//! Every measuring period ends with a step down by `delta_y`. Once the data
//! particles reach `y_minimum` the controller asks for a restart.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::config::MeasurementConfig;
use crate::data::{append_data_set, FloatData};
use crate::error::{DataError, SimulationError};
use crate::physics::SheetAccess;
use crate::shader_types::{ConstantsIndex, Particle};

/// A queued manual action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Task {
    CollectData,
    MoveUp,
    MoveDown,
    ToggleLock,
    EndDataSet,
    SetConstant(ConstantsIndex, f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementState {
    /// Manual mode.
    #[default]
    Idle,
    Waiting,
    Measuring,
}

/// Something the owner of the controller has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The data particles reached the minimum height.
    RestartRequested,
    /// A data set was appended to this file.
    DataSetWritten(PathBuf),
    /// Writing the data set to this file failed. The collected data is kept.
    DataSetFailed(PathBuf),
}

#[derive(Debug)]
pub struct DataController {
    config: MeasurementConfig,
    data: FloatData,
    tasks: VecDeque<Task>,
    state: MeasurementState,
    /// Seconds since the last state change.
    state_time: f32,
    data_indices: Vec<u32>,
    /// Data particles as read at the start of the current update.
    current: Vec<Particle>,
    /// Written before every data set.
    header: String,
}

impl DataController {
    pub fn new(config: MeasurementConfig, data_indices: Vec<u32>, header: String) -> Self {
        Self {
            config,
            data: FloatData::new(),
            tasks: VecDeque::new(),
            state: MeasurementState::Idle,
            state_time: 0.0,
            data_indices,
            current: Vec::new(),
            header,
        }
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn state(&self) -> MeasurementState {
        self.state
    }

    fn set_state(&mut self, state: MeasurementState) {
        if state != self.state {
            log::debug!("Measurement state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.state_time = 0.0;
    }

    pub fn data(&self) -> &FloatData {
        &self.data
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    pub fn delta_y(&self) -> f32 {
        self.config.delta_y
    }

    pub fn set_delta_y(&mut self, delta_y: f32) {
        self.config.delta_y = delta_y;
    }

    /// Height of the first data particle, as of the last update.
    pub fn height(&self) -> Option<f32> {
        self.current.first().map(|p| p.position.y)
    }

    /// Summed vertical spring force on the data particles, as of the last update.
    pub fn force(&self) -> Option<f32> {
        if self.current.is_empty() {
            return None;
        }
        Some(self.current.iter().map(|p| p.force.y).sum())
    }

    /// Starts the measurement program. The caller resets the sheet first.
    pub fn start_autonomous(&mut self) {
        log::info!("Starting measurement program");
        self.set_state(MeasurementState::Measuring);
    }

    /// Stops the measurement program and writes the collected data.
    pub fn stop_autonomous(&mut self) -> Result<ControllerEvent, DataError> {
        log::info!("Stopping measurement program");
        let event = self.end_data_set()?;
        self.set_state(MeasurementState::Idle);
        Ok(event)
    }

    /// Drops queued tasks. Collected data is kept.
    pub fn reset(&mut self) {
        self.tasks.clear();
    }

    /// Runs one frame of the controller against `sheet`.
    pub fn update<S: SheetAccess + ?Sized>(
        &mut self,
        dt: f32,
        sheet: &mut S,
    ) -> Result<Vec<ControllerEvent>, SimulationError> {
        self.current = sheet.read_particles(&self.data_indices)?;
        let mut events = Vec::new();

        if self.state != MeasurementState::Idle {
            self.state_time += dt;
            self.run_program(sheet, &mut events)?;
            self.tasks.clear();
        } else {
            while let Some(task) = self.tasks.pop_front() {
                self.run_task(task, sheet, &mut events)?;
            }
        }
        Ok(events)
    }

    fn run_task<S: SheetAccess + ?Sized>(
        &mut self,
        task: Task,
        sheet: &mut S,
        events: &mut Vec<ControllerEvent>,
    ) -> Result<(), SimulationError> {
        match task {
            Task::CollectData => self.collect(),
            Task::MoveUp => self.move_by(self.config.delta_y, sheet)?,
            Task::MoveDown => self.move_by(-self.config.delta_y, sheet)?,
            Task::ToggleLock => self.toggle_lock(sheet)?,
            Task::EndDataSet => match self.end_data_set() {
                Ok(event) => events.push(event),
                Err(e) => {
                    log::error!("Failed to write data set: {}", e);
                    events.push(ControllerEvent::DataSetFailed(self.config.output_path.clone()));
                }
            },
            Task::SetConstant(index, value) => {
                log::debug!("Setting {:?} to {}", index, value);
                sheet.write_constant(index, value);
            }
        }
        Ok(())
    }

    fn run_program<S: SheetAccess + ?Sized>(
        &mut self,
        sheet: &mut S,
        events: &mut Vec<ControllerEvent>,
    ) -> Result<(), SimulationError> {
        match self.state {
            MeasurementState::Idle => {}
            MeasurementState::Waiting => {
                if self.state_time > self.config.waiting_latency {
                    self.set_state(MeasurementState::Measuring);
                }
            }
            MeasurementState::Measuring => {
                if self.state_time > self.config.measurement_latency {
                    self.set_state(MeasurementState::Waiting);
                    self.move_by(-self.config.delta_y, sheet)?;
                }
                if self.current.first().is_some_and(|p| !p.locked) {
                    self.toggle_lock(sheet)?;
                }
                self.collect();
                if self.height().is_some_and(|y| y <= self.config.y_minimum) {
                    log::info!("Data particles reached {}, restarting", self.config.y_minimum);
                    events.push(ControllerEvent::RestartRequested);
                }
            }
        }
        Ok(())
    }

    fn collect(&mut self) {
        if let (Some(x), Some(y)) = (self.height(), self.force()) {
            self.data.add(x, &[y]);
        }
    }

    fn move_by<S: SheetAccess + ?Sized>(&mut self, dy: f32, sheet: &mut S) -> Result<(), SimulationError> {
        for (particle, &index) in self.current.iter_mut().zip(&self.data_indices) {
            particle.position.y += dy;
            particle.last_position.y += dy;
            sheet.write_particle(index, particle)?;
        }
        Ok(())
    }

    fn toggle_lock<S: SheetAccess + ?Sized>(&mut self, sheet: &mut S) -> Result<(), SimulationError> {
        for (particle, &index) in self.current.iter_mut().zip(&self.data_indices) {
            particle.locked = !particle.locked;
            sheet.write_particle(index, particle)?;
        }
        Ok(())
    }

    fn end_data_set(&mut self) -> Result<ControllerEvent, DataError> {
        let path = self.config.output_path.clone();
        append_data_set(&path, &self.header, &self.data)?;
        self.data.clear();
        Ok(ControllerEvent::DataSetWritten(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{generate, MeshParameters, SheetData};
    use crate::physics::{CpuSheet, SheetBackend};
    use std::fs;

    fn setup(name: &str) -> (SheetData, CpuSheet, DataController) {
        let params = MeshParameters { fineness: 0.1, ..Default::default() };
        let sheet = generate(&params).unwrap();
        let cpu = CpuSheet::new(&sheet);
        let config = MeasurementConfig {
            y_minimum: -0.5,
            output_path: std::env::temp_dir()
                .join(format!("trampoline-controller-{}-{}", name, std::process::id()))
                .join("data.txt"),
            ..Default::default()
        };
        let controller = DataController::new(config, sheet.data_indices.clone(), params.to_string());
        (sheet, cpu, controller)
    }

    fn cleanup(controller: &DataController) {
        if let Some(dir) = controller.config().output_path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_tasks_run_in_order() {
        let (sheet, mut cpu, mut controller) = setup("order");
        controller.add_task(Task::MoveDown);
        controller.add_task(Task::CollectData);
        controller.add_task(Task::MoveUp);
        controller.update(0.01, &mut cpu).unwrap();

        assert_eq!(controller.pending_tasks(), 0);
        let (xs, _) = controller.data().averaged_lists();
        assert_eq!(xs.len(), 1);
        assert!((xs[0] + 0.2).abs() < 1e-6);

        // Moved down then up again
        let particles = cpu.read_particles(&sheet.data_indices).unwrap();
        assert!(particles.iter().all(|p| p.position.y.abs() < 1e-6));
    }

    #[test]
    fn test_move_shifts_last_position_too() {
        let (sheet, mut cpu, mut controller) = setup("move");
        controller.add_task(Task::MoveDown);
        controller.update(0.01, &mut cpu).unwrap();

        for p in cpu.read_particles(&sheet.data_indices).unwrap() {
            assert!((p.position.y + 0.2).abs() < 1e-6);
            assert_eq!(p.position.y, p.last_position.y);
        }
        controller.update(0.01, &mut cpu).unwrap();
        assert!((controller.height().unwrap() + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_toggle_lock() {
        let (sheet, mut cpu, mut controller) = setup("lock");
        controller.add_task(Task::ToggleLock);
        controller.update(0.01, &mut cpu).unwrap();
        assert!(cpu.read_particles(&sheet.data_indices).unwrap().iter().all(|p| p.locked));

        controller.add_task(Task::ToggleLock);
        controller.update(0.01, &mut cpu).unwrap();
        assert!(cpu.read_particles(&sheet.data_indices).unwrap().iter().all(|p| !p.locked));
    }

    #[test]
    fn test_set_constant() {
        let (_, mut cpu, mut controller) = setup("constant");
        controller.add_task(Task::SetConstant(ConstantsIndex::OuterSpring, 1234.0));
        controller.update(0.01, &mut cpu).unwrap();
        assert_eq!(cpu.constants()[2], 1234.0);
    }

    #[test]
    fn test_force_sums_data_particles() {
        let (sheet, mut cpu, mut controller) = setup("force");
        controller.add_task(Task::ToggleLock);
        controller.add_task(Task::MoveDown);
        controller.update(0.0, &mut cpu).unwrap();
        let uniforms = cpu.physical_uniforms(0.0001, 0.0);
        cpu.step(&uniforms);
        controller.update(0.0, &mut cpu).unwrap();

        let expected: f32 = cpu
            .read_particles(&sheet.data_indices)
            .unwrap()
            .iter()
            .map(|p| p.force.y)
            .sum();
        assert_eq!(controller.force(), Some(expected));
        assert!(expected > 0.0);
    }

    #[test]
    fn test_end_data_set_writes_and_clears() {
        let (_, mut cpu, mut controller) = setup("end");
        controller.add_task(Task::CollectData);
        controller.add_task(Task::EndDataSet);
        let events = controller.update(0.01, &mut cpu).unwrap();

        let path = controller.config().output_path.clone();
        assert_eq!(events, vec![ControllerEvent::DataSetWritten(path.clone())]);
        assert!(controller.data().is_empty());
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("CircularTrampolineSheet{"));
        assert!(text.contains("\n0 "));
        cleanup(&controller);
    }

    #[test]
    fn test_failed_write_keeps_running_tasks() {
        let (sheet, mut cpu, _) = setup("unwritable");
        // A regular file where the output directory should be
        let blocker = std::env::temp_dir().join(format!("trampoline-blocker-{}", std::process::id()));
        fs::write(&blocker, "").unwrap();
        let path = blocker.join("data.txt");
        let config = MeasurementConfig {
            output_path: path.clone(),
            ..Default::default()
        };
        let mut controller =
            DataController::new(config, sheet.data_indices.clone(), sheet.parameters.to_string());

        controller.add_task(Task::CollectData);
        controller.add_task(Task::EndDataSet);
        controller.add_task(Task::MoveDown);
        let events = controller.update(0.01, &mut cpu).unwrap();

        assert_eq!(events, vec![ControllerEvent::DataSetFailed(path)]);
        assert_eq!(controller.pending_tasks(), 0);
        assert_eq!(controller.data().len(), 1);
        let particles = cpu.read_particles(&sheet.data_indices).unwrap();
        assert!(particles.iter().all(|p| (p.position.y + 0.2).abs() < 1e-6));
        let _ = fs::remove_file(&blocker);
    }

    #[test]
    fn test_tasks_dropped_while_autonomous() {
        let (_, mut cpu, mut controller) = setup("dropped");
        controller.start_autonomous();
        controller.add_task(Task::SetConstant(ConstantsIndex::InnerSpring, 1.0));
        controller.update(0.01, &mut cpu).unwrap();

        assert_eq!(controller.pending_tasks(), 0);
        assert_eq!(cpu.constants()[0], 4000.0);
    }

    #[test]
    fn test_program_steps_down_until_restart() {
        let (sheet, mut cpu, mut controller) = setup("program");
        controller.start_autonomous();
        assert_eq!(controller.state(), MeasurementState::Measuring);

        let mut restarted = false;
        let mut saw_waiting = false;
        for _ in 0..100 {
            let events = controller.update(0.06, &mut cpu).unwrap();
            saw_waiting |= controller.state() == MeasurementState::Waiting;
            if events.contains(&ControllerEvent::RestartRequested) {
                restarted = true;
                break;
            }
        }

        assert!(restarted);
        assert!(saw_waiting);
        let particles = cpu.read_particles(&sheet.data_indices).unwrap();
        assert!(particles.iter().all(|p| p.locked));
        assert!(particles[0].position.y <= -0.5);
        // Samples at 0, -0.2, -0.4 and the final height
        assert!(controller.data().len() >= 4);
    }

    #[test]
    fn test_stop_autonomous_writes_data() {
        let (_, mut cpu, mut controller) = setup("stop");
        controller.start_autonomous();
        controller.update(0.01, &mut cpu).unwrap();
        assert_eq!(controller.data().len(), 1);

        let event = controller.stop_autonomous().unwrap();
        assert!(matches!(event, ControllerEvent::DataSetWritten(_)));
        assert_eq!(controller.state(), MeasurementState::Idle);
        assert!(controller.data().is_empty());
        cleanup(&controller);
    }

    #[test]
    fn test_reset_clears_tasks_only() {
        let (_, mut cpu, mut controller) = setup("reset");
        controller.add_task(Task::CollectData);
        controller.update(0.01, &mut cpu).unwrap();
        controller.add_task(Task::MoveDown);
        controller.reset();

        assert_eq!(controller.pending_tasks(), 0);
        assert_eq!(controller.data().len(), 1);
    }
}
