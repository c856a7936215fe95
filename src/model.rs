//! The running trampoline: a sheet backend plus its measurement controller.

use std::fmt;

use crate::config::{MeasurementConfig, PhysicsConfig};
use crate::controller::{ControllerEvent, DataController, MeasurementState, Task};
use crate::error::SimulationError;
use crate::mesh::SheetData;
use crate::physics::SheetBackend;
use crate::shader_types::ConstantsIndex;
use crate::ShaderIndex;

/// Lifecycle of the simulation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelState {
    /// Nothing requested yet.
    #[default]
    Init,
    /// Mesh parameters chosen, generation not started.
    ParametersSet,
    /// The mesh is being generated in the background.
    LoadingModel,
    /// Loaded and paused.
    ReadyToRun,
    Running,
}

impl ModelState {
    /// Whether the sheet buffers exist in this state.
    pub fn is_loaded(self) -> bool {
        matches!(self, ModelState::ReadyToRun | ModelState::Running)
    }

    /// The loaded state matching `should_run`. Unloaded states are kept.
    pub fn follow(self, should_run: bool) -> ModelState {
        match (self, should_run) {
            (ModelState::ReadyToRun, true) => ModelState::Running,
            (ModelState::Running, false) => ModelState::ReadyToRun,
            (state, _) => state,
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelState::Init => "init",
            ModelState::ParametersSet => "parameters set",
            ModelState::LoadingModel => "loading model",
            ModelState::ReadyToRun => "ready to run",
            ModelState::Running => "running",
        };
        f.write_str(name)
    }
}

/// A sheet backend, its initial contents and the data controller.
pub struct Model<B: SheetBackend> {
    backend: B,
    sheet: SheetData,
    controller: DataController,
    physics: PhysicsConfig,
    should_run: bool,
    virtual_time: f64,
}

impl<B: SheetBackend> Model<B> {
    /// Wraps `backend`, which must already hold `sheet`.
    pub fn new(backend: B, sheet: SheetData, measurement: MeasurementConfig, physics: PhysicsConfig) -> Self {
        let controller = DataController::new(measurement, sheet.data_indices.clone(), sheet.parameters.to_string());
        Self {
            backend,
            sheet,
            controller,
            physics,
            should_run: false,
            virtual_time: 0.0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Initial buffer contents, restored by [`Model::reset`].
    pub fn sheet(&self) -> &SheetData {
        &self.sheet
    }

    pub fn controller(&self) -> &DataController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut DataController {
        &mut self.controller
    }

    pub fn physics(&self) -> &PhysicsConfig {
        &self.physics
    }

    pub fn set_gravity(&mut self, gravity: f32) {
        self.physics.gravity = gravity;
    }

    pub fn set_substeps(&mut self, substeps: u32) {
        self.physics.substeps = substeps.max(1);
    }

    pub fn should_run(&self) -> bool {
        self.should_run
    }

    pub fn set_should_run(&mut self, should_run: bool) {
        self.should_run = should_run;
    }

    pub fn toggle_running(&mut self) -> bool {
        self.should_run = !self.should_run;
        self.should_run
    }

    /// Simulated seconds since the last reset that cleared it.
    pub fn virtual_time(&self) -> f64 {
        self.virtual_time
    }

    pub fn add_task(&mut self, task: Task) {
        self.controller.add_task(task);
    }

    /// Writes a physics constant now, and keeps it across resets.
    pub fn set_constant(&mut self, index: ConstantsIndex, value: f32) {
        self.sheet.constants[index.index() as usize] = value;
        self.backend.write_constant(index, value);
    }

    pub fn constant(&self, index: ConstantsIndex) -> f32 {
        self.sheet.constant(index)
    }

    /// Advances the model by `dt` simulated seconds if it is running.
    pub fn frame(&mut self, dt: f32) -> Result<Vec<ControllerEvent>, SimulationError> {
        if !self.should_run {
            return Ok(Vec::new());
        }
        self.virtual_time += dt as f64;

        let events = self.controller.update(dt, &mut self.backend)?;
        for event in &events {
            match event {
                ControllerEvent::RestartRequested => self.start_autonomous(),
                ControllerEvent::DataSetWritten(path) => {
                    log::info!("Data set written to {}", path.display())
                }
                ControllerEvent::DataSetFailed(path) => {
                    log::warn!("Data set kept in memory, {} is not writable", path.display())
                }
            }
        }

        let substeps = self.physics.substeps.max(1);
        let uniforms = self
            .backend
            .physical_uniforms(dt / substeps as f32, self.physics.gravity);
        for _ in 0..substeps {
            self.backend.step(&uniforms);
        }
        Ok(events)
    }

    /// Restores the initial sheet and stops running.
    pub fn reset(&mut self, reset_virtual_time: bool) {
        log::debug!("Resetting model");
        self.backend.reset(&self.sheet);
        self.controller.reset();
        self.should_run = false;
        if reset_virtual_time {
            self.virtual_time = 0.0;
        }
    }

    /// Restarts the sheet and runs the measurement program from the top.
    pub fn start_autonomous(&mut self) {
        self.reset(false);
        self.should_run = true;
        self.controller.start_autonomous();
    }

    /// Stops the measurement program and writes the data set.
    pub fn stop_autonomous(&mut self) -> Result<ControllerEvent, SimulationError> {
        let event = self.controller.stop_autonomous()?;
        if let ControllerEvent::DataSetWritten(path) = &event {
            log::info!("Data set written to {}", path.display());
        }
        Ok(event)
    }

    pub fn is_autonomous(&self) -> bool {
        self.controller.state() != MeasurementState::Idle
    }
}
