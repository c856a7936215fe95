//! Running the model without a window.

use std::path::PathBuf;

use crate::config::SimulationConfig;
use crate::controller::ControllerEvent;
use crate::error::SimulationError;
use crate::gpu::{GpuContext, GpuSheet};
use crate::mesh;
use crate::model::Model;
use crate::physics::{CpuSheet, SheetBackend};

/// Frame time used when the config asks for real time, which has no
/// meaning without a window.
pub const FALLBACK_FRAME_TIME: f32 = 0.00004;

/// Where the sheet is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Gpu,
    /// The host reference solver.
    Cpu,
}

/// Outcome of a headless run.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessReport {
    pub frames: u32,
    pub virtual_time: f64,
    /// Height of the first data particle after the last frame.
    pub height: Option<f32>,
    pub force: Option<f32>,
    /// Distinct heights collected.
    pub samples: usize,
    /// File the data set was appended to, if anything was collected.
    pub output: Option<PathBuf>,
}

/// Generates the sheet and runs it for `frames` frames.
///
/// With `autonomous` the measurement program runs from the first frame and
/// its data set is written at the end; otherwise the sheet just evolves.
pub fn run(
    config: &SimulationConfig,
    frames: u32,
    backend: Backend,
    autonomous: bool,
) -> Result<HeadlessReport, SimulationError> {
    let sheet = mesh::generate(&config.mesh)?;
    let measurement = config.measurement.clone();
    let physics = config.physics.clone();

    match backend {
        Backend::Cpu => {
            let cpu = CpuSheet::new(&sheet);
            run_model(Model::new(cpu, sheet, measurement, physics), frames, autonomous)
        }
        Backend::Gpu => {
            let context = pollster::block_on(GpuContext::headless())?;
            let gpu = GpuSheet::new(&context, &sheet);
            run_model(Model::new(gpu, sheet, measurement, physics), frames, autonomous)
        }
    }
}

fn run_model<B: SheetBackend>(
    mut model: Model<B>,
    frames: u32,
    autonomous: bool,
) -> Result<HeadlessReport, SimulationError> {
    let dt = match model.physics().frame_time {
        Some(frame_time) => frame_time,
        None => {
            log::warn!("Real time requested without a window, using {}s per frame", FALLBACK_FRAME_TIME);
            FALLBACK_FRAME_TIME
        }
    };

    if autonomous {
        model.start_autonomous();
    } else {
        model.set_should_run(true);
    }

    log::info!("Running {} frames of {}s", frames, dt);
    let mut restarts = 0;
    for frame in 0..frames {
        let events = model.frame(dt)?;
        restarts += events
            .iter()
            .filter(|e| **e == ControllerEvent::RestartRequested)
            .count();
        if frame > 0 && frame % 10_000 == 0 {
            log::debug!("Frame {}, t = {:.5}s", frame, model.virtual_time());
        }
    }
    if restarts > 0 {
        log::info!("Measurement program restarted {} times", restarts);
    }

    let samples = model.controller().data().len();
    let output = if samples > 0 {
        match model.stop_autonomous()? {
            ControllerEvent::DataSetWritten(path) => Some(path),
            ControllerEvent::RestartRequested | ControllerEvent::DataSetFailed(_) => None,
        }
    } else {
        None
    };

    Ok(HeadlessReport {
        frames,
        virtual_time: model.virtual_time(),
        height: model.controller().height(),
        force: model.controller().force(),
        samples,
        output,
    })
}
