//! Simulation builder and window loop.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use glam::Vec2;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::config::SimulationConfig;
use crate::controller::Task;
use crate::data::rounded;
use crate::error::{GpuError, MeshError, SimulationError};
use crate::gpu::{GpuContext, GpuSheet, Renderer};
use crate::input::{Command, Input};
use crate::mesh::{self, MeshParameters, SheetData, EDGE_SMOOTHNESS};
use crate::model::{Model, ModelState};
use crate::node::Node;
use crate::time::Time;

#[cfg(feature = "egui")]
use crate::gpu::egui_integration::{EguiFrameOutput, EguiIntegration};

/// A trampoline simulation window.
///
/// Configure with method chaining, then call `.run()`.
///
/// ```ignore
/// use trampoline::{Simulation, SimulationConfig};
///
/// Simulation::new(SimulationConfig::default())
///     .with_gravity(9.81)
///     .with_autostart(true)
///     .run()?;
/// ```
pub struct Simulation {
    config: SimulationConfig,
    autostart: bool,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            autostart: false,
        }
    }

    pub fn with_mesh(mut self, mesh: MeshParameters) -> Self {
        self.config.mesh = mesh;
        self
    }

    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.config.physics.gravity = gravity;
        self
    }

    /// Simulated seconds per frame, `None` for real time.
    pub fn with_frame_time(mut self, frame_time: Option<f32>) -> Self {
        self.config.physics.frame_time = frame_time;
        self
    }

    pub fn with_substeps(mut self, substeps: u32) -> Self {
        self.config.physics.substeps = substeps.max(1);
        self
    }

    /// File the measured data sets are appended to.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.measurement.output_path = path.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.view.title = title.into();
        self
    }

    /// Starts the measurement program as soon as the sheet is loaded.
    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Opens the window and runs until it is closed.
    pub fn run(self) -> Result<(), SimulationError> {
        self.config.mesh.validate()?;

        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = App::new(self.config, self.autostart);
        event_loop.run_app(&mut app)?;

        match app.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

struct App {
    config: SimulationConfig,
    autostart: bool,
    window: Option<Arc<Window>>,
    context: Option<GpuContext>,
    renderer: Option<Renderer>,
    node: Node,
    input: Input,
    time: Time,
    state: ModelState,
    loader: Option<Receiver<Result<SheetData, MeshError>>>,
    model: Option<Model<GpuSheet>>,
    #[cfg(feature = "egui")]
    egui: Option<EguiIntegration>,
    #[cfg(feature = "egui")]
    egui_output: Option<EguiFrameOutput>,
    error: Option<SimulationError>,
}

impl App {
    fn new(config: SimulationConfig, autostart: bool) -> Self {
        let aspect = config.view.width as f32 / config.view.height as f32;
        Self {
            node: Node::new(&config.view, aspect),
            time: Time::new(config.physics.frame_time),
            config,
            autostart,
            window: None,
            context: None,
            renderer: None,
            input: Input::new(),
            state: ModelState::Init,
            loader: None,
            model: None,
            #[cfg(feature = "egui")]
            egui: None,
            #[cfg(feature = "egui")]
            egui_output: None,
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), SimulationError> {
        let window_attrs = Window::default_attributes()
            .with_title(self.config.view.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.view.width,
                self.config.view.height,
            ));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let instance = GpuContext::create_instance();
        let surface = instance.create_surface(window.clone()).map_err(GpuError::from)?;
        let context = pollster::block_on(GpuContext::for_surface(&instance, &surface))?;

        let size = window.inner_size();
        let edge = mesh::edge_ring(&self.config.mesh, EDGE_SMOOTHNESS);
        let renderer = Renderer::new(&context, surface, size.width, size.height, &edge);
        self.node.set_aspect(size.width as f32 / size.height as f32);

        #[cfg(feature = "egui")]
        {
            self.egui = Some(EguiIntegration::new(&context.device, renderer.format(), &window));
        }

        self.window = Some(window);
        self.context = Some(context);
        self.renderer = Some(renderer);
        self.set_state(ModelState::ParametersSet);
        self.start_loading();
        Ok(())
    }

    fn set_state(&mut self, state: ModelState) {
        if state != self.state {
            log::info!("Model state: {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// Generates the mesh on a worker thread.
    fn start_loading(&mut self) {
        let params = self.config.mesh.clone();
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let _ = sender.send(mesh::generate(&params));
        });
        self.loader = Some(receiver);
        self.set_state(ModelState::LoadingModel);
    }

    fn poll_loader(&mut self) -> Result<(), SimulationError> {
        let Some(receiver) = &self.loader else {
            return Ok(());
        };
        let sheet = match receiver.try_recv() {
            Ok(result) => result?,
            Err(TryRecvError::Empty) => return Ok(()),
            Err(TryRecvError::Disconnected) => return Err(SimulationError::ModelNotLoaded),
        };
        self.loader = None;

        let context = self.context.as_ref().ok_or(SimulationError::ModelNotLoaded)?;
        let backend = GpuSheet::new(context, &sheet);
        let mut model = Model::new(
            backend,
            sheet,
            self.config.measurement.clone(),
            self.config.physics.clone(),
        );
        if self.autostart {
            model.start_autonomous();
        }
        self.model = Some(model);
        self.set_state(ModelState::ReadyToRun);
        Ok(())
    }

    fn execute(&mut self, command: Command, event_loop: &ActiveEventLoop) {
        if command == Command::Quit {
            event_loop.exit();
            return;
        }
        if command == Command::ToggleTime {
            self.time.toggle_virtual();
            return;
        }

        let Some(model) = &mut self.model else {
            log::debug!("Ignoring {:?}, the model is still loading", command);
            return;
        };
        match command {
            Command::ToggleRun => {
                model.toggle_running();
            }
            Command::Reset => {
                model.reset(true);
                self.time.reset_virtual();
            }
            Command::ToggleLock => model.add_task(Task::ToggleLock),
            Command::MoveUp => model.add_task(Task::MoveUp),
            Command::MoveDown => model.add_task(Task::MoveDown),
            Command::CollectData => model.add_task(Task::CollectData),
            Command::EndDataSet => model.add_task(Task::EndDataSet),
            Command::StartProgram => model.start_autonomous(),
            Command::StopProgram => {
                if let Err(e) = model.stop_autonomous() {
                    log::error!("Failed to write data set: {}", e);
                }
            }
            Command::ToggleTime | Command::Quit => {}
        }
    }

    fn update_title(&self) {
        let (Some(window), Some(model)) = (&self.window, &self.model) else {
            return;
        };
        let controller = model.controller();
        let reading = |value: Option<f32>| match value {
            Some(v) => rounded(v as f64, 4).to_string(),
            None => "-".to_string(),
        };
        window.set_title(&format!(
            "{} | height: {} | force: {} | time: {}s | {}",
            self.config.view.title,
            reading(controller.height()),
            reading(controller.force()),
            rounded(model.virtual_time(), 5),
            self.state,
        ));
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<(), SimulationError> {
        self.poll_loader()?;

        let drag = self.input.take_drag();
        if drag != Vec2::ZERO {
            self.node.drag(drag.x, drag.y);
        }
        let scroll = self.input.take_scroll();
        if scroll != 0.0 {
            self.node.zoom(scroll);
        }

        let dt = self.time.update();
        if let Some(model) = &mut self.model {
            model.frame(dt)?;
            let next = self.state.follow(model.should_run());
            self.set_state(next);
        }
        if self.time.frame() % 10 == 0 {
            self.update_title();
        }

        #[cfg(feature = "egui")]
        for command in self.run_ui() {
            self.execute(command, event_loop);
        }

        self.render(event_loop);
        Ok(())
    }

    #[cfg(feature = "egui")]
    fn run_ui(&mut self) -> Vec<Command> {
        let (Some(egui), Some(window)) = (self.egui.as_mut(), self.window.as_ref()) else {
            return Vec::new();
        };
        let mut model = self.model.as_mut();
        let time = &mut self.time;
        let state = self.state;
        let mut commands = Vec::new();

        let output = egui.run(window, |ctx| {
            commands = crate::ui::control_panel(ctx, model.as_deref_mut(), time, state);
        });
        self.egui_output = Some(output);
        commands
    }

    fn render(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let uniforms = self.node.uniforms();
        let sheet = self.model.as_ref().map(Model::backend);

        #[cfg(feature = "egui")]
        let result = match (self.egui.as_mut(), self.egui_output.take(), self.context.as_ref()) {
            (Some(egui), Some(output), Some(context)) => {
                let (width, height) = renderer.size();
                let mut paint = |encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView| {
                    egui.paint(&context.device, &context.queue, encoder, view, [width, height], &output);
                };
                renderer.render(&uniforms, sheet, Some(&mut paint))
            }
            _ => renderer.render(&uniforms, sheet, None),
        };

        #[cfg(not(feature = "egui"))]
        let result = match sheet {
            Some(sheet) => renderer.render(&uniforms, Some(sheet), None),
            None => renderer.render_edge_only(&uniforms),
        };

        match result {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => renderer.reconfigure(),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of GPU memory");
                event_loop.exit();
            }
            Err(e) => log::warn!("Render error: {:?}", e),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: SimulationError) {
        log::error!("{}", error);
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        #[cfg(feature = "egui")]
        if let (Some(egui), Some(window)) = (self.egui.as_mut(), self.window.as_ref()) {
            let passthrough = matches!(
                event,
                WindowEvent::RedrawRequested | WindowEvent::Resized(_) | WindowEvent::CloseRequested
            );
            if egui.on_window_event(window, &event) && !passthrough {
                return;
            }
        }

        if let Some(command) = self.input.handle_event(&event) {
            self.execute(command, event_loop);
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(physical_size.width, physical_size.height);
                }
                if physical_size.height > 0 {
                    self.node
                        .set_aspect(physical_size.width as f32 / physical_size.height as f32);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw(event_loop) {
                    self.fail(event_loop, e);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
