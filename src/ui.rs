//! Control panel drawn with egui.

use crate::input::Command;
use crate::model::{Model, ModelState};
use crate::physics::SheetBackend;
use crate::shader_types::ConstantsIndex;
use crate::time::Time;
use crate::ShaderIndex;

const BUTTONS: &[Command] = &[
    Command::ToggleRun,
    Command::Reset,
    Command::ToggleLock,
    Command::MoveUp,
    Command::MoveDown,
    Command::CollectData,
    Command::EndDataSet,
    Command::StartProgram,
    Command::StopProgram,
    Command::ToggleTime,
];

/// Draws the panel and returns the commands of clicked buttons.
///
/// Slider changes are applied directly.
pub(crate) fn control_panel<B: SheetBackend>(
    ctx: &egui::Context,
    model: Option<&mut Model<B>>,
    time: &mut Time,
    state: ModelState,
) -> Vec<Command> {
    let mut commands = Vec::new();

    egui::Window::new("Trampoline")
        .default_pos([10.0, 10.0])
        .resizable(false)
        .show(ctx, |ui| {
            ui.label(format!("State: {}", state));
            ui.label(format!("FPS: {:.1}", time.fps()));

            match time.virtual_frame_time() {
                Some(mut frame_time) => {
                    let slider = egui::Slider::new(&mut frame_time, 1e-6..=1e-3)
                        .logarithmic(true)
                        .text("frame time");
                    if ui.add(slider).changed() {
                        time.set_frame_time(Some(frame_time));
                    }
                }
                None => {
                    ui.label("Real time");
                }
            }

            let Some(model) = model else {
                ui.label("Loading sheet...");
                return;
            };

            ui.separator();
            let mut delta_y = model.controller().delta_y();
            if ui
                .add(egui::Slider::new(&mut delta_y, 0.001..=1.0).text("delta y"))
                .changed()
            {
                model.controller_mut().set_delta_y(delta_y);
            }

            let mut gravity = model.physics().gravity;
            if ui
                .add(egui::Slider::new(&mut gravity, 0.0..=20.0).text("gravity"))
                .changed()
            {
                model.set_gravity(gravity);
            }

            for &index in ConstantsIndex::ALL {
                let (name, range) = match index {
                    ConstantsIndex::InnerSpring => ("inner spring", 0.0..=10000.0),
                    ConstantsIndex::InnerVelocity => ("inner velocity", 0.0..=10.0),
                    ConstantsIndex::OuterSpring => ("outer spring", 0.0..=10000.0),
                    ConstantsIndex::OuterVelocity => ("outer velocity", 0.0..=10.0),
                };
                let mut value = model.constant(index);
                if ui.add(egui::Slider::new(&mut value, range).text(name)).changed() {
                    model.set_constant(index, value);
                }
            }

            ui.separator();
            if let (Some(height), Some(force)) = (model.controller().height(), model.controller().force()) {
                ui.label(format!("Height: {:.4}", height));
                ui.label(format!("Force: {:.4}", force));
            }
            ui.label(format!("Samples: {}", model.controller().data().len()));

            ui.separator();
            egui::Grid::new("commands").num_columns(2).show(ui, |ui| {
                for (i, &command) in BUTTONS.iter().enumerate() {
                    if ui.button(command.label()).clicked() {
                        commands.push(command);
                    }
                    if i % 2 == 1 {
                        ui.end_row();
                    }
                }
            });
        });

    commands
}
