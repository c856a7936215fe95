//! Keyboard commands and mouse camera controls.
//!
//! | Key | Command |
//! |-----|---------|
//! | Space | run / stop |
//! | R | reset |
//! | L | toggle lock of the data particles |
//! | ↑ / ↓ | move the data particles |
//! | C | collect a data point |
//! | E | end the data set |
//! | P / O | start / stop the measurement program |
//! | T | switch between real and virtual time |
//! | Esc | quit |
//!
//! Dragging with the left button rotates the sheet, the wheel zooms.

use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pixels one wheel notch counts as.
const PIXELS_PER_LINE: f32 = 40.0;

/// A user action bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleRun,
    Reset,
    ToggleLock,
    MoveUp,
    MoveDown,
    CollectData,
    EndDataSet,
    StartProgram,
    StopProgram,
    ToggleTime,
    Quit,
}

impl Command {
    pub fn from_key(key: KeyCode) -> Option<Command> {
        let command = match key {
            KeyCode::Space => Command::ToggleRun,
            KeyCode::KeyR => Command::Reset,
            KeyCode::KeyL => Command::ToggleLock,
            KeyCode::ArrowUp => Command::MoveUp,
            KeyCode::ArrowDown => Command::MoveDown,
            KeyCode::KeyC => Command::CollectData,
            KeyCode::KeyE => Command::EndDataSet,
            KeyCode::KeyP => Command::StartProgram,
            KeyCode::KeyO => Command::StopProgram,
            KeyCode::KeyT => Command::ToggleTime,
            KeyCode::Escape => Command::Quit,
            _ => return None,
        };
        Some(command)
    }

    /// Button label in the control panel.
    pub fn label(self) -> &'static str {
        match self {
            Command::ToggleRun => "Run / Stop",
            Command::Reset => "Reset",
            Command::ToggleLock => "Toggle lock",
            Command::MoveUp => "Move up",
            Command::MoveDown => "Move down",
            Command::CollectData => "Collect",
            Command::EndDataSet => "End data set",
            Command::StartProgram => "Start program",
            Command::StopProgram => "Stop program",
            Command::ToggleTime => "Real / virtual time",
            Command::Quit => "Quit",
        }
    }
}

/// Mouse state between frames.
#[derive(Debug, Default)]
pub struct Input {
    dragging: bool,
    cursor: Option<Vec2>,
    /// Drag distance since the last [`Input::take_drag`].
    drag: Vec2,
    /// Scroll distance in pixels since the last [`Input::take_scroll`].
    scroll: f32,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes a window event, returning the command of a newly pressed key.
    pub fn handle_event(&mut self, event: &WindowEvent) -> Option<Command> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return None;
                }
                match event.physical_key {
                    PhysicalKey::Code(key) => Command::from_key(key),
                    PhysicalKey::Unidentified(_) => None,
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if *button == MouseButton::Left {
                    self.set_dragging(*state == ElementState::Pressed);
                }
                None
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(Vec2::new(position.x as f32, position.y as f32));
                None
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                None
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll(match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y * PIXELS_PER_LINE,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32,
                });
                None
            }
            _ => None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    fn cursor_moved(&mut self, position: Vec2) {
        if let (true, Some(last)) = (self.dragging, self.cursor) {
            self.drag += position - last;
        }
        self.cursor = Some(position);
    }

    fn scroll(&mut self, pixels: f32) {
        self.scroll += pixels;
    }

    /// Returns and clears the accumulated drag.
    pub fn take_drag(&mut self) -> Vec2 {
        std::mem::take(&mut self.drag)
    }

    /// Returns and clears the accumulated scroll.
    pub fn take_scroll(&mut self) -> f32 {
        std::mem::take(&mut self.scroll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_map() {
        assert_eq!(Command::from_key(KeyCode::Space), Some(Command::ToggleRun));
        assert_eq!(Command::from_key(KeyCode::KeyR), Some(Command::Reset));
        assert_eq!(Command::from_key(KeyCode::KeyL), Some(Command::ToggleLock));
        assert_eq!(Command::from_key(KeyCode::ArrowUp), Some(Command::MoveUp));
        assert_eq!(Command::from_key(KeyCode::ArrowDown), Some(Command::MoveDown));
        assert_eq!(Command::from_key(KeyCode::KeyC), Some(Command::CollectData));
        assert_eq!(Command::from_key(KeyCode::KeyE), Some(Command::EndDataSet));
        assert_eq!(Command::from_key(KeyCode::KeyP), Some(Command::StartProgram));
        assert_eq!(Command::from_key(KeyCode::KeyO), Some(Command::StopProgram));
        assert_eq!(Command::from_key(KeyCode::KeyT), Some(Command::ToggleTime));
        assert_eq!(Command::from_key(KeyCode::Escape), Some(Command::Quit));
        assert_eq!(Command::from_key(KeyCode::KeyQ), None);
    }

    #[test]
    fn test_drag_needs_button() {
        let mut input = Input::new();
        input.cursor_moved(Vec2::new(10.0, 10.0));
        input.cursor_moved(Vec2::new(20.0, 15.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);

        input.set_dragging(true);
        input.cursor_moved(Vec2::new(30.0, 5.0));
        input.cursor_moved(Vec2::new(35.0, 5.0));
        assert_eq!(input.take_drag(), Vec2::new(15.0, -10.0));
        // Cleared after taking
        assert_eq!(input.take_drag(), Vec2::ZERO);

        input.set_dragging(false);
        input.cursor_moved(Vec2::new(100.0, 100.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);
    }

    #[test]
    fn test_scroll_accumulates() {
        let mut input = Input::new();
        input.scroll(PIXELS_PER_LINE);
        input.scroll(-10.0);
        assert_eq!(input.take_scroll(), 30.0);
        assert_eq!(input.take_scroll(), 0.0);
    }

    #[test]
    fn test_labels_are_distinct() {
        let commands = [
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
            Command::Quit,
        ];
        let mut labels: Vec<_> = commands.iter().map(|c| c.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), commands.len());
    }
}
