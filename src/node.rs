//! Transform of the rendered sheet.

use glam::{Mat4, Vec3};

use crate::config::ViewConfig;
use crate::shader_types::Uniforms;

/// Position, rotation and scale of the sheet, under a parent (camera)
/// transform and a perspective projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub position: Vec3,
    /// Euler angles in radians, applied x, then y, then z.
    pub rotation: Vec3,
    pub scale: f32,
    pub parent: Mat4,
    pub projection: Mat4,
    fov: f32,
    near: f32,
    far: f32,
    drag_sensitivity: f32,
    scroll_sensitivity: f32,
}

impl Node {
    pub fn new(view: &ViewConfig, aspect: f32) -> Self {
        let mut node = Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
            parent: view.parent_matrix(),
            projection: Mat4::IDENTITY,
            fov: view.fov.to_radians(),
            near: view.near,
            far: view.far,
            drag_sensitivity: view.drag_sensitivity,
            scroll_sensitivity: view.scroll_sensitivity,
        };
        node.set_aspect(aspect);
        node
    }

    /// Rebuilds the projection for a new viewport aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        self.projection = Mat4::perspective_rh(self.fov, aspect, self.near, self.far);
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * Mat4::from_rotation_x(self.rotation.x)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_scale(Vec3::splat(self.scale))
    }

    pub fn model_view_matrix(&self) -> Mat4 {
        self.parent * self.model_matrix()
    }

    /// Rotates by a mouse drag of `(dx, dy)` pixels.
    pub fn drag(&mut self, dx: f32, dy: f32) {
        self.rotation.x += dy * self.drag_sensitivity;
        self.rotation.y += dx * self.drag_sensitivity;
    }

    /// Moves the camera along its view axis by a scroll of `dy` pixels.
    pub fn zoom(&mut self, dy: f32) {
        self.parent.w_axis.z += dy * self.scroll_sensitivity;
    }

    pub fn uniforms(&self) -> Uniforms {
        Uniforms {
            projection_matrix: self.projection,
            model_view_matrix: self.model_view_matrix(),
        }
    }
}
