//! Simulation configuration.
//!
//! Every section has defaults, so a config file only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "mesh": { "fineness": 0.05 },
//!   "physics": { "gravity": 9.81, "frame_time": null }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mesh::MeshParameters;

/// Complete configuration of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub mesh: MeshParameters,
    pub physics: PhysicsConfig,
    pub measurement: MeasurementConfig,
    pub view: ViewConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravitational acceleration along −y.
    pub gravity: f32,
    /// Simulated seconds per frame. `None` advances by the real frame time.
    pub frame_time: Option<f32>,
    /// Integration steps per frame.
    pub substeps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 0.0,
            frame_time: Some(0.00004),
            substeps: 1,
        }
    }
}

/// Parameters of the force/displacement measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Height step of the data particles.
    pub delta_y: f32,
    /// The measurement program restarts once the data particles reach this height.
    pub y_minimum: f32,
    /// Seconds of data collection per height step.
    pub measurement_latency: f32,
    /// Seconds the sheet settles after a height step.
    pub waiting_latency: f32,
    pub output_path: PathBuf,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            delta_y: 0.2,
            y_minimum: -3.0,
            measurement_latency: 0.1,
            waiting_latency: 0.1,
            output_path: PathBuf::from("trampoline_output/data.txt"),
        }
    }
}

/// Window and camera settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Translation of the camera parent transform.
    pub parent_translation: [f32; 3],
    /// Tilt of the camera parent transform around x, in degrees.
    pub parent_rotation_x: f32,
    /// Radians of rotation per dragged pixel.
    pub drag_sensitivity: f32,
    /// Zoom per scrolled pixel.
    pub scroll_sensitivity: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            title: "Trampoline".to_string(),
            width: 1280,
            height: 720,
            fov: 85.0,
            near: 0.01,
            far: 100.0,
            parent_translation: [0.0, 0.5, -3.0],
            parent_rotation_x: 20.0,
            drag_sensitivity: 0.004,
            scroll_sensitivity: 0.01,
        }
    }
}

impl ViewConfig {
    /// Camera parent transform: translation, then the x tilt.
    pub fn parent_matrix(&self) -> Mat4 {
        Mat4::from_translation(Vec3::from_array(self.parent_translation))
            * Mat4::from_rotation_x(self.parent_rotation_x.to_radians())
    }
}

impl SimulationConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert_eq!(config.physics.gravity, 0.0);
        assert_eq!(config.physics.frame_time, Some(0.00004));
        assert_eq!(config.physics.substeps, 1);
        assert_eq!(config.measurement.delta_y, 0.2);
        assert_eq!(config.measurement.y_minimum, -3.0);
        assert_eq!(config.view.fov, 85.0);
        assert_eq!(config.mesh, MeshParameters::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimulationConfig::from_json(
            r#"{ "mesh": { "fineness": 0.05 }, "physics": { "gravity": 9.81, "frame_time": null } }"#,
        )
        .unwrap();
        assert_eq!(config.mesh.fineness, 0.05);
        assert_eq!(config.mesh.sheet_radius, 1.31);
        assert_eq!(config.physics.gravity, 9.81);
        assert_eq!(config.physics.frame_time, None);
        assert_eq!(config.physics.substeps, 1);
        assert_eq!(config.measurement, MeasurementConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = SimulationConfig::default();
        config.mesh.particle_mass = Some(0.001);
        config.measurement.output_path = PathBuf::from("out/run.txt");
        let text = config.to_json().unwrap();
        assert_eq!(SimulationConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_json() {
        let err = SimulationConfig::from_json("{ \"physics\": 3 }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("trampoline-config-{}", std::process::id()))
            .join("config.json");
        let mut config = SimulationConfig::default();
        config.physics.substeps = 4;
        config.save(&path).unwrap();
        assert_eq!(SimulationConfig::load(&path).unwrap(), config);
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
    }

    #[test]
    fn test_parent_matrix() {
        let view = ViewConfig::default();
        let origin = view.parent_matrix().transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(0.0, 0.5, -3.0)).length() < 1e-6);
    }
}
