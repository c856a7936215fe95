//! Error types for trampoline.
//!
//! This module provides error types for GPU initialization, mesh generation,
//! buffer access, configuration and data files.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur during GPU initialization.
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::SurfaceCreation(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// A raw value that does not name a variant of a shared index enum.
///
/// Returned by the `TryFrom<u32>` impls generated by `#[derive(ShaderIndex)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutOfRange {
    /// Name of the index enum, e.g. `"BufferIndex"`.
    pub kind: &'static str,
    pub value: u32,
}

impl fmt::Display for IndexOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} has no variant with value {}", self.kind, self.value)
    }
}

impl std::error::Error for IndexOutOfRange {}

/// Errors that can occur while building the trampoline sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// A mesh parameter is out of range.
    InvalidParameter { name: &'static str, reason: String },
    /// A particle is attached to more springs than it has slots for.
    TooManySprings { particle: usize, count: usize, max: usize },
    /// No grid particle survived the cut to the sheet radius.
    EmptySheet,
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::InvalidParameter { name, reason } => {
                write!(f, "Invalid mesh parameter '{}': {}", name, reason)
            }
            MeshError::TooManySprings { particle, count, max } => write!(
                f,
                "Particle {} is attached to {} springs, at most {} are supported",
                particle, count, max
            ),
            MeshError::EmptySheet => write!(f, "No particles left inside the sheet radius. Decrease fineness or increase the sheet radius."),
        }
    }
}

impl std::error::Error for MeshError {}

/// Errors that can occur when reading or writing sheet buffers.
#[derive(Debug)]
pub enum SheetError {
    /// Reading particles back from the GPU failed.
    Readback(GpuError),
    /// A particle index past the end of the particle buffer.
    IndexOutOfRange { index: u32, len: usize },
}

impl fmt::Display for SheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetError::Readback(e) => write!(f, "Failed to read particles: {}", e),
            SheetError::IndexOutOfRange { index, len } => {
                write!(f, "Particle index {} out of range ({} particles)", index, len)
            }
        }
    }
}

impl std::error::Error for SheetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SheetError::Readback(e) => Some(e),
            SheetError::IndexOutOfRange { .. } => None,
        }
    }
}

impl From<GpuError> for SheetError {
    fn from(e: GpuError) -> Self {
        SheetError::Readback(e)
    }
}

/// Errors that can occur when loading or saving a configuration file.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to access config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Invalid config file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Errors that can occur when reading or writing measurement data files.
#[derive(Debug)]
pub enum DataError {
    Io { path: PathBuf, source: std::io::Error },
    /// A data line that is not two floats separated by whitespace.
    Parse { line: usize, content: String },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::Io { path, source } => {
                write!(f, "Failed to access data file {}: {}", path.display(), source)
            }
            DataError::Parse { line, content } => {
                write!(f, "Malformed data line {}: '{}'", line, content)
            }
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Io { source, .. } => Some(source),
            DataError::Parse { .. } => None,
        }
    }
}

/// Errors that can occur when running a simulation.
#[derive(Debug)]
pub enum SimulationError {
    /// Failed to create event loop.
    EventLoop(winit::error::EventLoopError),
    /// Failed to create window.
    Window(winit::error::OsError),
    /// GPU initialization failed.
    Gpu(GpuError),
    Mesh(MeshError),
    Sheet(SheetError),
    Config(ConfigError),
    Data(DataError),
    /// An operation needed the sheet before it finished loading.
    ModelNotLoaded,
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::EventLoop(e) => write!(f, "Failed to create event loop: {}", e),
            SimulationError::Window(e) => write!(f, "Failed to create window: {}", e),
            SimulationError::Gpu(e) => write!(f, "GPU error: {}", e),
            SimulationError::Mesh(e) => write!(f, "Mesh error: {}", e),
            SimulationError::Sheet(e) => write!(f, "Sheet error: {}", e),
            SimulationError::Config(e) => write!(f, "Config error: {}", e),
            SimulationError::Data(e) => write!(f, "Data error: {}", e),
            SimulationError::ModelNotLoaded => write!(f, "The trampoline model is not loaded yet"),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::EventLoop(e) => Some(e),
            SimulationError::Window(e) => Some(e),
            SimulationError::Gpu(e) => Some(e),
            SimulationError::Mesh(e) => Some(e),
            SimulationError::Sheet(e) => Some(e),
            SimulationError::Config(e) => Some(e),
            SimulationError::Data(e) => Some(e),
            SimulationError::ModelNotLoaded => None,
        }
    }
}

impl From<winit::error::EventLoopError> for SimulationError {
    fn from(e: winit::error::EventLoopError) -> Self {
        SimulationError::EventLoop(e)
    }
}

impl From<winit::error::OsError> for SimulationError {
    fn from(e: winit::error::OsError) -> Self {
        SimulationError::Window(e)
    }
}

impl From<GpuError> for SimulationError {
    fn from(e: GpuError) -> Self {
        SimulationError::Gpu(e)
    }
}

impl From<MeshError> for SimulationError {
    fn from(e: MeshError) -> Self {
        SimulationError::Mesh(e)
    }
}

impl From<SheetError> for SimulationError {
    fn from(e: SheetError) -> Self {
        SimulationError::Sheet(e)
    }
}

impl From<ConfigError> for SimulationError {
    fn from(e: ConfigError) -> Self {
        SimulationError::Config(e)
    }
}

impl From<DataError> for SimulationError {
    fn from(e: DataError) -> Self {
        SimulationError::Data(e)
    }
}
