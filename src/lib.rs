//! # trampoline
//!
//! A GPU mass-spring simulation of a circular trampoline jumping sheet.
//!
//! The sheet is a square grid of particles cut to a circle, tied to a ring of
//! locked frame particles by stiffer outer springs. Three compute passes
//! advance it every step (spring forces, per-particle force gather, Verlet
//! integration) and a line renderer draws every spring. A measurement
//! controller pushes the particles at the centre of the sheet down and
//! records the restoring force against the displacement.
//!
//! ## Host/shader contract
//!
//! Buffer binding slots, the layout of the physics constants array and the
//! per-frame uniforms are defined once in [`shader_types`]:
//!
//! ```ignore
//! use trampoline::shader_types::{BufferIndex, ConstantsIndex, Uniforms};
//!
//! assert_eq!(u32::from(BufferIndex::Uniforms), 2);
//! assert_eq!(u32::from(ConstantsIndex::OuterSpring), 2);
//! assert_eq!(Uniforms::GPU_SIZE, 128);
//! ```
//!
//! The WGSL side is generated from those definitions, and the bind group
//! layouts are built from the same binding tables as the WGSL declarations
//! (see [`shader`]), so slot numbers cannot drift apart.
//!
//! ## Running
//!
//! ```ignore
//! use trampoline::{Simulation, SimulationConfig};
//!
//! Simulation::new(SimulationConfig::default()).run()?;
//! ```
//!
//! Without a window, [`headless::run`] drives the same model on the GPU or on
//! the CPU reference solver in [`physics`].

extern crate self as trampoline;

pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod gpu;
pub mod headless;
pub mod input;
pub mod mesh;
pub mod model;
pub mod node;
pub mod physics;
pub mod shader;
pub mod shader_types;
mod simulation;
pub mod time;
#[cfg(feature = "egui")]
mod ui;

pub use bytemuck;
pub use config::SimulationConfig;
pub use error::{IndexOutOfRange, SimulationError};
pub use glam::{Mat4, UVec2, Vec3};
pub use mesh::{MeshParameters, SheetData};
pub use model::{Model, ModelState};
pub use simulation::Simulation;
pub use trampoline_derive::{GpuStruct, ShaderIndex};

/// Trait automatically implemented by `#[derive(GpuStruct)]`.
///
/// Bridges a Rust struct to its padded GPU representation and the matching
/// WGSL struct definition.
///
/// # Do Not Implement Manually
///
/// The derive macro computes padding and asserts every field offset at
/// compile time; a hand-written impl gets none of that.
pub trait GpuStruct: Sized {
    /// GPU-compatible representation with explicit padding fields.
    type Gpu: Copy + bytemuck::Pod + bytemuck::Zeroable;

    /// WGSL struct definition with the same name and layout.
    const WGSL_STRUCT: &'static str;

    /// Size in bytes, a multiple of 16.
    const GPU_SIZE: u32;

    /// `(field name, byte offset)` of every non-padding field, in order.
    const FIELD_OFFSETS: &'static [(&'static str, u32)];

    fn to_gpu(&self) -> Self::Gpu;

    fn from_gpu(gpu: &Self::Gpu) -> Self;
}

/// Trait automatically implemented by `#[derive(ShaderIndex)]`.
///
/// A unit enum whose variants are contiguous indices starting at zero and
/// exist identically on the host and in WGSL.
pub trait ShaderIndex: Copy + Sized + 'static {
    /// Name of the enum.
    const NAME: &'static str;

    /// Number of variants.
    const COUNT: usize;

    /// Every variant, in index order.
    const ALL: &'static [Self];

    /// One WGSL `const` declaration per variant.
    const WGSL_CONSTANTS: &'static str;

    fn index(self) -> u32;

    /// Name of the WGSL constant for this variant.
    fn wgsl_name(self) -> &'static str;
}
