//! Types shared between the host and the WGSL shaders.
//!
//! Everything the GPU reads is declared here exactly once. The derive macros
//! generate the padded `*Gpu` companions and the WGSL text from these
//! definitions, and [`wgsl_prelude`] stitches the WGSL side together for the
//! shader modules in [`crate::shader`].
//!
//! # Binding slots
//!
//! | Slot | [`BufferIndex`] | Contents |
//! |------|-----------------|----------|
//! | 0 | `Particle` | `array<Particle>` |
//! | 1 | `Spring` | `array<Spring>` |
//! | 2 | `Uniforms` | [`Uniforms`] (per frame) |
//! | 3 | `Constants` | `array<f32>` indexed by [`ConstantsIndex`] |
//! | 4 | `PhysicalUniforms` | [`PhysicalUniforms`] |
//! | 5 | `OtherRendering` | `array<VertexIn>` (frame ring) |

use glam::{Mat4, UVec2, Vec3};

use crate::{GpuStruct, ShaderIndex};

/// Maximum number of springs a single particle can be attached to.
///
/// The gather pass walks this many slots per particle.
pub const MAX_SPRINGS_PER_PARTICLE: usize = 16;

/// Value of an unused entry in [`Particle::springs`].
pub const NO_SPRING: u32 = u32::MAX;

/// Binding slot (`@group(0) @binding(n)`) of every GPU buffer.
#[derive(ShaderIndex, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BufferIndex {
    Particle = 0,
    Spring = 1,
    Uniforms = 2,
    Constants = 3,
    PhysicalUniforms = 4,
    OtherRendering = 5,
}

/// Offset of each physics constant in the constants buffer.
#[derive(ShaderIndex, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ConstantsIndex {
    InnerSpring = 0,
    InnerVelocity = 1,
    OuterSpring = 2,
    OuterVelocity = 3,
}

/// Per-frame transforms read by the vertex shaders.
///
/// Both matrices are column-major on either side of the boundary.
#[derive(GpuStruct, Clone, Copy, Debug, PartialEq)]
pub struct Uniforms {
    pub projection_matrix: Mat4,
    pub model_view_matrix: Mat4,
}

impl Default for Uniforms {
    fn default() -> Self {
        Self {
            projection_matrix: Mat4::IDENTITY,
            model_view_matrix: Mat4::IDENTITY,
        }
    }
}

/// A mass point of the sheet.
#[derive(GpuStruct, Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    /// Position one step ago, used by the Verlet integrator.
    pub last_position: Vec3,
    pub velocity: Vec3,
    /// Sum of the spring forces acting on the particle (gravity excluded).
    pub force: Vec3,
    pub mass: f32,
    /// Locked particles ignore all forces.
    pub locked: bool,
    pub spring_count: u32,
    /// Indices into the spring buffer; the first `spring_count` are valid.
    pub springs: [u32; 16],
}

impl Particle {
    /// A particle at rest with no springs attached.
    pub fn at_rest(position: Vec3, mass: f32, locked: bool) -> Self {
        Self {
            position,
            last_position: position,
            velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            mass,
            locked,
            spring_count: 0,
            springs: [NO_SPRING; MAX_SPRINGS_PER_PARTICLE],
        }
    }

    /// The valid part of the spring slot list.
    pub fn spring_slots(&self) -> &[u32] {
        let count = (self.spring_count as usize).min(MAX_SPRINGS_PER_PARTICLE);
        &self.springs[..count]
    }
}

/// A damped spring between two particles.
#[derive(GpuStruct, Clone, Copy, Debug, PartialEq)]
pub struct Spring {
    /// Particle indices of the two ends.
    pub indices: UVec2,
    /// [`ConstantsIndex`] of the spring constant (x) and the velocity constant (y).
    pub constants_indices: UVec2,
    /// Force acting on `indices.x`; the other end receives the negation.
    pub force: Vec3,
    pub rest_length: f32,
}

/// Step parameters for the particle passes.
#[derive(GpuStruct, Clone, Copy, Debug, PartialEq)]
pub struct PhysicalUniforms {
    pub dt: f32,
    pub gravity: f32,
    pub particle_count: u32,
    pub spring_count: u32,
}

/// A vertex of the helper geometry drawn next to the sheet.
#[derive(GpuStruct, Clone, Copy, Debug, PartialEq)]
pub struct VertexIn {
    pub position: Vec3,
    pub color: Vec3,
}

/// Byte size of a [`Particle`] in the particle buffer.
pub const PARTICLE_STRIDE: u64 = Particle::GPU_SIZE as u64;
/// Byte size of a constants buffer entry.
pub const CONSTANT_STRIDE: u64 = std::mem::size_of::<f32>() as u64;

// The uniform layout is a contract with every vertex shader.
const _: () = {
    assert!(MAX_SPRINGS_PER_PARTICLE == 16);
    assert!(std::mem::size_of::<UniformsGpu>() == 2 * 16 * std::mem::size_of::<f32>());
    assert!(std::mem::offset_of!(UniformsGpu, projection_matrix) == 0);
    assert!(std::mem::offset_of!(UniformsGpu, model_view_matrix) == 64);
    assert!(std::mem::size_of::<PhysicalUniformsGpu>() == 16);
};

/// WGSL declarations shared by every shader module.
///
/// Contains the index constants of [`BufferIndex`] and [`ConstantsIndex`],
/// the spring slot constants and every struct in this module.
pub fn wgsl_prelude() -> String {
    let mut out = String::new();
    out.push_str(BufferIndex::WGSL_CONSTANTS);
    out.push('\n');
    out.push_str(ConstantsIndex::WGSL_CONSTANTS);
    out.push('\n');
    out.push_str(&format!(
        "const MAX_SPRINGS_PER_PARTICLE: u32 = {}u;\nconst NO_SPRING: u32 = {}u;\n\n",
        MAX_SPRINGS_PER_PARTICLE, NO_SPRING
    ));
    for wgsl in [
        Uniforms::WGSL_STRUCT,
        Particle::WGSL_STRUCT,
        Spring::WGSL_STRUCT,
        PhysicalUniforms::WGSL_STRUCT,
        VertexIn::WGSL_STRUCT,
    ] {
        out.push_str(wgsl);
        out.push_str("\n\n");
    }
    out
}
