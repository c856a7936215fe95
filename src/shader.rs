//! WGSL composition and binding tables.
//!
//! Every shader module is assembled from three parts:
//!
//! 1. [`wgsl_prelude`] - index constants and struct definitions generated by
//!    the derives in [`crate::shader_types`]
//! 2. one `@group(0) @binding(n)` declaration per entry of the module's
//!    binding table, with `n` taken from [`BufferIndex`]
//! 3. the hand-written body from `src/shaders/`
//!
//! The same binding tables build the wgpu bind group layouts through
//! [`Binding::layout_entry`], so the declaration a shader sees and the buffer
//! the host attaches are derived from one definition.

use crate::shader_types::{wgsl_prelude, BufferIndex};
use crate::ShaderIndex;

/// Workgroup size of every compute entry point.
pub const WORKGROUP_SIZE: u32 = 64;

/// How a shader accesses a bound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Uniform,
    /// Read-only storage.
    Storage,
    StorageReadWrite,
}

/// One buffer binding of a shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub index: BufferIndex,
    pub access: Access,
    /// Variable name in WGSL.
    pub name: &'static str,
    /// WGSL type of the variable.
    pub ty: &'static str,
    /// Bound with a dynamic offset (the per-frame uniform ring).
    pub dynamic_offset: bool,
}

impl Binding {
    pub const fn new(index: BufferIndex, access: Access, name: &'static str, ty: &'static str) -> Self {
        Self {
            index,
            access,
            name,
            ty,
            dynamic_offset: false,
        }
    }

    pub const fn with_dynamic_offset(mut self) -> Self {
        self.dynamic_offset = true;
        self
    }

    /// Binding slot number.
    pub fn slot(&self) -> u32 {
        self.index.index()
    }

    /// WGSL declaration of the binding.
    pub fn declaration(&self) -> String {
        let address_space = match self.access {
            Access::Uniform => "uniform",
            Access::Storage => "storage, read",
            Access::StorageReadWrite => "storage, read_write",
        };
        format!(
            "@group(0) @binding({}) var<{}> {}: {};",
            self.slot(),
            address_space,
            self.name,
            self.ty
        )
    }

    /// Bind group layout entry matching [`Binding::declaration`].
    pub fn layout_entry(&self, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
        let ty = match self.access {
            Access::Uniform => wgpu::BufferBindingType::Uniform,
            Access::Storage => wgpu::BufferBindingType::Storage { read_only: true },
            Access::StorageReadWrite => wgpu::BufferBindingType::Storage { read_only: false },
        };
        wgpu::BindGroupLayoutEntry {
            binding: self.slot(),
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: self.dynamic_offset,
                min_binding_size: None,
            },
            count: None,
        }
    }
}

/// Spring pass: reads particles and constants, writes spring forces.
pub const SPRING_BINDINGS: &[Binding] = &[
    Binding::new(BufferIndex::Particle, Access::Storage, "particles", "array<Particle>"),
    Binding::new(BufferIndex::Spring, Access::StorageReadWrite, "springs", "array<Spring>"),
    Binding::new(BufferIndex::Constants, Access::Storage, "constants", "array<f32>"),
];

/// Gather and integrate passes.
pub const PARTICLE_BINDINGS: &[Binding] = &[
    Binding::new(BufferIndex::Particle, Access::StorageReadWrite, "particles", "array<Particle>"),
    Binding::new(BufferIndex::Spring, Access::Storage, "springs", "array<Spring>"),
    Binding::new(BufferIndex::PhysicalUniforms, Access::Uniform, "physical", "PhysicalUniforms"),
];

/// Sheet line renderer.
pub const SHEET_BINDINGS: &[Binding] = &[
    Binding::new(BufferIndex::Particle, Access::Storage, "particles", "array<Particle>"),
    Binding::new(BufferIndex::Spring, Access::Storage, "springs", "array<Spring>"),
    Binding::new(BufferIndex::Uniforms, Access::Uniform, "uniforms", "Uniforms").with_dynamic_offset(),
];

/// Frame ring renderer.
pub const EDGE_BINDINGS: &[Binding] = &[
    Binding::new(BufferIndex::Uniforms, Access::Uniform, "uniforms", "Uniforms").with_dynamic_offset(),
    Binding::new(BufferIndex::OtherRendering, Access::Storage, "vertices", "array<VertexIn>"),
];

/// A shader module: its binding table and body.
#[derive(Debug, Clone, Copy)]
pub struct ShaderSource {
    pub label: &'static str,
    pub bindings: &'static [Binding],
    pub body: &'static str,
    /// Entry points defined by the body.
    pub entry_points: &'static [&'static str],
}

pub const SPRING_SHADER: ShaderSource = ShaderSource {
    label: "Spring Compute Shader",
    bindings: SPRING_BINDINGS,
    body: include_str!("shaders/springs.wgsl"),
    entry_points: &["spring_update"],
};

pub const PARTICLE_SHADER: ShaderSource = ShaderSource {
    label: "Particle Compute Shader",
    bindings: PARTICLE_BINDINGS,
    body: include_str!("shaders/particles.wgsl"),
    entry_points: &["gather_forces", "integrate"],
};

pub const SHEET_SHADER: ShaderSource = ShaderSource {
    label: "Sheet Render Shader",
    bindings: SHEET_BINDINGS,
    body: include_str!("shaders/sheet.wgsl"),
    entry_points: &["vs_main", "fs_main"],
};

pub const EDGE_SHADER: ShaderSource = ShaderSource {
    label: "Edge Render Shader",
    bindings: EDGE_BINDINGS,
    body: include_str!("shaders/edge.wgsl"),
    entry_points: &["vs_main", "fs_main"],
};

/// Every shader module of the crate.
pub const ALL_SHADERS: &[ShaderSource] = &[SPRING_SHADER, PARTICLE_SHADER, SHEET_SHADER, EDGE_SHADER];

impl ShaderSource {
    /// Full WGSL source of the module.
    pub fn compose(&self) -> String {
        compose(self.bindings, self.body)
    }

    /// Bind group layout entries, in slot order.
    pub fn layout_entries(&self, visibility: wgpu::ShaderStages) -> Vec<wgpu::BindGroupLayoutEntry> {
        let mut bindings = self.bindings.to_vec();
        bindings.sort_by_key(Binding::slot);
        bindings.iter().map(|b| b.layout_entry(visibility)).collect()
    }

    /// Creates the wgpu shader module.
    pub fn create_module(&self, device: &wgpu::Device) -> wgpu::ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(self.label),
            source: wgpu::ShaderSource::Wgsl(self.compose().into()),
        })
    }
}

/// Prelude, binding declarations in slot order, then `body`.
pub fn compose(bindings: &[Binding], body: &str) -> String {
    let mut bindings = bindings.to_vec();
    bindings.sort_by_key(Binding::slot);

    let mut out = wgsl_prelude();
    for binding in &bindings {
        out.push_str(&binding.declaration());
        out.push('\n');
    }
    out.push('\n');
    out.push_str(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_uses_buffer_index() {
        let binding = Binding::new(BufferIndex::Constants, Access::Storage, "constants", "array<f32>");
        assert_eq!(
            binding.declaration(),
            "@group(0) @binding(3) var<storage, read> constants: array<f32>;"
        );

        let uniforms = SHEET_BINDINGS[2];
        assert_eq!(
            uniforms.declaration(),
            "@group(0) @binding(2) var<uniform> uniforms: Uniforms;"
        );
    }

    #[test]
    fn test_layout_entry_matches_access() {
        let entry = SPRING_BINDINGS[1].layout_entry(wgpu::ShaderStages::COMPUTE);
        assert_eq!(entry.binding, 1);
        match entry.ty {
            wgpu::BindingType::Buffer { ty, has_dynamic_offset, .. } => {
                assert_eq!(ty, wgpu::BufferBindingType::Storage { read_only: false });
                assert!(!has_dynamic_offset);
            }
            other => panic!("unexpected binding type {:?}", other),
        }

        let entry = EDGE_BINDINGS[0].layout_entry(wgpu::ShaderStages::VERTEX);
        assert_eq!(entry.binding, 2);
        match entry.ty {
            wgpu::BindingType::Buffer { ty, has_dynamic_offset, .. } => {
                assert_eq!(ty, wgpu::BufferBindingType::Uniform);
                assert!(has_dynamic_offset);
            }
            other => panic!("unexpected binding type {:?}", other),
        }
    }

    #[test]
    fn test_tables_have_unique_slots() {
        for shader in ALL_SHADERS {
            let mut slots: Vec<u32> = shader.bindings.iter().map(Binding::slot).collect();
            slots.sort_unstable();
            slots.dedup();
            assert_eq!(slots.len(), shader.bindings.len(), "{}", shader.label);
        }
    }

    #[test]
    fn test_compose_orders_declarations_by_slot() {
        let source = EDGE_SHADER.compose();
        let uniforms = source.find("@binding(2)").unwrap();
        let vertices = source.find("@binding(5)").unwrap();
        assert!(uniforms < vertices);
        assert!(source.contains("struct VertexIn {"));
        assert!(source.ends_with(EDGE_SHADER.body));
    }

    #[test]
    fn test_entry_points_present_in_body() {
        for shader in ALL_SHADERS {
            for entry in shader.entry_points {
                assert!(
                    shader.body.contains(&format!("fn {}(", entry)),
                    "{} is missing {}",
                    shader.label,
                    entry
                );
            }
        }
    }

    #[test]
    fn test_compute_bodies_use_workgroup_size() {
        let attribute = format!("@workgroup_size({})", WORKGROUP_SIZE);
        assert!(SPRING_SHADER.body.contains(&attribute));
        assert_eq!(PARTICLE_SHADER.body.matches(attribute.as_str()).count(), 2);
    }
}
