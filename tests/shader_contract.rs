//! Host/shader contract tests.
//!
//! Every composed shader module is parsed and validated with naga, and the
//! parsed module is compared against the host side: binding slots, struct
//! layouts, index constants and entry points.

use glam::Mat4;
use rand::{Rng, SeedableRng};
use trampoline::shader::{Access, Binding, ShaderSource, ALL_SHADERS, WORKGROUP_SIZE};
use trampoline::shader_types::{
    BufferIndex, ConstantsIndex, Particle, PhysicalUniforms, Spring, Uniforms, UniformsGpu, VertexIn,
};
use trampoline::{GpuStruct, ShaderIndex};

fn parse_and_validate(shader: &ShaderSource) -> Result<naga::Module, String> {
    let source = shader.compose();
    let module = naga::front::wgsl::parse_str(&source)
        .map_err(|e| format!("{}: WGSL parse error: {}", shader.label, e.emit_to_string(&source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("{}: WGSL validation error: {:?}", shader.label, e))?;

    Ok(module)
}

fn modules() -> Vec<(ShaderSource, naga::Module)> {
    ALL_SHADERS
        .iter()
        .map(|shader| (*shader, parse_and_validate(shader).unwrap()))
        .collect()
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_all_shaders_validate() {
    for shader in ALL_SHADERS {
        if let Err(e) = parse_and_validate(shader) {
            panic!("{}", e);
        }
    }
}

#[test]
fn test_entry_points() {
    for (shader, module) in modules() {
        let names: Vec<&str> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names.len(), shader.entry_points.len(), "{}", shader.label);
        for name in shader.entry_points {
            assert!(names.contains(name), "{} is missing {}", shader.label, name);
        }

        for entry in &module.entry_points {
            if entry.stage == naga::ShaderStage::Compute {
                assert_eq!(entry.workgroup_size, [WORKGROUP_SIZE, 1, 1], "{}", entry.name);
            }
        }
    }
}

// ============================================================================
// Binding reflection
// ============================================================================

fn expected_space(binding: &Binding) -> naga::AddressSpace {
    match binding.access {
        Access::Uniform => naga::AddressSpace::Uniform,
        Access::Storage => naga::AddressSpace::Storage {
            access: naga::StorageAccess::LOAD,
        },
        Access::StorageReadWrite => naga::AddressSpace::Storage {
            access: naga::StorageAccess::LOAD | naga::StorageAccess::STORE,
        },
    }
}

#[test]
fn test_bindings_match_buffer_index() {
    for (shader, module) in modules() {
        let globals: Vec<_> = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| var.binding.as_ref().map(|b| (var, b)))
            .collect();
        assert_eq!(globals.len(), shader.bindings.len(), "{}", shader.label);

        for binding in shader.bindings {
            let (var, resource) = globals
                .iter()
                .find(|(var, _)| var.name.as_deref() == Some(binding.name))
                .unwrap_or_else(|| panic!("{} has no variable {}", shader.label, binding.name));

            assert_eq!(resource.group, 0);
            assert_eq!(resource.binding, u32::from(binding.index), "{}", binding.name);
            assert_eq!(var.space, expected_space(binding), "{}", binding.name);
        }
    }
}

#[test]
fn test_buffer_slots_are_shared() {
    // A buffer bound in several modules sits in the same slot everywhere
    for (_, module) in modules() {
        for (_, var) in module.global_variables.iter() {
            let (Some(name), Some(binding)) = (&var.name, &var.binding) else {
                continue;
            };
            let expected = match name.as_str() {
                "particles" => BufferIndex::Particle,
                "springs" => BufferIndex::Spring,
                "uniforms" => BufferIndex::Uniforms,
                "constants" => BufferIndex::Constants,
                "physical" => BufferIndex::PhysicalUniforms,
                "vertices" => BufferIndex::OtherRendering,
                other => panic!("unexpected binding {}", other),
            };
            assert_eq!(binding.binding, expected.index(), "{}", name);
        }
    }
}

#[test]
fn test_index_constants_match_host() {
    let (_, module) = modules().remove(0);
    let value = |name: &str| -> u32 {
        let (_, constant) = module
            .constants
            .iter()
            .find(|(_, c)| c.name.as_deref() == Some(name))
            .unwrap_or_else(|| panic!("missing constant {}", name));
        match module.global_expressions[constant.init] {
            naga::Expression::Literal(naga::Literal::U32(v)) => v,
            ref other => panic!("{} is not a u32 literal: {:?}", name, other),
        }
    };

    for &index in BufferIndex::ALL {
        assert_eq!(value(index.wgsl_name()), index.index());
    }
    for &index in ConstantsIndex::ALL {
        assert_eq!(value(index.wgsl_name()), index.index());
    }
}

// ============================================================================
// Struct layouts
// ============================================================================

fn struct_layout(module: &naga::Module, name: &str) -> (Vec<(String, u32)>, u32) {
    for (_, ty) in module.types.iter() {
        if ty.name.as_deref() != Some(name) {
            continue;
        }
        if let naga::TypeInner::Struct { members, span } = &ty.inner {
            let fields = members
                .iter()
                .filter_map(|m| m.name.clone().map(|n| (n, m.offset)))
                .filter(|(n, _)| !n.starts_with("_pad"))
                .collect();
            return (fields, *span);
        }
    }
    panic!("struct {} not found", name);
}

fn assert_layout<T: GpuStruct>(module: &naga::Module, name: &str) {
    let (fields, span) = struct_layout(module, name);
    let expected: Vec<(String, u32)> = T::FIELD_OFFSETS
        .iter()
        .map(|&(n, offset)| (n.to_string(), offset))
        .collect();
    assert_eq!(fields, expected, "{} offsets", name);
    assert_eq!(span, T::GPU_SIZE, "{} size", name);
    assert_eq!(std::mem::size_of::<T::Gpu>(), T::GPU_SIZE as usize, "{} host size", name);
}

#[test]
fn test_struct_layouts_match_host() {
    let (_, module) = modules().remove(0);
    assert_layout::<Uniforms>(&module, "Uniforms");
    assert_layout::<Particle>(&module, "Particle");
    assert_layout::<Spring>(&module, "Spring");
    assert_layout::<PhysicalUniforms>(&module, "PhysicalUniforms");
    assert_layout::<VertexIn>(&module, "VertexIn");
}

#[test]
fn test_uniforms_are_two_matrices() {
    let (_, module) = modules().remove(0);
    let (fields, span) = struct_layout(&module, "Uniforms");
    assert_eq!(
        fields,
        vec![
            ("projection_matrix".to_string(), 0),
            ("model_view_matrix".to_string(), 64)
        ]
    );
    assert_eq!(span, 128);
}

// ============================================================================
// Uniform bytes
// ============================================================================

fn random_matrix(rng: &mut impl Rng) -> Mat4 {
    Mat4::from_cols_array(&std::array::from_fn(|_| rng.gen_range(-100.0..100.0)))
}

#[test]
fn test_uniforms_bytes_round_trip() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for _ in 0..100 {
        let uniforms = Uniforms {
            projection_matrix: random_matrix(&mut rng),
            model_view_matrix: random_matrix(&mut rng),
        };

        // What the vertex shader reads from the uniform slot
        let bytes = bytemuck::bytes_of(&uniforms.to_gpu()).to_vec();
        assert_eq!(bytes.len(), 128);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(&floats[..16], &uniforms.projection_matrix.to_cols_array());
        assert_eq!(&floats[16..], &uniforms.model_view_matrix.to_cols_array());

        let back: UniformsGpu = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(Uniforms::from_gpu(&back), uniforms);
    }
}
