//! Derive macros for the trampoline host/shader contract.
//!
//! This crate provides two derive macros:
//!
//! - [`GpuStruct`] - Generates a padded `#[repr(C)]` companion struct and the
//!   matching WGSL struct definition
//! - [`ShaderIndex`] - Turns a unit enum into binding/constant indices that
//!   are shared with WGSL
//!
//! # Usage
//!
//! These macros are re-exported from the main `trampoline` crate:
//!
//! ```ignore
//! use trampoline::{GpuStruct, ShaderIndex};
//!
//! #[derive(GpuStruct, Clone, Debug, PartialEq)]
//! struct Uniforms {
//!     projection_matrix: Mat4,
//!     model_view_matrix: Mat4,
//! }
//!
//! #[derive(ShaderIndex, Clone, Copy, Debug, PartialEq, Eq)]
//! enum BufferIndex {
//!     Particle,
//!     Spring,
//! }
//! ```
//!
//! ## GPU Memory Layout
//!
//! WGSL alignment rules differ from Rust's:
//! - `Vec3` requires 16-byte alignment (even though it's only 12 bytes)
//! - `Mat4` is sixteen floats, column-major, 16-byte aligned
//! - `bool` is not host-shareable and is stored as `u32`
//! - Struct total size is rounded up to a multiple of 16 bytes
//!
//! Padding fields are inserted on both sides so the Rust struct and the WGSL
//! struct have identical offsets. The generated code asserts every offset at
//! compile time.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Expr, Fields, Ident, Lit, Type};

/// Derive macro for shared index enums.
///
/// Variants are assigned sequential IDs starting from 0. Explicit
/// discriminants are allowed but must equal the variant's position, so the
/// values stay contiguous.
///
/// # Generated Items
///
/// For an enum `BufferIndex`:
///
/// - `impl From<BufferIndex> for u32`
/// - `impl TryFrom<u32> for BufferIndex` (error: `trampoline::IndexOutOfRange`)
/// - `impl trampoline::ShaderIndex for BufferIndex` with `ALL`, `COUNT`,
///   `wgsl_name()` and `WGSL_CONSTANTS`, e.g.
///   `const BUFFER_INDEX_PARTICLE: u32 = 0u;`
///
/// # Panics
///
/// The macro panics at compile time if:
/// - Applied to a struct instead of an enum
/// - Any variant has fields
/// - A discriminant is not a literal equal to the variant's position
/// - Enum has zero variants
#[proc_macro_derive(ShaderIndex)]
pub fn derive_shader_index(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let name_str = name.to_string();

    let variants = match &input.data {
        Data::Enum(data) => &data.variants,
        _ => panic!("ShaderIndex derive only supports enums"),
    };

    if variants.is_empty() {
        panic!("ShaderIndex enum '{}' must have at least one variant", name_str);
    }

    for (i, variant) in variants.iter().enumerate() {
        if !matches!(variant.fields, Fields::Unit) {
            panic!(
                "ShaderIndex enum variants must be unit variants. Found fields on variant '{}'",
                variant.ident
            );
        }
        if let Some((_, expr)) = &variant.discriminant {
            let value = literal_u32(expr).unwrap_or_else(|| {
                panic!("ShaderIndex discriminant of '{}' must be an integer literal", variant.ident)
            });
            if value != i as u32 {
                panic!(
                    "ShaderIndex values must be contiguous: '{}' is {} but sits at position {}",
                    variant.ident, value, i
                );
            }
        }
    }

    let prefix = screaming_snake(&name_str);

    let mut into_arms = Vec::new();
    let mut from_arms = Vec::new();
    let mut name_arms = Vec::new();
    let mut all = Vec::new();
    let mut wgsl_lines = Vec::new();

    for (i, variant) in variants.iter().enumerate() {
        let variant_name = &variant.ident;
        let idx = i as u32;
        let wgsl_name = format!("{}_{}", prefix, screaming_snake(&variant_name.to_string()));

        into_arms.push(quote! { #name::#variant_name => #idx });
        from_arms.push(quote! { #idx => Ok(#name::#variant_name) });
        name_arms.push(quote! { #name::#variant_name => #wgsl_name });
        all.push(quote! { #name::#variant_name });
        wgsl_lines.push(format!("const {}: u32 = {}u;", wgsl_name, idx));
    }

    let count = variants.len();
    let wgsl_constants = wgsl_lines.join("\n");

    let expanded = quote! {
        impl From<#name> for u32 {
            fn from(value: #name) -> u32 {
                match value {
                    #(#into_arms),*
                }
            }
        }

        impl TryFrom<u32> for #name {
            type Error = trampoline::IndexOutOfRange;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    #(#from_arms,)*
                    _ => Err(trampoline::IndexOutOfRange { kind: #name_str, value }),
                }
            }
        }

        impl trampoline::ShaderIndex for #name {
            const NAME: &'static str = #name_str;
            const COUNT: usize = #count;
            const ALL: &'static [Self] = &[#(#all),*];
            const WGSL_CONSTANTS: &'static str = #wgsl_constants;

            fn index(self) -> u32 {
                u32::from(self)
            }

            fn wgsl_name(self) -> &'static str {
                match self {
                    #(#name_arms),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Derive macro for structs shared with WGSL.
///
/// Generates:
///
/// - A companion `{Name}Gpu` struct with `#[repr(C)]`, `Pod` and explicit
///   padding fields (`_pad0`, `_pad1`, ...)
/// - An implementation of `trampoline::GpuStruct` with the WGSL struct
///   definition, the GPU size, field offsets and conversions both ways
/// - Compile-time assertions that every field offset and the total size of
///   the companion struct match the WGSL layout
///
/// # Supported Types
///
/// | Rust Type | WGSL Type | Size | Alignment |
/// |-----------|-----------|------|-----------|
/// | `Vec2` | `vec2<f32>` | 8 bytes | 8 bytes |
/// | `Vec3` | `vec3<f32>` | 12 bytes | 16 bytes |
/// | `Vec4` | `vec4<f32>` | 16 bytes | 16 bytes |
/// | `UVec2` | `vec2<u32>` | 8 bytes | 8 bytes |
/// | `Mat4` | `mat4x4<f32>` | 64 bytes | 16 bytes |
/// | `f32` / `u32` / `i32` | same | 4 bytes | 4 bytes |
/// | `bool` | `u32` | 4 bytes | 4 bytes |
/// | `[u32; N]` / `[f32; N]` | `array<T, N>` | 4N bytes | 4 bytes |
///
/// The WGSL struct carries the Rust struct's name.
///
/// # Panics
///
/// The macro panics at compile time if:
/// - Applied to an enum instead of a struct
/// - Struct uses tuple fields instead of named fields
/// - Any field has an unsupported type
#[proc_macro_derive(GpuStruct)]
pub fn derive_gpu_struct(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let gpu_name = Ident::new(&format!("{}Gpu", name), Span::call_site());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("GpuStruct derive only supports structs with named fields"),
        },
        _ => panic!("GpuStruct derive only supports structs"),
    };

    let mut layout = Layout::default();
    let mut to_gpu_conversions = Vec::new();
    let mut from_gpu_conversions = Vec::new();
    let mut offset_entries = Vec::new();
    let mut offset_asserts = Vec::new();

    for field in fields.iter() {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let field_name_str = field_name.to_string();
        let type_info = rust_type_info(&field.ty);

        layout.pad_to(type_info.align, &mut to_gpu_conversions);

        let offset = layout.offset;
        offset_entries.push(quote! { (#field_name_str, #offset) });
        offset_asserts.push(quote! {
            assert!(::core::mem::offset_of!(#gpu_name, #field_name) == #offset as usize);
        });

        layout.wgsl_fields.push(format!("    {}: {},", field_name_str, type_info.wgsl_type));
        let gpu_field_type = &type_info.gpu_type;
        layout.gpu_fields.push(quote! { #field_name: #gpu_field_type });

        let conversion = generate_conversion(field_name, &type_info.kind);
        to_gpu_conversions.push(quote! { #field_name: #conversion });

        let reverse_conversion = generate_reverse_conversion(field_name, &type_info.kind);
        from_gpu_conversions.push(quote! { #field_name: #reverse_conversion });

        layout.offset += type_info.size;
    }

    // Arrays of structs need a 16-byte stride
    layout.pad_to(16, &mut to_gpu_conversions);

    let gpu_size = layout.offset;
    let gpu_struct_fields = &layout.gpu_fields;
    let wgsl_struct = format!("struct {} {{\n{}\n}}", name, layout.wgsl_fields.join("\n"));

    let expanded = quote! {
        #[repr(C)]
        #[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
        pub struct #gpu_name {
            #(pub #gpu_struct_fields),*
        }

        const _: () = {
            assert!(::core::mem::size_of::<#gpu_name>() == #gpu_size as usize);
            #(#offset_asserts)*
        };

        impl trampoline::GpuStruct for #name {
            type Gpu = #gpu_name;

            const WGSL_STRUCT: &'static str = #wgsl_struct;
            const GPU_SIZE: u32 = #gpu_size;
            const FIELD_OFFSETS: &'static [(&'static str, u32)] = &[#(#offset_entries),*];

            fn to_gpu(&self) -> Self::Gpu {
                #gpu_name {
                    #(#to_gpu_conversions),*
                }
            }

            fn from_gpu(gpu: &Self::Gpu) -> Self {
                Self {
                    #(#from_gpu_conversions),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Running layout state while walking the fields of a struct.
#[derive(Default)]
struct Layout {
    offset: u32,
    padding_count: u32,
    wgsl_fields: Vec<String>,
    gpu_fields: Vec<proc_macro2::TokenStream>,
}

impl Layout {
    /// Insert a padding field so the next offset is a multiple of `align`.
    fn pad_to(&mut self, align: u32, conversions: &mut Vec<proc_macro2::TokenStream>) {
        let padding_needed = (align - (self.offset % align)) % align;
        if padding_needed == 0 {
            return;
        }

        let pad_name_str = format!("_pad{}", self.padding_count);
        let pad_name = Ident::new(&pad_name_str, Span::call_site());
        self.padding_count += 1;

        if padding_needed == 4 {
            self.wgsl_fields.push(format!("    {}: f32,", pad_name_str));
            self.gpu_fields.push(quote! { #pad_name: f32 });
            conversions.push(quote! { #pad_name: 0.0 });
        } else {
            let count = (padding_needed / 4) as usize;
            self.wgsl_fields.push(format!("    {}: array<f32, {}>,", pad_name_str, count));
            self.gpu_fields.push(quote! { #pad_name: [f32; #count] });
            conversions.push(quote! { #pad_name: [0.0; #count] });
        }
        self.offset += padding_needed;
    }
}

/// How a field converts between its Rust and GPU forms.
enum FieldKind {
    Vector(proc_macro2::TokenStream),
    Matrix,
    Bool,
    Plain,
}

/// Type metadata for GPU memory layout calculations.
struct TypeInfo {
    /// WGSL type name (e.g., "vec3<f32>")
    wgsl_type: String,
    /// Rust type for the GPU struct (e.g., `[f32; 3]`)
    gpu_type: proc_macro2::TokenStream,
    size: u32,
    align: u32,
    kind: FieldKind,
}

fn rust_type_info(ty: &Type) -> TypeInfo {
    if let Type::Array(array) = ty {
        let elem = &array.elem;
        let elem_str = quote!(#elem).to_string().replace(' ', "");
        let len = literal_u32(&array.len)
            .unwrap_or_else(|| panic!("Array length in GpuStruct must be an integer literal"));
        let (wgsl_elem, gpu_elem) = match elem_str.as_str() {
            "u32" => ("u32", quote! { u32 }),
            "f32" => ("f32", quote! { f32 }),
            "i32" => ("i32", quote! { i32 }),
            _ => panic!("Unsupported array element type in GpuStruct: {}", elem_str),
        };
        let len_usize = len as usize;
        return TypeInfo {
            wgsl_type: format!("array<{}, {}>", wgsl_elem, len),
            gpu_type: quote! { [#gpu_elem; #len_usize] },
            size: 4 * len,
            align: 4,
            kind: FieldKind::Plain,
        };
    }

    let type_str = quote!(#ty).to_string().replace(' ', "");

    let vector = |wgsl: &str, gpu: proc_macro2::TokenStream, size, align, glam_ty| TypeInfo {
        wgsl_type: wgsl.to_string(),
        gpu_type: gpu,
        size,
        align,
        kind: FieldKind::Vector(glam_ty),
    };
    let scalar = |wgsl: &str, gpu: proc_macro2::TokenStream, kind| TypeInfo {
        wgsl_type: wgsl.to_string(),
        gpu_type: gpu,
        size: 4,
        align: 4,
        kind,
    };

    match type_str.as_str() {
        "Vec2" | "glam::Vec2" => vector("vec2<f32>", quote! { [f32; 2] }, 8, 8, quote! { glam::Vec2 }),
        // vec3 has 16-byte alignment in WGSL
        "Vec3" | "glam::Vec3" => vector("vec3<f32>", quote! { [f32; 3] }, 12, 16, quote! { glam::Vec3 }),
        "Vec4" | "glam::Vec4" => vector("vec4<f32>", quote! { [f32; 4] }, 16, 16, quote! { glam::Vec4 }),
        "UVec2" | "glam::UVec2" => vector("vec2<u32>", quote! { [u32; 2] }, 8, 8, quote! { glam::UVec2 }),
        "Mat4" | "glam::Mat4" => TypeInfo {
            wgsl_type: "mat4x4<f32>".to_string(),
            gpu_type: quote! { [[f32; 4]; 4] },
            size: 64,
            align: 16,
            kind: FieldKind::Matrix,
        },
        "f32" => scalar("f32", quote! { f32 }, FieldKind::Plain),
        "u32" => scalar("u32", quote! { u32 }, FieldKind::Plain),
        "i32" => scalar("i32", quote! { i32 }, FieldKind::Plain),
        "bool" => scalar("u32", quote! { u32 }, FieldKind::Bool),
        _ => panic!("Unsupported type in GpuStruct: {}", type_str),
    }
}

/// Generate code to convert a field from Rust to GPU format.
fn generate_conversion(field_name: &Ident, kind: &FieldKind) -> proc_macro2::TokenStream {
    match kind {
        FieldKind::Vector(_) => quote! { self.#field_name.to_array() },
        FieldKind::Matrix => quote! { self.#field_name.to_cols_array_2d() },
        FieldKind::Bool => quote! { u32::from(self.#field_name) },
        FieldKind::Plain => quote! { self.#field_name },
    }
}

/// Generate code to convert a field from GPU format back to Rust.
fn generate_reverse_conversion(field_name: &Ident, kind: &FieldKind) -> proc_macro2::TokenStream {
    match kind {
        FieldKind::Vector(glam_ty) => quote! { #glam_ty::from_array(gpu.#field_name) },
        FieldKind::Matrix => quote! { glam::Mat4::from_cols_array_2d(&gpu.#field_name) },
        FieldKind::Bool => quote! { gpu.#field_name != 0 },
        FieldKind::Plain => quote! { gpu.#field_name },
    }
}

fn literal_u32(expr: &Expr) -> Option<u32> {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Int(int) => int.base10_parse::<u32>().ok(),
            _ => None,
        },
        _ => None,
    }
}

/// `PhysicalUniforms` -> `PHYSICAL_UNIFORMS`
fn screaming_snake(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    let chars: Vec<char> = ident.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push('_');
            }
        }
        out.extend(c.to_uppercase());
    }
    out
}
