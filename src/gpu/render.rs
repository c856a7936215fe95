//! Window renderer: the sheet as lines plus the frame ring.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::physics::SheetBackend;
use crate::shader::{EDGE_SHADER, SHEET_SHADER};
use crate::shader_types::{BufferIndex, Uniforms, VertexIn, VertexInGpu};
use crate::{GpuStruct, ShaderIndex};

use super::{GpuContext, GpuSheet};

/// Number of per-frame uniform slots in flight.
pub const UNIFORM_RING_SLOTS: u32 = 3;

/// Size of one uniform ring slot: `size` rounded past the next 256 byte
/// boundary, which satisfies every backend's dynamic offset alignment.
pub const fn uniform_slot_stride(size: u64) -> u64 {
    (size & !0xFF) + 0x100
}

/// A uniform buffer with one aligned slot per frame in flight.
///
/// Each frame writes the next slot and binds it with a dynamic offset, so a
/// frame never overwrites uniforms an earlier one may still be reading.
pub struct UniformRing {
    buffer: wgpu::Buffer,
    stride: u64,
    slot: u32,
}

impl UniformRing {
    pub fn new(device: &wgpu::Device) -> Self {
        let stride = uniform_slot_stride(Uniforms::GPU_SIZE as u64);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Ring Buffer"),
            size: stride * UNIFORM_RING_SLOTS as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, stride, slot: 0 }
    }

    /// Writes `uniforms` into the next slot and returns its dynamic offset.
    pub fn push(&mut self, queue: &wgpu::Queue, uniforms: &Uniforms) -> u32 {
        self.slot = (self.slot + 1) % UNIFORM_RING_SLOTS;
        let offset = self.slot as u64 * self.stride;
        queue.write_buffer(&self.buffer, offset, bytemuck::bytes_of(&uniforms.to_gpu()));
        offset as u32
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Binding of one slot, for a layout entry with a dynamic offset.
    fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(Uniforms::GPU_SIZE as u64),
        })
    }
}

/// Draws a [`GpuSheet`] and the frame ring to a window surface.
pub struct Renderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    uniforms: UniformRing,
    sheet_layout: wgpu::BindGroupLayout,
    sheet_pipeline: wgpu::RenderPipeline,
    /// Bind group and the sheet generation it was built for.
    sheet_bind_group: Option<(u64, wgpu::BindGroup)>,
    edge_layout: wgpu::BindGroupLayout,
    edge_pipeline: wgpu::RenderPipeline,
    edge_buffer: wgpu::Buffer,
    edge_bind_group: wgpu::BindGroup,
    edge_vertex_count: u32,
}

impl Renderer {
    pub fn new(
        context: &GpuContext,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        edge: &[VertexIn],
    ) -> Self {
        let device = &context.device;

        let surface_caps = surface.get_capabilities(&context.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(device, &config);

        let uniforms = UniformRing::new(device);

        let sheet_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sheet Bind Group Layout"),
            entries: &SHEET_SHADER.layout_entries(wgpu::ShaderStages::VERTEX),
        });
        let edge_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Edge Bind Group Layout"),
            entries: &EDGE_SHADER.layout_entries(wgpu::ShaderStages::VERTEX),
        });

        let sheet_pipeline = line_pipeline(
            device,
            &sheet_layout,
            &SHEET_SHADER.create_module(device),
            surface_format,
            "Sheet Pipeline",
        );
        let edge_pipeline = line_pipeline(
            device,
            &edge_layout,
            &EDGE_SHADER.create_module(device),
            surface_format,
            "Edge Pipeline",
        );

        let edge_buffer = edge_buffer(device, edge);
        let edge_bind_group = create_edge_bind_group(device, &edge_layout, &uniforms, &edge_buffer);

        Self {
            device: Arc::clone(&context.device),
            queue: Arc::clone(&context.queue),
            surface,
            config,
            uniforms,
            sheet_layout,
            sheet_pipeline,
            sheet_bind_group: None,
            edge_layout,
            edge_pipeline,
            edge_buffer,
            edge_bind_group,
            edge_vertex_count: edge.len() as u32,
        }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Reconfigures the surface with its current size, after it was lost.
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Replaces the frame ring geometry.
    pub fn set_edge(&mut self, edge: &[VertexIn]) {
        self.edge_buffer = edge_buffer(&self.device, edge);
        self.edge_bind_group =
            create_edge_bind_group(&self.device, &self.edge_layout, &self.uniforms, &self.edge_buffer);
        self.edge_vertex_count = edge.len() as u32;
    }

    /// Draws one frame.
    ///
    /// Without a sheet (still loading) only the frame ring is drawn.
    /// `overlay` records extra passes on top, such as the UI.
    pub fn render(
        &mut self,
        uniforms: &Uniforms,
        sheet: Option<&GpuSheet>,
        overlay: Option<&mut dyn FnMut(&mut wgpu::CommandEncoder, &wgpu::TextureView)>,
    ) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let offset = self.uniforms.push(&self.queue, uniforms);
        if let Some(sheet) = sheet {
            self.bind_sheet(sheet);
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sheet Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let (Some(sheet), Some((_, bind_group))) = (sheet, &self.sheet_bind_group) {
                render_pass.set_pipeline(&self.sheet_pipeline);
                render_pass.set_bind_group(0, bind_group, &[offset]);
                render_pass.draw(0..sheet.spring_count() * 2, 0..1);
            }

            if self.edge_vertex_count > 0 {
                render_pass.set_pipeline(&self.edge_pipeline);
                render_pass.set_bind_group(0, &self.edge_bind_group, &[offset]);
                render_pass.draw(0..self.edge_vertex_count, 0..1);
            }
        }

        if let Some(overlay) = overlay {
            overlay(&mut encoder, &view);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Draws the frame ring alone, while the sheet is loading.
    pub fn render_edge_only(&mut self, uniforms: &Uniforms) -> Result<(), wgpu::SurfaceError> {
        self.render(uniforms, None, None)
    }

    /// Rebuilds the sheet bind group when the sheet buffers changed.
    fn bind_sheet(&mut self, sheet: &GpuSheet) {
        if matches!(&self.sheet_bind_group, Some((generation, _)) if *generation == sheet.generation()) {
            return;
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sheet Bind Group"),
            layout: &self.sheet_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: BufferIndex::Particle.index(),
                    resource: sheet.particle_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: BufferIndex::Spring.index(),
                    resource: sheet.spring_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: BufferIndex::Uniforms.index(),
                    resource: self.uniforms.binding(),
                },
            ],
        });
        self.sheet_bind_group = Some((sheet.generation(), bind_group));
    }
}

fn edge_buffer(device: &wgpu::Device, edge: &[VertexIn]) -> wgpu::Buffer {
    let mut vertices: Vec<VertexInGpu> = edge.iter().map(VertexIn::to_gpu).collect();
    if vertices.is_empty() {
        vertices.push(bytemuck::Zeroable::zeroed());
    }
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Edge Vertex Buffer"),
        contents: bytemuck::cast_slice(&vertices),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    })
}

fn create_edge_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniforms: &UniformRing,
    edge_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Edge Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: BufferIndex::Uniforms.index(),
                resource: uniforms.binding(),
            },
            wgpu::BindGroupEntry {
                binding: BufferIndex::OtherRendering.index(),
                resource: edge_buffer.as_entire_binding(),
            },
        ],
    })
}

fn line_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::LineList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
