//! GPU sheet backend.
//!
//! Holds the particle, spring, constants and physical uniform buffers and the
//! three compute pipelines that advance them. Each [`SheetBackend::step`]
//! records one compute pass with a dispatch per stage; wgpu orders the
//! storage writes between dispatches.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::error::SheetError;
use crate::mesh::SheetData;
use crate::physics::{SheetAccess, SheetBackend};
use crate::shader::{PARTICLE_SHADER, SPRING_SHADER, WORKGROUP_SIZE};
use crate::shader_types::{
    BufferIndex, ConstantsIndex, Particle, ParticleGpu, PhysicalUniforms, Spring, SpringGpu, CONSTANT_STRIDE,
    PARTICLE_STRIDE,
};
use crate::{GpuStruct, ShaderIndex};

use super::{read_buffer_regions, GpuContext};

struct SheetBuffers {
    particles: wgpu::Buffer,
    springs: wgpu::Buffer,
    constants: wgpu::Buffer,
    particle_count: u32,
    spring_count: u32,
}

impl SheetBuffers {
    fn new(device: &wgpu::Device, sheet: &SheetData) -> Self {
        let particles: Vec<ParticleGpu> = sheet.particles.iter().map(Particle::to_gpu).collect();
        let springs: Vec<SpringGpu> = sheet.springs.iter().map(Spring::to_gpu).collect();

        Self {
            particles: storage_buffer(
                device,
                "Particle Buffer",
                bytemuck::cast_slice(&particles),
                Particle::GPU_SIZE as usize,
            ),
            springs: storage_buffer(
                device,
                "Spring Buffer",
                bytemuck::cast_slice(&springs),
                Spring::GPU_SIZE as usize,
            ),
            constants: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Constants Buffer"),
                contents: bytemuck::cast_slice(&sheet.constants),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            }),
            particle_count: sheet.particles.len() as u32,
            spring_count: sheet.springs.len() as u32,
        }
    }

    fn write(&self, queue: &wgpu::Queue, sheet: &SheetData) {
        let particles: Vec<ParticleGpu> = sheet.particles.iter().map(Particle::to_gpu).collect();
        let springs: Vec<SpringGpu> = sheet.springs.iter().map(Spring::to_gpu).collect();
        queue.write_buffer(&self.particles, 0, bytemuck::cast_slice(&particles));
        queue.write_buffer(&self.springs, 0, bytemuck::cast_slice(&springs));
        queue.write_buffer(&self.constants, 0, bytemuck::cast_slice(&sheet.constants));
    }
}

/// Storage buffer holding `contents`, at least one element long so it can
/// be bound even when empty.
fn storage_buffer(device: &wgpu::Device, label: &str, contents: &[u8], element_size: usize) -> wgpu::Buffer {
    let usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
    if contents.is_empty() {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: element_size as u64,
            usage,
            mapped_at_creation: false,
        })
    } else {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        })
    }
}

/// Sheet simulated by compute shaders.
pub struct GpuSheet {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: SheetBuffers,
    physical_buffer: wgpu::Buffer,
    spring_layout: wgpu::BindGroupLayout,
    particle_layout: wgpu::BindGroupLayout,
    spring_bind_group: wgpu::BindGroup,
    particle_bind_group: wgpu::BindGroup,
    spring_pipeline: wgpu::ComputePipeline,
    gather_pipeline: wgpu::ComputePipeline,
    integrate_pipeline: wgpu::ComputePipeline,
    constants: [f32; 4],
    generation: u64,
}

impl GpuSheet {
    pub fn new(context: &GpuContext, sheet: &SheetData) -> Self {
        let device = &context.device;
        let buffers = SheetBuffers::new(device, sheet);

        let physical_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Physical Uniforms Buffer"),
            size: PhysicalUniforms::GPU_SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let spring_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Spring Bind Group Layout"),
            entries: &SPRING_SHADER.layout_entries(wgpu::ShaderStages::COMPUTE),
        });
        let particle_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Bind Group Layout"),
            entries: &PARTICLE_SHADER.layout_entries(wgpu::ShaderStages::COMPUTE),
        });

        let spring_module = SPRING_SHADER.create_module(device);
        let particle_module = PARTICLE_SHADER.create_module(device);

        let spring_pipeline = compute_pipeline(device, &spring_layout, &spring_module, "spring_update");
        let gather_pipeline = compute_pipeline(device, &particle_layout, &particle_module, "gather_forces");
        let integrate_pipeline = compute_pipeline(device, &particle_layout, &particle_module, "integrate");

        let (spring_bind_group, particle_bind_group) =
            create_bind_groups(device, &spring_layout, &particle_layout, &buffers, &physical_buffer);

        log::debug!(
            "GPU sheet: {} particles, {} springs",
            buffers.particle_count,
            buffers.spring_count
        );

        Self {
            device: Arc::clone(&context.device),
            queue: Arc::clone(&context.queue),
            buffers,
            physical_buffer,
            spring_layout,
            particle_layout,
            spring_bind_group,
            particle_bind_group,
            spring_pipeline,
            gather_pipeline,
            integrate_pipeline,
            constants: sheet.constants,
            generation: 0,
        }
    }

    pub fn particle_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.particles
    }

    pub fn spring_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.springs
    }

    pub fn constants_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.constants
    }

    /// Bumped whenever the buffers are recreated; bind groups built from
    /// older buffers must be rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last constants written, as seen by the next step.
    pub fn constants(&self) -> &[f32; 4] {
        &self.constants
    }

    /// Reads back every particle.
    pub fn read_all_particles(&mut self) -> Result<Vec<Particle>, SheetError> {
        let size = self.buffers.particle_count as u64 * PARTICLE_STRIDE;
        let bytes = read_buffer_regions(&self.device, &self.queue, &self.buffers.particles, &[(0, size)])?;
        Ok(decode_particles(&bytes))
    }

    /// Reads back every spring, forces of the last step included.
    pub fn read_springs(&mut self) -> Result<Vec<Spring>, SheetError> {
        let size = self.buffers.spring_count as u64 * Spring::GPU_SIZE as u64;
        let bytes = read_buffer_regions(&self.device, &self.queue, &self.buffers.springs, &[(0, size)])?;
        Ok(bytes
            .chunks_exact(Spring::GPU_SIZE as usize)
            .map(|chunk| Spring::from_gpu(&bytemuck::pod_read_unaligned::<SpringGpu>(chunk)))
            .collect())
    }

    fn check_index(&self, index: u32) -> Result<u64, SheetError> {
        if index < self.buffers.particle_count {
            Ok(index as u64 * PARTICLE_STRIDE)
        } else {
            Err(SheetError::IndexOutOfRange {
                index,
                len: self.buffers.particle_count as usize,
            })
        }
    }
}

fn decode_particles(bytes: &[u8]) -> Vec<Particle> {
    bytes
        .chunks_exact(PARTICLE_STRIDE as usize)
        .map(|chunk| Particle::from_gpu(&bytemuck::pod_read_unaligned::<ParticleGpu>(chunk)))
        .collect()
}

fn compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(entry_point),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

fn create_bind_groups(
    device: &wgpu::Device,
    spring_layout: &wgpu::BindGroupLayout,
    particle_layout: &wgpu::BindGroupLayout,
    buffers: &SheetBuffers,
    physical_buffer: &wgpu::Buffer,
) -> (wgpu::BindGroup, wgpu::BindGroup) {
    let spring = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Spring Bind Group"),
        layout: spring_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: BufferIndex::Particle.index(),
                resource: buffers.particles.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: BufferIndex::Spring.index(),
                resource: buffers.springs.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: BufferIndex::Constants.index(),
                resource: buffers.constants.as_entire_binding(),
            },
        ],
    });

    let particle = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Particle Bind Group"),
        layout: particle_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: BufferIndex::Particle.index(),
                resource: buffers.particles.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: BufferIndex::Spring.index(),
                resource: buffers.springs.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: BufferIndex::PhysicalUniforms.index(),
                resource: physical_buffer.as_entire_binding(),
            },
        ],
    });

    (spring, particle)
}

impl SheetAccess for GpuSheet {
    fn read_particles(&mut self, indices: &[u32]) -> Result<Vec<Particle>, SheetError> {
        let regions = indices
            .iter()
            .map(|&i| self.check_index(i).map(|offset| (offset, PARTICLE_STRIDE)))
            .collect::<Result<Vec<_>, _>>()?;
        let bytes = read_buffer_regions(&self.device, &self.queue, &self.buffers.particles, &regions)?;
        Ok(decode_particles(&bytes))
    }

    fn write_particle(&mut self, index: u32, particle: &Particle) -> Result<(), SheetError> {
        let offset = self.check_index(index)?;
        self.queue
            .write_buffer(&self.buffers.particles, offset, bytemuck::bytes_of(&particle.to_gpu()));
        Ok(())
    }

    fn write_constant(&mut self, index: ConstantsIndex, value: f32) {
        self.constants[index.index() as usize] = value;
        self.queue.write_buffer(
            &self.buffers.constants,
            index.index() as u64 * CONSTANT_STRIDE,
            bytemuck::bytes_of(&value),
        );
    }
}

impl SheetBackend for GpuSheet {
    fn step(&mut self, uniforms: &PhysicalUniforms) {
        if uniforms.dt <= 0.0 {
            return;
        }
        self.queue
            .write_buffer(&self.physical_buffer, 0, bytemuck::bytes_of(&uniforms.to_gpu()));

        let spring_workgroups = self.buffers.spring_count.div_ceil(WORKGROUP_SIZE);
        let particle_workgroups = self.buffers.particle_count.div_ceil(WORKGROUP_SIZE);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Sheet Step Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Sheet Step"),
                timestamp_writes: None,
            });

            if spring_workgroups > 0 {
                pass.set_pipeline(&self.spring_pipeline);
                pass.set_bind_group(0, &self.spring_bind_group, &[]);
                pass.dispatch_workgroups(spring_workgroups, 1, 1);
            }

            pass.set_bind_group(0, &self.particle_bind_group, &[]);
            pass.set_pipeline(&self.gather_pipeline);
            pass.dispatch_workgroups(particle_workgroups, 1, 1);
            pass.set_pipeline(&self.integrate_pipeline);
            pass.dispatch_workgroups(particle_workgroups, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn reset(&mut self, sheet: &SheetData) {
        self.constants = sheet.constants;
        let same_shape = sheet.particles.len() as u32 == self.buffers.particle_count
            && sheet.springs.len() as u32 == self.buffers.spring_count;

        if same_shape {
            self.buffers.write(&self.queue, sheet);
            return;
        }

        self.buffers = SheetBuffers::new(&self.device, sheet);
        let (spring, particle) = create_bind_groups(
            &self.device,
            &self.spring_layout,
            &self.particle_layout,
            &self.buffers,
            &self.physical_buffer,
        );
        self.spring_bind_group = spring;
        self.particle_bind_group = particle;
        self.generation += 1;
        log::debug!(
            "Recreated GPU sheet buffers: {} particles, {} springs",
            self.buffers.particle_count,
            self.buffers.spring_count
        );
    }

    fn particle_count(&self) -> u32 {
        self.buffers.particle_count
    }

    fn spring_count(&self) -> u32 {
        self.buffers.spring_count
    }
}
