//! Sheet backends and the CPU reference solver.
//!
//! A backend owns the particle, spring and constants buffers of one sheet and
//! advances them with three passes per step:
//!
//! 1. **springs** - every spring computes its damped force
//!    `(k·(len − rest) + c·dot(v₂ − v₁, dir))·dir` on its first particle
//! 2. **gather** - every particle sums the forces of its spring slots,
//!    negated where it is the second end
//! 3. **integrate** - position Verlet with gravity along −y; locked particles
//!    stay put
//!
//! [`CpuSheet`] runs the passes on the host and is the reference the WGSL
//! kernels in `src/shaders/` are tested against. [`crate::gpu::GpuSheet`] is
//! the GPU implementation.

use glam::Vec3;

use crate::error::SheetError;
use crate::mesh::SheetData;
use crate::shader_types::{ConstantsIndex, Particle, PhysicalUniforms, Spring};
use crate::ShaderIndex;

/// Random access to the particles and constants of a running sheet.
///
/// This is all the measurement controller needs, so it can drive any
/// backend.
pub trait SheetAccess {
    /// Reads the particles at `indices`, in order.
    fn read_particles(&mut self, indices: &[u32]) -> Result<Vec<Particle>, SheetError>;

    fn write_particle(&mut self, index: u32, particle: &Particle) -> Result<(), SheetError>;

    fn write_constant(&mut self, index: ConstantsIndex, value: f32);
}

/// A sheet that can be stepped and reloaded.
pub trait SheetBackend: SheetAccess {
    /// Runs the spring, gather and integrate passes once.
    fn step(&mut self, uniforms: &PhysicalUniforms);

    /// Replaces all buffer contents with `sheet`.
    fn reset(&mut self, sheet: &SheetData);

    fn particle_count(&self) -> u32;

    fn spring_count(&self) -> u32;

    /// Step parameters for this sheet.
    fn physical_uniforms(&self, dt: f32, gravity: f32) -> PhysicalUniforms {
        PhysicalUniforms {
            dt,
            gravity,
            particle_count: self.particle_count(),
            spring_count: self.spring_count(),
        }
    }
}

/// Damped spring force on the first end of `spring`.
pub fn spring_force(spring: &Spring, p1: &Particle, p2: &Particle, constants: &[f32]) -> Vec3 {
    let delta = p2.position - p1.position;
    let len = delta.length();
    let direction = if len > 0.0 { delta / len } else { Vec3::ZERO };

    let k = constants[spring.constants_indices.x as usize];
    let c = constants[spring.constants_indices.y as usize];
    let stretch = len - spring.rest_length;
    let closing_speed = (p2.velocity - p1.velocity).dot(direction);

    (k * stretch + c * closing_speed) * direction
}

/// Sum of the spring forces acting on particle `index`.
pub fn gather_force(index: u32, particle: &Particle, springs: &[Spring]) -> Vec3 {
    particle
        .spring_slots()
        .iter()
        .map(|&slot| {
            let spring = &springs[slot as usize];
            if spring.indices.x == index {
                spring.force
            } else {
                -spring.force
            }
        })
        .sum()
}

/// One position Verlet step of `particle`.
pub fn integrate(particle: &mut Particle, dt: f32, gravity: f32) {
    if particle.locked {
        particle.last_position = particle.position;
        particle.velocity = Vec3::ZERO;
        return;
    }

    let acceleration = particle.force / particle.mass - Vec3::new(0.0, gravity, 0.0);
    let next = 2.0 * particle.position - particle.last_position + acceleration * dt * dt;
    particle.velocity = (next - particle.position) / dt;
    particle.last_position = particle.position;
    particle.position = next;
}

/// Host-side sheet backend.
#[derive(Debug, Clone)]
pub struct CpuSheet {
    particles: Vec<Particle>,
    springs: Vec<Spring>,
    constants: [f32; 4],
}

impl CpuSheet {
    pub fn new(sheet: &SheetData) -> Self {
        Self {
            particles: sheet.particles.clone(),
            springs: sheet.springs.clone(),
            constants: sheet.constants,
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    pub fn constants(&self) -> &[f32; 4] {
        &self.constants
    }

    fn update_springs(&mut self) {
        let particles = &self.particles;
        let constants = &self.constants;
        for spring in &mut self.springs {
            let p1 = &particles[spring.indices.x as usize];
            let p2 = &particles[spring.indices.y as usize];
            spring.force = spring_force(spring, p1, p2, constants);
        }
    }

    fn gather_forces(&mut self) {
        let springs = &self.springs;
        for (index, particle) in self.particles.iter_mut().enumerate() {
            particle.force = gather_force(index as u32, particle, springs);
        }
    }

    fn check_index(&self, index: u32) -> Result<usize, SheetError> {
        if (index as usize) < self.particles.len() {
            Ok(index as usize)
        } else {
            Err(SheetError::IndexOutOfRange {
                index,
                len: self.particles.len(),
            })
        }
    }
}

impl SheetAccess for CpuSheet {
    fn read_particles(&mut self, indices: &[u32]) -> Result<Vec<Particle>, SheetError> {
        indices
            .iter()
            .map(|&i| self.check_index(i).map(|i| self.particles[i]))
            .collect()
    }

    fn write_particle(&mut self, index: u32, particle: &Particle) -> Result<(), SheetError> {
        let index = self.check_index(index)?;
        self.particles[index] = *particle;
        Ok(())
    }

    fn write_constant(&mut self, index: ConstantsIndex, value: f32) {
        self.constants[index.index() as usize] = value;
    }
}

impl SheetBackend for CpuSheet {
    fn step(&mut self, uniforms: &PhysicalUniforms) {
        if uniforms.dt <= 0.0 {
            return;
        }
        self.update_springs();
        self.gather_forces();
        for particle in &mut self.particles {
            integrate(particle, uniforms.dt, uniforms.gravity);
        }
    }

    fn reset(&mut self, sheet: &SheetData) {
        *self = Self::new(sheet);
    }

    fn particle_count(&self) -> u32 {
        self.particles.len() as u32
    }

    fn spring_count(&self) -> u32 {
        self.springs.len() as u32
    }
}
