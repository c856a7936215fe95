//! Generation of the circular jumping sheet.
//!
//! The sheet starts as a square grid of particles in the y = 0 plane, joined
//! to their horizontal and vertical neighbours. The grid is cut to a circle,
//! the particles left on its rim are joined to each other, and a ring of
//! locked frame particles is tied to the rim with the (stiffer) outer
//! springs.
//!
//! ```ignore
//! use trampoline::mesh::{generate, MeshParameters};
//!
//! let sheet = generate(&MeshParameters::default())?;
//! println!("{} particles, {} springs", sheet.particles.len(), sheet.springs.len());
//! ```

use std::collections::HashSet;
use std::f32::consts::TAU;
use std::fmt;

use glam::{UVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::MeshError;
use crate::shader_types::{ConstantsIndex, Particle, Spring, VertexIn, MAX_SPRINGS_PER_PARTICLE};
use crate::ShaderIndex;

/// Colour of the frame ring.
pub const EDGE_COLOR: Vec3 = Vec3::new(0.0, 0.5, 1.0);

/// Default angular resolution of [`edge_ring`].
pub const EDGE_SMOOTHNESS: f32 = 10.0;

/// Shape and material of the sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshParameters {
    /// Radius of the frame the outer springs are hooked into.
    pub frame_radius: f32,
    /// Radius of the jumping sheet itself.
    pub sheet_radius: f32,
    /// Grid spacing.
    pub fineness: f32,
    /// Mass of every particle. Defaults to `0.26 * fineness²`.
    pub particle_mass: Option<f32>,
    pub outer_spring_count: u32,
    pub inner_spring_constant: f32,
    pub inner_velocity_constant: f32,
    pub outer_spring_constant: f32,
    pub outer_velocity_constant: f32,
    /// Rest length of the outer springs.
    pub outer_spring_length: f32,
    /// Number of particles at the centre the measurement acts on.
    pub data_particle_count: u32,
}

impl Default for MeshParameters {
    fn default() -> Self {
        Self {
            frame_radius: 1.65,
            sheet_radius: 1.31,
            fineness: 0.03,
            particle_mass: None,
            outer_spring_count: 72,
            inner_spring_constant: 4000.0,
            inner_velocity_constant: 1.0,
            outer_spring_constant: 2264.0,
            outer_velocity_constant: 1.0,
            outer_spring_length: 0.17,
            data_particle_count: 9,
        }
    }
}

impl MeshParameters {
    pub fn particle_mass(&self) -> f32 {
        self.particle_mass.unwrap_or(0.26 * self.fineness * self.fineness)
    }

    /// Initial contents of the constants buffer, indexed by [`ConstantsIndex`].
    pub fn constants(&self) -> [f32; 4] {
        let mut constants = [0.0; 4];
        constants[ConstantsIndex::InnerSpring.index() as usize] = self.inner_spring_constant;
        constants[ConstantsIndex::InnerVelocity.index() as usize] = self.inner_velocity_constant;
        constants[ConstantsIndex::OuterSpring.index() as usize] = self.outer_spring_constant;
        constants[ConstantsIndex::OuterVelocity.index() as usize] = self.outer_velocity_constant;
        constants
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        fn invalid(name: &'static str, reason: impl Into<String>) -> MeshError {
            MeshError::InvalidParameter { name, reason: reason.into() }
        }

        for (name, value) in [
            ("frame_radius", self.frame_radius),
            ("sheet_radius", self.sheet_radius),
            ("fineness", self.fineness),
            ("outer_spring_length", self.outer_spring_length),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(name, format!("must be positive, got {}", value)));
            }
        }
        if let Some(mass) = self.particle_mass {
            if !mass.is_finite() || mass <= 0.0 {
                return Err(invalid("particle_mass", format!("must be positive, got {}", mass)));
            }
        }
        if self.sheet_radius >= self.frame_radius {
            return Err(invalid(
                "sheet_radius",
                format!(
                    "must be smaller than the frame radius {}, got {}",
                    self.frame_radius, self.sheet_radius
                ),
            ));
        }
        if self.outer_spring_count == 0 {
            return Err(invalid("outer_spring_count", "at least one outer spring is required"));
        }
        if self.data_particle_count == 0 {
            return Err(invalid("data_particle_count", "at least one data particle is required"));
        }
        Ok(())
    }
}

impl fmt::Display for MeshParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CircularTrampolineSheet{{r1: {}, r2: {}, fineness: {}, n_outerSprings: {}, \
             innerSpringConstant: {}, innerVelConstant: {}, outerSpringConstant: {}, \
             outerVelConstant: {}, outerSpringLength: {}, n_dataParticles: {}}}",
            self.frame_radius,
            self.sheet_radius,
            self.fineness,
            self.outer_spring_count,
            self.inner_spring_constant,
            self.inner_velocity_constant,
            self.outer_spring_constant,
            self.outer_velocity_constant,
            self.outer_spring_length,
            self.data_particle_count
        )
    }
}

/// Initial buffer contents of a sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub particles: Vec<Particle>,
    pub springs: Vec<Spring>,
    /// Indexed by [`ConstantsIndex`].
    pub constants: [f32; 4],
    /// Particles nearest the centre, nearest first.
    pub data_indices: Vec<u32>,
    pub parameters: MeshParameters,
}

impl SheetData {
    pub fn constant(&self, index: ConstantsIndex) -> f32 {
        self.constants[index.index() as usize]
    }

    /// Number of locked frame particles at the end of the particle list.
    pub fn frame_particle_count(&self) -> usize {
        self.particles.iter().filter(|p| p.locked).count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SpringKind {
    Inner,
    Outer,
}

impl SpringKind {
    fn constants_indices(self) -> UVec2 {
        match self {
            SpringKind::Inner => UVec2::new(
                ConstantsIndex::InnerSpring.index(),
                ConstantsIndex::InnerVelocity.index(),
            ),
            SpringKind::Outer => UVec2::new(
                ConstantsIndex::OuterSpring.index(),
                ConstantsIndex::OuterVelocity.index(),
            ),
        }
    }
}

fn make_spring(a: u32, b: u32, kind: SpringKind, rest_length: f32) -> Spring {
    Spring {
        indices: UVec2::new(a, b),
        constants_indices: kind.constants_indices(),
        force: Vec3::ZERO,
        rest_length,
    }
}

/// The `count` candidates nearest `position`, nearest first. Ties keep
/// candidate order.
fn nearest(
    position: Vec3,
    candidates: &[u32],
    particles: &[Particle],
    count: usize,
    exclude: Option<u32>,
) -> Vec<u32> {
    let mut sorted: Vec<(f32, u32)> = candidates
        .iter()
        .filter(|&&i| Some(i) != exclude)
        .map(|&i| (particles[i as usize].position.distance(position), i))
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    sorted.into_iter().take(count).map(|(_, i)| i).collect()
}

/// Builds the sheet described by `params`.
pub fn generate(params: &MeshParameters) -> Result<SheetData, MeshError> {
    params.validate()?;

    let n = (2.0 * params.frame_radius / params.fineness) as usize;
    let coordinate = |i: usize| (i as f32 - (n as f32 - 1.0) / 2.0) * params.fineness;
    let mass = params.particle_mass();

    log::debug!("Building {}x{} particle grid", n, n);

    // Grid cell -> particle index, None once cut away
    let mut grid: Vec<Option<u32>> = vec![None; n * n];
    let mut particles = Vec::new();
    for row in 0..n {
        for col in 0..n {
            let position = Vec3::new(coordinate(col), 0.0, coordinate(row));
            if Vec2::new(position.x, position.z).length() <= params.sheet_radius {
                grid[row * n + col] = Some(particles.len() as u32);
                particles.push(Particle::at_rest(position, mass, false));
            }
        }
    }
    if particles.is_empty() {
        return Err(MeshError::EmptySheet);
    }
    let cell = |row: usize, col: usize| grid[row * n + col];

    let mut springs = Vec::new();
    let connect = |springs: &mut Vec<Spring>, a: u32, b: u32, particles: &[Particle]| {
        let rest = particles[a as usize].position.distance(particles[b as usize].position);
        springs.push(make_spring(a, b, SpringKind::Inner, rest));
    };

    for row in 0..n {
        for col in 0..n.saturating_sub(1) {
            if let (Some(a), Some(b)) = (cell(row, col), cell(row, col + 1)) {
                connect(&mut springs, a, b, &particles);
            }
        }
    }
    for row in 0..n.saturating_sub(1) {
        for col in 0..n {
            if let (Some(a), Some(b)) = (cell(row, col), cell(row + 1, col)) {
                connect(&mut springs, a, b, &particles);
            }
        }
    }

    // First and last particle of every row, then of every column
    let mut inner_edge = Vec::new();
    let mut seen = HashSet::new();
    for row in 0..n {
        push_ends((0..n).filter_map(|col| cell(row, col)), &mut seen, &mut inner_edge);
    }
    for col in 0..n {
        push_ends((0..n).filter_map(|row| cell(row, col)), &mut seen, &mut inner_edge);
    }
    log::debug!("{} particles on the inner edge", inner_edge.len());

    for &index in &inner_edge {
        let position = particles[index as usize].position;
        for other in nearest(position, &inner_edge, &particles, 2, Some(index)) {
            connect(&mut springs, index, other, &particles);
        }
    }

    let angle_step = TAU / params.outer_spring_count as f32;
    for i in 0..params.outer_spring_count {
        let angle = i as f32 * angle_step;
        let position = Vec3::new(
            params.frame_radius * angle.sin(),
            0.0,
            params.frame_radius * angle.cos(),
        );
        let index = particles.len() as u32;
        particles.push(Particle::at_rest(position, mass, true));
        if let Some(&other) = nearest(position, &inner_edge, &particles, 1, None).first() {
            springs.push(make_spring(index, other, SpringKind::Outer, params.outer_spring_length));
        }
    }

    attach_springs(&mut particles, &springs)?;

    let all: Vec<u32> = (0..particles.len() as u32).collect();
    let data_indices = nearest(
        Vec3::ZERO,
        &all,
        &particles,
        params.data_particle_count as usize,
        None,
    );

    log::info!(
        "Generated sheet: {} particles, {} springs, {} data particles",
        particles.len(),
        springs.len(),
        data_indices.len()
    );

    Ok(SheetData {
        particles,
        springs,
        constants: params.constants(),
        data_indices,
        parameters: params.clone(),
    })
}

/// Appends the first and last index of `line` to `edge` unless already seen.
fn push_ends(mut line: impl Iterator<Item = u32>, seen: &mut HashSet<u32>, edge: &mut Vec<u32>) {
    let first = line.next();
    let last = line.last().or(first);
    for index in [first, last].into_iter().flatten() {
        if seen.insert(index) {
            edge.push(index);
        }
    }
}

/// Fills the spring slots of every particle.
fn attach_springs(particles: &mut [Particle], springs: &[Spring]) -> Result<(), MeshError> {
    let mut counts = vec![0usize; particles.len()];
    for spring in springs {
        counts[spring.indices.x as usize] += 1;
        counts[spring.indices.y as usize] += 1;
    }
    if let Some((particle, &count)) = counts
        .iter()
        .enumerate()
        .find(|(_, &count)| count > MAX_SPRINGS_PER_PARTICLE)
    {
        return Err(MeshError::TooManySprings {
            particle,
            count,
            max: MAX_SPRINGS_PER_PARTICLE,
        });
    }

    for (spring_index, spring) in springs.iter().enumerate() {
        for end in [spring.indices.x, spring.indices.y] {
            let particle = &mut particles[end as usize];
            particle.springs[particle.spring_count as usize] = spring_index as u32;
            particle.spring_count += 1;
        }
    }
    Ok(())
}

/// Line-list vertices of the frame ring.
///
/// Empty unless `smoothness` is finite and positive.
pub fn edge_ring(params: &MeshParameters, smoothness: f32) -> Vec<VertexIn> {
    if !smoothness.is_finite() || smoothness <= 0.0 {
        log::warn!("Ignoring edge ring smoothness {}", smoothness);
        return Vec::new();
    }
    let step = 1.0 / smoothness;
    let end = TAU + step;
    let mut vertices = Vec::new();
    let mut i = 0u32;
    loop {
        let angle = i as f32 * step;
        if angle > end {
            break;
        }
        let vertex = VertexIn {
            position: Vec3::new(
                params.frame_radius * angle.sin(),
                0.0,
                params.frame_radius * angle.cos(),
            ),
            color: EDGE_COLOR,
        };
        vertices.push(vertex);
        if i != 0 {
            vertices.push(vertex);
        }
        i += 1;
    }
    vertices.pop();
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coarse() -> MeshParameters {
        MeshParameters {
            fineness: 0.1,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_parameters() {
        let params = MeshParameters::default();
        assert!(params.validate().is_ok());
        assert!((params.particle_mass() - 0.26 * 0.03 * 0.03).abs() < 1e-9);
        assert_eq!(params.constants(), [4000.0, 1.0, 2264.0, 1.0]);
    }

    #[test]
    fn test_display() {
        let text = MeshParameters::default().to_string();
        assert!(text.starts_with("CircularTrampolineSheet{r1: 1.65, r2: 1.31, fineness: 0.03"));
        assert!(text.contains("n_outerSprings: 72"));
        assert!(text.ends_with("n_dataParticles: 9}"));
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let too_wide = MeshParameters { sheet_radius: 2.0, ..Default::default() };
        assert!(matches!(
            too_wide.validate(),
            Err(MeshError::InvalidParameter { name: "sheet_radius", .. })
        ));

        let no_fineness = MeshParameters { fineness: 0.0, ..Default::default() };
        assert!(no_fineness.validate().is_err());

        let no_frame = MeshParameters { outer_spring_count: 0, ..Default::default() };
        assert!(no_frame.validate().is_err());

        let no_data = MeshParameters { data_particle_count: 0, ..Default::default() };
        assert!(generate(&no_data).is_err());
    }

    #[test]
    fn test_sheet_is_cut_to_circle() {
        let params = coarse();
        let sheet = generate(&params).unwrap();

        for particle in sheet.particles.iter().filter(|p| !p.locked) {
            let r = Vec2::new(particle.position.x, particle.position.z).length();
            assert!(r <= params.sheet_radius + 1e-6);
            assert_eq!(particle.position.y, 0.0);
            assert_eq!(particle.mass, params.particle_mass());
        }
    }

    #[test]
    fn test_frame_particles() {
        let params = coarse();
        let sheet = generate(&params).unwrap();

        assert_eq!(sheet.frame_particle_count(), 72);
        let frame = &sheet.particles[sheet.particles.len() - 72..];
        assert!(frame.iter().all(|p| p.locked));
        for particle in frame {
            assert!((particle.position.length() - params.frame_radius).abs() < 1e-4);
        }
        // First frame particle sits at angle 0: (0, 0, r1)
        assert!((frame[0].position - Vec3::new(0.0, 0.0, params.frame_radius)).length() < 1e-6);
    }

    #[test]
    fn test_frame_particle_count_is_exact() {
        // Accumulating the angle step in f32 overshoots for these counts
        for count in [19, 38] {
            let params = MeshParameters { outer_spring_count: count, ..coarse() };
            let sheet = generate(&params).unwrap();
            assert_eq!(sheet.frame_particle_count(), count as usize, "count {}", count);
            let outer = sheet
                .springs
                .iter()
                .filter(|s| s.constants_indices.x == ConstantsIndex::OuterSpring.index())
                .count();
            assert_eq!(outer, count as usize);
        }
    }

    #[test]
    fn test_spring_kinds_and_rest_lengths() {
        let params = coarse();
        let sheet = generate(&params).unwrap();
        let inner = UVec2::new(0, 1);
        let outer = UVec2::new(2, 3);

        let outer_springs: Vec<&Spring> = sheet
            .springs
            .iter()
            .filter(|s| s.constants_indices == outer)
            .collect();
        assert_eq!(outer_springs.len(), 72);
        for spring in &outer_springs {
            assert_eq!(spring.rest_length, params.outer_spring_length);
            assert!(sheet.particles[spring.indices.x as usize].locked);
            assert!(!sheet.particles[spring.indices.y as usize].locked);
        }

        for spring in sheet.springs.iter().filter(|s| s.constants_indices == inner) {
            let a = sheet.particles[spring.indices.x as usize].position;
            let b = sheet.particles[spring.indices.y as usize].position;
            assert!((a.distance(b) - spring.rest_length).abs() < 1e-6);
            assert!(spring.rest_length > 0.0);
        }
    }

    #[test]
    fn test_grid_springs_connect_neighbours() {
        let params = coarse();
        let sheet = generate(&params).unwrap();
        // The first spring joins the first two particles of the first row.
        let first = sheet.springs[0];
        assert_eq!(first.indices, UVec2::new(0, 1));
        assert!((first.rest_length - params.fineness).abs() < 1e-5);
    }

    #[test]
    fn test_spring_slots_are_consistent() {
        let sheet = generate(&coarse()).unwrap();

        for (index, spring) in sheet.springs.iter().enumerate() {
            for end in [spring.indices.x, spring.indices.y] {
                assert!((end as usize) < sheet.particles.len());
                assert!(sheet.particles[end as usize].spring_slots().contains(&(index as u32)));
            }
        }
        let total: u32 = sheet.particles.iter().map(|p| p.spring_count).sum();
        assert_eq!(total as usize, sheet.springs.len() * 2);
    }

    #[test]
    fn test_data_particles_are_nearest_centre() {
        let params = coarse();
        let sheet = generate(&params).unwrap();

        assert_eq!(sheet.data_indices.len(), 9);
        let distances: Vec<f32> = sheet
            .data_indices
            .iter()
            .map(|&i| sheet.particles[i as usize].position.length())
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));

        let farthest = *distances.last().unwrap();
        let closer_outside = sheet
            .particles
            .iter()
            .enumerate()
            .filter(|(i, _)| !sheet.data_indices.contains(&(*i as u32)))
            .any(|(_, p)| p.position.length() < farthest - 1e-6);
        assert!(!closer_outside);
    }

    #[test]
    fn test_too_many_springs() {
        let params = MeshParameters {
            fineness: 0.5,
            outer_spring_count: 2000,
            ..Default::default()
        };
        match generate(&params) {
            Err(MeshError::TooManySprings { count, max, .. }) => {
                assert!(count > max);
                assert_eq!(max, MAX_SPRINGS_PER_PARTICLE);
            }
            other => panic!("expected TooManySprings, got {:?}", other.map(|s| s.springs.len())),
        }
    }

    #[test]
    fn test_empty_sheet() {
        let params = MeshParameters {
            fineness: 0.5,
            sheet_radius: 0.1,
            ..Default::default()
        };
        assert_eq!(generate(&params).unwrap_err(), MeshError::EmptySheet);
    }

    #[test]
    fn test_edge_ring() {
        let params = MeshParameters::default();
        let ring = edge_ring(&params, EDGE_SMOOTHNESS);

        // 64 angles, every one but the first duplicated, last dropped
        assert_eq!(ring.len(), 126);
        assert!(ring.iter().all(|v| v.color == EDGE_COLOR));
        assert!(ring
            .iter()
            .all(|v| (v.position.length() - params.frame_radius).abs() < 1e-4));
        // Consecutive segments share an end point
        for pair in ring[1..].chunks(2).filter(|c| c.len() == 2) {
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_edge_ring_rejects_bad_smoothness() {
        let params = MeshParameters::default();
        for smoothness in [0.0, -1.0, f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(edge_ring(&params, smoothness).is_empty(), "smoothness {}", smoothness);
        }
        // Coarse but valid: angles 0, 2, 4, 6 and 8 give four segments
        assert_eq!(edge_ring(&params, 0.5).len(), 8);
    }
}
