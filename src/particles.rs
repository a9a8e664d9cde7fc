//! GPU Particles
//!
//! A fixed set of particles whose motion is evaluated entirely in the vertex
//! shader. Per-particle data (initial position, velocity, lifetime, size) is
//! generated once and uploaded once; each frame the host only updates the
//! elapsed-time uniform, so host cost does not depend on particle count.
//!
//! For a particle with lifetime `L` at elapsed time `t`:
//!
//! ```text
//! age      = t mod L
//! position = initial + velocity × age
//! alpha    = 1 − age / L
//! ```
//!
//! Particles do not interact. [`ParticleSystem::particle_state`] evaluates
//! the same formula on the CPU for tests and debugging.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

/// WGSL source of the particle pipeline (`vs_main` / `fs_main`).
pub const PARTICLE_SHADER: &str = include_str!("shaders/particles.wgsl");

/// Vertices drawn per particle (two triangles).
pub const VERTICES_PER_PARTICLE: u32 = 6;

const MIN_LIFETIME: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleEmitterSettings {
    pub count: usize,
    /// Half-extent of the spawn cube around `origin`.
    pub spread: f32,
    pub origin: [f32; 3],
    pub speed: (f32, f32),
    pub lifetime: (f32, f32),
    pub size: (f32, f32),
    pub seed: u64,
}

impl Default for ParticleEmitterSettings {
    fn default() -> Self {
        Self {
            count: 1000,
            spread: 1.0,
            origin: [0.0; 3],
            speed: (0.5, 2.0),
            lifetime: (1.0, 4.0),
            size: (0.05, 0.2),
            seed: 42,
        }
    }
}

/// Per-particle vertex data, stepped per instance.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub initial_position: [f32; 3],
    pub lifetime: f32,
    pub velocity: [f32; 3],
    pub size: f32,
}

const PARTICLE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32,
    2 => Float32x3,
    3 => Float32,
];

impl ParticleVertex {
    #[must_use]
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ParticleVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &PARTICLE_ATTRIBUTES,
        }
    }
}

/// Uniform block matching `ParticleUniforms` in the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleUniforms {
    pub view_projection: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub elapsed: f32,
    pub _pad: [f32; 3],
}

/// CPU evaluation of one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleState {
    pub position: Vec3,
    pub alpha: f32,
    pub size: f32,
}

/// Age within the current cycle, `elapsed mod lifetime` (always `>= 0`).
#[inline]
#[must_use]
pub fn particle_age(elapsed: f32, lifetime: f32) -> f32 {
    let lifetime = lifetime.max(MIN_LIFETIME);
    elapsed - lifetime * (elapsed / lifetime).floor()
}

/// Position and alpha of a particle at `elapsed`.
#[must_use]
pub fn evaluate_particle(initial: Vec3, velocity: Vec3, lifetime: f32, elapsed: f32) -> (Vec3, f32) {
    let lifetime = lifetime.max(MIN_LIFETIME);
    let age = particle_age(elapsed, lifetime);
    (initial + velocity * age, 1.0 - age / lifetime)
}

fn ordered(range: (f32, f32)) -> (f32, f32) {
    if range.0 <= range.1 {
        range
    } else {
        (range.1, range.0)
    }
}

fn sample(rng: &mut StdRng, range: (f32, f32)) -> f32 {
    let (lo, hi) = ordered(range);
    if hi > lo { rng.random_range(lo..hi) } else { lo }
}

#[derive(Debug, Clone)]
pub struct ParticleSystem {
    particles: Box<[ParticleVertex]>,
    elapsed: f32,
    pub color: Vec4,
}

impl ParticleSystem {
    /// Generates the particle set. Same settings (and seed) produce the same
    /// particles.
    #[must_use]
    pub fn new(settings: &ParticleEmitterSettings) -> Self {
        let mut rng = StdRng::seed_from_u64(settings.seed);
        let origin = Vec3::from_array(settings.origin);
        let spread = settings.spread.abs();

        let particles = (0..settings.count)
            .map(|_| {
                let offset = if spread > 0.0 {
                    Vec3::new(
                        rng.random_range(-spread..spread),
                        rng.random_range(-spread..spread),
                        rng.random_range(-spread..spread),
                    )
                } else {
                    Vec3::ZERO
                };
                let direction = Vec3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                )
                .normalize_or(Vec3::Y);
                let speed = sample(&mut rng, settings.speed);

                ParticleVertex {
                    initial_position: (origin + offset).to_array(),
                    lifetime: sample(&mut rng, settings.lifetime).max(MIN_LIFETIME),
                    velocity: (direction * speed).to_array(),
                    size: sample(&mut rng, settings.size),
                }
            })
            .collect();

        Self {
            particles,
            elapsed: 0.0,
            color: Vec4::ONE,
        }
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Advances time. O(1): nothing per particle is touched.
    pub fn advance(&mut self, dt: f32) {
        if dt.is_finite() {
            self.elapsed += dt;
        }
    }

    pub fn set_elapsed(&mut self, elapsed: f32) {
        if elapsed.is_finite() {
            self.elapsed = elapsed;
        }
    }

    #[must_use]
    pub fn particles(&self) -> &[ParticleVertex] {
        &self.particles
    }

    /// Instance buffer contents; uploaded once.
    #[must_use]
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.particles)
    }

    #[must_use]
    pub fn uniforms(&self, view_projection: Mat4) -> ParticleUniforms {
        ParticleUniforms {
            view_projection: view_projection.to_cols_array_2d(),
            color: self.color.to_array(),
            elapsed: self.elapsed,
            _pad: [0.0; 3],
        }
    }

    /// What the shader computes for particle `index` right now.
    #[must_use]
    pub fn particle_state(&self, index: usize) -> Option<ParticleState> {
        let p = self.particles.get(index)?;
        let (position, alpha) = evaluate_particle(
            Vec3::from_array(p.initial_position),
            Vec3::from_array(p.velocity),
            p.lifetime,
            self.elapsed,
        );
        Some(ParticleState {
            position,
            alpha,
            size: p.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_wraps_at_lifetime() {
        assert!((particle_age(2.5, 2.0) - 0.5).abs() < 1e-6);
        assert!((particle_age(-0.5, 2.0) - 1.5).abs() < 1e-6);
        assert_eq!(particle_age(0.0, 2.0), 0.0);
    }

    #[test]
    fn alpha_fades_over_lifetime() {
        let (_, alpha) = evaluate_particle(Vec3::ZERO, Vec3::X, 4.0, 1.0);
        assert!((alpha - 0.75).abs() < 1e-6);
    }

    #[test]
    fn pod_layouts() {
        assert_eq!(std::mem::size_of::<ParticleVertex>(), 32);
        assert_eq!(std::mem::size_of::<ParticleUniforms>(), 96);
        assert_eq!(ParticleVertex::layout().attributes[2].offset, 16);
    }

    #[test]
    fn shader_declares_entry_points() {
        assert!(PARTICLE_SHADER.contains("fn vs_main"));
        assert!(PARTICLE_SHADER.contains("fn fs_main"));
    }
}
