//! GPU Particle Tests
//!
//! Tests for:
//! - Deterministic generation from a seed
//! - Stateless evaluation (state depends only on elapsed time)
//! - Host-side cost independent of particle count
//! - Buffer and uniform layouts

use glam::{Mat4, Vec3};

use myth_governor::particles::{
    ParticleEmitterSettings, ParticleSystem, ParticleVertex, VERTICES_PER_PARTICLE, evaluate_particle,
};

fn settings(count: usize) -> ParticleEmitterSettings {
    ParticleEmitterSettings {
        count,
        ..Default::default()
    }
}

// ============================================================================
// Generation
// ============================================================================

#[test]
fn same_seed_same_particles() {
    let a = ParticleSystem::new(&settings(256));
    let b = ParticleSystem::new(&settings(256));
    assert_eq!(a.particles(), b.particles());

    let c = ParticleSystem::new(&ParticleEmitterSettings {
        seed: 7,
        ..settings(256)
    });
    assert_ne!(a.particles(), c.particles());
}

#[test]
fn generated_values_respect_ranges() {
    let s = ParticleEmitterSettings {
        count: 500,
        spread: 2.0,
        origin: [10.0, 0.0, -5.0],
        ..Default::default()
    };
    let system = ParticleSystem::new(&s);
    let origin = Vec3::from_array(s.origin);

    for p in system.particles() {
        let offset = Vec3::from_array(p.initial_position) - origin;
        assert!(offset.abs().max_element() <= 2.0, "Spawned outside spread: {offset:?}");
        assert!((1.0..4.0).contains(&p.lifetime));
        assert!((0.05..0.2).contains(&p.size));
        let speed = Vec3::from_array(p.velocity).length();
        assert!((0.5 - 1e-4..2.0 + 1e-4).contains(&speed), "Speed {speed}");
    }
}

#[test]
fn reversed_ranges_are_tolerated() {
    let system = ParticleSystem::new(&ParticleEmitterSettings {
        count: 64,
        lifetime: (3.0, 3.0),
        size: (0.5, 0.1),
        ..Default::default()
    });
    for p in system.particles() {
        assert_eq!(p.lifetime, 3.0);
        assert!((0.1..0.5).contains(&p.size));
    }
}

#[test]
fn zero_count_is_empty() {
    let system = ParticleSystem::new(&settings(0));
    assert_eq!(system.count(), 0);
    assert!(system.vertex_bytes().is_empty());
    assert!(system.particle_state(0).is_none());
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn state_depends_only_on_elapsed_time() {
    let mut stepped = ParticleSystem::new(&settings(128));
    stepped.advance(0.5);
    stepped.advance(0.25);

    let mut jumped = ParticleSystem::new(&settings(128));
    jumped.set_elapsed(0.75);

    for i in 0..128 {
        assert_eq!(stepped.particle_state(i), jumped.particle_state(i));
    }
}

#[test]
fn particles_recycle_after_lifetime() {
    let initial = Vec3::new(1.0, 2.0, 3.0);
    let velocity = Vec3::new(0.0, 1.0, 0.0);

    let (start, alpha_start) = evaluate_particle(initial, velocity, 2.0, 0.0);
    assert_eq!(start, initial);
    assert_eq!(alpha_start, 1.0);

    let (mid, alpha_mid) = evaluate_particle(initial, velocity, 2.0, 1.5);
    assert!((mid - Vec3::new(1.0, 3.5, 3.0)).length() < 1e-5);
    assert!((alpha_mid - 0.25).abs() < 1e-5);

    let (wrapped, alpha_wrapped) = evaluate_particle(initial, velocity, 2.0, 4.5);
    assert!((wrapped - Vec3::new(1.0, 2.5, 3.0)).length() < 1e-5);
    assert!((alpha_wrapped - 0.75).abs() < 1e-5);
}

#[test]
fn advancing_never_touches_particle_data() {
    let mut system = ParticleSystem::new(&settings(1000));
    let before = system.vertex_bytes().to_vec();

    for _ in 0..100 {
        system.advance(1.0 / 60.0);
    }
    system.advance(f32::NAN);

    assert_eq!(system.vertex_bytes(), &before[..]);
    assert!((system.elapsed() - 100.0 / 60.0).abs() < 1e-4);
}

// ============================================================================
// GPU Layout
// ============================================================================

#[test]
fn vertex_buffer_matches_particle_count() {
    let system = ParticleSystem::new(&settings(300));
    assert_eq!(system.vertex_bytes().len(), 300 * std::mem::size_of::<ParticleVertex>());
    assert_eq!(ParticleVertex::layout().array_stride, 32);
    assert_eq!(ParticleVertex::layout().step_mode, wgpu::VertexStepMode::Instance);
    assert_eq!(VERTICES_PER_PARTICLE, 6);
}

#[test]
fn uniforms_carry_elapsed_time_and_matrix() {
    let mut system = ParticleSystem::new(&settings(16));
    system.set_elapsed(3.5);
    let view_projection = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));

    let uniforms = system.uniforms(view_projection);
    assert_eq!(uniforms.elapsed, 3.5);
    assert_eq!(uniforms.view_projection, view_projection.to_cols_array_2d());
    assert_eq!(bytemuck::bytes_of(&uniforms).len(), 96);
}
