//! Headless governor simulation.
//!
//! Builds a scene that is too heavy for its frame budget, then drives the
//! optimizer with a synthetic clock whose frame cost follows the submitted
//! work. Watch the log: the batcher collapses the crate field, LOD kicks in
//! for distant trees, and the quality controller steps pixel ratio, shadows
//! and LOD distance until the frame rate recovers.
//!
//! ```text
//! RUST_LOG=info cargo run -p headless_sim [settings.json]
//! ```

use std::sync::Arc;

use anyhow::Context;
use glam::{Vec3, Vec4};

use myth_governor::metrics::RenderInfo;
use myth_governor::particles::{ParticleEmitterSettings, ParticleSystem};
use myth_governor::quality::{DeviceCapabilities, QualityConfig};
use myth_governor::resources::{Geometry, Image, Material, Mesh, TextureAtlas};
use myth_governor::scene::{Camera, Scene};
use myth_governor::utils::Timer;
use myth_governor::utils::time::{Duration, Instant};
use myth_governor::{Optimizer, OptimizerSettings};

const FRAMES: u64 = 900;
const REPORT_EVERY: u64 = 60;

/// Pretend GPU: frame time grows with submitted work and resolution.
fn simulated_frame_time(info: &RenderInfo, config: &QualityConfig, particles: usize) -> Duration {
    let fill = config.pixel_ratio * config.pixel_ratio;
    let mut ms = 2.0
        + f64::from(info.draw_calls) * 0.04
        + info.triangles as f64 * 2e-5 * f64::from(fill)
        + particles as f64 * 1e-4 * f64::from(fill);
    if config.shadows_enabled {
        ms += 6.0;
    }
    if config.antialiasing {
        ms += 1.0;
    }
    Duration::from_secs_f64(ms / 1000.0)
}

fn load_settings() -> anyhow::Result<OptimizerSettings> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            Ok(OptimizerSettings::from_json_str(&json)?)
        }
        None => Ok(OptimizerSettings::default()),
    }
}

fn build_crate_material() -> anyhow::Result<Material> {
    let mut atlas = TextureAtlas::new("crate-atlas", 256, 256);
    for (i, check) in [4, 8, 16, 32].into_iter().enumerate() {
        let region = atlas.insert(&Image::checkerboard(format!("crate-{i}"), 96, 96, check))?;
        log::debug!("Atlas region {i}: {region:?}");
    }
    Ok(Material::new("crate-mat", Vec4::ONE).with_map(atlas.build_texture()))
}

fn build_scene(optimizer: &mut Optimizer) -> anyhow::Result<Scene> {
    let mut scene = Scene::new();

    let crate_mesh = Mesh::new(
        Arc::new(Geometry::new_box("crate", 1.0, 1.0, 1.0)),
        Arc::new(build_crate_material()?),
    );
    for x in -10..10 {
        for z in 0..10 {
            let node = scene.add_mesh("crate", crate_mesh.clone());
            if let Some(node) = scene.get_node_mut(node) {
                node.transform.position = Vec3::new(x as f32 * 2.0, 0.0, -5.0 - z as f32 * 2.0);
            }
        }
    }

    let tree_mesh = Mesh::new(
        Arc::new(Geometry::new_sphere("tree", 3.0)),
        Arc::new(Material::new("leaves", Vec4::new(0.2, 0.6, 0.2, 1.0))),
    );
    for i in 0..8 {
        let tree = scene.add_mesh("tree", tree_mesh.clone());
        if let Some(node) = scene.get_node_mut(tree) {
            node.transform.position = Vec3::new(i as f32 * 12.0 - 42.0, 0.0, -60.0 - i as f32 * 15.0);
        }
        optimizer.create_lod(&mut scene, tree, &[0.0, 40.0, 80.0, 140.0])?;
    }

    Ok(scene)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = load_settings()?;
    let mut optimizer = Optimizer::new(settings, DeviceCapabilities::detect(2.0))?;
    let mut scene = build_scene(&mut optimizer)?;

    let mut particles = ParticleSystem::new(&ParticleEmitterSettings {
        count: 20_000,
        origin: [0.0, 2.0, -20.0],
        spread: 4.0,
        ..Default::default()
    });

    let mut camera = Camera::new_perspective(60.0, 16.0 / 9.0, 0.1, 500.0);
    let mut now = Instant::now();
    let mut timer = Timer::starting_at(now);

    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.002;
        let eye = Vec3::new(angle.sin() * 10.0, 6.0, 10.0 + angle.cos() * 5.0);
        camera.look_at(eye, Vec3::new(0.0, 0.0, -40.0), Vec3::Y);

        let info = RenderInfo::from_scene(&scene);
        now += simulated_frame_time(&info, &optimizer.config(), particles.count());
        timer.tick_at(now);
        particles.advance(timer.dt_seconds());

        let Some(report) = optimizer.optimize_at(now, &mut scene, &camera, Some(&info)) else {
            break;
        };
        optimizer.poll_controller(now);

        if report.batches_created > 0 || report.lod_switches > 0 {
            log::debug!(
                "frame {frame}: {} batch(es) created, {} LOD switch(es)",
                report.batches_created,
                report.lod_switches
            );
        }
        if frame % REPORT_EVERY == 0 {
            log::info!(
                "frame {frame}: {} | {:?}",
                serde_json::to_string(&report.metrics)?,
                optimizer.config()
            );
        }
    }

    let history = optimizer.metrics_history();
    log::info!(
        "Finished {} frames in {:.1}s simulated: avg {:.1} fps (min {:.1}, max {:.1}), particles at t={:.2}s",
        timer.frame_count,
        timer.elapsed.as_secs_f32(),
        history.average_fps().unwrap_or_default(),
        history.min_fps().unwrap_or_default(),
        history.max_fps().unwrap_or_default(),
        particles.elapsed()
    );
    log::info!("Final quality: {:?}", optimizer.config());

    optimizer.dispose(&mut scene);
    Ok(())
}
