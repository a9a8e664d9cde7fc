//! Adaptive Quality Tests
//!
//! Tests for:
//! - Degrade / restore ordering of the quality controller
//! - Configuration bounds under arbitrary frame-rate sequences
//! - Command queue semantics (frame-start application, external producers)
//! - Controller scheduling, inline and on the service thread

use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use myth_governor::quality::{
    AdaptiveQualityController, ControllerTicker, ControllerTuning, DeviceCapabilities, LOD_MULTIPLIER_FLOOR,
    MIN_PIXEL_RATIO, QualityCommand, QualityConfig, QualityStep, TickOutcome,
};
use myth_governor::scene::{Camera, Scene};
use myth_governor::{GovernorError, Optimizer, OptimizerSettings};

const LOW_FRAME: Duration = Duration::from_millis(40); // 25 fps
const HIGH_FRAME: Duration = Duration::from_millis(10); // 100 fps

fn desktop() -> DeviceCapabilities {
    DeviceCapabilities {
        max_pixel_ratio: 2.0,
        cpu_cores: 8,
        supports_instancing: true,
    }
}

fn small_history() -> OptimizerSettings {
    OptimizerSettings {
        history_capacity: 5,
        ..Default::default()
    }
}

/// Drives an optimizer with a synthetic clock.
struct Harness {
    optimizer: Optimizer,
    scene: Scene,
    camera: Camera,
    now: Instant,
}

impl Harness {
    fn new(settings: OptimizerSettings, caps: DeviceCapabilities) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            optimizer: Optimizer::new(settings, caps).unwrap(),
            scene: Scene::new(),
            camera: Camera::new_perspective(60.0, 1.0, 0.1, 100.0),
            now: Instant::now(),
        }
    }

    fn frames(&mut self, count: usize, frame_time: Duration) {
        for _ in 0..count {
            self.now += frame_time;
            self.optimizer
                .optimize_at(self.now, &mut self.scene, &self.camera, None)
                .unwrap();
        }
    }

    /// Fills the history at `frame_time`, ticks, and applies the result.
    fn step(&mut self, frame_time: Duration) -> TickOutcome {
        self.frames(5, frame_time);
        let outcome = self.optimizer.tick_controller();
        self.frames(1, frame_time);
        outcome
    }
}

// ============================================================================
// Controller Decisions
// ============================================================================

#[test]
fn degrades_pixel_ratio_then_shadows_then_lod() {
    let mut h = Harness::new(small_history(), desktop());
    assert_eq!(h.optimizer.config().pixel_ratio, 2.0);

    for expected in [1.75, 1.5, 1.25, 1.0] {
        assert_eq!(h.step(LOW_FRAME), TickOutcome::Degraded(QualityStep::PixelRatio));
        assert!((h.optimizer.config().pixel_ratio - expected).abs() < 1e-5);
    }

    assert_eq!(h.step(LOW_FRAME), TickOutcome::Degraded(QualityStep::Shadows));
    assert!(!h.optimizer.config().shadows_enabled);

    assert_eq!(h.step(LOW_FRAME), TickOutcome::Degraded(QualityStep::LodDistance));
    assert!((h.optimizer.config().lod_distance_multiplier - 0.8).abs() < 1e-5);
}

#[test]
fn bottoms_out_at_limits() {
    let mut h = Harness::new(small_history(), desktop());
    let mut outcome = TickOutcome::Idle;
    for _ in 0..30 {
        outcome = h.step(LOW_FRAME);
    }

    let config = h.optimizer.config();
    assert_eq!(outcome, TickOutcome::AtLimit);
    assert_eq!(config.pixel_ratio, MIN_PIXEL_RATIO);
    assert!(!config.shadows_enabled);
    assert_eq!(config.lod_distance_multiplier, LOD_MULTIPLIER_FLOOR);
}

#[test]
fn restores_in_reverse_order() {
    let mut h = Harness::new(small_history(), desktop());
    for _ in 0..6 {
        h.step(LOW_FRAME);
    }
    let degraded = h.optimizer.config();
    assert!(!degraded.shadows_enabled);
    assert!(degraded.lod_distance_multiplier < 1.0);

    assert_eq!(h.step(HIGH_FRAME), TickOutcome::Restored(QualityStep::LodDistance));
    assert!((h.optimizer.config().lod_distance_multiplier - 1.0).abs() < 1e-5);

    assert_eq!(h.step(HIGH_FRAME), TickOutcome::Restored(QualityStep::Shadows));
    assert!(h.optimizer.config().shadows_enabled);

    assert_eq!(h.step(HIGH_FRAME), TickOutcome::Restored(QualityStep::PixelRatio));
    assert!((h.optimizer.config().pixel_ratio - 1.25).abs() < 1e-5);

    for _ in 0..3 {
        h.step(HIGH_FRAME);
    }
    assert_eq!(h.step(HIGH_FRAME), TickOutcome::AtLimit);
    assert_eq!(h.optimizer.config(), desktop().initial_config());
}

#[test]
fn holds_inside_comfort_band() {
    let mut h = Harness::new(small_history(), desktop());
    // 55 fps: above 48 (0.8 × 60), below 57 (0.95 × 60).
    let frame = Duration::from_secs_f64(1.0 / 55.0);
    assert_eq!(h.step(frame), TickOutcome::Hold);
    assert_eq!(h.optimizer.config(), desktop().initial_config());
}

#[test]
fn idle_without_metrics() {
    let optimizer = Optimizer::new(OptimizerSettings::default(), desktop()).unwrap();
    assert_eq!(optimizer.tick_controller(), TickOutcome::Idle);
}

#[test]
fn low_end_device_never_reenables_shadows() {
    let caps = DeviceCapabilities {
        max_pixel_ratio: 1.0,
        cpu_cores: 2,
        supports_instancing: true,
    };
    let mut h = Harness::new(small_history(), caps);
    assert!(!h.optimizer.config().shadows_enabled);
    assert!(!h.optimizer.config().antialiasing);

    assert_eq!(h.step(LOW_FRAME), TickOutcome::Degraded(QualityStep::LodDistance));
    assert_eq!(h.step(HIGH_FRAME), TickOutcome::Restored(QualityStep::LodDistance));
    assert_eq!(h.step(HIGH_FRAME), TickOutcome::AtLimit);
    assert!(!h.optimizer.config().shadows_enabled);
}

#[test]
fn random_sequences_stay_in_bounds() {
    let caps = desktop();
    let (tx, rx) = flume::unbounded();
    let controller = AdaptiveQualityController::new(ControllerTuning::default(), caps, tx);
    let mut config = caps.initial_config();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..2000 {
        let fps: f32 = rng.random_range(5.0..120.0);
        controller.tick_with(Some(fps), &config);
        for command in rx.try_iter() {
            config.apply(&command, &caps);
        }

        assert!(config.pixel_ratio >= MIN_PIXEL_RATIO && config.pixel_ratio <= caps.pixel_ratio_ceiling());
        assert!(
            config.lod_distance_multiplier >= LOD_MULTIPLIER_FLOOR && config.lod_distance_multiplier <= 1.0,
            "Multiplier out of range: {}",
            config.lod_distance_multiplier
        );
    }
}

#[test]
fn commands_are_clamped() {
    let caps = desktop();
    let mut config = QualityConfig::default();

    assert!(config.apply(&QualityCommand::SetPixelRatio(8.0), &caps));
    assert_eq!(config.pixel_ratio, 2.0);
    config.apply(&QualityCommand::SetPixelRatio(0.1), &caps);
    assert_eq!(config.pixel_ratio, MIN_PIXEL_RATIO);
    config.apply(&QualityCommand::SetLodDistanceMultiplier(0.01), &caps);
    assert_eq!(config.lod_distance_multiplier, LOD_MULTIPLIER_FLOOR);

    assert!(!config.apply(&QualityCommand::SetPixelRatio(f32::NAN), &caps));
    assert_eq!(config.pixel_ratio, MIN_PIXEL_RATIO);
}

// ============================================================================
// Command Queue
// ============================================================================

#[test]
fn tick_takes_effect_at_next_frame() {
    let mut h = Harness::new(small_history(), desktop());
    h.frames(5, LOW_FRAME);

    h.optimizer.tick_controller();
    assert_eq!(h.optimizer.config().pixel_ratio, 2.0, "Not applied until frame start");

    h.now += LOW_FRAME;
    let report = h
        .optimizer
        .optimize_at(h.now, &mut h.scene, &h.camera, None)
        .unwrap();
    assert_eq!(report.commands_applied, 1);
    assert_eq!(h.optimizer.config().pixel_ratio, 1.75);
}

#[test]
fn external_producer_sends_commands() {
    let mut h = Harness::new(small_history(), desktop());
    let sender = h.optimizer.command_sender();

    thread::spawn(move || {
        sender.send(QualityCommand::SetShadows(false)).unwrap();
        sender.send(QualityCommand::SetAntialiasing(false)).unwrap();
    })
    .join()
    .unwrap();

    h.frames(1, HIGH_FRAME);
    let config = h.optimizer.config();
    assert!(!config.shadows_enabled);
    assert!(!config.antialiasing);
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn ticker_fires_once_per_interval() {
    let start = Instant::now();
    let mut ticker = ControllerTicker::new(Duration::from_secs(1));

    assert!(!ticker.poll(start), "First poll arms the timer");
    assert!(!ticker.poll(start + Duration::from_millis(999)));
    assert!(ticker.poll(start + Duration::from_millis(1000)));
    assert!(!ticker.poll(start + Duration::from_millis(1500)));
    assert!(ticker.poll(start + Duration::from_millis(2000)));

    // A long stall yields a single tick, not a burst.
    assert!(ticker.poll(start + Duration::from_secs(10)));
    assert!(!ticker.poll(start + Duration::from_millis(10_500)));
    assert!(ticker.poll(start + Duration::from_secs(11)));
}

#[test]
fn poll_controller_follows_interval() {
    let mut h = Harness::new(small_history(), desktop());
    h.frames(5, LOW_FRAME);

    let start = h.now;
    assert_eq!(h.optimizer.poll_controller(start), None);
    assert_eq!(h.optimizer.poll_controller(start + Duration::from_millis(500)), None);
    assert_eq!(
        h.optimizer.poll_controller(start + Duration::from_secs(1)),
        Some(TickOutcome::Degraded(QualityStep::PixelRatio))
    );
}

#[test]
fn controller_service_degrades_in_background() {
    let settings = OptimizerSettings {
        history_capacity: 5,
        controller_interval_ms: 5,
        ..Default::default()
    };
    let mut h = Harness::new(settings, desktop());
    h.optimizer.spawn_controller_service().unwrap();
    assert!(h.optimizer.controller_service_running());
    assert!(matches!(
        h.optimizer.spawn_controller_service(),
        Err(GovernorError::ServiceRunning)
    ));
    assert_eq!(h.optimizer.poll_controller(h.now + Duration::from_secs(5)), None);

    let deadline = Instant::now() + Duration::from_secs(5);
    while h.optimizer.config().pixel_ratio >= 2.0 && Instant::now() < deadline {
        h.frames(1, LOW_FRAME);
        thread::sleep(Duration::from_millis(2));
    }
    assert!(h.optimizer.config().pixel_ratio < 2.0, "Service never degraded quality");

    h.optimizer.stop_controller_service();
    assert!(!h.optimizer.controller_service_running());
}
