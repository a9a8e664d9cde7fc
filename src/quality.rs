//! Adaptive Quality
//!
//! A feedback loop between measured frame rate and rendering settings.
//!
//! # Command queue
//!
//! The controller never writes the [`QualityConfig`]. Each tick it reads a
//! snapshot and, when a change is due, sends one absolute-valued
//! [`QualityCommand`] into a `flume` channel. The optimizer drains that
//! channel at the start of every frame, so the configuration has exactly
//! one writer whether the controller runs inline ([`ControllerTicker`]) or
//! on its own thread ([`ControllerService`]). Commands carry target values
//! rather than deltas; applying one twice is the same as applying it once.
//!
//! # Steps
//!
//! Degrade (average fps below `target × 0.8`), one notch per tick:
//! 1. pixel ratio −0.25, floor 1.0
//! 2. shadows off
//! 3. LOD distance multiplier ×0.8, floor [`LOD_MULTIPLIER_FLOOR`]
//!
//! Restore (average fps above `target × 0.95`) walks the same list
//! backwards. Shadows only come back if the device baseline had them, and
//! pixel ratio never exceeds the device ceiling.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::errors::{GovernorError, Result};
use crate::metrics::MetricsHistory;
use crate::settings::OptimizerSettings;
use crate::utils::time::{Duration, Instant};

/// Lowest pixel ratio the controller will set.
pub const MIN_PIXEL_RATIO: f32 = 1.0;
/// Lowest LOD distance multiplier the controller will set.
pub const LOD_MULTIPLIER_FLOOR: f32 = 0.2;
/// Highest pixel ratio chosen for the initial configuration.
pub const DEFAULT_PIXEL_RATIO_CAP: f32 = 2.0;

const EPSILON: f32 = 1e-4;

// ============================================================================
// Device capabilities
// ============================================================================

/// What the device reported at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Highest usable pixel ratio (e.g. the display's device pixel ratio).
    pub max_pixel_ratio: f32,
    pub cpu_cores: usize,
    pub supports_instancing: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_pixel_ratio: 1.0,
            cpu_cores: 4,
            supports_instancing: true,
        }
    }
}

impl DeviceCapabilities {
    /// Probes the core count; the pixel-ratio ceiling comes from the host.
    #[must_use]
    pub fn detect(max_pixel_ratio: f32) -> Self {
        let cpu_cores = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            max_pixel_ratio,
            cpu_cores,
            supports_instancing: true,
        }
    }

    /// Pixel-ratio ceiling, never below [`MIN_PIXEL_RATIO`].
    #[inline]
    #[must_use]
    pub fn pixel_ratio_ceiling(&self) -> f32 {
        if self.max_pixel_ratio.is_finite() {
            self.max_pixel_ratio.max(MIN_PIXEL_RATIO)
        } else {
            MIN_PIXEL_RATIO
        }
    }

    /// Low-end devices start without shadows and never get them back.
    #[inline]
    #[must_use]
    pub fn shadows_allowed(&self) -> bool {
        self.cpu_cores > 2
    }

    /// Starting configuration for this device.
    #[must_use]
    pub fn initial_config(&self) -> QualityConfig {
        let low_end = self.cpu_cores <= 2;
        QualityConfig {
            pixel_ratio: self.pixel_ratio_ceiling().min(DEFAULT_PIXEL_RATIO_CAP),
            shadows_enabled: self.shadows_allowed(),
            antialiasing: !low_end,
            lod_distance_multiplier: 1.0,
        }
    }
}

// ============================================================================
// Configuration & commands
// ============================================================================

/// Rendering settings the rest of the governor and the host read each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    pub pixel_ratio: f32,
    pub shadows_enabled: bool,
    pub antialiasing: bool,
    pub lod_distance_multiplier: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: MIN_PIXEL_RATIO,
            shadows_enabled: true,
            antialiasing: true,
            lod_distance_multiplier: 1.0,
        }
    }
}

/// A partial update; `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPatch {
    pub pixel_ratio: Option<f32>,
    pub shadows_enabled: Option<bool>,
    pub antialiasing: Option<bool>,
    pub lod_distance_multiplier: Option<f32>,
}

impl QualityPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An absolute change to the [`QualityConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityCommand {
    SetPixelRatio(f32),
    SetShadows(bool),
    SetAntialiasing(bool),
    SetLodDistanceMultiplier(f32),
    Patch(QualityPatch),
}

impl QualityConfig {
    /// Applies a command, clamping values into their valid ranges.
    ///
    /// Non-finite values are ignored. Returns whether anything changed.
    pub fn apply(&mut self, command: &QualityCommand, caps: &DeviceCapabilities) -> bool {
        let before = *self;
        match *command {
            QualityCommand::SetPixelRatio(ratio) => self.set_pixel_ratio(ratio, caps),
            QualityCommand::SetShadows(enabled) => self.shadows_enabled = enabled,
            QualityCommand::SetAntialiasing(enabled) => self.antialiasing = enabled,
            QualityCommand::SetLodDistanceMultiplier(m) => self.set_lod_multiplier(m),
            QualityCommand::Patch(patch) => {
                if let Some(ratio) = patch.pixel_ratio {
                    self.set_pixel_ratio(ratio, caps);
                }
                if let Some(enabled) = patch.shadows_enabled {
                    self.shadows_enabled = enabled;
                }
                if let Some(enabled) = patch.antialiasing {
                    self.antialiasing = enabled;
                }
                if let Some(m) = patch.lod_distance_multiplier {
                    self.set_lod_multiplier(m);
                }
            }
        }
        *self != before
    }

    fn set_pixel_ratio(&mut self, ratio: f32, caps: &DeviceCapabilities) {
        if ratio.is_finite() {
            self.pixel_ratio = ratio.clamp(MIN_PIXEL_RATIO, caps.pixel_ratio_ceiling());
        }
    }

    fn set_lod_multiplier(&mut self, multiplier: f32) {
        if multiplier.is_finite() {
            self.lod_distance_multiplier = multiplier.clamp(LOD_MULTIPLIER_FLOOR, 1.0);
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Which knob a controller step turned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityStep {
    PixelRatio,
    Shadows,
    LodDistance,
}

impl fmt::Display for QualityStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PixelRatio => f.write_str("pixel ratio"),
            Self::Shadows => f.write_str("shadows"),
            Self::LodDistance => f.write_str("LOD distance"),
        }
    }
}

/// Result of one controller tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No metrics yet.
    Idle,
    /// Frame rate inside the comfort band.
    Hold,
    Degraded(QualityStep),
    Restored(QualityStep),
    /// A change was wanted but every knob is at its bound.
    AtLimit,
}

/// Thresholds and step sizes for the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerTuning {
    pub target_fps: f32,
    pub degrade_ratio: f32,
    pub restore_ratio: f32,
    pub pixel_ratio_step: f32,
    pub lod_shrink_factor: f32,
}

impl Default for ControllerTuning {
    fn default() -> Self {
        Self::from(&OptimizerSettings::default())
    }
}

impl From<&OptimizerSettings> for ControllerTuning {
    fn from(settings: &OptimizerSettings) -> Self {
        Self {
            target_fps: settings.target_fps,
            degrade_ratio: settings.degrade_ratio,
            restore_ratio: settings.restore_ratio,
            pixel_ratio_step: settings.pixel_ratio_step,
            lod_shrink_factor: settings.lod_shrink_factor,
        }
    }
}

/// Decides quality changes from average fps and sends them as commands.
#[derive(Debug, Clone)]
pub struct AdaptiveQualityController {
    tuning: ControllerTuning,
    caps: DeviceCapabilities,
    commands: Sender<QualityCommand>,
}

impl AdaptiveQualityController {
    #[must_use]
    pub fn new(tuning: ControllerTuning, caps: DeviceCapabilities, commands: Sender<QualityCommand>) -> Self {
        Self {
            tuning,
            caps,
            commands,
        }
    }

    #[must_use]
    pub fn tuning(&self) -> &ControllerTuning {
        &self.tuning
    }

    /// Pure decision for one tick: what to do given `average_fps`.
    #[must_use]
    pub fn decide(&self, average_fps: Option<f32>, config: &QualityConfig) -> (TickOutcome, Option<QualityCommand>) {
        let Some(fps) = average_fps.filter(|f| f.is_finite()) else {
            return (TickOutcome::Idle, None);
        };
        let t = &self.tuning;

        if fps < t.target_fps * t.degrade_ratio {
            self.degrade(config)
        } else if fps > t.target_fps * t.restore_ratio {
            self.restore(config)
        } else {
            (TickOutcome::Hold, None)
        }
    }

    fn degrade(&self, config: &QualityConfig) -> (TickOutcome, Option<QualityCommand>) {
        if config.pixel_ratio > MIN_PIXEL_RATIO + EPSILON {
            let ratio = (config.pixel_ratio - self.tuning.pixel_ratio_step).max(MIN_PIXEL_RATIO);
            return (
                TickOutcome::Degraded(QualityStep::PixelRatio),
                Some(QualityCommand::SetPixelRatio(ratio)),
            );
        }
        if config.shadows_enabled {
            return (
                TickOutcome::Degraded(QualityStep::Shadows),
                Some(QualityCommand::SetShadows(false)),
            );
        }
        if config.lod_distance_multiplier > LOD_MULTIPLIER_FLOOR + EPSILON {
            let m = (config.lod_distance_multiplier * self.tuning.lod_shrink_factor).max(LOD_MULTIPLIER_FLOOR);
            return (
                TickOutcome::Degraded(QualityStep::LodDistance),
                Some(QualityCommand::SetLodDistanceMultiplier(m)),
            );
        }
        (TickOutcome::AtLimit, None)
    }

    fn restore(&self, config: &QualityConfig) -> (TickOutcome, Option<QualityCommand>) {
        if config.lod_distance_multiplier < 1.0 - EPSILON {
            let m = (config.lod_distance_multiplier / self.tuning.lod_shrink_factor).min(1.0);
            return (
                TickOutcome::Restored(QualityStep::LodDistance),
                Some(QualityCommand::SetLodDistanceMultiplier(m)),
            );
        }
        if !config.shadows_enabled && self.caps.shadows_allowed() {
            return (
                TickOutcome::Restored(QualityStep::Shadows),
                Some(QualityCommand::SetShadows(true)),
            );
        }
        let ceiling = self.caps.pixel_ratio_ceiling();
        if config.pixel_ratio < ceiling - EPSILON {
            let ratio = (config.pixel_ratio + self.tuning.pixel_ratio_step).min(ceiling);
            return (
                TickOutcome::Restored(QualityStep::PixelRatio),
                Some(QualityCommand::SetPixelRatio(ratio)),
            );
        }
        (TickOutcome::AtLimit, None)
    }

    /// Runs one tick against a history and enqueues the resulting command.
    pub fn tick(&self, history: &MetricsHistory, config: &QualityConfig) -> TickOutcome {
        self.tick_with(history.average_fps(), config)
    }

    /// Like [`tick`](Self::tick), from a precomputed average.
    pub fn tick_with(&self, average_fps: Option<f32>, config: &QualityConfig) -> TickOutcome {
        let (outcome, command) = self.decide(average_fps, config);
        if let Some(command) = command {
            if self.commands.send(command).is_err() {
                log::debug!("Quality command dropped: optimizer is gone");
            }
            match outcome {
                TickOutcome::Degraded(step) => {
                    log::info!("Quality degraded ({step}) at {:.1} fps", average_fps.unwrap_or(0.0));
                }
                TickOutcome::Restored(step) => {
                    log::info!("Quality restored ({step}) at {:.1} fps", average_fps.unwrap_or(0.0));
                }
                _ => {}
            }
        }
        outcome
    }
}

// ============================================================================
// Scheduling
// ============================================================================

/// Fixed-interval schedule driven by caller-supplied instants.
///
/// The first tick is due one interval after the first poll. Ticks missed
/// while the host was stalled collapse into one.
#[derive(Debug, Clone)]
pub struct ControllerTicker {
    interval: Duration,
    next_due: Option<Instant>,
}

impl ControllerTicker {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` when a tick is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            self.next_due = Some(now + self.interval);
            return false;
        };
        if now < due {
            return false;
        }
        let next = due + self.interval;
        self.next_due = Some(if next <= now { now + self.interval } else { next });
        true
    }

    pub fn reset(&mut self) {
        self.next_due = None;
    }
}

/// What the render thread tells a [`ControllerService`] each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerFeed {
    pub average_fps: Option<f32>,
    pub config: QualityConfig,
}

/// Runs an [`AdaptiveQualityController`] on a background thread.
///
/// The thread ticks on its own interval, reading the latest
/// [`ControllerFeed`] and writing commands to the same queue the inline
/// controller uses. Stopped by [`stop`](Self::stop) or on drop.
pub struct ControllerService {
    running: Arc<AtomicBool>,
    feed: Option<Sender<ControllerFeed>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ControllerService {
    /// Starts the service thread.
    pub fn spawn(controller: AdaptiveQualityController, interval: Duration) -> Result<Self> {
        let (feed_tx, feed_rx) = flume::bounded(4);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("quality-controller".into())
            .spawn(move || Self::run(&controller, &feed_rx, &thread_running, interval))
            .map_err(GovernorError::ThreadSpawn)?;

        Ok(Self {
            running,
            feed: Some(feed_tx),
            handle: Some(handle),
        })
    }

    fn run(
        controller: &AdaptiveQualityController,
        feed: &Receiver<ControllerFeed>,
        running: &AtomicBool,
        interval: Duration,
    ) {
        log::info!("Quality controller thread started ({} ms)", interval.as_millis());
        let mut latest: Option<ControllerFeed> = None;
        let mut next_tick = Instant::now() + interval;

        while running.load(Ordering::Relaxed) {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            match feed.recv_timeout(timeout) {
                Ok(update) => latest = Some(update),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if Instant::now() >= next_tick {
                next_tick += interval;
                if let Some(update) = latest {
                    controller.tick_with(update.average_fps, &update.config);
                }
            }
        }
        log::info!("Quality controller thread stopped");
    }

    /// Hands the latest measurements to the service. Never blocks; a full
    /// queue drops the update.
    pub fn feed(&self, update: ControllerFeed) {
        if let Some(tx) = &self.feed
            && let Err(TrySendError::Disconnected(_)) = tx.try_send(update)
        {
            log::debug!("Quality controller thread has exited");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed) && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the sender wakes the thread out of its wait.
        self.feed = None;
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Quality controller thread panicked");
        }
    }
}

impl Drop for ControllerService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ControllerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerService")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(max_pixel_ratio: f32, cpu_cores: usize) -> DeviceCapabilities {
        DeviceCapabilities {
            max_pixel_ratio,
            cpu_cores,
            supports_instancing: true,
        }
    }

    fn controller(caps: DeviceCapabilities) -> (AdaptiveQualityController, Receiver<QualityCommand>) {
        let (tx, rx) = flume::unbounded();
        (AdaptiveQualityController::new(ControllerTuning::default(), caps, tx), rx)
    }

    #[test]
    fn initial_config_follows_device() {
        let high = caps(3.0, 8).initial_config();
        assert_eq!(high.pixel_ratio, 2.0);
        assert!(high.shadows_enabled);
        assert!(high.antialiasing);

        let low = caps(0.5, 2).initial_config();
        assert_eq!(low.pixel_ratio, 1.0);
        assert!(!low.shadows_enabled);
        assert!(!low.antialiasing);
    }

    #[test]
    fn degrade_order() {
        let (ctrl, _rx) = controller(caps(2.0, 8));
        let mut config = QualityConfig {
            pixel_ratio: 1.25,
            shadows_enabled: true,
            antialiasing: true,
            lod_distance_multiplier: 1.0,
        };

        let (outcome, cmd) = ctrl.decide(Some(10.0), &config);
        assert_eq!(outcome, TickOutcome::Degraded(QualityStep::PixelRatio));
        assert_eq!(cmd, Some(QualityCommand::SetPixelRatio(1.0)));

        config.pixel_ratio = 1.0;
        let (outcome, _) = ctrl.decide(Some(10.0), &config);
        assert_eq!(outcome, TickOutcome::Degraded(QualityStep::Shadows));

        config.shadows_enabled = false;
        let (outcome, cmd) = ctrl.decide(Some(10.0), &config);
        assert_eq!(outcome, TickOutcome::Degraded(QualityStep::LodDistance));
        assert_eq!(cmd, Some(QualityCommand::SetLodDistanceMultiplier(0.8)));

        config.lod_distance_multiplier = LOD_MULTIPLIER_FLOOR;
        assert_eq!(ctrl.decide(Some(10.0), &config), (TickOutcome::AtLimit, None));
    }

    #[test]
    fn restore_skips_shadows_on_low_end() {
        let (ctrl, _rx) = controller(caps(2.0, 2));
        let config = QualityConfig {
            pixel_ratio: 1.0,
            shadows_enabled: false,
            antialiasing: false,
            lod_distance_multiplier: 1.0,
        };
        let (outcome, cmd) = ctrl.decide(Some(60.0), &config);
        assert_eq!(outcome, TickOutcome::Restored(QualityStep::PixelRatio));
        assert_eq!(cmd, Some(QualityCommand::SetPixelRatio(1.25)));
    }

    #[test]
    fn comfort_band_holds() {
        let (ctrl, rx) = controller(caps(2.0, 8));
        let outcome = ctrl.tick_with(Some(55.0), &QualityConfig::default());
        assert_eq!(outcome, TickOutcome::Hold);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn apply_clamps_and_is_idempotent() {
        let caps = caps(2.0, 8);
        let mut config = QualityConfig::default();

        assert!(config.apply(&QualityCommand::SetPixelRatio(5.0), &caps));
        assert_eq!(config.pixel_ratio, 2.0);
        assert!(!config.apply(&QualityCommand::SetPixelRatio(5.0), &caps));

        config.apply(&QualityCommand::SetLodDistanceMultiplier(0.01), &caps);
        assert_eq!(config.lod_distance_multiplier, LOD_MULTIPLIER_FLOOR);

        assert!(!config.apply(&QualityCommand::SetPixelRatio(f32::NAN), &caps));
    }

    #[test]
    fn ticker_fires_once_per_interval() {
        let start = Instant::now();
        let mut ticker = ControllerTicker::new(Duration::from_millis(1000));

        assert!(!ticker.poll(start));
        assert!(!ticker.poll(start + Duration::from_millis(999)));
        assert!(ticker.poll(start + Duration::from_millis(1000)));
        assert!(!ticker.poll(start + Duration::from_millis(1500)));
        // A long stall yields a single tick.
        assert!(ticker.poll(start + Duration::from_millis(10_000)));
        assert!(!ticker.poll(start + Duration::from_millis(10_500)));
    }
}
