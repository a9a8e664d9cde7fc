//! Optimizer
//!
//! The per-frame entry point. One [`Optimizer`] owns the quality
//! configuration, the metrics history and every side-table the governor
//! keeps about the scene (LOD groups, instance batches).
//!
//! # Frame pass
//!
//! [`Optimizer::optimize`] runs, in order:
//!
//! 1. drain queued [`QualityCommand`]s into the configuration
//! 2. refresh world matrices and sample frame metrics
//! 3. frustum culling
//! 4. LOD selection
//! 5. automatic instancing
//!
//! The quality controller runs separately: inline via
//! [`poll_controller`](Optimizer::poll_controller), or on a thread via
//! [`spawn_controller_service`](Optimizer::spawn_controller_service).
//! Either way it only enqueues commands.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut optimizer = Optimizer::new(OptimizerSettings::default(), DeviceCapabilities::detect(2.0))?;
//! optimizer.create_lod(&mut scene, tree, &[0.0, 50.0, 100.0])?;
//!
//! loop {
//!     let info = RenderInfo::from_scene(&scene);
//!     optimizer.optimize(&mut scene, &camera, Some(&info));
//!     optimizer.poll_controller(Instant::now());
//!     // render with optimizer.config() ...
//! }
//! ```

use std::sync::Arc;

use flume::{Receiver, Sender};

use crate::culling::{CullStats, FrustumCuller};
use crate::errors::{GovernorError, Result};
use crate::instancing::InstancingBatcher;
use crate::lod::{LodGroupHandle, LodManager};
use crate::metrics::{MetricsCollector, MetricsHistory, MetricsSnapshot, RendererInfo};
use crate::quality::{
    AdaptiveQualityController, ControllerFeed, ControllerService, ControllerTicker, ControllerTuning,
    DeviceCapabilities, QualityCommand, QualityConfig, QualityPatch, TickOutcome,
};
use crate::resources::{Geometry, Material};
use crate::scene::{Camera, NodeHandle, Scene};
use crate::settings::OptimizerSettings;
use crate::utils::time::Instant;

/// What one [`Optimizer::optimize`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub metrics: MetricsSnapshot,
    pub cull: CullStats,
    pub commands_applied: usize,
    pub lod_switches: usize,
    pub batches_created: usize,
}

pub struct Optimizer {
    settings: OptimizerSettings,
    caps: DeviceCapabilities,
    config: QualityConfig,

    commands_tx: Sender<QualityCommand>,
    commands_rx: Receiver<QualityCommand>,

    metrics: MetricsCollector,
    culler: FrustumCuller,
    lod: LodManager,
    batcher: InstancingBatcher,

    controller: AdaptiveQualityController,
    ticker: ControllerTicker,
    service: Option<ControllerService>,

    disposed: bool,
}

impl Optimizer {
    /// Creates an optimizer seeded from the device's capabilities.
    pub fn new(settings: OptimizerSettings, caps: DeviceCapabilities) -> Result<Self> {
        settings.validate()?;

        let (commands_tx, commands_rx) = flume::unbounded();
        let controller = AdaptiveQualityController::new(
            ControllerTuning::from(&settings),
            caps,
            commands_tx.clone(),
        );
        let config = caps.initial_config();

        log::info!(
            "Optimizer: target {} fps, pixel ratio {} (ceiling {}), shadows {}",
            settings.target_fps,
            config.pixel_ratio,
            caps.pixel_ratio_ceiling(),
            config.shadows_enabled
        );

        Ok(Self {
            metrics: MetricsCollector::new(settings.history_capacity),
            culler: FrustumCuller::new(),
            lod: LodManager::new(),
            batcher: InstancingBatcher::new(settings.instancing_threshold, caps.supports_instancing),
            ticker: ControllerTicker::new(settings.controller_interval()),
            controller,
            service: None,
            commands_tx,
            commands_rx,
            config,
            caps,
            settings,
            disposed: false,
        })
    }

    // ========================================================================
    // Frame pass
    // ========================================================================

    /// Runs one frame's pass against the wall clock.
    ///
    /// Returns `None` once the optimizer has been disposed.
    pub fn optimize(
        &mut self,
        scene: &mut Scene,
        camera: &Camera,
        renderer: Option<&dyn RendererInfo>,
    ) -> Option<FrameReport> {
        self.optimize_at(Instant::now(), scene, camera, renderer)
    }

    /// Runs one frame's pass for a frame ending at `now`.
    pub fn optimize_at(
        &mut self,
        now: Instant,
        scene: &mut Scene,
        camera: &Camera,
        renderer: Option<&dyn RendererInfo>,
    ) -> Option<FrameReport> {
        if self.disposed {
            return None;
        }

        let commands_applied = self.apply_pending_commands();

        scene.update_matrix_world();
        let metrics = self.metrics.sample_at(now, renderer);
        let cull = self.culler.cull(scene, camera);
        let lod_switches = self
            .lod
            .update(scene, camera.position(), self.config.lod_distance_multiplier);
        let batches_created = if self.settings.auto_instancing {
            self.batcher.maintain(scene, &self.lod)
        } else {
            0
        };

        if let Some(service) = &self.service {
            service.feed(ControllerFeed {
                average_fps: self.metrics.history().average_fps(),
                config: self.config,
            });
        }

        Some(FrameReport {
            metrics,
            cull,
            commands_applied,
            lod_switches,
            batches_created,
        })
    }

    /// Applies every queued command. Returns how many changed the config.
    pub fn apply_pending_commands(&mut self) -> usize {
        let mut changed = 0;
        for command in self.commands_rx.try_iter() {
            if self.config.apply(&command, &self.caps) {
                log::debug!("Quality command applied: {command:?}");
                changed += 1;
            }
        }
        changed
    }

    // ========================================================================
    // Quality controller
    // ========================================================================

    /// Runs one controller tick now, regardless of schedule.
    ///
    /// The resulting command is applied at the next frame start.
    pub fn tick_controller(&self) -> TickOutcome {
        if self.disposed {
            return TickOutcome::Idle;
        }
        self.controller.tick(self.metrics.history(), &self.config)
    }

    /// Ticks the controller if its interval has elapsed at `now`.
    ///
    /// Does nothing while a [`ControllerService`] is running or after
    /// disposal.
    pub fn poll_controller(&mut self, now: Instant) -> Option<TickOutcome> {
        if self.disposed || self.service.is_some() {
            return None;
        }
        self.ticker.poll(now).then(|| self.tick_controller())
    }

    /// Moves the controller onto a background thread.
    pub fn spawn_controller_service(&mut self) -> Result<()> {
        if self.service.is_some() {
            return Err(GovernorError::ServiceRunning);
        }
        let service = ControllerService::spawn(self.controller.clone(), self.settings.controller_interval())?;
        self.service = Some(service);
        Ok(())
    }

    /// Stops the background controller, if any. Inline polling resumes.
    pub fn stop_controller_service(&mut self) {
        if let Some(mut service) = self.service.take() {
            service.stop();
            self.ticker.reset();
        }
    }

    #[must_use]
    pub fn controller_service_running(&self) -> bool {
        self.service.as_ref().is_some_and(ControllerService::is_running)
    }

    /// Sender for external command producers. Commands are applied at frame
    /// start.
    #[must_use]
    pub fn command_sender(&self) -> Sender<QualityCommand> {
        self.commands_tx.clone()
    }

    // ========================================================================
    // Construction-time operations
    // ========================================================================

    /// Builds an LOD group for a mesh node.
    pub fn create_lod(&mut self, scene: &mut Scene, node: NodeHandle, distances: &[f32]) -> Result<LodGroupHandle> {
        self.lod.create_lod(scene, node, distances)
    }

    /// Creates an explicit instanced proxy of `count` identity transforms.
    pub fn create_instanced_mesh(
        &mut self,
        scene: &mut Scene,
        geometry: Arc<Geometry>,
        material: Arc<Material>,
        count: usize,
        id: &str,
    ) -> Result<NodeHandle> {
        self.batcher
            .create_instanced_mesh(scene, geometry, material, count, id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Most recent frame snapshot.
    #[must_use]
    pub fn metrics(&self) -> Option<&MetricsSnapshot> {
        self.metrics.latest()
    }

    #[must_use]
    pub fn metrics_history(&self) -> &MetricsHistory {
        self.metrics.history()
    }

    #[must_use]
    pub fn config(&self) -> QualityConfig {
        self.config
    }

    /// Applies a partial configuration change.
    ///
    /// The patch goes through the command queue behind anything already
    /// queued, and the queue is drained immediately.
    pub fn update_config(&mut self, patch: QualityPatch) -> QualityConfig {
        if !patch.is_empty() && self.commands_tx.send(QualityCommand::Patch(patch)).is_ok() {
            self.apply_pending_commands();
        }
        self.config
    }

    #[must_use]
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    #[must_use]
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    #[must_use]
    pub fn lod(&self) -> &LodManager {
        &self.lod
    }

    #[must_use]
    pub fn batcher(&self) -> &InstancingBatcher {
        &self.batcher
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Releases everything the optimizer holds about `scene`.
    ///
    /// LOD groups put their original node back and remove generated levels.
    /// Instanced proxies stay in the scene; only the batch records are
    /// dropped. Any controller thread is stopped. Every later `optimize`
    /// call returns `None`.
    pub fn dispose(&mut self, scene: &mut Scene) {
        if self.disposed {
            return;
        }
        self.stop_controller_service();
        self.lod.release_all(scene);
        self.batcher.clear();
        self.metrics.clear();
        self.ticker.reset();
        let _ = self.commands_rx.drain();
        self.disposed = true;
        log::info!("Optimizer disposed");
    }
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("config", &self.config)
            .field("lod_groups", &self.lod.len())
            .field("batches", &self.batcher.len())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}
