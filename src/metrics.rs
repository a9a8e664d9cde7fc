//! Frame Metrics
//!
//! Per-frame timing plus renderer-reported counters, kept in a bounded
//! rolling history that the quality controller reads.
//!
//! # Overview
//!
//! - [`RendererInfo`]: read-only counters provided by the host renderer
//! - [`RenderInfo`]: plain counter struct, also derivable from a [`Scene`]
//! - [`MetricsSnapshot`]: one frame's measurement
//! - [`MetricsHistory`]: ring buffer of snapshots with rolling statistics
//! - [`MetricsCollector`]: turns wall-clock instants into snapshots
//!
//! The history never grows past its capacity: storage is reserved up front
//! and the oldest sample is overwritten once full.

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::scene::{NodeKind, Scene};
use crate::utils::time::Instant;

// ============================================================================
// Ring buffer
// ============================================================================

/// A fixed-capacity circular buffer.
///
/// Capacity is chosen at runtime; storage is allocated once.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    index: usize,
}

impl<T: Copy> RingBuffer<T> {
    /// Creates an empty buffer. A capacity of zero is bumped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            index: 0,
        }
    }

    /// Pushes a new value, overwriting the oldest if full.
    pub fn push(&mut self, value: T) {
        if self.data.len() < self.capacity {
            self.data.push(value);
        } else {
            self.data[self.index] = value;
        }
        self.index = (self.index + 1) % self.capacity;
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values in chronological order (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let split = if self.data.len() < self.capacity {
            0
        } else {
            self.index
        };
        let (older, newer) = self.data.split_at(split);
        newer.iter().chain(older.iter())
    }

    /// Most recently pushed value.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        if self.data.is_empty() {
            return None;
        }
        let last = (self.index + self.capacity - 1) % self.capacity;
        self.data.get(last)
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.index = 0;
    }
}

// ============================================================================
// Renderer counters
// ============================================================================

/// Counters reported by the host renderer. Read-only.
pub trait RendererInfo {
    fn draw_calls(&self) -> u32;
    fn triangles(&self) -> u64;
    fn geometry_memory_bytes(&self) -> u64;
    fn texture_memory_bytes(&self) -> u64;
}

/// Plain renderer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderInfo {
    pub draw_calls: u32,
    pub triangles: u64,
    pub geometry_memory_bytes: u64,
    pub texture_memory_bytes: u64,
}

impl RenderInfo {
    /// Estimates what a renderer would submit for `scene` right now.
    ///
    /// Every visible attached drawable is one draw call; instanced proxies
    /// contribute `triangles × instance count`. Memory counts each geometry
    /// and image once, however many nodes share it.
    #[must_use]
    pub fn from_scene(scene: &Scene) -> Self {
        let mut info = Self::default();
        let mut seen_geometry: FxHashSet<*const ()> = FxHashSet::default();
        let mut seen_images: FxHashSet<u64> = FxHashSet::default();

        scene.traverse(|_, node| {
            let (mesh, instances) = match &node.kind {
                NodeKind::Mesh(mesh) => (mesh, 1),
                NodeKind::Instanced(instanced) => (instanced.mesh(), instanced.count() as u64),
                NodeKind::Group | NodeKind::Light => return,
            };

            if seen_geometry.insert(std::sync::Arc::as_ptr(&mesh.geometry).cast()) {
                info.geometry_memory_bytes += mesh.geometry.memory_bytes() as u64;
            }
            for texture in mesh.material.textures() {
                if seen_images.insert(texture.image.id()) {
                    info.texture_memory_bytes += texture.memory_bytes() as u64;
                }
            }

            if node.visible {
                info.draw_calls += 1;
                info.triangles += mesh.geometry.triangle_count() as u64 * instances;
            }
        });

        info
    }
}

impl RendererInfo for RenderInfo {
    fn draw_calls(&self) -> u32 {
        self.draw_calls
    }
    fn triangles(&self) -> u64 {
        self.triangles
    }
    fn geometry_memory_bytes(&self) -> u64 {
        self.geometry_memory_bytes
    }
    fn texture_memory_bytes(&self) -> u64 {
        self.texture_memory_bytes
    }
}

// ============================================================================
// Snapshots & history
// ============================================================================

/// One frame's measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub fps: f32,
    pub frame_time_ms: f32,
    pub draw_calls: u32,
    pub triangles: u64,
    pub geometry_memory_bytes: u64,
    pub texture_memory_bytes: u64,
}

/// Default number of retained snapshots (one second at 60 Hz).
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// Rolling window of [`MetricsSnapshot`]s.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    samples: RingBuffer<MetricsSnapshot>,
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl MetricsHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RingBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, snapshot: MetricsSnapshot) {
        self.samples.push(snapshot);
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.samples.latest()
    }

    /// Snapshots from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &MetricsSnapshot> {
        self.samples.iter()
    }

    fn mean_of(&self, f: impl Fn(&MetricsSnapshot) -> f32) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        Some(self.iter().map(f).sum::<f32>() / self.len() as f32)
    }

    /// Rolling average fps, `None` when empty.
    #[must_use]
    pub fn average_fps(&self) -> Option<f32> {
        self.mean_of(|s| s.fps)
    }

    #[must_use]
    pub fn average_frame_time_ms(&self) -> Option<f32> {
        self.mean_of(|s| s.frame_time_ms)
    }

    #[must_use]
    pub fn min_fps(&self) -> Option<f32> {
        self.iter().map(|s| s.fps).reduce(f32::min)
    }

    #[must_use]
    pub fn max_fps(&self) -> Option<f32> {
        self.iter().map(|s| s.fps).reduce(f32::max)
    }

    /// Population variance of frame times. High values indicate stutter.
    #[must_use]
    pub fn frame_time_variance(&self) -> f32 {
        if self.len() < 2 {
            return 0.0;
        }
        let avg = self.average_frame_time_ms().unwrap_or(0.0);
        let sum_sq: f32 = self
            .iter()
            .map(|s| (s.frame_time_ms - avg) * (s.frame_time_ms - avg))
            .sum();
        sum_sq / self.len() as f32
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Samples one [`MetricsSnapshot`] per rendered frame.
#[derive(Debug)]
pub struct MetricsCollector {
    history: MetricsHistory,
    last_sample: Instant,
    last_fps: f32,
}

impl MetricsCollector {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::starting_at(capacity, Instant::now())
    }

    /// Creates a collector whose first frame delta is measured from `start`.
    #[must_use]
    pub fn starting_at(capacity: usize, start: Instant) -> Self {
        Self {
            history: MetricsHistory::new(capacity),
            last_sample: start,
            last_fps: 0.0,
        }
    }

    /// Samples the current frame against the wall clock.
    pub fn sample(&mut self, renderer: Option<&dyn RendererInfo>) -> MetricsSnapshot {
        self.sample_at(Instant::now(), renderer)
    }

    /// Samples a frame that ended at `now`.
    ///
    /// Without a renderer all counters are zero; fps is still computed.
    /// A zero-length delta repeats the previous fps.
    pub fn sample_at(&mut self, now: Instant, renderer: Option<&dyn RendererInfo>) -> MetricsSnapshot {
        let frame_time_ms = now.saturating_duration_since(self.last_sample).as_secs_f64() * 1000.0;
        self.last_sample = now;

        let fps = if frame_time_ms > 0.0 {
            (1000.0 / frame_time_ms) as f32
        } else {
            self.last_fps
        };
        self.last_fps = fps;

        let snapshot = match renderer {
            Some(info) => MetricsSnapshot {
                fps,
                frame_time_ms: frame_time_ms as f32,
                draw_calls: info.draw_calls(),
                triangles: info.triangles(),
                geometry_memory_bytes: info.geometry_memory_bytes(),
                texture_memory_bytes: info.texture_memory_bytes(),
            },
            None => MetricsSnapshot {
                fps,
                frame_time_ms: frame_time_ms as f32,
                ..Default::default()
            },
        };

        self.history.push(snapshot);
        snapshot
    }

    #[must_use]
    pub fn history(&self) -> &MetricsHistory {
        &self.history
    }

    #[must_use]
    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.history.latest()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.last_fps = 0.0;
    }
}
