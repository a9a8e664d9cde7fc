//! # Myth Governor
//!
//! Keeps a 3D scene rendering at a target frame rate by trading visual
//! detail for speed, frame by frame.
//!
//! - [`culling`]: frustum culling of scene nodes
//! - [`lod`]: distance-based level-of-detail groups
//! - [`instancing`]: merging identical drawables into instanced draws
//! - [`metrics`]: per-frame timing and renderer counters
//! - [`quality`]: the adaptive quality feedback loop
//! - [`particles`]: stateless GPU particle sets
//! - [`optimizer`]: the per-frame entry point tying these together
//!
//! The [`scene`] and [`resources`] modules hold the minimal scene graph and
//! asset types the governor works on.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod culling;
pub mod errors;
pub mod instancing;
pub mod lod;
pub mod metrics;
pub mod optimizer;
pub mod particles;
pub mod quality;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod utils;

pub use culling::{CullStats, FrustumCuller};
pub use errors::{GovernorError, Result};
pub use instancing::{BatchKey, InstanceBatch, InstancedMesh, InstancingBatcher};
pub use lod::{LodGroup, LodGroupHandle, LodManager, select_level};
pub use metrics::{MetricsCollector, MetricsHistory, MetricsSnapshot, RenderInfo, RendererInfo};
pub use optimizer::{FrameReport, Optimizer};
pub use particles::{ParticleEmitterSettings, ParticleSystem};
pub use quality::{
    AdaptiveQualityController, ControllerService, ControllerTicker, DeviceCapabilities, QualityCommand,
    QualityConfig, QualityPatch, QualityStep, TickOutcome,
};
pub use resources::primitives::*;
pub use resources::{Geometry, Image, Material, Mesh, Texture, TextureAtlas};
pub use scene::{Camera, Node, NodeHandle, NodeKind, Scene};
pub use settings::OptimizerSettings;
