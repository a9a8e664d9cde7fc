//! Error Types
//!
//! This module defines the error types used throughout the governor.
//!
//! # Overview
//!
//! The main error type [`GovernorError`] covers the validation failures that
//! can be raised by the construction-time APIs:
//! - Invalid LOD switch distances
//! - Nodes that are missing, not drawable, or already managed
//! - Instancing requests the device cannot honour
//! - Texture atlas overflow and settings parsing
//!
//! Per-frame work (`optimize`, controller ticks) never returns these; it
//! degrades gracefully and logs instead.
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_governor::errors::{GovernorError, Result};
//!
//! fn build_lods() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::scene::NodeHandle;

/// The main error type for the governor.
#[derive(Error, Debug)]
pub enum GovernorError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// LOD switch distances must be non-empty, finite, non-negative and
    /// strictly increasing.
    #[error("Invalid LOD distances {distances:?}: {reason}")]
    InvalidLodDistances {
        /// The rejected input
        distances: Vec<f32>,
        /// What rule was violated
        reason: &'static str,
    },

    /// The referenced node does not exist in the scene.
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeHandle),

    /// The node does not carry a mesh drawable.
    #[error("Node {0:?} is not a mesh drawable")]
    NotDrawable(NodeHandle),

    /// The node already belongs to an LOD group or an instance batch.
    #[error("Node {0:?} is already managed by the optimizer")]
    AlreadyManaged(NodeHandle),

    // ========================================================================
    // Instancing Errors
    // ========================================================================
    /// An instance batch with this key already exists.
    #[error("Instance batch already exists: {0}")]
    DuplicateBatch(String),

    /// The device reported no hardware instancing support.
    #[error("Hardware instancing is not supported on this device")]
    InstancingUnsupported,

    /// Instanced meshes need at least one instance.
    #[error("Instance count must be greater than zero")]
    EmptyInstanceBatch,

    // ========================================================================
    // Texture Errors
    // ========================================================================
    /// The image does not fit in the remaining atlas space.
    #[error("Texture atlas is full: cannot place {width}x{height}")]
    AtlasFull {
        /// Requested width in pixels
        width: u32,
        /// Requested height in pixels
        height: u32,
    },

    /// Raw pixel data does not match the declared dimensions.
    #[error("Image data length {actual} does not match {width}x{height} RGBA8")]
    ImageSizeMismatch {
        /// Declared width
        width: u32,
        /// Declared height
        height: u32,
        /// Byte length that was supplied
        actual: usize,
    },

    // ========================================================================
    // Service Errors
    // ========================================================================
    /// The controller service thread could not be started.
    #[error("Failed to spawn controller thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// A controller service is already running for this optimizer.
    #[error("Controller service is already running")]
    ServiceRunning,

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A setting is outside its valid range.
    #[error("Invalid setting `{name}`: {reason}")]
    InvalidSetting {
        /// Setting name
        name: &'static str,
        /// What rule was violated
        reason: &'static str,
    },
}

/// Alias for `Result<T, GovernorError>`.
pub type Result<T> = std::result::Result<T, GovernorError>;
