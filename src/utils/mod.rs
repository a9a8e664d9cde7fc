//! Utility Module
//!
//! - [`time`]: platform `Instant` (web-time on wasm32) and a frame [`Timer`]

pub mod time;

pub use time::Timer;
