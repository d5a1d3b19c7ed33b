//! Multicam Core Engine
//!
//! Core module of the engine.
//! Handles media catalog ingestion, sector partitioning, the timeline clock,
//! playback synchronization, zoom mapping and scene distribution.

pub mod catalog;
pub mod compilation;
pub mod playback;
pub mod sectors;
pub mod settings;
pub mod zoom;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
