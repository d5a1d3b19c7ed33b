//! Playback Module
//!
//! Timeline clock, media synchronization and the single-owner engine task
//! that serializes commands, media events and frame ticks.

pub mod clock;
pub mod engine;
pub mod events;
pub mod montage;
pub mod sync;

pub use clock::*;
pub use engine::*;
pub use events::*;
pub use montage::*;
pub use sync::*;
