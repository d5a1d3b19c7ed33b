//! Compilation Module
//!
//! Automatic multi-camera compilation: scene distribution over abstract
//! camera indices, the bitrate preference signal, and downstream resolution
//! of scenes onto concrete clips.

pub mod bitrate;
pub mod distributor;
pub mod durations;
pub mod resolve;
pub mod settings;

pub use bitrate::*;
pub use distributor::*;
pub use resolve::*;
pub use settings::*;
