//! Multicam Engine
//!
//! Timeline synchronization and automatic scene distribution for
//! multi-camera recordings.
//!
//! The crate is an in-process library: it consumes already-probed media
//! metadata and produces clock snapshots, media backend directives and
//! scene lists. Rendering, encoding and UI live elsewhere.

pub mod core;

pub use crate::core::{CoreError, CoreResult};
