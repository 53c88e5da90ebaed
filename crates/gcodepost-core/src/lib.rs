//! # GCodePost Core
//!
//! Core types shared by every GCodePost crate:
//! - The layered [`Job`] model handed between the slicer and post-processors
//! - Error types for G-code handling and processor configuration

pub mod error;
pub mod job;

pub use error::{Error, GcodeError, ProcessingError, Result};
pub use job::{Job, LAYER_SENTINEL, TIME_ELAPSED_SENTINEL};
