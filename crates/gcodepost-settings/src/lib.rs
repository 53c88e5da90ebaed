//! GCodePost Settings Crate
//!
//! Loads, saves and validates the list of post-processing scripts to run,
//! and turns it into a processor pipeline.

pub mod config;
pub mod error;

pub use config::{Config, ConfigFormat, OptionValue, ScriptSettings};
pub use error::{SettingsError, SettingsResult};
