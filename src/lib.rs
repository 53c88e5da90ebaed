//! # GCodePost
//!
//! Post-processing passes for sliced FDM 3D-printer G-code:
//! - Print progress enrichment (`M73` machine progress, `M117` status line)
//!   with per-command time estimates interpolated along extrusion
//! - Calibration towers stepping acceleration, retraction, temperature or
//!   linear advance every N layers
//! - Dry-run rewriting without extrusion or heating
//!
//! ## Architecture
//!
//! GCodePost is organized as a workspace with multiple crates:
//!
//! 1. **gcodepost-core** - Errors and the layered job model
//! 2. **gcodepost-processing** - Field extraction, simulation, enrichment, processors
//! 3. **gcodepost-settings** - Script configuration files (JSON/TOML)
//! 4. **gcodepost** - Logging setup and the command line binary

use std::path::Path;

use anyhow::Context;

pub use gcodepost_core::{
    Error, GcodeError, Job, ProcessingError, Result, LAYER_SENTINEL, TIME_ELAPSED_SENTINEL,
};

pub use gcodepost_processing::{
    enrich_job, AccelerationCalibration, CalibrationOptions, EnrichPrintProgress,
    InterpreterState, JobProcessor, JobTotals, LinearAdvanceCalibration, ProcessorConfig,
    ProcessorHandle, ProcessorPipeline, ProcessorRegistry, ProgressOptions,
    RetractLengthCalibration, RetractSpeedCalibration, SegmentSpeeds, SimulatePrint,
    TemperatureCalibration,
};

pub use gcodepost_settings::{
    Config, ConfigFormat, OptionValue, ScriptSettings, SettingsError, SettingsResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Equivalent to [`init_logging_with_level`] at `INFO`.
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with_level(tracing::Level::INFO)
}

/// Initialize logging
///
/// Sets up structured logging with:
/// - Output on stderr, leaving stdout free for G-code
/// - RUST_LOG environment variable support
/// - `level` as the default directive
pub fn init_logging_with_level(level: tracing::Level) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Apply `KEY=VALUE` overrides to a config
///
/// `script.key` targets a single script; a bare `key` applies to every
/// script that accepts it. Unknown keys are rejected.
pub fn apply_overrides(config: &mut Config, overrides: &[(String, String)]) -> SettingsResult<()> {
    for (key, value) in overrides {
        let (target, key) = match key.split_once('.') {
            Some((script, key)) => (Some(script), key),
            None => (None, key.as_str()),
        };
        config.set_option(target, key, value.as_str())?;
    }
    config.validate()
}

/// Run a G-code file through the pipeline described by `config`
pub fn process_file(input: &Path, config: &Config) -> anyhow::Result<Job> {
    let registry = ProcessorRegistry::with_defaults();
    let pipeline = config
        .to_pipeline(&registry)
        .context("Failed to build processor pipeline")?;

    let job = Job::read_file(input)
        .with_context(|| format!("Failed to read G-code from {}", input.display()))?;
    tracing::info!("Read {} layer blocks from {}", job.len(), input.display());

    let processed = pipeline.process_job(job)?;
    Ok(processed)
}
