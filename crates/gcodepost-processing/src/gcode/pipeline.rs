//! Job processor pipeline and registry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use gcodepost_core::{Job, ProcessingError};

use super::{
    AccelerationCalibration, EnrichPrintProgress, LinearAdvanceCalibration,
    RetractLengthCalibration, RetractSpeedCalibration, SimulatePrint, TemperatureCalibration,
};

/// Configuration options for job processors
///
/// A flat key/value map read once when a processor is built. Values are kept
/// as strings and interpreted by the typed getters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Whether this processor is enabled
    pub enabled: bool,
    /// Processor-specific options
    pub options: HashMap<String, String>,
}

impl ProcessorConfig {
    /// Create a new processor configuration
    pub fn new() -> Self {
        Self {
            enabled: true,
            options: HashMap::new(),
        }
    }

    /// Create a disabled processor configuration
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            options: HashMap::new(),
        }
    }

    /// Set a configuration option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Get a configuration option
    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(|s| s.as_str())
    }

    /// Reject options the processor does not know
    pub fn check_options(&self, processor: &str, accepted: &[&str]) -> Result<(), ProcessingError> {
        let mut keys: Vec<&str> = self.options.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();

        match keys.into_iter().find(|key| !accepted.contains(key)) {
            None => Ok(()),
            Some(key) if accepted.is_empty() => Err(ProcessingError::invalid_option(
                processor,
                key,
                "unknown option, this processor takes none",
            )),
            Some(key) => Err(ProcessingError::invalid_option(
                processor,
                key,
                format!("unknown option, expected one of: {}", accepted.join(", ")),
            )),
        }
    }

    /// Boolean option; accepts true/false, yes/no, on/off and 1/0
    pub fn get_bool(
        &self,
        processor: &str,
        key: &str,
        default: bool,
    ) -> Result<bool, ProcessingError> {
        let Some(raw) = self.get_option(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(ProcessingError::invalid_option(
                processor,
                key,
                format!("expected a boolean, got '{}'", raw),
            )),
        }
    }

    /// Floating point option
    pub fn get_f64(
        &self,
        processor: &str,
        key: &str,
        default: f64,
    ) -> Result<f64, ProcessingError> {
        let Some(raw) = self.get_option(key) else {
            return Ok(default);
        };
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ProcessingError::invalid_option(
                    processor,
                    key,
                    format!("expected a number, got '{}'", raw),
                )
            })
    }

    /// Non-negative integer option
    pub fn get_u32(
        &self,
        processor: &str,
        key: &str,
        default: u32,
    ) -> Result<u32, ProcessingError> {
        let Some(raw) = self.get_option(key) else {
            return Ok(default);
        };
        raw.trim().parse::<u32>().map_err(|_| {
            ProcessingError::invalid_option(
                processor,
                key,
                format!("expected a non-negative integer, got '{}'", raw),
            )
        })
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for whole-job post-processors
///
/// A processor receives the complete layered job and returns the rewritten
/// job. It must keep the number and order of layer blocks; lines may be
/// added, commented out or rewritten inside a block.
pub trait JobProcessor: Send + Sync {
    /// Get the name/identifier of this processor
    fn name(&self) -> &str;

    /// Get a description of what this processor does
    fn description(&self) -> &str;

    /// Rewrite a job
    fn process(&self, job: Job) -> Result<Job, ProcessingError>;

    /// Option keys accepted by this processor
    fn option_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Check if this processor is enabled
    fn is_enabled(&self) -> bool {
        self.config().enabled
    }

    /// Get the configuration for this processor
    fn config(&self) -> &ProcessorConfig {
        static DEFAULT_CONFIG: std::sync::OnceLock<ProcessorConfig> = std::sync::OnceLock::new();
        DEFAULT_CONFIG.get_or_init(ProcessorConfig::new)
    }
}

/// Arc-wrapped processor for thread-safe sharing
pub type ProcessorHandle = Arc<dyn JobProcessor>;

/// Job processor pipeline
///
/// Applies registered processors in registration order, each one receiving
/// the output of the previous.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use gcodepost_core::Job;
/// use gcodepost_processing::{EnrichPrintProgress, ProcessorPipeline, SimulatePrint};
///
/// let mut pipeline = ProcessorPipeline::new();
/// pipeline.register(Arc::new(SimulatePrint::new()));
/// pipeline.register(Arc::new(EnrichPrintProgress::new()));
///
/// let job = Job::from_gcode(";LAYER:0\nM104 S200\nG1 X1 E1\n;TIME_ELAPSED:4\n");
/// let processed = pipeline.process_job(job).unwrap();
/// assert!(processed.to_gcode().contains(";M104 S200"));
/// ```
pub struct ProcessorPipeline {
    processors: Vec<ProcessorHandle>,
}

impl ProcessorPipeline {
    /// Create a new empty processor pipeline
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    /// Register a processor in the pipeline
    ///
    /// Processors are applied in the order they are registered.
    pub fn register(&mut self, processor: ProcessorHandle) -> &mut Self {
        self.processors.push(processor);
        self
    }

    /// List all registered processors
    pub fn list_processors(&self) -> Vec<(&str, &str, bool)> {
        self.processors
            .iter()
            .map(|p| (p.name(), p.description(), p.is_enabled()))
            .collect()
    }

    /// Run a job through every enabled processor
    pub fn process_job(&self, job: Job) -> Result<Job, ProcessingError> {
        let mut current = job;

        for processor in &self.processors {
            if !processor.is_enabled() {
                tracing::debug!("Skipping disabled processor '{}'", processor.name());
                continue;
            }

            let layers_before = current.len();
            tracing::info!(
                "Running processor '{}' over {} blocks",
                processor.name(),
                layers_before
            );

            current = processor.process(current).inspect_err(|e| {
                tracing::warn!("Processor '{}' failed: {}", processor.name(), e);
            })?;

            if current.len() != layers_before {
                return Err(ProcessingError::ProcessorFailed {
                    processor: processor.name().to_string(),
                    reason: format!(
                        "layer count changed from {} to {}",
                        layers_before,
                        current.len()
                    ),
                });
            }
        }

        Ok(current)
    }
}

impl Default for ProcessorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

type ProcessorFactory =
    Arc<dyn Fn(&ProcessorConfig) -> Result<ProcessorHandle, ProcessingError> + Send + Sync>;

/// Processor registry for managing available processors
///
/// Maps processor names to factories that build a configured processor.
pub struct ProcessorRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl ProcessorRegistry {
    /// Create a new empty processor registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in processor
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(EnrichPrintProgress::NAME, |config| {
                Ok(Arc::new(EnrichPrintProgress::from_config(config)?) as ProcessorHandle)
            })
            .register(SimulatePrint::NAME, |config| {
                Ok(Arc::new(SimulatePrint::from_config(config)?) as ProcessorHandle)
            })
            .register(AccelerationCalibration::NAME, |config| {
                Ok(Arc::new(AccelerationCalibration::from_config(config)?) as ProcessorHandle)
            })
            .register(RetractLengthCalibration::NAME, |config| {
                Ok(Arc::new(RetractLengthCalibration::from_config(config)?) as ProcessorHandle)
            })
            .register(RetractSpeedCalibration::NAME, |config| {
                Ok(Arc::new(RetractSpeedCalibration::from_config(config)?) as ProcessorHandle)
            })
            .register(TemperatureCalibration::NAME, |config| {
                Ok(Arc::new(TemperatureCalibration::from_config(config)?) as ProcessorHandle)
            })
            .register(LinearAdvanceCalibration::NAME, |config| {
                Ok(Arc::new(LinearAdvanceCalibration::from_config(config)?) as ProcessorHandle)
            });
        registry
    }

    /// Register a processor factory
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ProcessorConfig) -> Result<ProcessorHandle, ProcessingError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Create a processor by name
    pub fn create(
        &self,
        name: &str,
        config: &ProcessorConfig,
    ) -> Result<ProcessorHandle, ProcessingError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ProcessingError::UnknownProcessor {
                name: name.to_string(),
            })?;
        factory(config)
    }

    /// Create a pipeline from named, configured processors
    pub fn create_pipeline<'a, I>(&self, entries: I) -> Result<ProcessorPipeline, ProcessingError>
    where
        I: IntoIterator<Item = (&'a str, &'a ProcessorConfig)>,
    {
        let mut pipeline = ProcessorPipeline::new();
        for (name, config) in entries {
            pipeline.register(self.create(name, config)?);
        }
        Ok(pipeline)
    }

    /// Option keys accepted by a registered processor
    pub fn option_keys(&self, name: &str) -> Result<&'static [&'static str], ProcessingError> {
        Ok(self.create(name, &ProcessorConfig::new())?.option_keys())
    }

    /// List all registered processor names, sorted
    pub fn list_registered(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
