//! Script configuration
//!
//! A configuration file lists the post-processing scripts to run, in order,
//! with their options:
//!
//! ```toml
//! [[scripts]]
//! name = "temperature_calibration"
//!
//! [scripts.options]
//! start = 215
//! every_layers = 20
//!
//! [[scripts]]
//! name = "enrich_print_progress"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use gcodepost_core::ProcessingError;
use gcodepost_processing::{ProcessorConfig, ProcessorPipeline, ProcessorRegistry};

use crate::error::{SettingsError, SettingsResult};

/// Scalar option value as written in a config file
///
/// Processors read their options as strings, so every variant is
/// normalised through [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

fn default_enabled() -> bool {
    true
}

/// One script entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSettings {
    /// Registered processor name
    pub name: String,
    /// Disabled scripts stay in the pipeline but are skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Processor options
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
}

impl ScriptSettings {
    /// Enabled script with default options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            options: BTreeMap::new(),
        }
    }

    /// Set an option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Options as read by the processor
    pub fn to_processor_config(&self) -> ProcessorConfig {
        let config = if self.enabled {
            ProcessorConfig::new()
        } else {
            ProcessorConfig::disabled()
        };
        self.options.iter().fold(config, |config, (key, value)| {
            config.with_option(key.as_str(), value.to_string())
        })
    }
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format from a file extension
    pub fn from_path(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(SettingsError::UnsupportedFormat(format!(
                "{} (config file must be .json or .toml)",
                path.display()
            ))),
        }
    }
}

/// Ordered list of scripts to run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scripts: Vec<ScriptSettings>,
}

impl Config {
    /// Create new config with no scripts
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a script
    pub fn with_script(mut self, script: ScriptSettings) -> Self {
        self.scripts.push(script);
        self
    }

    /// Parse config text in the given format and validate it
    pub fn parse(content: &str, format: ConfigFormat) -> SettingsResult<Self> {
        let config: Self = match format {
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Serialise config text in the given format after validating it
    pub fn render(&self, format: ConfigFormat) -> SettingsResult<String> {
        self.validate()?;
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };
        Ok(content)
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config = Self::parse(&content, format)?;
        tracing::debug!(
            "Loaded {} scripts from {}",
            config.scripts.len(),
            path.display()
        );
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        let format = ConfigFormat::from_path(path)?;
        let content = self.render(format)?;

        std::fs::write(path, content).map_err(|e| {
            SettingsError::SaveError(format!("Failed to write {}: {}", path.display(), e))
        })?;

        Ok(())
    }

    /// Set an option on scripts, checked against the built-in processors
    pub fn set_option(
        &mut self,
        target: Option<&str>,
        key: &str,
        value: impl Into<OptionValue>,
    ) -> SettingsResult<()> {
        self.set_option_with(&ProcessorRegistry::with_defaults(), target, key, value)
    }

    /// Set an option on scripts
    ///
    /// `target` selects a single script by name and the key must be one its
    /// processor accepts. `None` applies the option to every script whose
    /// processor accepts the key.
    pub fn set_option_with(
        &mut self,
        registry: &ProcessorRegistry,
        target: Option<&str>,
        key: &str,
        value: impl Into<OptionValue>,
    ) -> SettingsResult<()> {
        let value = value.into();
        let mut matched = false;

        for script in &mut self.scripts {
            match target {
                Some(name) if name != script.name => continue,
                Some(name) => {
                    if !registry.option_keys(name)?.contains(&key) {
                        return Err(ProcessingError::invalid_option(
                            name,
                            key,
                            "unknown option for this script",
                        )
                        .into());
                    }
                }
                None => {
                    let accepts = registry
                        .option_keys(&script.name)
                        .is_ok_and(|keys| keys.contains(&key));
                    if !accepts {
                        continue;
                    }
                }
            }
            script.options.insert(key.to_string(), value.clone());
            matched = true;
        }

        if matched {
            Ok(())
        } else {
            Err(SettingsError::invalid_setting(
                key,
                match target {
                    Some(name) => format!("no script named '{}' is configured", name),
                    None => "no configured script accepts this option".to_string(),
                },
            ))
        }
    }

    /// Validate against the built-in processors
    pub fn validate(&self) -> SettingsResult<()> {
        self.validate_with(&ProcessorRegistry::with_defaults())
    }

    /// Validate against a registry
    ///
    /// Every script must name a registered processor and its options must be
    /// accepted by that processor.
    pub fn validate_with(&self, registry: &ProcessorRegistry) -> SettingsResult<()> {
        for (index, script) in self.scripts.iter().enumerate() {
            if script.name.trim().is_empty() {
                return Err(SettingsError::invalid_setting(
                    format!("scripts[{}].name", index),
                    "must not be empty",
                ));
            }
            registry.create(&script.name, &script.to_processor_config())?;
        }
        Ok(())
    }

    /// Build the pipeline described by this config
    pub fn to_pipeline(&self, registry: &ProcessorRegistry) -> SettingsResult<ProcessorPipeline> {
        let configs: Vec<(&str, ProcessorConfig)> = self
            .scripts
            .iter()
            .map(|script| (script.name.as_str(), script.to_processor_config()))
            .collect();

        let pipeline =
            registry.create_pipeline(configs.iter().map(|(name, config)| (*name, config)))?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_value_display() {
        assert_eq!(OptionValue::Bool(true).to_string(), "true");
        assert_eq!(OptionValue::Integer(25).to_string(), "25");
        assert_eq!(OptionValue::Float(0.2).to_string(), "0.2");
        assert_eq!(OptionValue::from("yes").to_string(), "yes");
    }

    #[test]
    fn test_parse_toml_scalars() {
        let content = r#"
            [[scripts]]
            name = "retract_length_calibration"
            enabled = false

            [scripts.options]
            start = 0.4
            skip_layers = 2
            show_on_display = false
        "#;
        let config = Config::parse(content, ConfigFormat::Toml).unwrap();
        let script = &config.scripts[0];

        assert!(!script.enabled);
        assert_eq!(script.options["start"], OptionValue::Float(0.4));
        assert_eq!(script.options["skip_layers"], OptionValue::Integer(2));
        assert_eq!(script.options["show_on_display"], OptionValue::Bool(false));

        let processor_config = script.to_processor_config();
        assert!(!processor_config.enabled);
        assert_eq!(processor_config.get_option("skip_layers"), Some("2"));
    }

    #[test]
    fn test_parse_json_defaults() {
        let content = r#"{ "scripts": [ { "name": "simulate_print" } ] }"#;
        let config = Config::parse(content, ConfigFormat::Json).unwrap();
        assert!(config.scripts[0].enabled);
        assert!(config.scripts[0].options.is_empty());
    }

    #[test]
    fn test_validate_unknown_script() {
        let config = Config::new().with_script(ScriptSettings::new("arc_welder"));
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Processing(_))
        ));
    }

    #[test]
    fn test_validate_zero_every_layers() {
        let config = Config::new().with_script(
            ScriptSettings::new("temperature_calibration").with_option("every_layers", 0i64),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_name() {
        let config = Config::new().with_script(ScriptSettings::new(" "));
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_set_option() {
        let mut config = Config::new()
            .with_script(ScriptSettings::new("temperature_calibration"))
            .with_script(ScriptSettings::new("enrich_print_progress"));

        config
            .set_option(Some("temperature_calibration"), "start", 220i64)
            .unwrap();
        config.set_option(None, "show_on_display", false).unwrap();
        config.set_option(None, "show_elapsed_time", true).unwrap();

        assert_eq!(config.scripts[0].options["start"], OptionValue::Integer(220));
        assert_eq!(config.scripts[0].options["show_on_display"], OptionValue::Bool(false));
        assert!(config.scripts[0].options.get("show_elapsed_time").is_none());
        assert_eq!(config.scripts[1].options.len(), 1);
        assert_eq!(config.scripts[1].options["show_elapsed_time"], OptionValue::Bool(true));

        assert!(config
            .set_option(Some("simulate_print"), "start", 1i64)
            .is_err());
    }

    #[test]
    fn test_set_option_rejects_unknown_keys() {
        let mut config = Config::new()
            .with_script(ScriptSettings::new("temperature_calibration"))
            .with_script(ScriptSettings::new("simulate_print"));

        let err = config
            .set_option(Some("temperature_calibration"), "strat", 999i64)
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Processing(ProcessingError::InvalidOption { ref key, .. })
                if key == "strat"
        ));

        assert!(matches!(
            config.set_option(None, "use_machine_progres", false),
            Err(SettingsError::InvalidSetting { .. })
        ));
        assert!(config.scripts.iter().all(|script| script.options.is_empty()));
    }

    #[test]
    fn test_validate_misspelled_option() {
        let content = r#"
            [[scripts]]
            name = "enrich_print_progress"

            [scripts.options]
            use_machine_progres = false
        "#;
        let err = Config::parse(content, ConfigFormat::Toml).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Processing(ProcessingError::InvalidOption { ref key, .. })
                if key == "use_machine_progres"
        ));
    }

    #[test]
    fn test_to_pipeline_order() {
        let config = Config::new()
            .with_script(ScriptSettings::new("simulate_print"))
            .with_script(ScriptSettings::new("enrich_print_progress"));
        let pipeline = config
            .to_pipeline(&ProcessorRegistry::with_defaults())
            .unwrap();

        let names: Vec<&str> = pipeline
            .list_processors()
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        assert_eq!(names, vec!["simulate_print", "enrich_print_progress"]);
    }
}
