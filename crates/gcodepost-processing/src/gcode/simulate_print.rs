//! Dry-run rewriting: no filament, no heating

use gcodepost_core::{Job, ProcessingError};

use super::calibration::rewrite_lines;
use super::fields::{command_code, field_value, has_code, replace_field};
use super::pipeline::{JobProcessor, ProcessorConfig};

/// Turns a job into a motion-only simulation
///
/// Extruding moves (`G0`-`G3`) get `E0`, firmware retracts (`G10`/`G11`)
/// and heater commands (`M104`/`M109`/`M140`/`M190`) are commented out.
#[derive(Debug, Clone)]
pub struct SimulatePrint {
    config: ProcessorConfig,
}

impl SimulatePrint {
    pub const NAME: &'static str = "simulate_print";

    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::new(),
        }
    }

    /// This processor has no options besides `enabled`
    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ProcessingError> {
        config.check_options(Self::NAME, &[])?;
        Ok(Self {
            config: config.clone(),
        })
    }

    /// Rewrite a single line
    pub fn rewrite_line(line: &str) -> String {
        let g_code = command_code(line, 'G');

        if matches!(g_code, Some(10) | Some(11)) || has_code(line, 'M', &[104, 109, 140, 190]) {
            return format!(";{}", line);
        }

        let extrudes = field_value(line, 'E').is_some_and(|e| e != 0.0);
        if matches!(g_code, Some(0..=3)) && extrudes {
            return replace_field(line, 'E', "0");
        }

        line.to_string()
    }
}

impl Default for SimulatePrint {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProcessor for SimulatePrint {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Drops all extrusion and heating commands for a dry run"
    }

    fn process(&self, job: Job) -> Result<Job, ProcessingError> {
        Ok(rewrite_lines(job, |line, output| {
            output.push(Self::rewrite_line(line));
        }))
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}
