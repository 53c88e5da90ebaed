//! Layer-stepped calibration processors
//!
//! Each processor walks the `;LAYER:` sentinels of the whole job and, on a
//! fixed schedule, inserts a firmware parameter command right after the
//! sentinel, followed by an optional `M117` line naming the value. The value
//! then moves by one step, so a single test print sweeps a parameter range
//! from the bottom of the model to the top.

use gcodepost_core::{Job, ProcessingError, LAYER_SENTINEL};

use super::fields::has_code;
use super::pipeline::{JobProcessor, ProcessorConfig};

// ============================================================================
// Shared scheduling
// ============================================================================

/// Which layer sentinels receive a new value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSchedule {
    /// Sentinels to leave alone at the start of the job
    pub skip_layers: u32,
    /// Distance between changes, at least 1
    pub every_layers: u32,
}

impl CalibrationSchedule {
    /// Whether the sentinel with this 0-based ordinal gets a value
    pub fn applies(&self, ordinal: u32) -> bool {
        ordinal >= self.skip_layers && (ordinal - self.skip_layers) % self.every_layers.max(1) == 0
    }
}

/// Common options of the calibration processors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOptions {
    /// Value applied at the first scheduled sentinel
    pub start: f64,
    /// Change between scheduled sentinels
    pub step_size: f64,
    pub schedule: CalibrationSchedule,
    /// Add an `M117` line naming the value
    pub show_on_display: bool,
}

impl CalibrationOptions {
    pub const START: &'static str = "start";
    pub const STEP_SIZE: &'static str = "step_size";
    pub const SKIP_LAYERS: &'static str = "skip_layers";
    pub const EVERY_LAYERS: &'static str = "every_layers";
    pub const SHOW_ON_DISPLAY: &'static str = "show_on_display";

    /// Every option key read by [`CalibrationOptions::from_config`]
    pub const KEYS: &'static [&'static str] = &[
        Self::START,
        Self::STEP_SIZE,
        Self::SKIP_LAYERS,
        Self::EVERY_LAYERS,
        Self::SHOW_ON_DISPLAY,
    ];

    /// Options with the given defaults and display feedback on
    pub const fn new(start: f64, step_size: f64, skip_layers: u32, every_layers: u32) -> Self {
        Self {
            start,
            step_size,
            schedule: CalibrationSchedule {
                skip_layers,
                every_layers,
            },
            show_on_display: true,
        }
    }

    /// Read options from a processor configuration over `defaults`
    pub fn from_config(
        processor: &str,
        config: &ProcessorConfig,
        defaults: Self,
    ) -> Result<Self, ProcessingError> {
        let every_layers =
            config.get_u32(processor, Self::EVERY_LAYERS, defaults.schedule.every_layers)?;
        if every_layers == 0 {
            return Err(ProcessingError::invalid_option(
                processor,
                Self::EVERY_LAYERS,
                "must be at least 1",
            ));
        }

        let skip_layers =
            config.get_u32(processor, Self::SKIP_LAYERS, defaults.schedule.skip_layers)?;

        Ok(Self {
            start: config.get_f64(processor, Self::START, defaults.start)?,
            step_size: config.get_f64(processor, Self::STEP_SIZE, defaults.step_size)?,
            schedule: CalibrationSchedule {
                skip_layers,
                every_layers,
            },
            show_on_display: config.get_bool(
                processor,
                Self::SHOW_ON_DISPLAY,
                defaults.show_on_display,
            )?,
        })
    }
}

/// Direction a calibration value moves in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampDirection {
    Increasing,
    Decreasing,
}

/// Running value of a calibration sweep over the job
#[derive(Debug, Clone)]
pub struct CalibrationRamp {
    options: CalibrationOptions,
    direction: RampDirection,
    layers_seen: u32,
    changes: u32,
}

impl CalibrationRamp {
    pub fn new(options: CalibrationOptions, direction: RampDirection) -> Self {
        Self {
            options,
            direction,
            layers_seen: 0,
            changes: 0,
        }
    }

    /// Register a layer sentinel; returns the value to apply there, if any
    pub fn on_layer(&mut self) -> Option<f64> {
        let ordinal = self.layers_seen;
        self.layers_seen += 1;

        if !self.options.schedule.applies(ordinal) {
            return None;
        }

        let step = match self.direction {
            RampDirection::Increasing => self.options.step_size,
            RampDirection::Decreasing => -self.options.step_size,
        };
        let value = self.options.start + step * f64::from(self.changes);
        self.changes += 1;
        Some(value)
    }

    /// Number of sentinels registered so far
    pub fn layers_seen(&self) -> u32 {
        self.layers_seen
    }
}

/// Format a parameter without a fractional part when it is integral
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Rewrite every line of every block
///
/// `rewrite` receives each source line and appends its replacement lines
/// (usually the line itself) to the output. Block count and order are kept.
pub fn rewrite_lines<F>(job: Job, mut rewrite: F) -> Job
where
    F: FnMut(&str, &mut Vec<String>),
{
    let layers = job
        .into_layers()
        .into_iter()
        .map(|block| {
            let mut output = Vec::new();
            for line in block.split('\n') {
                rewrite(line, &mut output);
            }
            output.join("\n")
        })
        .collect();
    Job::new(layers)
}

/// Insert the ramp's commands after every scheduled sentinel
fn apply_ramp<F>(
    job: Job,
    options: &CalibrationOptions,
    direction: RampDirection,
    commands: F,
) -> Job
where
    F: Fn(f64) -> (Vec<String>, String),
{
    let mut ramp = CalibrationRamp::new(*options, direction);
    let job = rewrite_lines(job, |line, output| {
        output.push(line.to_string());
        if line.starts_with(LAYER_SENTINEL) {
            if let Some(value) = ramp.on_layer() {
                let (parameters, display) = commands(value);
                output.extend(parameters);
                if options.show_on_display {
                    output.push(display);
                }
            }
        }
    });
    tracing::debug!("Calibration ramp covered {} layer sentinels", ramp.layers_seen());
    job
}

// ============================================================================
// Acceleration
// ============================================================================

/// Sweeps print/travel acceleration (`M204 T P`)
///
/// Existing `M201`/`M204`/`M205`/`M900` lines are commented out so that only
/// the inserted overrides take effect, and fixed max acceleration, junction
/// deviation and K-factor overrides follow the `;LAYER_COUNT:` header.
#[derive(Debug, Clone)]
pub struct AccelerationCalibration {
    config: ProcessorConfig,
    options: CalibrationOptions,
}

impl AccelerationCalibration {
    pub const NAME: &'static str = "acceleration_calibration";
    pub const DEFAULTS: CalibrationOptions = CalibrationOptions::new(50.0, 12.0, 0, 1);

    const OVERRIDE_MARKER: &'static str = "override";
    const LAYER_COUNT_HEADER: &'static str = ";LAYER_COUNT:";

    pub fn new() -> Self {
        Self::with_options(Self::DEFAULTS)
    }

    pub fn with_options(options: CalibrationOptions) -> Self {
        Self {
            config: ProcessorConfig::new(),
            options,
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ProcessingError> {
        config.check_options(Self::NAME, CalibrationOptions::KEYS)?;
        Ok(Self {
            config: config.clone(),
            options: CalibrationOptions::from_config(Self::NAME, config, Self::DEFAULTS)?,
        })
    }
}

impl Default for AccelerationCalibration {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProcessor for AccelerationCalibration {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Steps acceleration (M204) every N layers"
    }

    fn process(&self, job: Job) -> Result<Job, ProcessingError> {
        let mut ramp = CalibrationRamp::new(self.options, RampDirection::Increasing);

        Ok(rewrite_lines(job, |line, output| {
            if has_code(line, 'M', &[201, 204, 205, 900]) && !line.contains(Self::OVERRIDE_MARKER) {
                output.push(format!(";{}", line));
                return;
            }

            output.push(line.to_string());

            if line.starts_with(Self::LAYER_COUNT_HEADER) {
                output.push("M201 X5000 Y5000 ;override".to_string());
                output.push("M205 J0.04 ;override".to_string());
                output.push("M900 K0 ;override".to_string());
            }

            if line.starts_with(LAYER_SENTINEL) {
                if let Some(value) = ramp.on_layer() {
                    let value = format_number(value);
                    output.push(format!("M204 T{0} P{0} ;override", value));
                    if self.options.show_on_display {
                        output.push(format!("M117 Acceleration - {}", value));
                    }
                }
            }
        }))
    }

    fn option_keys(&self) -> &'static [&'static str] {
        CalibrationOptions::KEYS
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

// ============================================================================
// Retraction
// ============================================================================

/// Sweeps firmware retraction length (`M207 S`)
#[derive(Debug, Clone)]
pub struct RetractLengthCalibration {
    config: ProcessorConfig,
    options: CalibrationOptions,
}

impl RetractLengthCalibration {
    pub const NAME: &'static str = "retract_length_calibration";
    pub const DEFAULTS: CalibrationOptions = CalibrationOptions::new(0.2, 0.2, 5, 25);

    pub fn new() -> Self {
        Self::with_options(Self::DEFAULTS)
    }

    pub fn with_options(options: CalibrationOptions) -> Self {
        Self {
            config: ProcessorConfig::new(),
            options,
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ProcessingError> {
        config.check_options(Self::NAME, CalibrationOptions::KEYS)?;
        Ok(Self {
            config: config.clone(),
            options: CalibrationOptions::from_config(Self::NAME, config, Self::DEFAULTS)?,
        })
    }
}

impl Default for RetractLengthCalibration {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProcessor for RetractLengthCalibration {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Steps firmware retract length (M207 S) every N layers"
    }

    fn process(&self, job: Job) -> Result<Job, ProcessingError> {
        Ok(apply_ramp(job, &self.options, RampDirection::Increasing, |value| {
            (
                vec![format!("M207 S{:.3}", value)],
                format!("M117 Retract Length - {:.3}", value),
            )
        }))
    }

    fn option_keys(&self) -> &'static [&'static str] {
        CalibrationOptions::KEYS
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

/// Sweeps firmware retract and recover speed (`M207 F`, `M208 F`)
///
/// Values are in mm/s; the commands take mm/min.
#[derive(Debug, Clone)]
pub struct RetractSpeedCalibration {
    config: ProcessorConfig,
    options: CalibrationOptions,
}

impl RetractSpeedCalibration {
    pub const NAME: &'static str = "retract_speed_calibration";
    pub const DEFAULTS: CalibrationOptions = CalibrationOptions::new(5.0, 5.0, 5, 25);

    pub fn new() -> Self {
        Self::with_options(Self::DEFAULTS)
    }

    pub fn with_options(options: CalibrationOptions) -> Self {
        Self {
            config: ProcessorConfig::new(),
            options,
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ProcessingError> {
        config.check_options(Self::NAME, CalibrationOptions::KEYS)?;
        Ok(Self {
            config: config.clone(),
            options: CalibrationOptions::from_config(Self::NAME, config, Self::DEFAULTS)?,
        })
    }
}

impl Default for RetractSpeedCalibration {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProcessor for RetractSpeedCalibration {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Steps firmware retract/recover speed (M207 F, M208 F) every N layers"
    }

    fn process(&self, job: Job) -> Result<Job, ProcessingError> {
        Ok(apply_ramp(job, &self.options, RampDirection::Increasing, |value| {
            let feed = format_number(value * 60.0);
            (
                vec![format!("M207 F{}", feed), format!("M208 F{}", feed)],
                format!("M117 Retract Speed - {} mm/s", format_number(value)),
            )
        }))
    }

    fn option_keys(&self) -> &'static [&'static str] {
        CalibrationOptions::KEYS
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

// ============================================================================
// Temperature
// ============================================================================

/// Lowers the hotend temperature (`M104 S`) every N layers
#[derive(Debug, Clone)]
pub struct TemperatureCalibration {
    config: ProcessorConfig,
    options: CalibrationOptions,
}

impl TemperatureCalibration {
    pub const NAME: &'static str = "temperature_calibration";
    pub const DEFAULTS: CalibrationOptions = CalibrationOptions::new(200.0, 5.0, 0, 100);

    pub fn new() -> Self {
        Self::with_options(Self::DEFAULTS)
    }

    pub fn with_options(options: CalibrationOptions) -> Self {
        Self {
            config: ProcessorConfig::new(),
            options,
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ProcessingError> {
        config.check_options(Self::NAME, CalibrationOptions::KEYS)?;
        Ok(Self {
            config: config.clone(),
            options: CalibrationOptions::from_config(Self::NAME, config, Self::DEFAULTS)?,
        })
    }
}

impl Default for TemperatureCalibration {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProcessor for TemperatureCalibration {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Lowers hotend temperature (M104) every N layers"
    }

    fn process(&self, job: Job) -> Result<Job, ProcessingError> {
        Ok(apply_ramp(job, &self.options, RampDirection::Decreasing, |value| {
            let value = format_number(value);
            (
                vec![format!("M104 S{}", value)],
                format!("M117 Temperature - {}", value),
            )
        }))
    }

    fn option_keys(&self) -> &'static [&'static str] {
        CalibrationOptions::KEYS
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}
