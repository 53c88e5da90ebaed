//! Linear advance (K-factor) calibration
//!
//! Besides stepping `M900 K` every N layers, each layer's two longest
//! extruding moves are split into segments printed at different speeds, so
//! the effect of the K-factor on speed transitions is visible on the part.
//! Splitting interpolates E linearly, which assumes absolute extrusion.

use gcodepost_core::{Job, ProcessingError, LAYER_SENTINEL};

use super::calibration::{format_number, CalibrationOptions, CalibrationRamp, RampDirection};
use super::fields::{command_code, field_value, field_value_or};
use super::pipeline::{JobProcessor, ProcessorConfig};

/// Segment speeds used when splitting moves (mm/s)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSpeeds {
    /// Middle of the longest move
    pub high_speed: f64,
    /// Second segment of the second-longest move
    pub slow_speed_1: f64,
    /// Fourth segment of the second-longest move
    pub slow_speed_2: f64,
}

impl Default for SegmentSpeeds {
    fn default() -> Self {
        Self {
            high_speed: 160.0,
            slow_speed_1: 30.0,
            slow_speed_2: 60.0,
        }
    }
}

impl SegmentSpeeds {
    pub const HIGH_SPEED: &'static str = "high_speed";
    pub const SLOW_SPEED_1: &'static str = "slow_speed_1";
    pub const SLOW_SPEED_2: &'static str = "slow_speed_2";

    pub fn from_config(processor: &str, config: &ProcessorConfig) -> Result<Self, ProcessingError> {
        let defaults = Self::default();
        Ok(Self {
            high_speed: config.get_f64(processor, Self::HIGH_SPEED, defaults.high_speed)?,
            slow_speed_1: config.get_f64(processor, Self::SLOW_SPEED_1, defaults.slow_speed_1)?,
            slow_speed_2: config.get_f64(processor, Self::SLOW_SPEED_2, defaults.slow_speed_2)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Position {
    x: f64,
    y: f64,
    z: f64,
    e: f64,
}

impl Position {
    /// Position after a move line; absent axes keep their value
    fn moved_by(&self, line: &str) -> Self {
        Self {
            x: field_value_or(line, 'X', self.x),
            y: field_value_or(line, 'Y', self.y),
            z: field_value_or(line, 'Z', self.z),
            e: field_value_or(line, 'E', self.e),
        }
    }

    fn lerp(&self, target: &Self, fraction: f64) -> Self {
        Self {
            x: self.x + (target.x - self.x) * fraction,
            y: self.y + (target.y - self.y) * fraction,
            z: self.z + (target.z - self.z) * fraction,
            e: self.e + (target.e - self.e) * fraction,
        }
    }

    fn xy_distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MoveCandidate {
    distance: f64,
    index: usize,
}

/// Two longest extruding moves of a block
#[derive(Debug, Clone, Copy, Default)]
struct LongMoves {
    longest: Option<MoveCandidate>,
    second: Option<MoveCandidate>,
}

impl LongMoves {
    fn offer(&mut self, candidate: MoveCandidate) {
        let longest = self.longest.map_or(0.0, |m| m.distance);
        let second = self.second.map_or(0.0, |m| m.distance);
        if longest < candidate.distance {
            self.second = self.longest;
            self.longest = Some(candidate);
        } else if second < candidate.distance {
            self.second = Some(candidate);
        }
    }
}

fn is_linear_move(line: &str) -> bool {
    matches!(command_code(line, 'G'), Some(0) | Some(1))
}

fn segment(feed: f64, to: &Position) -> String {
    format!(
        "G1 F{} X{:.3} Y{:.3} Z{:.3} E{:.3}",
        format_number(feed),
        to.x,
        to.y,
        to.z,
        to.e
    )
}

fn summary(label: &str, candidate: Option<MoveCandidate>, lines: &[&str]) -> String {
    match candidate {
        Some(m) => format!(";{}: {:.3} {}", label, m.distance, lines[m.index]),
        None => format!(";{}: {:.3} ;---", label, 0.0),
    }
}

/// Sweeps the linear advance K-factor and splits long moves at mixed speeds
#[derive(Debug, Clone)]
pub struct LinearAdvanceCalibration {
    config: ProcessorConfig,
    options: CalibrationOptions,
    speeds: SegmentSpeeds,
}

impl LinearAdvanceCalibration {
    pub const NAME: &'static str = "linear_advance_calibration";
    pub const DEFAULTS: CalibrationOptions = CalibrationOptions::new(0.002, 0.002, 1, 1);
    pub const OPTIONS: &'static [&'static str] = &[
        CalibrationOptions::START,
        CalibrationOptions::STEP_SIZE,
        CalibrationOptions::SKIP_LAYERS,
        CalibrationOptions::EVERY_LAYERS,
        CalibrationOptions::SHOW_ON_DISPLAY,
        SegmentSpeeds::HIGH_SPEED,
        SegmentSpeeds::SLOW_SPEED_1,
        SegmentSpeeds::SLOW_SPEED_2,
    ];

    pub fn new() -> Self {
        Self::with_options(Self::DEFAULTS, SegmentSpeeds::default())
    }

    pub fn with_options(options: CalibrationOptions, speeds: SegmentSpeeds) -> Self {
        Self {
            config: ProcessorConfig::new(),
            options,
            speeds,
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ProcessingError> {
        config.check_options(Self::NAME, Self::OPTIONS)?;
        Ok(Self {
            config: config.clone(),
            options: CalibrationOptions::from_config(Self::NAME, config, Self::DEFAULTS)?,
            speeds: SegmentSpeeds::from_config(Self::NAME, config)?,
        })
    }
}

impl Default for LinearAdvanceCalibration {
    fn default() -> Self {
        Self::new()
    }
}

/// Toolhead tracking carried from block to block
#[derive(Debug, Default)]
struct Toolhead {
    /// XY position as seen by the move search
    search_position: Position,
    /// Full position as seen while rewriting
    position: Position,
    feed: f64,
}

impl LinearAdvanceCalibration {
    fn process_block(
        &self,
        block: &str,
        ramp: &mut CalibrationRamp,
        toolhead: &mut Toolhead,
    ) -> String {
        let lines: Vec<&str> = block.split('\n').collect();
        let skip_layers = self.options.schedule.skip_layers;

        let mut inserts: Vec<Option<f64>> = vec![None; lines.len()];
        let mut moves = LongMoves::default();

        for (index, line) in lines.iter().enumerate() {
            if line.starts_with(LAYER_SENTINEL) {
                inserts[index] = ramp.on_layer();
            }

            if is_linear_move(line) {
                let target = toolhead.search_position.moved_by(line);
                if ramp.layers_seen() > skip_layers && field_value_or(line, 'E', 0.0) > 0.0 {
                    moves.offer(MoveCandidate {
                        distance: toolhead.search_position.xy_distance(&target),
                        index,
                    });
                }
                toolhead.search_position = target;
            }
        }

        let longest = moves.longest.map(|m| m.index);
        let second = moves.second.map(|m| m.index);
        let mut output: Vec<String> = Vec::with_capacity(lines.len() + 12);

        for (index, line) in lines.iter().enumerate() {
            if is_linear_move(line) {
                let start = toolhead.position;
                let target = start.moved_by(line);
                toolhead.feed = field_value_or(line, 'F', toolhead.feed);
                let feed = toolhead.feed;

                if Some(index) == longest {
                    let first = start.lerp(&target, 0.2);
                    let middle = start.lerp(&target, 0.8);
                    output.push(segment(feed, &first));
                    output.push(segment(self.speeds.high_speed * 60.0, &middle));
                    output.push(segment(feed, &target));
                } else if Some(index) == second {
                    let feeds = [
                        feed,
                        self.speeds.slow_speed_1 * 60.0,
                        feed,
                        self.speeds.slow_speed_2 * 60.0,
                    ];
                    for (step, segment_feed) in feeds.iter().enumerate() {
                        let point = start.lerp(&target, 0.2 * (step + 1) as f64);
                        output.push(segment(*segment_feed, &point));
                    }
                    output.push(segment(feed, &target));
                } else {
                    output.push(line.to_string());
                }

                toolhead.position = target;
                continue;
            }

            if command_code(line, 'G') == Some(92) {
                toolhead.position = Position {
                    x: field_value(line, 'X').unwrap_or(toolhead.position.x),
                    y: field_value(line, 'Y').unwrap_or(toolhead.position.y),
                    z: field_value(line, 'Z').unwrap_or(toolhead.position.z),
                    e: field_value(line, 'E').unwrap_or(toolhead.position.e),
                };
            }

            output.push(line.to_string());

            if let Some(k_factor) = inserts[index] {
                output.push(format!("M900 K{:.3}", k_factor));
                if self.options.show_on_display {
                    output.push(format!("M117 K-factor - {:.3}", k_factor));
                }
            }
        }

        output.push(String::new());
        output.push(summary("Longest move", moves.longest, &lines));
        output.push(summary("Second long move", moves.second, &lines));
        output.push(String::new());

        output.join("\n")
    }
}

impl JobProcessor for LinearAdvanceCalibration {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Steps linear advance K-factor (M900) and splits long moves at mixed speeds"
    }

    fn process(&self, job: Job) -> Result<Job, ProcessingError> {
        let mut ramp = CalibrationRamp::new(self.options, RampDirection::Increasing);
        let mut toolhead = Toolhead::default();

        let layers = job
            .into_layers()
            .into_iter()
            .map(|block| self.process_block(&block, &mut ramp, &mut toolhead))
            .collect();

        tracing::debug!("K-factor sweep covered {} layer sentinels", ramp.layers_seen());
        Ok(Job::new(layers))
    }

    fn option_keys(&self) -> &'static [&'static str] {
        Self::OPTIONS
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}
