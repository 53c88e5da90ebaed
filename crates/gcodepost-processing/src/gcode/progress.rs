//! Progress estimation and status line formatting
//!
//! Given the snapshot before and after a command, decide which progress
//! commands to insert after it. Two channels exist: a machine progress
//! command (`M73 P<pct>`) and a display message (`M117 ...`). Each channel
//! remembers the last line it produced and never repeats it back to back.

use std::sync::Arc;

use gcodepost_core::ProcessingError;

use super::pipeline::ProcessorConfig;
use super::prescan::JobTotals;
use super::state::InterpreterState;

/// Minimum advance of the percent threshold, as a fraction of the total time
const PERCENT_RESOLUTION: f64 = 0.0001;

/// Which progress commands to emit and what the display message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressOptions {
    /// Emit `M73 P<pct>` on percent crossings
    pub use_machine_progress: bool,
    /// Emit `M117` status messages
    pub use_display_progress: bool,
    /// Include the completion percentage in the status message
    pub show_progress_percent: bool,
    /// Include `L<cur>/<total>` in the status message
    pub show_current_layer: bool,
    /// Include elapsed time in the status message
    pub show_elapsed_time: bool,
    /// Include remaining time in the status message
    pub show_remaining_time: bool,
    /// Interpolate time along extrusion within a layer
    pub interpolate_by_extrusion: bool,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        Self {
            use_machine_progress: true,
            use_display_progress: true,
            show_progress_percent: false,
            show_current_layer: true,
            show_elapsed_time: false,
            show_remaining_time: true,
            interpolate_by_extrusion: true,
        }
    }
}

impl ProgressOptions {
    pub const USE_MACHINE_PROGRESS: &'static str = "use_machine_progress";
    pub const USE_DISPLAY_PROGRESS: &'static str = "use_display_progress";
    pub const SHOW_PROGRESS_PERCENT: &'static str = "show_progress_percent";
    pub const SHOW_CURRENT_LAYER: &'static str = "show_current_layer";
    pub const SHOW_ELAPSED_TIME: &'static str = "show_elapsed_time";
    pub const SHOW_REMAINING_TIME: &'static str = "show_remaining_time";
    pub const INTERPOLATE_BY_EXTRUSION: &'static str = "interpolate_by_extrusion";

    /// Every option key read by [`ProgressOptions::from_config`]
    pub const KEYS: &'static [&'static str] = &[
        Self::USE_MACHINE_PROGRESS,
        Self::USE_DISPLAY_PROGRESS,
        Self::SHOW_PROGRESS_PERCENT,
        Self::SHOW_CURRENT_LAYER,
        Self::SHOW_ELAPSED_TIME,
        Self::SHOW_REMAINING_TIME,
        Self::INTERPOLATE_BY_EXTRUSION,
    ];

    /// Read options from a processor configuration, falling back to defaults
    pub fn from_config(processor: &str, config: &ProcessorConfig) -> Result<Self, ProcessingError> {
        let defaults = Self::default();
        Ok(Self {
            use_machine_progress: config.get_bool(
                processor,
                Self::USE_MACHINE_PROGRESS,
                defaults.use_machine_progress,
            )?,
            use_display_progress: config.get_bool(
                processor,
                Self::USE_DISPLAY_PROGRESS,
                defaults.use_display_progress,
            )?,
            show_progress_percent: config.get_bool(
                processor,
                Self::SHOW_PROGRESS_PERCENT,
                defaults.show_progress_percent,
            )?,
            show_current_layer: config.get_bool(
                processor,
                Self::SHOW_CURRENT_LAYER,
                defaults.show_current_layer,
            )?,
            show_elapsed_time: config.get_bool(
                processor,
                Self::SHOW_ELAPSED_TIME,
                defaults.show_elapsed_time,
            )?,
            show_remaining_time: config.get_bool(
                processor,
                Self::SHOW_REMAINING_TIME,
                defaults.show_remaining_time,
            )?,
            interpolate_by_extrusion: config.get_bool(
                processor,
                Self::INTERPOLATE_BY_EXTRUSION,
                defaults.interpolate_by_extrusion,
            )?,
        })
    }
}

/// Lines to insert after a command, and the snapshot to continue from
#[derive(Debug, Clone, PartialEq)]
pub struct Injection {
    pub lines: Vec<String>,
    pub state: InterpreterState,
}

/// Format a duration in seconds as `HH-MM`
///
/// Both fields are two digits wide: hours wrap at 24 like a time of day.
/// Negative and non-finite durations show as `00-00`.
pub fn format_hours_minutes(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}-{:02}", (total / 3600) % 24, (total % 3600) / 60)
}

/// Decide what to insert after a command
///
/// `previous` is the snapshot before the command, `current` the snapshot
/// after it (with the time estimate already interpolated). Nothing is
/// produced before the first layer sentinel.
pub fn injectables(
    previous: &InterpreterState,
    current: &InterpreterState,
    totals: &JobTotals,
    options: &ProgressOptions,
) -> Injection {
    let mut next = current.clone();
    let mut lines = Vec::new();

    if !current.first_layer_seen {
        return Injection { lines, state: next };
    }

    let total_time = totals.known_time();
    let crossed =
        total_time.is_some_and(|_| current.estimated_time > current.next_percent_threshold);
    let layer_changed = previous.current_layer != current.current_layer;

    if crossed {
        if let Some(total) = total_time {
            let advanced = (current.estimated_time + PERCENT_RESOLUTION * total).ceil();
            next.next_percent_threshold = advanced.max(current.next_percent_threshold);
        }
    }

    if crossed && options.use_machine_progress {
        if let Some(total) = total_time {
            let message = format!("M73 P{:.2}", percent_complete(current.estimated_time, total));
            if push_if_new(&mut lines, &mut next.last_progress_message, message) {
                tracing::trace!(
                    "Percent threshold crossed at {:.3}s, next at {:.3}s",
                    current.estimated_time,
                    next.next_percent_threshold
                );
            }
        }
    }

    if options.use_display_progress && (crossed || layer_changed) {
        let message = status_message(current, totals, options);
        push_if_new(&mut lines, &mut next.last_status_message, message);
    }

    Injection { lines, state: next }
}

fn percent_complete(elapsed: f64, total: f64) -> f64 {
    (elapsed * 100.0 / total).clamp(0.0, 100.0)
}

fn push_if_new(lines: &mut Vec<String>, memo: &mut Option<Arc<str>>, message: String) -> bool {
    if memo.as_deref() == Some(message.as_str()) {
        return false;
    }
    *memo = Some(Arc::from(message.as_str()));
    lines.push(message);
    true
}

/// Compose the `M117` line from the enabled fields
///
/// Field order is fixed: percentage, layer, elapsed, remaining. Fields that
/// need the total print time are left out when it is unknown.
pub fn status_message(
    state: &InterpreterState,
    totals: &JobTotals,
    options: &ProgressOptions,
) -> String {
    let total_time = totals.known_time();
    let mut message = String::from("M117");

    if options.show_progress_percent {
        if let Some(total) = total_time {
            message.push_str(&format!(
                " {:.1}%",
                percent_complete(state.estimated_time, total)
            ));
        }
    }

    if options.show_current_layer {
        let layer_total = totals
            .layer_count
            .filter(|count| *count > 0)
            .map_or_else(|| "?".to_string(), |count| count.to_string());
        message.push_str(&format!(" L{}/{}", state.displayed_layer(), layer_total));
    }

    if options.show_elapsed_time {
        message.push_str(&format!(" P{}", format_hours_minutes(state.estimated_time)));
    }

    if options.show_remaining_time {
        if let Some(total) = total_time {
            message.push_str(&format!(
                " E{}",
                format_hours_minutes(total - state.estimated_time)
            ));
        }
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_layer(layer: i32, estimated_time: f64) -> InterpreterState {
        InterpreterState {
            first_layer_seen: true,
            current_layer: Some(layer),
            estimated_time,
            ..InterpreterState::new()
        }
    }

    fn totals(time: Option<f64>, layers: Option<u32>) -> JobTotals {
        JobTotals {
            elapsed_time: time,
            layer_count: layers,
        }
    }

    #[test]
    fn test_format_hours_minutes() {
        assert_eq!(format_hours_minutes(0.0), "00-00");
        assert_eq!(format_hours_minutes(59.9), "00-00");
        assert_eq!(format_hours_minutes(3_725.0), "01-02");
        assert_eq!(format_hours_minutes(23.0 * 3600.0 + 59.0 * 60.0), "23-59");
        assert_eq!(format_hours_minutes(100.0 * 3600.0 + 5.0 * 60.0), "04-05");
        assert_eq!(format_hours_minutes(-30.0), "00-00");
        assert_eq!(format_hours_minutes(f64::NAN), "00-00");
    }

    #[test]
    fn test_nothing_before_first_layer() {
        let before = InterpreterState::new();
        let after = before.with_estimated_time(50.0);
        let injection = injectables(
            &before,
            &after,
            &totals(Some(100.0), Some(2)),
            &ProgressOptions::default(),
        );
        assert!(injection.lines.is_empty());
        assert_eq!(injection.state, after);
    }

    #[test]
    fn test_percent_crossing() {
        let before = in_layer(0, 0.0);
        let after = in_layer(0, 12.3);
        let injection = injectables(
            &before,
            &after,
            &totals(Some(100.0), Some(2)),
            &ProgressOptions::default(),
        );

        assert_eq!(injection.lines, vec!["M73 P12.30", "M117 L1/2 E00-01"]);
        assert_eq!(injection.state.next_percent_threshold, 13.0);
        assert_eq!(injection.state.last_progress_message.as_deref(), Some("M73 P12.30"));
        assert_eq!(injection.state.last_status_message.as_deref(), Some("M117 L1/2 E00-01"));
    }

    #[test]
    fn test_no_crossing_below_threshold() {
        let before = in_layer(0, 0.0);
        let after = InterpreterState {
            next_percent_threshold: 20.0,
            ..in_layer(0, 15.0)
        };
        let injection = injectables(
            &before,
            &after,
            &totals(Some(100.0), Some(2)),
            &ProgressOptions::default(),
        );
        assert!(injection.lines.is_empty());
        assert_eq!(injection.state.next_percent_threshold, 20.0);
    }

    #[test]
    fn test_layer_change_without_total_time() {
        let before = in_layer(0, 0.0);
        let after = in_layer(1, 0.0);
        let injection = injectables(
            &before,
            &after,
            &totals(None, None),
            &ProgressOptions::default(),
        );

        assert_eq!(injection.lines, vec!["M117 L2/?"]);
        assert_eq!(injection.state.next_percent_threshold, 0.0);
    }

    #[test]
    fn test_first_sentinel_counts_as_layer_change() {
        let before = InterpreterState::new();
        let after = in_layer(0, 0.0);
        let injection = injectables(
            &before,
            &after,
            &totals(None, Some(3)),
            &ProgressOptions::default(),
        );
        assert_eq!(injection.lines, vec!["M117 L1/3"]);
    }

    #[test]
    fn test_repeated_message_is_suppressed() {
        let before = InterpreterState {
            last_status_message: Some(Arc::from("M117 L2/?")),
            ..in_layer(0, 0.0)
        };
        let after = InterpreterState {
            last_status_message: before.last_status_message.clone(),
            ..in_layer(1, 0.0)
        };
        let injection = injectables(
            &before,
            &after,
            &totals(None, None),
            &ProgressOptions::default(),
        );
        assert!(injection.lines.is_empty());
    }

    #[test]
    fn test_all_fields() {
        let options = ProgressOptions {
            show_progress_percent: true,
            show_elapsed_time: true,
            ..ProgressOptions::default()
        };
        let state = in_layer(9, 4_000.0);
        let message = status_message(&state, &totals(Some(8_000.0), Some(20)), &options);
        assert_eq!(message, "M117 50.0% L10/20 P01-06 E01-06");
    }

    #[test]
    fn test_zero_layer_count_renders_unknown() {
        let state = in_layer(-1, 0.0);
        let message = status_message(&state, &totals(None, Some(0)), &ProgressOptions::default());
        assert_eq!(message, "M117 L0/?");
    }

    #[test]
    fn test_channels_disabled() {
        let options = ProgressOptions {
            use_machine_progress: false,
            use_display_progress: false,
            ..ProgressOptions::default()
        };
        let before = in_layer(0, 0.0);
        let after = in_layer(1, 50.0);
        let injection = injectables(&before, &after, &totals(Some(100.0), Some(2)), &options);
        assert!(injection.lines.is_empty());
        // threshold still advances
        assert_eq!(injection.state.next_percent_threshold, 51.0);
    }

    #[test]
    fn test_options_from_config() {
        let config = ProcessorConfig::new()
            .with_option(ProgressOptions::USE_MACHINE_PROGRESS, "false")
            .with_option(ProgressOptions::SHOW_ELAPSED_TIME, "true");
        let options = ProgressOptions::from_config("enrich_print_progress", &config).unwrap();
        assert!(!options.use_machine_progress);
        assert!(options.show_elapsed_time);
        assert!(options.show_remaining_time);

        let bad = ProcessorConfig::new().with_option(ProgressOptions::SHOW_CURRENT_LAYER, "maybe");
        assert!(ProgressOptions::from_config("enrich_print_progress", &bad).is_err());
    }
}
