//! Print progress enrichment
//!
//! Walks the job layer by layer, interpolating the print time of every
//! command from the extrusion it performs, and inserts `M73`/`M117` progress
//! commands where the estimate crosses a percent step or the layer changes.

use gcodepost_core::{Job, ProcessingError};

use super::fields::{block_layer_number, block_time_elapsed, carriage_return, layer_number};
use super::pipeline::{JobProcessor, ProcessorConfig};
use super::prescan::JobTotals;
use super::progress::{injectables, ProgressOptions};
use super::simulator::{advance, simulate};
use super::state::InterpreterState;

/// Every command among the first lines of a layer is sampled
const SAMPLE_HEAD: usize = 10;
/// After the head, every n-th command is sampled
const SAMPLE_STRIDE: usize = 10;

/// Whether progress is evaluated after the command at `index`
fn is_sampled(index: usize) -> bool {
    index < SAMPLE_HEAD || index % SAMPLE_STRIDE == 0
}

/// Result of enriching one layer block
#[derive(Debug, Clone, PartialEq)]
pub struct LayerOutcome {
    /// Rewritten block text
    pub text: String,
    /// Snapshot to start the next block from
    pub state: InterpreterState,
}

/// Append injected lines after the last output line
///
/// After the empty segment that follows a block's final newline they go in
/// front of it instead, so the block still ends with a newline.
fn push_injected(output: &mut Vec<String>, injected: Vec<String>, cr: &str, at_tail: bool) {
    if injected.is_empty() {
        return;
    }
    let tail = if at_tail {
        output.pop_if(|line| line.is_empty())
    } else {
        None
    };
    output.extend(injected.into_iter().map(|line| line + cr));
    output.extend(tail);
}

/// Enrich a single layer block starting from `state`
pub fn enrich_layer(
    block: &str,
    state: &InterpreterState,
    totals: &JobTotals,
    options: &ProgressOptions,
) -> LayerOutcome {
    if options.interpolate_by_extrusion {
        enrich_layer_interpolated(block, state, totals, options)
    } else {
        enrich_layer_granular(block, state, totals, options)
    }
}

fn enrich_layer_interpolated(
    block: &str,
    state: &InterpreterState,
    totals: &JobTotals,
    options: &ProgressOptions,
) -> LayerOutcome {
    let lines: Vec<&str> = block.split('\n').collect();
    let cr = carriage_return(block);
    let layer_start_time = state.checkpoint_time;
    let checkpoint = block_time_elapsed(block);
    let layer_end_time = checkpoint.unwrap_or(layer_start_time);
    let layer_duration = layer_end_time - layer_start_time;
    let layer_extrusion = simulate(state, lines.iter().copied()).extrusion_since(state);
    let interpolate = checkpoint.is_some() && layer_extrusion != 0.0;

    tracing::trace!(
        "Layer block: {} lines, {:.3}s, {:.5} extrusion",
        lines.len(),
        layer_duration,
        layer_extrusion
    );

    let mut output = Vec::with_capacity(lines.len() + 4);
    let mut current = state.clone();

    for (index, line) in lines.iter().enumerate() {
        let mut after = advance(&current, line);
        if interpolate {
            let fed = after.extrusion_since(state);
            after.estimated_time = layer_start_time + layer_duration * fed / layer_extrusion;
        }

        output.push((*line).to_string());

        if is_sampled(index) {
            let injection = injectables(&current, &after, totals, options);
            let at_tail = index + 1 == lines.len();
            push_injected(&mut output, injection.lines, cr, at_tail);
            after = injection.state;
        }

        current = after;
    }

    LayerOutcome {
        text: output.join("\n"),
        state: current.at_checkpoint(layer_end_time),
    }
}

/// One evaluation per layer, right after its sentinel
fn enrich_layer_granular(
    block: &str,
    state: &InterpreterState,
    totals: &JobTotals,
    options: &ProgressOptions,
) -> LayerOutcome {
    let lines: Vec<&str> = block.split('\n').collect();
    let layer_end_time = block_time_elapsed(block).unwrap_or(state.checkpoint_time);

    let mut entered = state.with_estimated_time(state.checkpoint_time);
    if let Some(layer) = block_layer_number(block) {
        entered.first_layer_seen = true;
        entered.current_layer = Some(layer);
    }

    let injection = injectables(state, &entered, totals, options);
    let insert_at = lines
        .iter()
        .position(|line| layer_number(line).is_some())
        .map_or(0, |pos| pos + 1);

    let mut output: Vec<String> = Vec::with_capacity(lines.len() + injection.lines.len());
    output.extend(lines[..insert_at].iter().map(|line| line.to_string()));
    let cr = carriage_return(block);
    output.extend(injection.lines.into_iter().map(|line| line + cr));
    output.extend(lines[insert_at..].iter().map(|line| line.to_string()));

    let finished = simulate(&injection.state, lines.iter().copied());

    LayerOutcome {
        text: output.join("\n"),
        state: finished.at_checkpoint(layer_end_time),
    }
}

/// Enrich a whole job
pub fn enrich_job(job: Job, options: &ProgressOptions) -> Job {
    let totals = JobTotals::scan(&job);
    tracing::debug!(
        "Job totals: time={:?} layers={:?}",
        totals.elapsed_time,
        totals.layer_count
    );

    let mut state = InterpreterState::new();
    let layers = job
        .into_layers()
        .into_iter()
        .map(|block| {
            let outcome = enrich_layer(&block, &state, &totals, options);
            state = outcome.state;
            outcome.text
        })
        .collect::<Vec<_>>();

    if !state.first_layer_seen {
        tracing::warn!("No layer sentinel found; job left without progress commands");
    }

    Job::new(layers)
}

/// Processor that injects print progress commands
#[derive(Debug, Clone)]
pub struct EnrichPrintProgress {
    config: ProcessorConfig,
    options: ProgressOptions,
}

impl EnrichPrintProgress {
    pub const NAME: &'static str = "enrich_print_progress";
    pub const OPTIONS: &'static [&'static str] = ProgressOptions::KEYS;

    /// Processor with the default options
    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::new(),
            options: ProgressOptions::default(),
        }
    }

    /// Processor configured from key/value options
    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ProcessingError> {
        config.check_options(Self::NAME, Self::OPTIONS)?;
        Ok(Self {
            config: config.clone(),
            options: ProgressOptions::from_config(Self::NAME, config)?,
        })
    }

    /// Processor with explicit options
    pub fn with_options(options: ProgressOptions) -> Self {
        Self {
            config: ProcessorConfig::new(),
            options,
        }
    }

    pub fn options(&self) -> &ProgressOptions {
        &self.options
    }
}

impl Default for EnrichPrintProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProcessor for EnrichPrintProgress {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Adds M73/M117 print progress commands with per-command time estimates"
    }

    fn process(&self, job: Job) -> Result<Job, ProcessingError> {
        Ok(enrich_job(job, &self.options))
    }

    fn option_keys(&self) -> &'static [&'static str] {
        Self::OPTIONS
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_cadence() {
        assert!((0..10).all(is_sampled));
        assert!(!is_sampled(11));
        assert!(!is_sampled(19));
        assert!(is_sampled(20));
        assert!(is_sampled(100));
    }

    #[test]
    fn test_preamble_is_untouched() {
        let job = Job::new(vec![
            ";FLAVOR:Marlin\nG28\nG1 E5\n".to_string(),
            ";LAYER:0\nG1 X1 E10\n;TIME_ELAPSED:10\n".to_string(),
        ]);
        let enriched = enrich_job(job, &ProgressOptions::default());
        assert_eq!(enriched.layers()[0], ";FLAVOR:Marlin\nG28\nG1 E5\n");
    }

    #[test]
    fn test_interpolated_time_is_linear_in_extrusion() {
        let totals = JobTotals {
            elapsed_time: Some(100.0),
            layer_count: Some(1),
        };
        let options = ProgressOptions {
            use_display_progress: false,
            ..ProgressOptions::default()
        };
        let block = ";LAYER:0\nG1 E25\nG1 E50\nG1 E100\n;TIME_ELAPSED:100";
        let outcome = enrich_layer(block, &InterpreterState::new(), &totals, &options);

        assert_eq!(
            outcome.text,
            concat!(
                ";LAYER:0\nG1 E25\nM73 P25.00\n",
                "G1 E50\nM73 P50.00\n",
                "G1 E100\nM73 P100.00\n",
                ";TIME_ELAPSED:100",
            )
        );
        assert_eq!(outcome.state.checkpoint_time, 100.0);
        assert_eq!(outcome.state.estimated_time, 100.0);
    }

    #[test]
    fn test_layer_without_extrusion_keeps_time() {
        let totals = JobTotals {
            elapsed_time: Some(100.0),
            layer_count: Some(2),
        };
        let start = InterpreterState {
            checkpoint_time: 40.0,
            estimated_time: 40.0,
            next_percent_threshold: 41.0,
            first_layer_seen: true,
            current_layer: Some(0),
            ..InterpreterState::new()
        };
        let block = ";LAYER:1\nG0 X10\n;TIME_ELAPSED:60";
        let outcome = enrich_layer(block, &start, &totals, &ProgressOptions::default());

        assert_eq!(outcome.text, ";LAYER:1\nM117 L2/2 E00-01\nG0 X10\n;TIME_ELAPSED:60");
        assert_eq!(outcome.state.checkpoint_time, 60.0);
    }

    #[test]
    fn test_granular_mode_inserts_after_sentinel() {
        let options = ProgressOptions {
            interpolate_by_extrusion: false,
            use_machine_progress: false,
            ..ProgressOptions::default()
        };
        let job = Job::new(vec![
            "G28\n".to_string(),
            ";LAYER:0\nG1 E5\n;TIME_ELAPSED:1800\n".to_string(),
            ";LAYER:1\nG1 E10\n;TIME_ELAPSED:3600\n".to_string(),
        ]);
        let enriched = enrich_job(job, &options);

        assert_eq!(enriched.layers()[0], "G28\n");
        assert_eq!(
            enriched.layers()[1],
            ";LAYER:0\nM117 L1/2 E01-00\nG1 E5\n;TIME_ELAPSED:1800\n"
        );
        assert_eq!(
            enriched.layers()[2],
            ";LAYER:1\nM117 L2/2 E00-30\nG1 E10\n;TIME_ELAPSED:3600\n"
        );
    }

    #[test]
    fn test_crlf_blocks_keep_their_line_endings() {
        let job = Job::new(vec![
            ";LAYER:0\r\nG1 X10 E1\r\n;TIME_ELAPSED:10.0\r\n".to_string(),
            ";LAYER:1\r\nG1 X20 E2\r\n;TIME_ELAPSED:20.0\r\n".to_string(),
        ]);
        let enriched = enrich_job(job, &ProgressOptions::default());

        assert_eq!(
            enriched.layers()[0],
            concat!(
                ";LAYER:0\r\nM117 L1/2 E00-00\r\n",
                "G1 X10 E1\r\nM73 P50.00\r\n",
                ";TIME_ELAPSED:10.0\r\n",
            )
        );
        assert!(!enriched.to_gcode().replace("\r\n", "").contains('\n'));

        let granular = ProgressOptions {
            interpolate_by_extrusion: false,
            ..ProgressOptions::default()
        };
        let block = ";LAYER:0\r\nG1 X10 E1\r\n;TIME_ELAPSED:10.0\r\n";
        let job = Job::new(vec![block.to_string()]);
        let enriched = enrich_job(job, &granular);
        assert!(!enriched.to_gcode().replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn test_report_on_final_segment_keeps_block_newline() {
        let totals = JobTotals {
            elapsed_time: Some(100.0),
            layer_count: Some(1),
        };
        let options = ProgressOptions {
            use_display_progress: false,
            ..ProgressOptions::default()
        };
        let mut block = String::from(";LAYER:0\n");
        for i in 1..=18 {
            block.push_str(&format!("G1 X{0} E{0}\n", i));
        }
        block.push_str(";TIME_ELAPSED:100\n");

        // the last crossing happens at an unsampled command and is reported
        // at index 20, the empty segment after the final newline
        let outcome = enrich_layer(&block, &InterpreterState::new(), &totals, &options);
        assert!(outcome.text.ends_with(";TIME_ELAPSED:100\nM73 P100.00\n"));
    }

    #[test]
    fn test_processor_from_config() {
        let config = ProcessorConfig::new().with_option("use_machine_progress", "0");
        let processor = EnrichPrintProgress::from_config(&config).unwrap();
        assert_eq!(processor.name(), "enrich_print_progress");
        assert!(!processor.options().use_machine_progress);
        assert!(processor.is_enabled());
        assert_eq!(processor.option_keys(), ProgressOptions::KEYS);

        let misspelled = ProcessorConfig::new().with_option("show_remaning_time", "false");
        assert!(matches!(
            EnrichPrintProgress::from_config(&misspelled),
            Err(ProcessingError::InvalidOption { .. })
        ));
    }
}
