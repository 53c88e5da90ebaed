//! Whole-job totals gathered before the enrichment pass

use gcodepost_core::Job;

use super::fields::{block_layer_number, block_time_elapsed};

/// Job-wide totals used for percentages and remaining time
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JobTotals {
    /// Total print time in seconds, if any layer reports it
    pub elapsed_time: Option<f64>,
    /// Number of layers, if any layer sentinel is present
    pub layer_count: Option<u32>,
}

impl JobTotals {
    /// Scan a job for both totals
    pub fn scan(job: &Job) -> Self {
        Self {
            elapsed_time: total_elapsed_time(job),
            layer_count: total_layer_count(job),
        }
    }

    /// Total time usable as a divisor
    pub fn known_time(&self) -> Option<f64> {
        self.elapsed_time.filter(|t| *t > 0.0)
    }
}

/// Print time reported by the last layer that carries a checkpoint
///
/// Layers are scanned from the end so that a trailing block without a
/// checkpoint cannot hide the job-wide total.
pub fn total_elapsed_time(job: &Job) -> Option<f64> {
    job.layers()
        .iter()
        .rev()
        .find_map(|block| block_time_elapsed(block))
}

/// Last layer ordinal plus one
pub fn total_layer_count(job: &Job) -> Option<u32> {
    job.layers()
        .iter()
        .rev()
        .find_map(|block| block_layer_number(block))
        .and_then(|last| u32::try_from(i64::from(last) + 1).ok())
}
