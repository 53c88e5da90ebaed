//! Simulated printer state for progress estimation
//!
//! [`InterpreterState`] is a value type. The simulator and the progress
//! estimator take a shared reference and hand back a new snapshot, so a
//! speculative run over a whole layer can never leak into the timeline the
//! driver is walking. Clones are cheap: the only heap data are the two
//! message memos, held as `Arc<str>`.

use std::sync::Arc;

/// Snapshot of the simulated printer after some prefix of the job
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterState {
    /// Extrusion mode (M82/G90 = absolute, M83/G91 = relative)
    pub extrusion_absolute: bool,
    /// Raw E reference as the firmware sees it
    pub raw_extrusion_origin: f64,
    /// Filament fed since the start of the job; only differences are meaningful
    pub cumulative_extrusion: f64,
    /// Ordinal of the last `;LAYER:` sentinel, unset before the first one
    pub current_layer: Option<i32>,
    /// Set once the first layer sentinel has been seen; gates all output
    pub first_layer_seen: bool,
    /// Last cumulative print time reported by the slicer (seconds)
    pub checkpoint_time: f64,
    /// Interpolated print time as of the current command (seconds)
    pub estimated_time: f64,
    /// Estimated time that must be exceeded before the next percent report
    pub next_percent_threshold: f64,
    /// Last machine progress line emitted (M73)
    pub last_progress_message: Option<Arc<str>>,
    /// Last display line emitted (M117)
    pub last_status_message: Option<Arc<str>>,
}

impl Default for InterpreterState {
    fn default() -> Self {
        Self {
            extrusion_absolute: true,
            raw_extrusion_origin: 0.0,
            cumulative_extrusion: 0.0,
            current_layer: None,
            first_layer_seen: false,
            checkpoint_time: 0.0,
            estimated_time: 0.0,
            next_percent_threshold: 0.0,
            last_progress_message: None,
            last_status_message: None,
        }
    }
}

impl InterpreterState {
    /// State at the start of a job
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer number as shown to the user (1-based)
    pub fn displayed_layer(&self) -> i64 {
        i64::from(self.current_layer.unwrap_or(0)) + 1
    }

    /// Filament fed between `earlier` and this snapshot
    pub fn extrusion_since(&self, earlier: &InterpreterState) -> f64 {
        self.cumulative_extrusion - earlier.cumulative_extrusion
    }

    /// Snapshot with the time estimate replaced
    pub fn with_estimated_time(&self, estimated_time: f64) -> Self {
        Self {
            estimated_time,
            ..self.clone()
        }
    }

    /// Snapshot committed at a layer boundary
    ///
    /// Both the checkpoint and the running estimate snap to the time the
    /// slicer reported for the end of the layer, discarding any drift the
    /// interpolation accumulated.
    pub fn at_checkpoint(&self, checkpoint_time: f64) -> Self {
        Self {
            checkpoint_time,
            estimated_time: checkpoint_time,
            ..self.clone()
        }
    }

    /// Human-readable extrusion mode
    pub fn extrusion_mode_description(&self) -> &'static str {
        if self.extrusion_absolute {
            "Absolute extrusion (M82)"
        } else {
            "Relative extrusion (M83)"
        }
    }
}
