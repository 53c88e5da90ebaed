//! G-code post-processing
//!
//! This module provides:
//! - Letter-coded field extraction
//! - Extrusion/layer state simulation
//! - Whole-job pre-scan (total time, layer count)
//! - Print progress estimation and enrichment
//! - Job processor framework
//! - Calibration and dry-run processors

pub mod calibration;
pub mod enrich;
pub mod fields;
pub mod linear_advance;
pub mod pipeline;
pub mod prescan;
pub mod progress;
pub mod simulate_print;
pub mod simulator;
pub mod state;

pub use calibration::{
    AccelerationCalibration, CalibrationOptions, CalibrationRamp, CalibrationSchedule,
    RampDirection, RetractLengthCalibration, RetractSpeedCalibration, TemperatureCalibration,
};
pub use enrich::{enrich_job, enrich_layer, EnrichPrintProgress, LayerOutcome};
pub use linear_advance::{LinearAdvanceCalibration, SegmentSpeeds};
pub use pipeline::*;
pub use prescan::{total_elapsed_time, total_layer_count, JobTotals};
pub use progress::{format_hours_minutes, injectables, status_message, Injection, ProgressOptions};
pub use simulate_print::SimulatePrint;
pub use simulator::{advance, simulate, LineKind};
pub use state::InterpreterState;
