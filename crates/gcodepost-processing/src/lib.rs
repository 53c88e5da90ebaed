//! # GCodePost Processing
//!
//! Post-processing passes over sliced FDM G-code.
//!
//! The main pass, [`EnrichPrintProgress`], estimates the print time of every
//! command by interpolating the slicer's per-layer time checkpoints along
//! extrusion, and injects `M73` (machine progress) and `M117` (display
//! message) commands. The calibration processors step a firmware parameter
//! every N layers to print calibration towers. All passes implement
//! [`JobProcessor`] and can be chained in a [`ProcessorPipeline`].

pub mod gcode;

pub use gcode::{
    enrich_job, AccelerationCalibration, CalibrationOptions, EnrichPrintProgress,
    InterpreterState, JobProcessor, JobTotals, LinearAdvanceCalibration, ProcessorConfig,
    ProcessorHandle, ProcessorPipeline, ProcessorRegistry, ProgressOptions,
    RetractLengthCalibration, RetractSpeedCalibration, SegmentSpeeds, SimulatePrint,
    TemperatureCalibration,
};
