//! Registry-built pipelines over a small sliced job

use gcodepost_core::{Job, ProcessingError};
use gcodepost_processing::{ProcessorConfig, ProcessorRegistry};

const SLICED: &str = "\
;FLAVOR:Marlin
;LAYER_COUNT:4
M140 S60
M104 S210
M190 S60
M109 S210
M82
G92 E0
;LAYER:0
G1 F1200 X10 Y10 E0.5
G1 X20 Y10 E1.0
;TIME_ELAPSED:30
;LAYER:1
G1 X20 Y30 E2.0
G10
G11
;TIME_ELAPSED:60
;LAYER:2
G1 X40 Y30 E3.0
;TIME_ELAPSED:90
;LAYER:3
G1 X40 Y40 E3.5
;TIME_ELAPSED:120
M104 S0
";

#[test]
fn test_temperature_tower_every_two_layers() {
    let registry = ProcessorRegistry::with_defaults();
    let config = ProcessorConfig::new()
        .with_option("start", "215")
        .with_option("every_layers", "2")
        .with_option("show_on_display", "false");
    let pipeline = registry
        .create_pipeline([("temperature_calibration", &config)])
        .unwrap();

    let processed = pipeline.process_job(Job::from_gcode(SLICED)).unwrap();
    let gcode = processed.to_gcode();

    assert!(gcode.contains(";LAYER:0\nM104 S215\nG1 F1200"));
    assert!(gcode.contains(";LAYER:1\nG1 X20 Y30"));
    assert!(gcode.contains(";LAYER:2\nM104 S210\nG1 X40 Y30"));
    assert!(!gcode.contains("M117"));
}

#[test]
fn test_dry_run_then_progress() {
    let registry = ProcessorRegistry::with_defaults();
    let simulate = ProcessorConfig::new();
    let enrich = ProcessorConfig::new().with_option("show_progress_percent", "true");
    let pipeline = registry
        .create_pipeline([
            ("simulate_print", &simulate),
            ("enrich_print_progress", &enrich),
        ])
        .unwrap();

    let job = Job::from_gcode(SLICED);
    let blocks = job.len();
    let processed = pipeline.process_job(job).unwrap();
    let gcode = processed.to_gcode();

    assert_eq!(processed.len(), blocks);
    assert!(gcode.contains(";M140 S60\n;M104 S210\n;M190 S60\n;M109 S210\n"));
    assert!(gcode.contains(";G10\n;G11\n"));
    assert!(gcode.contains("G1 X20 Y10 E0\n"));

    // no extrusion left, so progress advances at layer granularity only
    assert!(gcode.contains(";LAYER:0\nM117 0.0% L1/4 E00-02\n"));
    assert!(gcode.contains(";LAYER:1\nM73 P25.00\nM117 25.0% L2/4 E00-01\n"));
}

#[test]
fn test_acceleration_tower() {
    let registry = ProcessorRegistry::with_defaults();
    let config = ProcessorConfig::new().with_option("step_size", "100");
    let pipeline = registry
        .create_pipeline([("acceleration_calibration", &config)])
        .unwrap();

    let processed = pipeline.process_job(Job::from_gcode(SLICED)).unwrap();
    let gcode = processed.to_gcode();

    assert!(gcode.contains(";LAYER_COUNT:4\nM201 X5000 Y5000 ;override\n"));
    assert!(gcode.contains(";LAYER:0\nM204 T50 P50 ;override\nM117 Acceleration - 50\n"));
    assert!(gcode.contains(";LAYER:3\nM204 T350 P350 ;override\nM117 Acceleration - 350\n"));
}

#[test]
fn test_linear_advance_summary_per_block() {
    let registry = ProcessorRegistry::with_defaults();
    let pipeline = registry
        .create_pipeline([("linear_advance_calibration", &ProcessorConfig::new())])
        .unwrap();

    let processed = pipeline.process_job(Job::from_gcode(SLICED)).unwrap();

    for block in processed.layers() {
        assert!(block.contains(";Longest move: "));
        assert!(block.contains(";Second long move: "));
    }
    // layer 0 is skipped by default
    assert!(processed.layers()[1].contains(";Longest move: 0.000 ;---"));
    assert!(processed.layers()[2].starts_with(";LAYER:1\nM900 K0.002\nM117 K-factor - 0.002\n"));
    assert!(processed.layers()[2].contains(";Longest move: 20.000 G1 X20 Y30 E2.0"));
}

#[test]
fn test_unknown_processor_in_pipeline() {
    let registry = ProcessorRegistry::with_defaults();
    let config = ProcessorConfig::new();
    let err = registry
        .create_pipeline([("pressure_advance", &config)])
        .err()
        .unwrap();
    assert!(matches!(err, ProcessingError::UnknownProcessor { .. }));
}

#[test]
fn test_invalid_option_value() {
    let registry = ProcessorRegistry::with_defaults();
    let config = ProcessorConfig::new().with_option("start", "hot");
    let err = registry
        .create("temperature_calibration", &config)
        .err()
        .unwrap();
    assert!(matches!(err, ProcessingError::InvalidOption { ref key, .. } if key == "start"));
}
