// Benchmark for the enrichment and calibration passes
// Run with: cargo bench -p gcodepost-processing

use criterion::{criterion_group, criterion_main, Criterion};
use gcodepost_core::Job;
use gcodepost_processing::{enrich_job, JobProcessor, LinearAdvanceCalibration, ProgressOptions};

fn synthetic_job(layers: usize, moves_per_layer: usize) -> Job {
    let mut gcode = String::from(";FLAVOR:Marlin\nM82\nG92 E0\n");
    let mut e = 0.0;
    for layer in 0..layers {
        gcode.push_str(&format!(";LAYER:{}\n", layer));
        for i in 0..moves_per_layer {
            e += 0.05;
            gcode.push_str(&format!("G1 X{} Y{} E{:.5}\n", i % 200, (i * 7) % 200, e));
        }
        gcode.push_str(&format!(";TIME_ELAPSED:{}\n", (layer + 1) * 30));
    }
    Job::from_gcode(&gcode)
}

fn bench_enrich(c: &mut Criterion) {
    let job = synthetic_job(200, 500);
    let options = ProgressOptions::default();
    c.bench_function("enrich 200 layers x 500 moves", |b| {
        b.iter(|| {
            let enriched = enrich_job(job.clone(), &options);
            assert_eq!(enriched.len(), job.len());
        });
    });
}

fn bench_linear_advance(c: &mut Criterion) {
    let job = synthetic_job(200, 500);
    let processor = LinearAdvanceCalibration::new();
    c.bench_function("linear advance 200 layers x 500 moves", |b| {
        b.iter(|| {
            let processed = processor.process(job.clone()).unwrap();
            assert_eq!(processed.len(), job.len());
        });
    });
}

criterion_group!(benches, bench_enrich, bench_linear_advance);
criterion_main!(benches);
