//! Profiling tool comparing the flow backends

use std::time::Instant;

use terrain_flow::flow::{create_backend, FlowBackendKind, FlowParams};
use terrain_flow::heightmap::{generate, GenerationParams};
use terrain_flow::HeightField;

fn main() {
    env_logger::init();

    let exponent = std::env::args().nth(1).and_then(|a| a.parse().ok()).unwrap_or(9u32);
    let batches = 10;
    let ticks_per_batch = 10;

    let mut base = match HeightField::with_exponent(exponent) {
        Ok(field) => field,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };
    let size = base.size();

    println!("=== Flow Profiling ===");
    println!("Grid size: {}x{} ({} cells)", size, size, size * size);
    println!();

    let start = Instant::now();
    if let Err(e) = generate(&mut base, &GenerationParams { seed: 1337, ..GenerationParams::default() }) {
        eprintln!("{}", e);
        return;
    }
    base.init_water(64.0, 2.0);
    println!("Terrain generation: {:?}", start.elapsed());
    println!("Initial water: {:.2}", base.water_sum());
    println!();

    for kind in [FlowBackendKind::Sequential, FlowBackendKind::Parallel, FlowBackendKind::Gpu] {
        let mut backend = match create_backend(size, &FlowParams::with_backend(kind)) {
            Ok(backend) => backend,
            Err(e) => {
                println!("{:<10} skipped: {}", kind.to_string(), e);
                continue;
            }
        };

        let mut field = base.clone();
        let mut timings = Vec::with_capacity(batches);
        for _ in 0..batches {
            let start = Instant::now();
            if let Err(e) = backend.tick_n(&mut field, ticks_per_batch) {
                println!("{:<10} failed: {}", kind.to_string(), e);
                break;
            }
            timings.push(start.elapsed());
        }
        if timings.is_empty() {
            continue;
        }

        let total: f64 = timings.iter().map(|t| t.as_secs_f64()).sum();
        let best = timings.iter().min().copied().unwrap_or_default();
        println!(
            "{:<10} {:>8.3} ms/tick (best batch {:?}), water {:.2}",
            kind.to_string(),
            total * 1000.0 / (timings.len() * ticks_per_batch) as f64,
            best,
            field.water_sum()
        );
    }
}
