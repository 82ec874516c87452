use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};

use terrain_flow::heightmap::{GenerationParams, GenerationPreset};
use terrain_flow::{
    export, persistence, FlowBackendKind, FlowSimulator, HeightField, SimulationConfig, TerrainGenerator,
    WaterBodyExtractor,
};

#[derive(Parser, Debug)]
#[command(name = "terrain_flow")]
#[command(about = "Generate fractal terrain and simulate water flowing over it")]
struct Args {
    /// JSON config; command line flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new terrain grid
    Generate {
        /// Output grid file
        #[arg(short, long, default_value = "terrain.bin")]
        output: PathBuf,

        /// Grid side is 2^k + 1
        #[arg(short = 'k', long)]
        size_exponent: Option<u32>,

        /// Random seed (uses random seed if not specified and no config is given)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Roughness preset, overridden by --amplitude / --decay
        #[arg(short, long, value_enum)]
        preset: Option<GenerationPreset>,

        #[arg(long)]
        amplitude: Option<f32>,

        #[arg(long)]
        decay: Option<f32>,

        /// Keep raw heights instead of rescaling to 0..255
        #[arg(long)]
        no_normalize: bool,

        /// Rain onto cells above the configured height after generating
        #[arg(long)]
        rain: bool,

        /// Also write a PNG preview
        #[arg(long)]
        png: Option<PathBuf>,
    },

    /// Run the flow simulation on a saved grid
    Simulate {
        input: PathBuf,

        /// Output grid file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value = "100")]
        ticks: usize,

        #[arg(short, long, value_enum)]
        backend: Option<FlowBackendKind>,

        /// Worker threads for the parallel backend (0 = all cores)
        #[arg(long)]
        threads: Option<usize>,

        /// Rain before simulating
        #[arg(long)]
        rain: bool,

        #[arg(long)]
        png: Option<PathBuf>,
    },

    /// List the water bodies in a saved grid
    Extract {
        input: PathBuf,

        /// Level difference allowed within one body
        #[arg(long)]
        tolerance: Option<f32>,
    },

    /// Print grid statistics
    Info { input: PathBuf },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> terrain_flow::Result<()> {
    let has_config = args.config.is_some();
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };

    match args.command {
        Command::Generate { output, size_exponent, seed, preset, amplitude, decay, no_normalize, rain, png } => {
            if let Some(k) = size_exponent {
                config.size_exponent = k;
            }
            if let Some(preset) = preset {
                println!("Preset: {} ({})", preset, preset.description());
                config.generation = GenerationParams::from_preset(preset, config.generation.seed);
            }
            config.generation.seed = match seed {
                Some(s) => s,
                None if has_config => config.generation.seed,
                None => rand::random(),
            };
            if let Some(a) = amplitude {
                config.generation.amplitude = a;
            }
            if let Some(d) = decay {
                config.generation.amplitude_decay = d;
            }
            if no_normalize {
                config.generation.normalize = false;
            }
            config.validate()?;

            let mut field = HeightField::with_exponent(config.size_exponent)?;
            println!("Generating terrain with seed: {}", config.generation.seed);
            println!("Grid size: {}x{}", field.size(), field.size());

            let start = Instant::now();
            let stats = TerrainGenerator::new(config.generation.clone())?.generate(&mut field)?;
            println!("Generated in {:?}, raw range {:.1} to {:.1}", start.elapsed(), stats.min, stats.max);

            if rain {
                field.init_water(config.water.min_height, config.water.amount);
                println!("Rained {:.1} units of water", field.water_sum());
            }

            persistence::save(&field, &output)?;
            println!("Saved grid: {}", output.display());
            if let Some(png) = png {
                export::export_preview(&field, &png)?;
                println!("Saved preview: {}", png.display());
            }
        }

        Command::Simulate { input, output, ticks, backend, threads, rain, png } => {
            if let Some(b) = backend {
                config.flow.backend = b;
            }
            if let Some(t) = threads {
                config.flow.threads = t;
            }

            let mut field = persistence::load(&input)?;
            if rain {
                field.init_water(config.water.min_height, config.water.amount);
            }
            let mut sim = FlowSimulator::new(field.size(), &config.flow)?;
            println!("Simulating {} ticks on {}x{} grid ({} backend)", ticks, field.size(), field.size(), sim.backend_name());

            let before = field.water_sum();
            let start = Instant::now();
            let stats = sim.tick_n(&mut field, ticks)?;
            let elapsed = start.elapsed();
            let after = field.water_sum();

            println!("Done in {:?} ({:.3} ms/tick)", elapsed, elapsed.as_secs_f64() * 1000.0 / ticks.max(1) as f64);
            println!("  Water: {:.4} -> {:.4} (clamped {:.6} in {} cells)", before, after, stats.clamped_mass, stats.clamped_cells);
            println!("  Moving cell-ticks: {}", stats.moving_cells);

            let output = output.unwrap_or(input);
            persistence::save(&field, &output)?;
            println!("Saved grid: {}", output.display());
            if let Some(png) = png {
                export::export_preview(&field, &png)?;
                println!("Saved preview: {}", png.display());
            }
        }

        Command::Extract { input, tolerance } => {
            if let Some(t) = tolerance {
                config.extraction.level_tolerance = t;
            }
            let field = persistence::load(&input)?;
            let mut extractor = WaterBodyExtractor::new(config.extraction.clone(), config.mesh.clone());

            let start = Instant::now();
            let found = extractor.extract(&field);
            let stats = found.stats();
            println!("Found {} water bodies in {:?}", stats.body_count, start.elapsed());
            println!("  Wet cells: {} (largest body {}, {} single cells)", stats.wet_cells, stats.largest_body, stats.single_cell_bodies);
            println!("  Triangles: {}", stats.triangles);

            let mut bodies: Vec<_> = found.bodies.iter().collect();
            bodies.sort_by(|a, b| b.cell_count().cmp(&a.cell_count()));
            for body in bodies.iter().take(20) {
                println!(
                    "  #{:<4} {:>6} cells  level {:>7.2}  volume {:>9.3}  {}x{} at ({}, {})  {} outline cells",
                    body.id.0,
                    body.cell_count(),
                    body.surface_level,
                    body.volume,
                    body.width(),
                    body.height(),
                    body.bounds.0,
                    body.bounds.1,
                    body.outline.len()
                );
            }
            if bodies.len() > 20 {
                println!("  ... and {} more", bodies.len() - 20);
            }
        }

        Command::Info { input } => {
            let field = persistence::load(&input)?;
            let stats = field.stats();
            println!("Grid: {}x{} ({} cells)", stats.size, stats.size, field.cell_count());
            println!("Height range: {:.2} to {:.2}", stats.min_height, stats.max_height);
            println!(
                "Water: {:.4} total, {} wet cells ({:.1}%), deepest {:.4}",
                stats.total_water,
                stats.wet_cells,
                100.0 * stats.wet_cells as f64 / field.cell_count() as f64,
                stats.max_water
            );
        }
    }

    Ok(())
}
