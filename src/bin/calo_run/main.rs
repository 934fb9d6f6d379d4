//! # Calorimeter Stack Run
//!
//! Build the layer stack, fire the configured particle gun, and record
//! per-layer energies and tracker hit positions.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin calo_run -- --events 1000
//! cargo run --release --bin calo_run -- --config run.json --workers 4
//! cargo run --release --bin calo_run -- --layers 0 --format csv --output data/output.csv
//! ```

mod report;
mod synthetic;

use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use calo_engine::sink::OutputFormat;
use calo_engine::source::ParticleGun;
use calo_engine::{RunConfig, RunController, RunError};
use report::{print_summary, write_report, RunReport};
use synthetic::SyntheticTransport;

/// Calorimeter stack run driver
#[derive(Parser, Debug)]
#[command(name = "calo_run")]
#[command(about = "Record per-layer energy and tracker hits for a layered detector stack")]
struct Args {
    /// JSON run configuration (missing fields take defaults)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Number of events to process
    #[arg(long, short = 'n')]
    events: Option<u64>,

    /// Number of absorber/detector pairs
    #[arg(long, short = 'l')]
    layers: Option<u32>,

    /// Output artifact path
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Output format: json or csv
    #[arg(long)]
    format: Option<String>,

    /// Independent workers merged at run end
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// Primary particle name (e-, mu+, mu-, proton)
    #[arg(long)]
    particle: Option<String>,

    /// Primary energy in MeV
    #[arg(long)]
    energy: Option<f64>,

    /// Seed for the synthetic hit generator
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Mean hits per crossed sensitive layer
    #[arg(long, default_value = "2.0")]
    mean_hits: f64,

    /// Also write the run summary as JSON
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn build_config(args: &Args) -> Result<RunConfig, RunError> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_json_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(events) = args.events {
        config.events = events;
    }
    if let Some(layers) = args.layers {
        config.geometry.absorber_layers = layers;
    }
    if let Some(output) = &args.output {
        config.output.path = output.clone();
    }
    if let Some(format) = &args.format {
        config.output.format = match format.to_lowercase().as_str() {
            "csv" => OutputFormat::Csv,
            "json" => OutputFormat::Json,
            other => {
                return Err(calo_engine::run::ConfigError::Invalid(format!(
                    "unknown output format {:?}",
                    other
                ))
                .into())
            }
        };
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(particle) = &args.particle {
        config.gun.particle = particle.clone();
    }
    if let Some(energy) = args.energy {
        config.gun.energy = energy;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<(), RunError> {
    let config = build_config(args)?;

    println!("\n  Calorimeter Stack Run");
    println!(
        "  Events: {} | Absorber layers: {} | Particle: {} @ {} MeV | Workers: {}",
        config.events,
        config.geometry.absorber_layers,
        config.gun.particle,
        config.gun.energy,
        config.workers
    );
    println!("  PRNG: ChaCha8Rng | Seed: {}\n", args.seed);

    let start = Instant::now();
    let controller = RunController::new(config.clone())?;
    let layer_names: Vec<String> = controller
        .layout()
        .sensitive_layers()
        .map(|l| l.name.clone())
        .collect();

    let summary = if config.workers > 1 {
        drop(controller);
        let gun_config = config.gun.clone();
        let (seed, mean_hits) = (args.seed, args.mean_hits);
        RunController::run_parallel(config, move |_worker, first_event| {
            let mut gun = ParticleGun::new(gun_config.clone());
            gun.skip(first_event);
            (gun, SyntheticTransport::new(seed, mean_hits))
        })?
    } else {
        let mut gun = ParticleGun::new(config.gun.clone());
        let mut transport = SyntheticTransport::new(args.seed, args.mean_hits);
        controller.run(&mut gun, &mut transport)?
    };

    print_summary(&summary, &layer_names);
    println!("  Elapsed: {:.1} ms\n", start.elapsed().as_secs_f64() * 1000.0);

    if let Some(path) = &args.summary {
        let report = RunReport {
            version: env!("CARGO_PKG_VERSION"),
            prng: "ChaCha8Rng",
            seed: args.seed,
            summary: &summary,
        };
        write_report(path, &report).map_err(calo_engine::sink::SinkError::from)?;
        println!("  Summary saved to: {}\n", path.display());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        log::error!("run aborted: {}", e);
        std::process::exit(1);
    }
}
