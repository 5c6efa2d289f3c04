use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::{Path, PathBuf};

use platoon_sim::simulation::{ControlLaw, SimConfig, SimWorld};

#[derive(Parser)]
#[command(name = "platoon_sim")]
#[command(about = "Headless platoon simulation on a circular multi-lane road")]
struct Cli {
    /// TOML file with simulation parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of simulation ticks to run
    #[arg(long, default_value = "600")]
    ticks: u64,

    /// Control law override (ACC, BCC or ACC+BCC)
    #[arg(long)]
    law: Option<String>,

    /// Vehicle count override
    #[arg(long)]
    vehicles: Option<usize>,

    /// Time delta per tick in seconds
    #[arg(long)]
    dt: Option<f64>,

    /// Seed for the initial velocity jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Assert the lead stop flag at this simulated time in seconds
    #[arg(long)]
    stop_lead_at: Option<f64>,

    /// Run every control law side by side on the same configuration
    #[arg(long)]
    compare: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,platoon_sim=info"),
    )
    .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if cli.compare {
        for law in ControlLaw::ALL {
            let config = SimConfig { law, ..config.clone() };
            run_headless(config, cli.ticks, cli.stop_lead_at)?;
            println!();
        }
    } else {
        run_headless(config, cli.ticks, cli.stop_lead_at)?;
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<SimConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse config file {}", path.display()))
}

fn build_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SimConfig::default(),
    };
    if let Some(law) = &cli.law {
        config.law = law.parse()?;
    }
    if let Some(vehicles) = cli.vehicles {
        config.vehicle_count = vehicles;
    }
    if let Some(dt) = cli.dt {
        config.dt = dt;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    Ok(config)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(config: SimConfig, ticks: u64, stop_lead_at: Option<f64>) -> Result<()> {
    let dt = config.dt;
    let mut world = SimWorld::new(config).context("Failed to initialize simulation")?;

    println!("Initial state:");
    world.print_summary();
    println!();

    // Report once per simulated second
    let ticks_per_second = ((1.0 / dt).ceil() as u64).max(1);
    let mut lead_stopped = false;
    for tick in 1..=ticks {
        if let Some(at) = stop_lead_at {
            if !lead_stopped && world.time() >= at {
                info!("Stopping lead vehicles at t={:.2}s", world.time());
                world.set_lead_stop(true);
                lead_stopped = true;
            }
        }

        world.tick().with_context(|| format!("Tick {} failed", tick))?;

        if tick % ticks_per_second == 0 {
            info!(
                "t={:.1}s energy={:.4} kWh collisions={}",
                world.time(),
                world.total_energy_kwh(),
                world.collision_count()
            );
        }
    }

    println!("=== Final State ===");
    world.print_summary();
    Ok(())
}
