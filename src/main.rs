//! CLI Entry Point for rig_fluidics
//!
//! Runs the dispensing primitives and cleaning routines against the pumps declared in
//! the rig configuration. Pump kinds without a hardware driver run as simulated pumps,
//! which makes every command usable as a dry run.
//!
//! # Usage
//!
//! ```bash
//! rig_fluidics --config config/rig.toml pumps
//! rig_fluidics dispense silver=2 gold=3 reductant=1 --parallel
//! rig_fluidics preflush
//! rig_fluidics clean
//! rig_fluidics finishing-clean silver gold
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rig_fluidics::{
    tracing_init, DispenseRequest, DispenseScheduler, ProtocolLibrary, PumpFactories,
    PumpRegistry, RigConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "rig_fluidics")]
#[command(about = "Pump dispensing and cleaning routines for the fluidics rig", long_about = None)]
struct Cli {
    /// Rig configuration file
    #[arg(long, default_value = "config/rig.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered pumps
    Pumps,

    /// Print the effective configuration
    ShowConfig,

    /// Dispense reagents, given as PUMP=ML or PUMP=ML:SOURCE:DEST
    Dispense {
        /// Requests in dispense order
        #[arg(required = true)]
        requests: Vec<DispenseRequest>,

        /// Aspirate on all pumps at once
        #[arg(long)]
        parallel: bool,

        /// With --parallel, deliver one pump at a time in listed order
        #[arg(long, requires = "parallel")]
        ordered: bool,
    },

    /// Regia purge followed by UV/IR line cleaning
    Clean,

    /// Purge vial and UV/IR line with aqua regia
    RegiaPurge,

    /// Rinse the UV/IR lines
    UvClean,

    /// Clear leftover reagent from the named pumps
    FinishingClean {
        /// Pumps to clear
        #[arg(required = true)]
        pumps: Vec<String>,
    },

    /// Halve the sample in the vial
    Dilute,

    /// Prime every reagent line with the standard preflush set
    Preflush,

    /// Re-flush the reductant line
    PrimeReductant {
        /// Flush volume in ml
        #[arg(long, default_value = "1.5")]
        volume: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RigConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing_init::init_from_config(&config)?;

    if let Commands::ShowConfig = cli.command {
        println!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let registry = PumpRegistry::from_config(&config, &PumpFactories::new())
        .await
        .context("Failed to build pump registry")?;
    let scheduler = DispenseScheduler::from_config(Arc::new(registry), &config.scheduler);
    let library = ProtocolLibrary::with_config(scheduler, config.protocols.clone());

    run(cli.command, &config, &library).await?;
    info!("Done");
    Ok(())
}

async fn run(command: Commands, config: &RigConfig, library: &ProtocolLibrary) -> Result<()> {
    let scheduler = library.scheduler();

    match command {
        Commands::Pumps => {
            for name in scheduler.registry().names() {
                let pump = scheduler.registry().resolve(name)?;
                let kind = config.pump(name).map(|d| d.kind.as_str()).unwrap_or("?");
                println!(
                    "{:<12} {:>6.2} ml  kind={}  held={:.2} ml",
                    name,
                    pump.capacity(),
                    kind,
                    pump.current_volume().await?
                );
            }
        }
        Commands::ShowConfig => {}
        Commands::Dispense {
            requests,
            parallel,
            ordered,
        } => {
            if parallel {
                scheduler.parallel_dispense(&requests, ordered).await?;
            } else {
                scheduler.sequential_dispense(&requests).await?;
            }
        }
        Commands::Clean => library.clean_routine().await?,
        Commands::RegiaPurge => library.regia_purge().await?,
        Commands::UvClean => library.clean_uv_ir_lines().await?,
        Commands::FinishingClean { pumps } => {
            let names: Vec<&str> = pumps.iter().map(String::as_str).collect();
            library.finishing_clean(&names).await?;
        }
        Commands::Dilute => library.dilute_sample().await?,
        Commands::Preflush => library.preflush_standard().await?,
        Commands::PrimeReductant { volume } => library.prime_reductant(volume).await?,
    }

    Ok(())
}
