use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use trampoline::data::{read_data_sets, rounded};
use trampoline::headless::{self, Backend};
use trampoline::{Simulation, SimulationConfig, SimulationError};

/// GPU mass-spring simulation of a trampoline jumping sheet.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON configuration file. Missing values take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open the simulation window (default).
    Run {
        /// Start the measurement program once the sheet is loaded.
        #[arg(long)]
        autostart: bool,
    },
    /// Run without a window and write the collected data set.
    Headless {
        #[arg(long, default_value_t = 10_000)]
        frames: u32,
        /// Simulate on the CPU instead of the GPU.
        #[arg(long)]
        cpu: bool,
        /// Run the measurement program.
        #[arg(long)]
        autonomous: bool,
    },
    /// Summarise the data sets of an output file.
    Analyse { file: PathBuf },
    /// Write the default configuration.
    DefaultConfig { file: PathBuf },
}

fn load_config(path: Option<&Path>) -> Result<SimulationConfig, SimulationError> {
    match path {
        Some(path) => {
            log::info!("Loading config from {}", path.display());
            Ok(SimulationConfig::load(path)?)
        }
        None => Ok(SimulationConfig::default()),
    }
}

fn analyse(file: &Path) -> Result<(), SimulationError> {
    let sets = read_data_sets(file)?;
    if sets.is_empty() {
        println!("{}: no data sets", file.display());
        return Ok(());
    }
    for (i, set) in sets.iter().enumerate() {
        println!("[{}] {}", i, set.header);
        let slope = match set.slope() {
            Some(slope) => rounded(slope as f64, 3).to_string(),
            None => "-".to_string(),
        };
        println!("    points: {}, force/height slope: {}", set.len(), slope);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), SimulationError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run { autostart: false }) {
        Command::Run { autostart } => Simulation::new(config).with_autostart(autostart).run(),
        Command::Headless {
            frames,
            cpu,
            autonomous,
        } => {
            let backend = if cpu { Backend::Cpu } else { Backend::Gpu };
            let report = headless::run(&config, frames, backend, autonomous)?;
            println!(
                "{} frames, t = {}s, {} samples",
                report.frames,
                rounded(report.virtual_time, 5),
                report.samples
            );
            if let Some(path) = report.output {
                println!("Data set written to {}", path.display());
            }
            Ok(())
        }
        Command::Analyse { file } => analyse(&file),
        Command::DefaultConfig { file } => {
            SimulationConfig::default().save(&file)?;
            log::info!("Wrote default config to {}", file.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
