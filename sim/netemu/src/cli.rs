//! Parses the command line arguments.
//!
//! Basic usage, with a JSON log written to `./logs`:
//!
//! ```cargo run --bin netemu -- --nodes 50 --peers 3 --log```

use crate::simulation::{self, Report, SimulationError, SimulationOptions};
use clap::Parser;
use netemu_core::config::{ConfigError, NetworkConfig};
use std::{
    fs::{create_dir_all, OpenOptions},
    io,
    sync::Arc,
    time::Duration,
};
use thiserror::Error as ThisError;
use tracing::{subscriber::SetGlobalDefaultError, Level};
use tracing_subscriber::FmtSubscriber;

/// Stores the different command line arguments.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Mean packet delay in seconds.
    #[arg(long, default_value_t = 0.2)]
    delay: f64,
    /// Standard deviation of the packet delay as a fraction of its mean.
    #[arg(long, default_value_t = 0.1)]
    variability: f64,
    /// Number of ordinary nodes, not counting the server.
    #[arg(short, long, default_value_t = 10)]
    nodes: usize,
    /// Number of update ticks to run after the dialogues.
    #[arg(short, long, default_value_t = 5)]
    rounds: u32,
    /// Milliseconds between update ticks.
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    /// Number of random peers each node handshakes with.
    #[arg(short, long, default_value_t = 2)]
    peers: usize,
    /// Seed for every random choice, for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
    /// Logging flag. Writes a JSON log to ./logs instead of logging to stderr.
    #[arg(short, long)]
    log: bool,
    /// The most verbose level logged to stderr.
    #[arg(short, long, default_value_t = Level::WARN)]
    verbosity: Level,
}

impl Args {
    /// Validates the arguments and turns them into simulation options.
    pub fn options(&self) -> Result<SimulationOptions, ConfigError> {
        Ok(SimulationOptions {
            config: NetworkConfig::new(self.delay, self.variability)?,
            nodes: self.nodes,
            rounds: self.rounds,
            tick: Duration::from_millis(self.tick_ms),
            peers: self.peers,
            seed: self.seed,
        })
    }
}

/// Parses command line arguments, sets up logging and runs the simulation.
pub async fn initialize_from_arguments() -> Result<Report, CliError> {
    let args = Args::parse();
    if args.log {
        initialize_logging()?;
    } else {
        initialize_stderr_logging(args.verbosity)?;
    }
    let options = args.options()?;
    tracing::info!(?options, "Starting simulation");
    Ok(simulation::run(options).await?)
}

/// Initializes JSON logging to a new file under `./logs`. Only should be
/// called once when the sim starts.
fn initialize_logging() -> Result<(), CliError> {
    let main_path = "./logs";
    create_dir_all(main_path)?;
    let file_path = format!(
        "{}/debug-{}.log",
        main_path,
        chrono::offset::Local::now().format("%y-%m-%d_%H-%M-%S")
    );
    let file = OpenOptions::new()
        .write(true)
        .append(true)
        .create(true)
        .open(file_path)?;
    let subscriber = FmtSubscriber::builder()
        .with_writer(Arc::new(file))
        .with_max_level(Level::TRACE)
        .json()
        .finish();
    // set the global default so all events/logs go to the same subscriber and
    // subsequently the same file
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn initialize_stderr_logging(level: Level) -> Result<(), CliError> {
    let subscriber = FmtSubscriber::builder()
        .with_writer(io::stderr)
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[derive(Debug, ThisError)]
pub enum CliError {
    #[error("Could not open the log file: {0}")]
    LogFile(#[from] io::Error),
    #[error("Could not install the log subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
    #[error("Invalid network configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_network_defaults() {
        let args = Args::parse_from(["netemu"]);
        let options = args.options().unwrap();
        assert_eq!(options.config, NetworkConfig::default());
        assert_eq!(options.nodes, 10);
        assert_eq!(options.tick, Duration::from_millis(100));
        assert_eq!(options.seed, None);
        assert_eq!(args.verbosity, Level::WARN);
    }

    #[test]
    fn invalid_delays_are_rejected() {
        let args = Args::parse_from(["netemu", "--delay=-1", "--seed", "7"]);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.options().unwrap_err(), ConfigError::Delay(-1.0));
    }

    #[test]
    fn verbosity_parses_level_names() {
        let args = Args::parse_from(["netemu", "-v", "debug", "-n", "3"]);
        assert_eq!(args.verbosity, Level::DEBUG);
        assert_eq!(args.nodes, 3);
    }
}
