//! txretry CLI
//!
//! Command-line exerciser for the retrying transaction executor.
//!
//! # Commands
//!
//! - `inc-counter-test` - Increment one counter from many concurrent workers
//! - `read-test` - Write a value, read it back and decode it
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Concurrent increment and read exerciser for a transactional key-value store.
#[derive(Parser)]
#[command(name = "txretry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Increment a counter from concurrent workers and verify the total
    IncCounterTest {
        /// Number of concurrent workers
        #[arg(short, long, default_value = "1", alias = "nb-goroutines")]
        workers: usize,

        /// Increments per worker
        #[arg(short, long, default_value = "1", alias = "nb-iter")]
        iterations: usize,

        /// Amount added by each increment
        #[arg(short, long, default_value = "1", allow_negative_numbers = true)]
        delta: i64,

        /// Give up after this many attempts per increment (unbounded if unset)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Probability that the store fails a commit with a transient error
        #[arg(long, default_value = "0.0")]
        conflict_rate: f64,

        /// Counter key
        key: String,
    },

    /// Write a value, read it back and print it decoded
    ReadTest {
        /// Store the value as an 8-byte little-endian integer
        #[arg(long)]
        integer: bool,

        /// Key to write and read
        key: String,

        /// Value to write
        #[arg(allow_negative_numbers = true)]
        value: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::IncCounterTest {
            workers,
            iterations,
            delta,
            max_attempts,
            conflict_rate,
            key,
        } => {
            let args = commands::inc_counter::IncCounterArgs {
                key,
                workers,
                iterations,
                delta,
                max_attempts,
                conflict_rate,
            };
            commands::inc_counter::run(&args, cli.format)?;
        }
        Commands::ReadTest {
            integer,
            key,
            value,
        } => {
            commands::read_test::run(&key, &value, integer, cli.format)?;
        }
        Commands::Version => {
            println!("txretry CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("txretry core v{}", txretry_core::VERSION);
        }
    }

    Ok(())
}
