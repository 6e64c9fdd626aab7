// CLI binary is only available with the native feature
#![cfg(feature = "native")]

mod cli;

use clap::{Parser, Subcommand};
use cli::OutputFormat;
use redirect_advisor::config::DEFAULT_INPUT_FILENAME;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "redirect-advisor")]
#[command(version, about = "Analyze component dependencies and recommend binding redirects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the dependency graph and recommend binding redirects
    Analyze {
        /// Input file
        #[arg(default_value = DEFAULT_INPUT_FILENAME)]
        input: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Main component, overriding the input file
        #[arg(long)]
        main: Option<String>,

        /// Fail when the analysis reports warnings
        #[arg(long)]
        strict: bool,
    },

    /// Write a starter input file
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing input file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter_layer = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::new("info")
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("redirect-advisor v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze {
            input,
            format,
            main,
            strict,
        } => {
            info!("Analyzing {:?}", input);
            cli::analyze::cmd_analyze(input, format, main, strict)?;
        }
        Commands::Init { path, force } => {
            info!("Initializing {:?}", path);
            cli::init::cmd_init(path, force)?;
        }
    }

    Ok(())
}
