mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skysub", about = "Sky estimation and subtraction for multi-chip mosaics")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show container header and metadata
    Info(commands::info::InfoArgs),
    /// Dry-run candidate availability per target
    Check(commands::check::CheckArgs),
    /// Build sky and count maps for each target
    Mksky(commands::mksky::MkSkyArgs),
    /// Subtract built skies, flatten the background, destripe
    Subsky(commands::subsky::SubSkyArgs),
    /// Run the full pipeline end to end
    Run(commands::run::RunArgs),
    /// Print or save the default configuration
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Mksky(args) => commands::mksky::run(args),
        Commands::Subsky(args) => commands::subsky::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
