mod cmd;
mod output;
mod signal;

use clap::{Parser, Subcommand};
use folio_core::types::BracketStyle;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "folio",
    about = "Declarative volume preparation pipeline for page-image releases",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter pipeline config
    Gen {
        /// Config file to create (.yaml or .json)
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        publisher: String,
        /// Release group credited in archive names
        #[arg(long)]
        credit: String,
        #[arg(long)]
        email: String,
        /// Bracket style for archive names: square, round, curly
        #[arg(long, default_value = "round")]
        bracket: BracketStyle,
    },

    /// Check a config for errors without touching any files
    Validate {
        file: PathBuf,
        /// Also dry-run every volume
        #[arg(long)]
        simulate: bool,
    },

    /// Run the pipeline over every volume
    Run(cmd::run::RunArgs),
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) | Commands::Validate { .. } => tracing::Level::INFO,
        Commands::Gen { .. } => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Gen {
            file,
            title,
            publisher,
            credit,
            email,
            bracket,
        } => cmd::gen::run(&file, &title, &publisher, &credit, &email, bracket, cli.json),
        Commands::Validate { file, simulate } => cmd::validate::run(&file, simulate, cli.json),
        Commands::Run(args) => cmd::run::run(args, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
