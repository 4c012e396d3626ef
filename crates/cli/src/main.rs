//! Stepwise CLI: the main entry point.
//!
//! Commands:
//! - `edit`: Edit a line range of a file, driven by recorded model replies
//! - `config`: Print the default configuration or its path

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "Stepwise, a line-protocol code editing agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit lines of a file
    Edit(commands::edit::EditArgs),

    /// Show configuration
    Config {
        /// Print the config file path instead of the defaults
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for the edited file.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Edit(args) => commands::edit::run(args).await?,
        Commands::Config { path: true } => commands::config_cmd::path().await?,
        Commands::Config { path: false } => commands::config_cmd::show_defaults().await?,
    }

    Ok(())
}
