mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "grocerbot")]
#[command(about = "Chat bot that fills a grocery cart in a shared browser session", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file, a sample catalog and a prompt
    Onboard {
        /// Force overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration status
    Status,

    /// Start the bot (long-running)
    Run,

    /// Talk to the bot from this terminal instead of Telegram
    Chat,

    /// Resolve a shopping request once and print the result
    Resolve {
        /// Request text, e.g. "2 литра молока и сыр"
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Onboard { force } => commands::onboard::run(force).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Run => commands::run::run().await?,
        Commands::Chat => commands::chat::run().await?,
        Commands::Resolve { text } => commands::resolve::run(&text).await?,
    }

    Ok(())
}
