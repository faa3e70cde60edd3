mod cli;
mod server;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pcheck::config::PolicyConfig;

#[derive(Parser)]
#[command(name = "pcheck", version, about = "Semantic policy matching over a folder of documents")]
struct Cli {
    /// Config file (defaults to ~/.pcheck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve,
    /// Match free text against the loaded policies
    Search {
        query: String,
        /// Maximum number of matches
        #[arg(short, long)]
        k: Option<usize>,
        /// Minimum cosine similarity to report
        #[arg(long)]
        min_score: Option<f64>,
    },
    /// List every loaded policy
    List,
    /// Print a single policy
    Show { id: String },
    /// Validate configuration and dry-load the policy folder (no embedding calls)
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PolicyConfig::load_from(path)?,
        None => PolicyConfig::load()?,
    };

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve_http(config).await?,
        Command::Search { query, k, min_score } => {
            cli::search::search(&config, &query, k, min_score).await?
        }
        Command::List => cli::list::list(&config).await?,
        Command::Show { id } => cli::list::show(&config, &id).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
