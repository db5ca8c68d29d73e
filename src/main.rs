use clap::{Parser, Subcommand};
use std::path::PathBuf;

use alignment_search::commands::{SearchOptions, search, serve, show_info};
use alignment_search::config::{Config, run_interactive_config, show_config};
use alignment_search::{Result, SearchError};

#[derive(Parser)]
#[command(name = "alignment-search")]
#[command(about = "Semantic search over an embedded corpus of AI alignment writing")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (and relative corpus paths)
    #[arg(long, global = true, env = "ALIGNMENT_SEARCH_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the model service and retrieval defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Find the corpus blocks most relevant to a question
    Search {
        /// Free-text question
        query: String,
        /// Number of results to return
        #[arg(short, long)]
        k: Option<usize>,
        /// Search with the embedding of a generated answer instead of the question
        #[arg(long)]
        hyde: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP search API
    Serve {
        /// Address to listen on, e.g. "0.0.0.0:8080"
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show corpus statistics and check the model service
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::config_dir().map_err(|e| SearchError::Config(e.to_string()))?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?);
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Search {
            query,
            k,
            hyde,
            json,
        } => {
            search(
                Config::load(&config_dir)?,
                query,
                SearchOptions { k, hyde, json },
            )
            .await?;
        }
        Commands::Serve { bind } => {
            serve(Config::load(&config_dir)?, bind).await?;
        }
        Commands::Info => {
            show_info(Config::load(&config_dir)?).await?;
        }
    }

    Ok(())
}
