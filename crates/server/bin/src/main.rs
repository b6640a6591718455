//! Agora replicator
//!
//! Keeps the comments service's replica of posts in step with the posts
//! service by applying `post-created`, `post-updated` and `post-deleted`
//! events from NATS JetStream.

mod startup;

use std::path::PathBuf;

use agora_domain::config::ConfigLoader;
use clap::Parser;

/// CLI arguments for agora-replicator
#[derive(clap::Parser, Debug)]
#[command(name = "agora-replicator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Applies post events to the comments service replica", long_about = None)]
struct Args {
    /// Load environment variables from this file first
    #[arg(long, env = "AGORA_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Create the comments schema before starting
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new(args.env_file).load_service_config()?;

    setup_logging(args.debug, &config.logging.level, config.logging.json)?;

    startup::run(config, args.migrate).await
}

/// `RUST_LOG` wins over the configured level; `--debug` raises the default.
fn setup_logging(debug: bool, level: &str, json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = if debug { "debug" } else { level };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
    }
}
