use clap::Parser;
use tracing_subscriber::EnvFilter;

use packsmith::cli::{self, Cli};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(error) = cli::run(cli).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
