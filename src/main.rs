mod cli;
mod errors;
mod github_app;
mod orchestrator;
mod server;
mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = cli::Cli::parse();
    if let Err(e) = cli::run(cli).await {
        eprintln!("treliq: {e}");
        std::process::exit(e.exit_code());
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let is_production = std::env::var("NODE_ENV").map(|v| v == "production").unwrap_or(false);

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if is_production {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
