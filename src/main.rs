//! gguf - Local GGUF model manager entry point

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use gguf_manager::cli::{App, Cli};
use gguf_manager::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load(cli.config)?;
    config.validate()?;

    tracing::debug!(
        models_dir = ?config.models_dir,
        db_path = ?config.db_path,
        api_url = %config.api_url,
        "Configuration loaded"
    );

    let app = App::from_config(config).context("initializing")?;

    let mut stdout = std::io::stdout();
    app.execute(command, &mut stdout).await?;
    Ok(())
}
