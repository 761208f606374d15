use clap::Parser;
use sentinel::cli::{self, Cli, Commands};
use sentinel::config::AppConfig;
use sentinel::telemetry;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config: {}", e);
        }
        anyhow::bail!("invalid configuration ({} problems)", errors.len());
    }

    let _logging = telemetry::init_logging(&config.logging)?;
    info!("sentinel {} starting", env!("CARGO_PKG_VERSION"));

    let outcome = match &cli.command {
        Commands::Step { symbol, candles } => cli::run_step(&config, symbol, candles.as_deref())
            .await
            .map(|_| ()),
        Commands::Run {
            symbols,
            interval_secs,
            candles,
            replay,
        } => cli::run_paper(
            &config,
            symbols,
            Duration::from_secs(*interval_secs),
            candles.as_deref(),
            *replay,
        )
        .await
        .map(|_| ()),
    };

    if let Err(e) = outcome {
        error!("{}", e);
        return Err(e.into());
    }
    Ok(())
}
