use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use gauntlet_core::error::GauntletError;
use gauntlet_daemon::cli::DaemonCli;
use gauntlet_daemon::logging::init_tracing;
use gauntlet_daemon::orchestrator::{Orchestrator, RunOptions, load_config};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = DaemonCli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e
                .downcast_ref::<GauntletError>()
                .and_then(GauntletError::as_worker_stderr)
            {
                Some(stderr) => eprintln!("{}", stderr.render()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: DaemonCli) -> Result<()> {
    let config = load_config(&cli).await?;
    init_tracing(&config.general)?;

    tracing::info!(
        design = %cli.design.display(),
        config = %cli.config.display(),
        "gauntlet starting"
    );

    let orchestrator = Orchestrator::load(config, &cli.design, RunOptions::from_cli(&cli)).await?;
    let result = orchestrator.run().await;
    match &result {
        Ok(()) => tracing::info!("gauntlet finished"),
        Err(e) => tracing::error!(error = %e, "gauntlet failed"),
    }
    result
}
