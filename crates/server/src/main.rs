mod bootstrap;
mod health;

use anyhow::Result;
use procurebot_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use procurebot_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    match dotenv {
        Ok(path) => tracing::info!(
            event_name = "system.server.dotenv_loaded",
            correlation_id = "bootstrap",
            path = %path.display(),
            "loaded environment from .env"
        ),
        Err(error) if error.not_found() => {}
        Err(error) => tracing::warn!(
            event_name = "system.server.dotenv_invalid",
            correlation_id = "bootstrap",
            error = %error,
            ".env file could not be parsed"
        ),
    }

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.registry.clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "procurebot-server started, polling telegram"
    );
    app.runner.run_until(wait_for_shutdown()).await;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "procurebot-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(
            event_name = "system.server.stopping",
            correlation_id = "shutdown",
            "shutdown signal received, draining in-flight updates"
        ),
        Err(error) => {
            tracing::error!(
                event_name = "system.server.signal_error",
                correlation_id = "shutdown",
                error = %error,
                "could not listen for shutdown signal"
            );
            std::future::pending::<()>().await;
        }
    }
}
