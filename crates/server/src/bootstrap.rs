use std::sync::Arc;
use std::time::Duration;

use procurebot_core::config::{AppConfig, ConfigError, LoadOptions};
use procurebot_core::{
    AccessRegistry, DeliveryRelay, OrderDesk, OrderFlow, RegistryError, SystemClock, TokioSleeper,
};
use procurebot_telegram::{
    BotApiClient, ClientError, PollingRunner, ReconnectPolicy, UpdateClassifier,
};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<AccessRegistry>,
    pub runner: PollingRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let registry = load_registry(&config)?;
    let client = Arc::new(BotApiClient::new(&config.telegram)?);
    let bot_username = identify_bot(&client).await;

    Ok(assemble(config, registry, client, bot_username))
}

pub fn load_registry(config: &AppConfig) -> Result<Arc<AccessRegistry>, RegistryError> {
    let registry = AccessRegistry::from_file(&config.registry.users_file)?;
    let snapshot = registry.snapshot();
    info!(
        event_name = "system.bootstrap.registry_loaded",
        correlation_id = "bootstrap",
        users_file = %config.registry.users_file.display(),
        admins = snapshot.admin_count(),
        allowed_users = snapshot.allowed_count(),
        "user registry ready"
    );
    Ok(Arc::new(registry))
}

pub fn assemble(
    config: AppConfig,
    registry: Arc<AccessRegistry>,
    client: Arc<BotApiClient>,
    bot_username: Option<String>,
) -> Application {
    let relay = DeliveryRelay::new(
        client.clone(),
        Arc::new(TokioSleeper),
        config.relay.retry_policy(),
    );
    let desk = OrderDesk::new(
        Arc::clone(&registry),
        OrderFlow::new(config.catalog.clone()),
        relay,
        Arc::new(SystemClock),
    );
    let runner = PollingRunner::new(
        client.clone(),
        client,
        Arc::new(desk),
        UpdateClassifier::new(bot_username),
        ReconnectPolicy::default(),
        Arc::new(TokioSleeper),
    )
    .with_drain_timeout(Duration::from_secs(config.server.graceful_shutdown_secs));

    Application { config, registry, runner }
}

/// Asks Telegram who we are. Failure is not fatal: commands then match any
/// `@bot` suffix.
async fn identify_bot(client: &BotApiClient) -> Option<String> {
    match client.get_me().await {
        Ok(me) => {
            info!(
                event_name = "system.bootstrap.bot_identified",
                correlation_id = "bootstrap",
                bot_id = me.id,
                bot_username = me.username.as_deref().unwrap_or("unknown"),
                "telegram bot identified"
            );
            me.username
        }
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.bot_identify_failed",
                correlation_id = "bootstrap",
                error = %error,
                "could not call getMe; accepting commands addressed to any bot"
            );
            None
        }
    }
}
