use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use procurebot_core::AccessRegistry;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    registry: Arc<AccessRegistry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistryCheck {
    pub source: String,
    pub admins: usize,
    pub allowed_users: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub registry: RegistryCheck,
    pub checked_at: String,
}

pub fn router(registry: Arc<AccessRegistry>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { registry })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    registry: Arc<AccessRegistry>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(registry)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Reports the live registry snapshot. Loading guarantees at least one
/// administrator, so a running service is always ready.
pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    let snapshot = state.registry.snapshot();

    Json(HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "procurebot-server polling loop initialized".to_string(),
        },
        registry: RegistryCheck {
            source: state.registry.source_name(),
            admins: snapshot.admin_count(),
            allowed_users: snapshot.allowed_count(),
        },
        checked_at: Utc::now().to_rfc3339(),
    })
}
