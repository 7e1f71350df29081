//! Headless FieldLink agent runner.
//!
//! Wires the full sync stack against a real server and runs until ctrl-c.
//! Useful for soak-testing a deployment without the mobile app:
//!
//! ```text
//! FIELDLINK_SERVER_URL=wss://notify.example.com/agent \
//! FIELDLINK_API_URL=https://api.example.com \
//! FIELDLINK_TOKEN=<access token> \
//! fieldlink-agent
//! ```

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fieldlink_sync::{
    AppLifecycle, ConnectionState, Platform, SyncAgent, SyncConfig, SyncEventEmitter, SyncSession,
};

struct LogEmitter;

impl SyncEventEmitter for LogEmitter {
    fn connection_changed(&self, state: &ConnectionState) {
        info!(%state, "connection");
    }

    fn auth_required(&self, reason: &str) {
        error!(reason, "re-authentication required");
    }

    fn case_updated(&self, case_id: &str) {
        info!(case_id, "case updated");
    }

    fn data_refreshed(&self, session: &SyncSession) {
        info!(applied = session.applied, reason = %session.reason, "store refreshed");
    }

    fn data_stale(&self, consecutive_failures: u32) {
        info!(consecutive_failures, "cached data may be stale");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SyncConfig::load_or_default(None);
    let token = std::env::var("FIELDLINK_TOKEN")
        .map_err(|_| "FIELDLINK_TOKEN must be set to an access token")?;

    let agent = SyncAgent::builder(config, Platform::Desktop)
        .with_emitter(Arc::new(LogEmitter))
        .build()
        .await?;

    let identity = agent.identity().identity().await;
    info!(device_id = %identity.device_id, platform = %identity.platform, "agent identity");

    agent.login(token).await?;
    agent.set_app_state(AppLifecycle::Foreground).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    agent.shutdown().await?;

    Ok(())
}
