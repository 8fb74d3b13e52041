//! pacebot-bot/src/health.rs
//!
//! Minimal health surface per bot process: relay connectivity plus the
//! current joined-channel count.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use pacebot_core::membership::MembershipStore;
use pacebot_core::platforms::ConnectionStatus;

#[derive(Clone)]
struct HealthState {
    relay_status: watch::Receiver<ConnectionStatus>,
    membership: Arc<MembershipStore>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    ok: bool,
    relay_connected: bool,
    joined_channels: usize,
}

async fn health(State(state): State<HealthState>) -> Json<HealthReport> {
    let relay_connected = matches!(*state.relay_status.borrow(), ConnectionStatus::Connected);
    Json(HealthReport {
        ok: true,
        relay_connected,
        joined_channels: state.membership.joined_count(),
    })
}

pub fn spawn(
    addr: String,
    relay_status: watch::Receiver<ConnectionStatus>,
    membership: Arc<MembershipStore>,
) {
    tokio::spawn(async move {
        let state = HealthState { relay_status, membership };
        let app = Router::new().route("/health", get(health)).with_state(state);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("health endpoint bind failed on {addr}: {e}");
                return;
            }
        };
        info!("health endpoint on http://{addr}/health");
        if let Err(e) = axum::serve(listener, app).await {
            error!("health endpoint error: {e}");
        }
    });
}
