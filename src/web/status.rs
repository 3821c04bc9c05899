//! Health and status handlers.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use tracing::{trace, warn};
use ts_rs::TS;

use crate::data::health;
use crate::state::{AppState, ServiceStatus};
use crate::utils::{fmt_duration, log_if_slow};

const SLOW_PING: Duration = Duration::from_millis(250);

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HealthResponse {
    status: ServiceStatus,
    database: ServiceStatus,
    db_latency: Option<String>,
    timestamp: String,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ServiceInfo {
    status: ServiceStatus,
    #[ts(type = "number")]
    updated_secs_ago: u64,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    #[ts(type = "number")]
    uptime_secs: u64,
    services: BTreeMap<String, ServiceInfo>,
}

/// `GET /api/health` -- Liveness plus a database round trip.
///
/// Answers 503 when the database can't be reached.
pub(super) async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();
    let ping = health::ping(&state.db_pool).await;
    log_if_slow(start, SLOW_PING, "database ping");

    let (code, database, db_latency) = match ping {
        Ok(latency) => {
            trace!(latency = fmt_duration(latency), "health check passed");
            (StatusCode::OK, ServiceStatus::Connected, Some(fmt_duration(latency)))
        }
        Err(e) => {
            warn!(error = ?e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, ServiceStatus::Error, None)
        }
    };
    state.service_statuses.set("database", database.clone());

    let status = if code.is_success() {
        ServiceStatus::Active
    } else {
        ServiceStatus::Error
    };
    (
        code,
        Json(HealthResponse {
            status,
            database,
            db_latency,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// Fold individual service statuses into one.
fn overall_status<'a>(statuses: impl IntoIterator<Item = &'a ServiceStatus>) -> ServiceStatus {
    let mut any = false;
    let mut starting = false;
    for status in statuses {
        any = true;
        match status {
            ServiceStatus::Error => return ServiceStatus::Error,
            ServiceStatus::Starting => starting = true,
            _ => {}
        }
    }
    if !any {
        ServiceStatus::Disabled
    } else if starting {
        ServiceStatus::Starting
    } else {
        ServiceStatus::Active
    }
}

/// `GET /api/status` -- Build info and self-reported service statuses.
pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let services: BTreeMap<String, ServiceInfo> = state
        .service_statuses
        .all()
        .into_iter()
        .map(|(name, status, updated_secs_ago)| {
            (
                name,
                ServiceInfo {
                    status,
                    updated_secs_ago,
                },
            )
        })
        .collect();

    Json(StatusResponse {
        status: overall_status(services.values().map(|s| &s.status)),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_SHORT").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        services,
    })
}
