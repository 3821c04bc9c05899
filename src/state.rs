//! Application state shared across request handlers.

use dashmap::DashMap;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use ts_rs::TS;

use crate::web::auth::AuthConfig;

/// Health status of a service.
#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceStatus {
    Starting,
    Active,
    Connected,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for components to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    /// Returns the current status of a named service, if present.
    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.get(name).map(|entry| entry.status.clone())
    }

    /// Returns a snapshot of all service statuses with seconds since last update,
    /// sorted by name.
    pub fn all(&self) -> Vec<(String, ServiceStatus, u64)> {
        let mut entries: Vec<_> = self
            .inner
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().status.clone(),
                    entry.value().updated_at.elapsed().as_secs(),
                )
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth: AuthConfig,
    pub service_statuses: ServiceStatusRegistry,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db_pool: PgPool, auth: AuthConfig) -> Self {
        Self {
            db_pool,
            auth,
            service_statuses: ServiceStatusRegistry::new(),
            started_at: Instant::now(),
        }
    }
}
