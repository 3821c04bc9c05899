use crate::config::Config;
use crate::state::{AppState, ServiceStatus};
use crate::utils::fmt_duration;
use crate::web::auth::AuthConfig;
use crate::web::create_router;
use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
}

impl App {
    /// Connect to the database, run migrations, and build shared state.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let slow_threshold = Duration::from_millis(500);

        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(config.db_max_connections)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            min_connections = 0,
            max_connections = config.db_max_connections,
            acquire_timeout = "4s",
            idle_timeout = "2m",
            max_lifetime = "30m",
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        let start = Instant::now();
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!(
            duration = fmt_duration(start.elapsed()),
            "database migrations completed"
        );

        let auth = AuthConfig::new(&config.api_token, &config.admin_token);
        let app_state = AppState::new(db_pool, auth);
        app_state
            .service_statuses
            .set("database", ServiceStatus::Connected);

        Ok(App { config, app_state })
    }

    /// Serve HTTP until SIGINT/SIGTERM, then drain in-flight requests.
    ///
    /// Requests still running after `SHUTDOWN_TIMEOUT` are abandoned and the
    /// process exits with a failure code.
    pub async fn run(self) -> ExitCode {
        let statuses = self.app_state.service_statuses.clone();
        statuses.set("web", ServiceStatus::Starting);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                statuses.set("web", ServiceStatus::Error);
                error!(error = ?e, %addr, "failed to bind web server");
                return ExitCode::FAILURE;
            }
        };

        let db_pool = self.app_state.db_pool.clone();
        let router = create_router(self.app_state);
        statuses.set("web", ServiceStatus::Active);
        info!(%addr, "web server listening");

        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    signal_rx.await.ok();
                })
                .await
        });
        let abort = server.abort_handle();

        shutdown_signal().await;
        statuses.set("web", ServiceStatus::Disabled);
        // The receiver only goes away if the server already stopped.
        let _ = signal_tx.send(());

        let timeout = self.config.shutdown_timeout;
        let start = Instant::now();
        let code = match tokio::time::timeout(timeout, server).await {
            Ok(Ok(Ok(()))) => {
                info!(
                    duration = fmt_duration(start.elapsed()),
                    "web server drained"
                );
                ExitCode::SUCCESS
            }
            Ok(Ok(Err(e))) => {
                statuses.set("web", ServiceStatus::Error);
                error!(error = ?e, "web server failed");
                ExitCode::FAILURE
            }
            Ok(Err(e)) => {
                error!(error = ?e, "web server task panicked");
                ExitCode::FAILURE
            }
            Err(_) => {
                warn!(
                    timeout = fmt_duration(timeout),
                    "graceful shutdown timed out, abandoning in-flight requests"
                );
                abort.abort();
                ExitCode::FAILURE
            }
        };

        db_pool.close().await;
        info!("shutdown complete");
        code
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = ?e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM, shutting down");
            }
            Err(e) => {
                error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
