//! Configuration module for the registrar application.
//!
//! Values come from the process environment (optionally seeded from `.env`),
//! read without a prefix: `DATABASE_URL`, `PORT`, `LOG_LEVEL`, and so on.

use std::time::Duration;

use anyhow::Context;
use figment::{Figment, providers::Env};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};

/// Main application configuration containing all sub-configurations
#[derive(Deserialize)]
pub struct Config {
    /// Log level for the application's own modules (e.g. "info", "debug")
    ///
    /// Ignored when `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port for the web server
    #[serde(default = "default_port")]
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Upper bound on pooled database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    /// How long in-flight requests may take to finish after a shutdown signal
    ///
    /// Accepts bare seconds (`8`) or a unit suffix (`8s`, `1500ms`, `1m`).
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
    /// Bearer token for regular API clients
    pub api_token: String,
    /// Bearer token for administrative endpoints
    pub admin_token: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("log_level", &self.log_level)
            .field("port", &self.port)
            .field("db_max_connections", &self.db_max_connections)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment.extract().context("failed to load config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.api_token.trim().is_empty() {
            anyhow::bail!("API_TOKEN must not be empty");
        }
        if self.admin_token.trim().is_empty() {
            anyhow::bail!("ADMIN_TOKEN must not be empty");
        }
        if self.api_token == self.admin_token {
            anyhow::bail!("API_TOKEN and ADMIN_TOKEN must differ");
        }
        if self.db_max_connections == 0 {
            anyhow::bail!("DB_MAX_CONNECTIONS must be at least 1");
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_max_connections() -> u32 {
    8
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

/// Parse a human duration. A bare number is read as seconds.
fn parse_duration(value: &str) -> Result<Duration, String> {
    let parser =
        DurationParser::with_time_units(&[TimeUnit::MilliSecond, TimeUnit::Second, TimeUnit::Minute]);
    let parsed = parser
        .parse(value.trim())
        .map_err(|e| format!("invalid duration '{value}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{value}': {e}"))
}

/// Accepts an integer number of seconds or a duration string.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a duration string (e.g. \"8s\") or a number of seconds")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration cannot be negative"))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse_duration(value).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;
    use serde_json::json;

    fn figment(extra: serde_json::Value) -> Figment {
        let mut base = json!({
            "database_url": "postgres://localhost/registrar",
            "api_token": "client-token",
            "admin_token": "admin-token",
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        Figment::new().merge(Serialized::defaults(base))
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_figment(figment(json!({}))).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.db_max_connections, 8);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_shutdown_timeout_formats() {
        for (value, expected) in [
            (json!("15s"), Duration::from_secs(15)),
            (json!("1500ms"), Duration::from_millis(1500)),
            (json!("2m"), Duration::from_secs(120)),
            (json!("5"), Duration::from_secs(5)),
            (json!(12), Duration::from_secs(12)),
        ] {
            let config =
                Config::from_figment(figment(json!({ "shutdown_timeout": value }))).unwrap();
            assert_eq!(config.shutdown_timeout, expected);
        }
    }

    #[test]
    fn test_invalid_duration_rejected() {
        assert!(Config::from_figment(figment(json!({ "shutdown_timeout": "soon" }))).is_err());
        assert!(Config::from_figment(figment(json!({ "shutdown_timeout": -3 }))).is_err());
    }

    #[test]
    fn test_tokens_validated() {
        assert!(Config::from_figment(figment(json!({ "api_token": "  " }))).is_err());
        assert!(
            Config::from_figment(figment(json!({ "admin_token": "client-token" }))).is_err()
        );
    }

    #[test]
    fn test_missing_database_url_rejected() {
        let figment = Figment::new().merge(Serialized::defaults(json!({
            "api_token": "a",
            "admin_token": "b",
        })));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = Config::from_figment(figment(json!({}))).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("admin-token"));
        assert!(!rendered.contains("postgres://"));
    }
}
