//! Application settings loaded via OrthoConfig.
//!
//! Every value may come from CLI flags, `DISPATCH_*` environment variables or
//! a configuration file. Optional values fall back to the documented defaults
//! through the accessor methods.

use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{
    ChatId, DEFAULT_UTC_OFFSET_MINUTES, IngestSettings, MirrorRetryConfig, UserId,
};
use crate::outbound::persistence::PoolConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MIRROR_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_MIRROR_INITIAL_BACKOFF_MS: u64 = 250;
const DEFAULT_MIRROR_MAX_BACKOFF_MS: u64 = 5_000;
const DEFAULT_MIRROR_CALL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONFIRMATION_TTL_SECS: u64 = 24 * 60 * 60;

/// Settings that could not be turned into a runnable configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("database_url is required (set DISPATCH_DATABASE_URL)")]
    MissingDatabaseUrl,
    #[error("bind_addr `{0}` is not a socket address")]
    InvalidBindAddr(String),
}

/// Deployment configuration of the dispatch backend.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "DISPATCH")]
pub struct AppSettings {
    /// PostgreSQL connection URL.
    pub database_url: Option<String>,
    /// Upper bound on pooled database connections.
    pub db_max_connections: Option<u32>,
    /// Seconds to wait for a pooled connection.
    pub db_checkout_timeout_secs: Option<u64>,
    /// HTTP listen address.
    pub bind_addr: Option<String>,
    /// Fixed civil zone as minutes east of UTC.
    pub utc_offset_minutes: Option<i32>,
    /// Principal of the platform bot; its feed messages are ignored.
    pub bot_principal_id: Option<i64>,
    /// Dispatcher channel announcing ingested orders.
    pub dispatcher_chat_id: Option<i64>,
    /// Base URL of the chat platform gateway.
    pub chat_api_url: Option<String>,
    /// Bearer token for the chat platform gateway.
    pub chat_api_token: Option<String>,
    pub mirror_max_attempts: Option<u32>,
    pub mirror_initial_backoff_ms: Option<u64>,
    pub mirror_max_backoff_ms: Option<u64>,
    pub mirror_call_timeout_ms: Option<u64>,
    /// Lifetime of a pending ingest confirmation.
    pub confirmation_ttl_secs: Option<u64>,
    /// Run the period-report scheduler.
    #[ortho_config(default = false)]
    pub reports_enabled: bool,
}

impl AppSettings {
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(SettingsError::MissingDatabaseUrl)
    }

    /// Pool limits over [`Self::database_url`].
    pub fn pool_config(&self) -> Result<PoolConfig, SettingsError> {
        let defaults = PoolConfig::new(self.database_url()?);
        Ok(PoolConfig {
            max_size: self.db_max_connections.unwrap_or(defaults.max_size),
            checkout_timeout: self
                .db_checkout_timeout_secs
                .map_or(defaults.checkout_timeout, Duration::from_secs),
            ..defaults
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let raw = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        raw.parse()
            .map_err(|_| SettingsError::InvalidBindAddr(raw.to_owned()))
    }

    pub fn utc_offset_minutes(&self) -> i32 {
        self.utc_offset_minutes
            .unwrap_or(DEFAULT_UTC_OFFSET_MINUTES)
    }

    /// Retry ladder for mirror transport calls.
    pub fn mirror_retry(&self) -> MirrorRetryConfig {
        MirrorRetryConfig {
            max_attempts: self
                .mirror_max_attempts
                .unwrap_or(DEFAULT_MIRROR_MAX_ATTEMPTS)
                .max(1),
            initial_backoff: Duration::from_millis(
                self.mirror_initial_backoff_ms
                    .unwrap_or(DEFAULT_MIRROR_INITIAL_BACKOFF_MS),
            ),
            max_backoff: Duration::from_millis(
                self.mirror_max_backoff_ms
                    .unwrap_or(DEFAULT_MIRROR_MAX_BACKOFF_MS),
            ),
            call_timeout: Duration::from_millis(
                self.mirror_call_timeout_ms
                    .unwrap_or(DEFAULT_MIRROR_CALL_TIMEOUT_MS),
            ),
        }
    }

    pub fn ingest(&self) -> IngestSettings {
        IngestSettings {
            bot_principal_id: UserId::new(self.bot_principal_id.unwrap_or(0)),
            dispatcher_chat_id: self.dispatcher_chat_id.map(ChatId::new),
            confirmation_ttl: Duration::from_secs(
                self.confirmation_ttl_secs
                    .unwrap_or(DEFAULT_CONFIRMATION_TTL_SECS),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for settings parsing.

    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    use super::*;

    const KEYS: [&str; 16] = [
        "DISPATCH_DATABASE_URL",
        "DISPATCH_DB_MAX_CONNECTIONS",
        "DISPATCH_DB_CHECKOUT_TIMEOUT_SECS",
        "DISPATCH_BIND_ADDR",
        "DISPATCH_UTC_OFFSET_MINUTES",
        "DISPATCH_BOT_PRINCIPAL_ID",
        "DISPATCH_DISPATCHER_CHAT_ID",
        "DISPATCH_CHAT_API_URL",
        "DISPATCH_CHAT_API_TOKEN",
        "DISPATCH_MIRROR_MAX_ATTEMPTS",
        "DISPATCH_MIRROR_INITIAL_BACKOFF_MS",
        "DISPATCH_MIRROR_MAX_BACKOFF_MS",
        "DISPATCH_MIRROR_CALL_TIMEOUT_MS",
        "DISPATCH_CONFIRMATION_TTL_SECS",
        "DISPATCH_REPORTS_ENABLED",
        "DISPATCH_CONFIG_PATH",
    ];

    fn cleared_except(set: &[(&'static str, &str)]) -> Vec<(&'static str, Option<String>)> {
        KEYS.iter()
            .map(|key| {
                let value = set
                    .iter()
                    .find(|(name, _)| name == key)
                    .map(|(_, value)| (*value).to_owned());
                (*key, value)
            })
            .collect()
    }

    fn load_from_empty_args() -> AppSettings {
        AppSettings::load_from_iter([OsString::from("dispatch-backend")])
            .expect("config should load")
    }

    #[rstest]
    fn defaults_apply_when_unset() {
        let _guard = lock_env(cleared_except(&[]));

        let settings = load_from_empty_args();

        assert_eq!(
            settings.database_url(),
            Err(SettingsError::MissingDatabaseUrl)
        );
        assert_eq!(
            settings.pool_config(),
            Err(SettingsError::MissingDatabaseUrl)
        );
        assert_eq!(
            settings.bind_addr().map(|addr| addr.port()),
            Ok(8080)
        );
        assert_eq!(settings.utc_offset_minutes(), 180);
        assert_eq!(settings.mirror_retry(), MirrorRetryConfig::default());
        assert_eq!(settings.ingest(), IngestSettings::default());
        assert!(!settings.reports_enabled);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(cleared_except(&[
            ("DISPATCH_DATABASE_URL", "postgres://dispatch@localhost/dispatch"),
            ("DISPATCH_DB_MAX_CONNECTIONS", "24"),
            ("DISPATCH_DB_CHECKOUT_TIMEOUT_SECS", "5"),
            ("DISPATCH_BIND_ADDR", "127.0.0.1:9090"),
            ("DISPATCH_UTC_OFFSET_MINUTES", "300"),
            ("DISPATCH_BOT_PRINCIPAL_ID", "42"),
            ("DISPATCH_DISPATCHER_CHAT_ID", "-100500"),
            ("DISPATCH_MIRROR_MAX_ATTEMPTS", "6"),
            ("DISPATCH_CONFIRMATION_TTL_SECS", "600"),
            ("DISPATCH_REPORTS_ENABLED", "true"),
        ]));

        let settings = load_from_empty_args();

        assert_eq!(
            settings.database_url(),
            Ok("postgres://dispatch@localhost/dispatch")
        );
        let pool = settings.pool_config().expect("pool config");
        assert_eq!(pool.max_size, 24);
        assert_eq!(pool.checkout_timeout, Duration::from_secs(5));
        assert_eq!(
            settings.bind_addr(),
            Ok(SocketAddr::from(([127, 0, 0, 1], 9090)))
        );
        assert_eq!(settings.utc_offset_minutes(), 300);
        assert_eq!(settings.mirror_retry().max_attempts, 6);
        let ingest = settings.ingest();
        assert_eq!(ingest.bot_principal_id, UserId::new(42));
        assert_eq!(ingest.dispatcher_chat_id, Some(ChatId::new(-100_500)));
        assert_eq!(ingest.confirmation_ttl, Duration::from_secs(600));
        assert!(settings.reports_enabled);
    }

    #[rstest]
    fn malformed_bind_addresses_are_reported() {
        let _guard = lock_env(cleared_except(&[("DISPATCH_BIND_ADDR", "localhost")]));

        let settings = load_from_empty_args();

        assert_eq!(
            settings.bind_addr(),
            Err(SettingsError::InvalidBindAddr("localhost".to_owned()))
        );
    }
}
