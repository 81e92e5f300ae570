use shopflow_core::config::{ConfigError, env_lookup, parsed_or, required};
use shopflow_messaging::config::MessagingConfig;

/// Orders service configuration loaded from environment variables.
#[derive(Debug)]
pub struct OrdersConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// TCP port for the HTTP server (default 8080). Env var: `ORDERS_PORT`.
    pub orders_port: u16,
    /// Apply pending migrations at startup (default true). Env var: `RUN_MIGRATIONS`.
    pub run_migrations: bool,
    pub messaging: MessagingConfig,
}

impl OrdersConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            orders_port: parsed_or(&lookup, "ORDERS_PORT", 8080)?,
            run_migrations: parsed_or(&lookup, "RUN_MIGRATIONS", true)?,
            messaging: MessagingConfig::from_lookup(&lookup)?,
        })
    }
}
