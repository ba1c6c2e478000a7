//! Exchange service configuration.

use std::str::FromStr;
use std::time::Duration;

use fxledger_common::BPS_DIVISOR;
use fxledger_fx::DEFAULT_OVERRIDE_FEE_BPS;
use fxledger_ledger::postgres::PgStoreConfig;
use rust_decimal::Decimal;

/// Ledger database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
    /// Per-statement limit inside transactions.
    pub statement_timeout: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let store = PgStoreConfig::default();
        Self {
            url: store.database_url,
            max_connections: store.max_connections,
            acquire_timeout: store.acquire_timeout,
            statement_timeout: store.statement_timeout,
        }
    }
}

/// Rate oracle configuration.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// HTTP endpoint of the rate service. `None` uses the in-process static
    /// rate service.
    pub url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Rate quoted by the static service for pairs missing from its table.
    pub static_rate: Option<Decimal>,
    /// Fee for the static override, in basis points.
    pub static_fee_bps: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(2),
            static_rate: None,
            static_fee_bps: DEFAULT_OVERRIDE_FEE_BPS,
        }
    }
}

/// Main exchange configuration.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub database: DatabaseConfig,
    pub oracle: OracleConfig,
    /// Deadline for one intake, conversion or read operation.
    pub operation_timeout: Duration,
    /// Maximum job references consumed per batch.
    pub dispatch_batch_size: usize,
    /// Capacity of the in-process dispatch channel.
    pub dispatch_capacity: usize,
    /// Log level.
    pub log_level: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            oracle: OracleConfig::default(),
            operation_timeout: Duration::from_secs(10),
            dispatch_batch_size: 10,
            dispatch_capacity: 1024,
            log_level: "info".to_string(),
        }
    }
}

impl ExchangeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(max) = env_parse("DB_MAX_CONNECTIONS") {
            config.database.max_connections = max;
        }
        if let Some(ms) = env_parse::<u64>("OPERATION_TIMEOUT_MS") {
            config.operation_timeout = Duration::from_millis(ms);
        }

        if let Ok(url) = std::env::var("RATE_ORACLE_URL") {
            if !url.trim().is_empty() {
                config.oracle.url = Some(url);
            }
        }
        if let Some(ms) = env_parse::<u64>("RATE_ORACLE_TIMEOUT_MS") {
            config.oracle.timeout = Duration::from_millis(ms);
        }
        if let Some(rate) = env_parse::<Decimal>("STATIC_RATE") {
            config.oracle.static_rate = Some(rate);
        }
        if let Some(bps) = env_parse("STATIC_FEE_BPS") {
            config.oracle.static_fee_bps = bps;
        }

        if let Some(size) = env_parse("DISPATCH_BATCH_SIZE") {
            config.dispatch_batch_size = size;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("Database pool needs at least one connection".to_string());
        }

        if self.operation_timeout.is_zero() {
            return Err("Operation timeout cannot be 0".to_string());
        }

        if self.oracle.timeout > self.operation_timeout {
            return Err("Rate oracle timeout cannot exceed the operation timeout".to_string());
        }

        if let Some(rate) = self.oracle.static_rate {
            if rate <= Decimal::ZERO {
                return Err("STATIC_RATE must be positive".to_string());
            }
        }

        if self.oracle.static_fee_bps > BPS_DIVISOR {
            return Err("STATIC_FEE_BPS cannot exceed 10000".to_string());
        }

        if self.dispatch_batch_size == 0 || self.dispatch_capacity == 0 {
            return Err("Dispatch batch size and capacity must be positive".to_string());
        }

        Ok(())
    }

    /// Store settings for the ledger pool.
    pub fn store_config(&self) -> PgStoreConfig {
        PgStoreConfig {
            database_url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            acquire_timeout: self.database.acquire_timeout,
            statement_timeout: self.database.statement_timeout,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
