use std::path::PathBuf;
use std::time::Duration;

use crate::outbox::RelayConfig;

/// Edge node configuration
///
/// # Environment variables
///
/// Every setting can be overridden via environment variable:
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | /var/lib/store-edge | Working directory (ledger, logs) |
/// | EDGE_ID | edge-local | Identity reported to HQ in sync batches |
/// | DEFAULT_CURRENCY | VND | Currency for transactions that do not specify one |
/// | RELAY_STREAM | hq-sales | Sync stream name for the sales relay |
/// | RELAY_BATCH_SIZE | 100 | Max outbox events per HQ push |
/// | RELAY_POLL_MS | 1000 | Relay poll interval (milliseconds) |
/// | RELAY_TIMEOUT_MS | 30000 | Deadline for one HQ request (milliseconds) |
/// | RELAY_MAX_ATTEMPTS | 10 | Publish attempts before an event is isolated |
/// | RELAY_INITIAL_BACKOFF_MS | 5000 | First retry delay after a transport failure |
/// | RELAY_MAX_BACKOFF_MS | 60000 | Retry delay ceiling |
/// | ENVIRONMENT | development | development \| staging \| production |
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory holding the ledger database and log files
    pub work_dir: String,
    /// Edge node identity included in every HQ sync batch
    pub edge_id: String,
    /// Currency applied when a transaction is created without one
    pub default_currency: String,
    /// Stream name the sales relay advances its cursor under
    pub relay_stream: String,
    /// Maximum outbox events shipped per HQ request
    pub relay_batch_size: usize,
    /// Relay poll interval in milliseconds
    pub relay_poll_ms: u64,
    /// Deadline for a single HQ request in milliseconds
    pub relay_timeout_ms: u64,
    /// Publish attempts before a poison event is isolated
    pub relay_max_attempts: u32,
    /// Initial retry backoff after a transport failure (milliseconds)
    pub relay_initial_backoff_ms: u64,
    /// Retry backoff ceiling (milliseconds)
    pub relay_max_backoff_ms: u64,
    /// Runtime environment: development | staging | production
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/store-edge".into()),
            edge_id: std::env::var("EDGE_ID").unwrap_or_else(|_| "edge-local".into()),
            default_currency: std::env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "VND".into()),
            relay_stream: std::env::var("RELAY_STREAM").unwrap_or_else(|_| "hq-sales".into()),
            relay_batch_size: std::env::var("RELAY_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            relay_poll_ms: std::env::var("RELAY_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            relay_timeout_ms: std::env::var("RELAY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30000),
            relay_max_attempts: std::env::var("RELAY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            relay_initial_backoff_ms: std::env::var("RELAY_INITIAL_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            relay_max_backoff_ms: std::env::var("RELAY_MAX_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// Override the working directory, keeping everything else from the
    /// environment. Mostly used by tests.
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    /// Path of the ledger database file under the working directory
    pub fn ledger_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("store-edge.redb")
    }

    /// Relay settings derived from this configuration
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            stream: self.relay_stream.clone(),
            batch_size: self.relay_batch_size,
            poll_interval: Duration::from_millis(self.relay_poll_ms),
            request_timeout: Duration::from_millis(self.relay_timeout_ms),
            max_publish_attempts: self.relay_max_attempts,
            initial_backoff: Duration::from_millis(self.relay_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.relay_max_backoff_ms),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
