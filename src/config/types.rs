use serde::Deserialize;

/// Browser-like identification sent with every supplier page request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure for Price-Sync
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sync behaviour. Numeric fields are clamped into range by [`SyncSettings::clamped`]
/// rather than rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncSettings {
    /// Per-request timeout for supplier pages, 5..=60 seconds
    pub fetch_timeout_seconds: u64,

    /// Products processed per invocation, 1..=25
    pub batch_size: usize,

    /// Consecutive counted failures before a product is hidden, 1..=99
    pub max_errors: u32,

    /// Skip products synced successfully within `skip_recent_hours` (cron runs only)
    pub skip_recent_sync: bool,

    /// Recent-sync window, 1..=168 hours
    pub skip_recent_hours: u32,

    /// Recipient of failure and restoration notices
    pub admin_email: String,

    /// Write every event level to the event log instead of only errors and successes
    pub detailed_logging: bool,

    /// Soft wall-clock budget for one invocation, 5..=600 seconds
    pub time_budget_seconds: u64,

    /// Pause between two products of a batch, 0..=10000 milliseconds
    pub throttle_ms: u64,

    /// User agent sent to supplier sites
    pub user_agent: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_seconds: 30,
            batch_size: 5,
            max_errors: 1,
            skip_recent_sync: false,
            skip_recent_hours: 24,
            admin_email: String::new(),
            detailed_logging: false,
            time_budget_seconds: 45,
            throttle_ms: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SyncSettings {
    /// Returns a copy with every numeric option forced into its allowed range
    pub fn clamped(&self) -> Self {
        let user_agent = if self.user_agent.trim().is_empty() {
            DEFAULT_USER_AGENT.to_string()
        } else {
            self.user_agent.trim().to_string()
        };

        Self {
            fetch_timeout_seconds: self.fetch_timeout_seconds.clamp(5, 60),
            batch_size: self.batch_size.clamp(1, 25),
            max_errors: self.max_errors.clamp(1, 99),
            skip_recent_sync: self.skip_recent_sync,
            skip_recent_hours: self.skip_recent_hours.clamp(1, 168),
            admin_email: self.admin_email.trim().to_string(),
            detailed_logging: self.detailed_logging,
            time_budget_seconds: self.time_budget_seconds.clamp(5, 600),
            throttle_ms: self.throttle_ms.min(10_000),
            user_agent,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./price-sync.db".to_string(),
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Directory holding the monthly event log files
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "./logs".to_string(),
        }
    }
}
