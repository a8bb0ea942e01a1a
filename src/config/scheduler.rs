//! Scheduler configuration structures.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "MAIL_SCHEDULER_";

/// Durable store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory sorted-set store for development/testing.
    #[default]
    InMemory,
    /// JSON-lines operation log under a directory.
    File {
        /// Directory holding the log.
        path: PathBuf,
        /// Log file stem.
        #[serde(default = "default_stream")]
        stream: String,
    },
}

fn default_stream() -> String {
    "mailqueue".into()
}

/// Overflow persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Whether records are written through to a durable store.
    pub enabled: bool,
    /// Records requested per backfill cycle beyond the resident count.
    pub desired_batch_size: usize,
    /// Backfill runs while fewer records than this are resident.
    pub min_in_memory: usize,
    /// Hard bound on resident records.
    pub max_in_memory: usize,
    /// Backend holding overflow records.
    pub store: StoreBackendConfig,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            desired_batch_size: 100,
            min_in_memory: 100,
            max_in_memory: 1_000,
            store: StoreBackendConfig::InMemory,
        }
    }
}

impl PersistenceConfig {
    /// Validate persistence values. Disabled persistence is always valid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.desired_batch_size == 0 {
            return Err("desired_batch_size must be greater than 0".into());
        }
        if self.max_in_memory == 0 {
            return Err("max_in_memory must be greater than 0".into());
        }
        if self.min_in_memory == 0 {
            return Err("min_in_memory must be greater than 0; backfill would never run".into());
        }
        if self.min_in_memory > self.max_in_memory {
            return Err(format!(
                "min_in_memory ({}) must not exceed max_in_memory ({})",
                self.min_in_memory, self.max_in_memory
            ));
        }
        if self.max_in_memory < self.desired_batch_size {
            return Err(format!(
                "max_in_memory ({}) must be at least desired_batch_size ({})",
                self.max_in_memory, self.desired_batch_size
            ));
        }
        if let StoreBackendConfig::File { path, stream } = &self.store {
            if path.as_os_str().is_empty() {
                return Err("file store path must not be empty".into());
            }
            if stream.trim().is_empty() {
                return Err("file store stream must not be empty".into());
            }
        }
        Ok(())
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of priority bands; level 1 is the highest priority.
    pub priority_levels: u32,
    /// Overflow persistence.
    pub persistence: PersistenceConfig,
    /// How early a record may be dispatched, in milliseconds.
    pub dispatch_tolerance_ms: u64,
    /// Pause between backfill cycles, in milliseconds.
    pub backfill_interval_ms: u64,
    /// Longest the dispatcher sleeps without re-checking, in milliseconds.
    pub max_idle_wait_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            priority_levels: 3,
            persistence: PersistenceConfig::default(),
            dispatch_tolerance_ms: 1_000,
            backfill_interval_ms: 5_000,
            max_idle_wait_ms: 30_000,
        }
    }
}

impl SchedulerConfig {
    /// Default configuration with `levels` priority bands.
    #[must_use]
    pub fn new(levels: u32) -> Self {
        Self {
            priority_levels: levels,
            ..Self::default()
        }
    }

    /// Set persistence settings.
    #[must_use]
    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    /// Set dispatch tolerance.
    #[must_use]
    pub const fn with_dispatch_tolerance_ms(mut self, ms: u64) -> Self {
        self.dispatch_tolerance_ms = ms;
        self
    }

    /// Set backfill interval.
    #[must_use]
    pub const fn with_backfill_interval_ms(mut self, ms: u64) -> Self {
        self.backfill_interval_ms = ms;
        self
    }

    /// Set the dispatcher idle bound.
    #[must_use]
    pub const fn with_max_idle_wait_ms(mut self, ms: u64) -> Self {
        self.max_idle_wait_ms = ms;
        self
    }

    /// Dispatch tolerance as a duration.
    #[must_use]
    pub const fn dispatch_tolerance(&self) -> Duration {
        Duration::from_millis(self.dispatch_tolerance_ms)
    }

    /// Backfill interval as a duration.
    #[must_use]
    pub const fn backfill_interval(&self) -> Duration {
        Duration::from_millis(self.backfill_interval_ms)
    }

    /// Dispatcher idle bound as a duration.
    #[must_use]
    pub const fn max_idle_wait(&self) -> Duration {
        Duration::from_millis(self.max_idle_wait_ms)
    }

    /// Validate all values.
    pub fn validate(&self) -> Result<(), String> {
        if self.priority_levels == 0 {
            return Err("priority_levels must be at least 1".into());
        }
        if self.backfill_interval_ms == 0 {
            return Err("backfill_interval_ms must be greater than 0".into());
        }
        if self.max_idle_wait_ms == 0 {
            return Err("max_idle_wait_ms must be greater than 0".into());
        }
        self.persistence
            .validate()
            .map_err(|e| format!("persistence invalid: {e}"))
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `MAIL_SCHEDULER_*` environment variables.
    ///
    /// A `.env` file is loaded first if present. Unset variables keep their
    /// defaults. Recognized: `PRIORITY_LEVELS`, `PERSISTENCE_ENABLED`,
    /// `DESIRED_BATCH_SIZE`, `MIN_IN_MEMORY`, `MAX_IN_MEMORY`, `STORE_PATH`
    /// (selects the file backend), `STORE_STREAM`, `DISPATCH_TOLERANCE_MS`,
    /// `BACKFILL_INTERVAL_MS`, `MAX_IDLE_WAIT_MS`.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        if let Some(v) = env_parse("PRIORITY_LEVELS")? {
            cfg.priority_levels = v;
        }
        if let Some(v) = env_parse("PERSISTENCE_ENABLED")? {
            cfg.persistence.enabled = v;
        }
        if let Some(v) = env_parse("DESIRED_BATCH_SIZE")? {
            cfg.persistence.desired_batch_size = v;
        }
        if let Some(v) = env_parse("MIN_IN_MEMORY")? {
            cfg.persistence.min_in_memory = v;
        }
        if let Some(v) = env_parse("MAX_IN_MEMORY")? {
            cfg.persistence.max_in_memory = v;
        }
        if let Some(path) = env_var("STORE_PATH") {
            cfg.persistence.store = StoreBackendConfig::File {
                path: PathBuf::from(path),
                stream: env_var("STORE_STREAM").unwrap_or_else(default_stream),
            };
        }
        if let Some(v) = env_parse("DISPATCH_TOLERANCE_MS")? {
            cfg.dispatch_tolerance_ms = v;
        }
        if let Some(v) = env_parse("BACKFILL_INTERVAL_MS")? {
            cfg.backfill_interval_ms = v;
        }
        if let Some(v) = env_parse("MAX_IDLE_WAIT_MS")? {
            cfg.max_idle_wait_ms = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{ENV_PREFIX}{name}={raw}: {e}"))
        })
        .transpose()
}
