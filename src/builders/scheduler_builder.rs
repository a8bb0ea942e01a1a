//! Build a [`MailScheduler`] from configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::config::{SchedulerConfig, StoreBackendConfig};
use crate::core::{AppResult, MailScheduler, MailTransport, SchedulerError, SortedSetBackend};
use crate::infra::{FileSortedSetStore, InMemorySortedSetStore, LoggingTransport};

/// Open the durable store backend selected by `cfg`.
///
/// Returns `None` when persistence is disabled.
pub fn build_backend(
    cfg: &SchedulerConfig,
) -> Result<Option<Arc<dyn SortedSetBackend>>, SchedulerError> {
    if !cfg.persistence.enabled {
        return Ok(None);
    }
    let backend: Arc<dyn SortedSetBackend> = match &cfg.persistence.store {
        StoreBackendConfig::InMemory => Arc::new(InMemorySortedSetStore::new()),
        StoreBackendConfig::File { path, stream } => {
            Arc::new(FileSortedSetStore::open(path, stream.as_str())?)
        }
    };
    Ok(Some(backend))
}

/// Validate `cfg`, open its backend, and start a scheduler over `transport`.
pub fn build_scheduler(
    cfg: &SchedulerConfig,
    transport: Arc<dyn MailTransport>,
) -> AppResult<MailScheduler> {
    cfg.validate()
        .map_err(SchedulerError::InvalidConfig)
        .context("scheduler config rejected")?;
    let backend = build_backend(cfg).context("failed to open durable store")?;
    let scheduler =
        MailScheduler::start(cfg, transport, backend).context("failed to start mail scheduler")?;
    Ok(scheduler)
}

/// Fluent construction of a [`MailScheduler`].
///
/// Defaults to [`LoggingTransport`] and to the backend named in the
/// configuration; both can be overridden.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    transport: Option<Arc<dyn MailTransport>>,
    backend: Option<Arc<dyn SortedSetBackend>>,
}

impl SchedulerBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            transport: None,
            backend: None,
        }
    }

    /// Start from `MAIL_SCHEDULER_*` environment variables.
    pub fn from_env() -> AppResult<Self> {
        let config = SchedulerConfig::from_env()
            .map_err(SchedulerError::InvalidConfig)
            .context("failed to read scheduler config from environment")?;
        Ok(Self::new(config))
    }

    /// Use this transport instead of [`LoggingTransport`].
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use this backend instead of the configured one.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn SortedSetBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Configuration the scheduler will be started with.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Start the scheduler.
    pub fn build(self) -> AppResult<MailScheduler> {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(LoggingTransport::new()));
        match self.backend {
            Some(backend) => MailScheduler::start(&self.config, transport, Some(backend))
                .context("failed to start mail scheduler"),
            None => build_scheduler(&self.config, transport),
        }
    }
}
