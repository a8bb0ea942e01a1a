//! Core scheduling engine: working set, durable store adapter, and the loops driving them.

pub mod error;
pub mod record;
pub mod queue;
pub mod durable;
pub mod transport;
pub mod status;
pub mod stats;
pub mod backfill;
pub(crate) mod dispatch;
pub mod scheduler;

pub use error::{AppResult, SchedulerError, TransportError};
pub use record::{MailMessage, MailPayload, QueueKey, RecordId, SchedulingRecord};
pub use queue::{
    Admission, DequeueSession, EnqueueSession, QueueState, SchedulingQueue, QUEUABILITY_DELTA_MS,
};
pub use durable::{DurableStore, IndexScore, SortedSetBackend, REMOVE_CHUNK};
pub use transport::MailTransport;
pub use status::{SchedulerStatus, StatusCell};
pub use stats::SchedulerStats;
pub use backfill::{backfill_once, BackfillPass, BackfillSettings};
pub use scheduler::{MailScheduler, ScheduleRequest, TemplateSpec};
