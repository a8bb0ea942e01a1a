//! Public entry point: schedule mail, observe progress, shut down.
//!
//! [`MailScheduler::start`] wires the working set, the optional durable
//! store, and the two background loops. Scheduling writes through to the
//! durable store while holding an enqueue session, then offers the record to
//! the working set, so the dispatcher can never remove a record from the
//! store before it was written.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::backfill::{spawn_backfill_loop, BackfillSettings};
use crate::core::dispatch::{spawn_dispatch_loop, DispatchSignal};
use crate::core::durable::{DurableStore, SortedSetBackend};
use crate::core::queue::{Admission, SchedulingQueue};
use crate::core::record::{MailMessage, MailPayload, RecordId, SchedulingRecord};
use crate::core::stats::{SchedulerCounters, SchedulerStats};
use crate::core::status::{SchedulerStatus, StatusCell};
use crate::core::transport::MailTransport;
use crate::core::SchedulerError;
use crate::util::clock::now_ms;

/// Template half of a [`ScheduleRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Template identifier understood by the transport.
    pub name: String,
    /// Data rendered into the template.
    #[serde(default)]
    pub model: serde_json::Value,
}

/// Serializable scheduling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Message to deliver.
    pub message: MailMessage,
    /// Due instant in UTC milliseconds; `None` means now.
    #[serde(default)]
    pub scheduled_at_ms: Option<u128>,
    /// Requested priority, 1 being the highest.
    pub priority: u32,
    /// Render through a template instead of sending the message as is.
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// State shared between the facade and both loop threads.
pub(crate) struct SchedulerShared {
    pub(crate) queue: SchedulingQueue,
    pub(crate) store: Option<Arc<DurableStore>>,
    pub(crate) transport: Arc<dyn MailTransport>,
    pub(crate) status: StatusCell,
    pub(crate) counters: SchedulerCounters,
    pub(crate) signal: DispatchSignal,
    /// Record handed to the transport but not yet removed from the durable store.
    pub(crate) in_flight: Mutex<Option<RecordId>>,
    pub(crate) dispatch_tolerance: Duration,
    pub(crate) max_idle_wait: Duration,
}

#[derive(Default)]
struct LoopHandles {
    dispatch: Option<JoinHandle<()>>,
    backfill: Option<JoinHandle<()>>,
    backfill_shutdown: Option<Sender<()>>,
}

/// Priority-aware, memory-bounded mail scheduler.
pub struct MailScheduler {
    shared: Arc<SchedulerShared>,
    handles: Mutex<LoopHandles>,
}

impl std::fmt::Debug for MailScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailScheduler")
            .field("status", &self.shared.status.get())
            .field("levels", &self.shared.queue.number_of_levels())
            .field("in_memory", &self.shared.queue.currently_in_queue())
            .field("persistent", &self.shared.store.is_some())
            .finish()
    }
}

impl MailScheduler {
    /// Validate `config`, build the working set and durable store, and spawn
    /// the dispatch loop plus, with persistence, the backfill loop.
    ///
    /// `backend` is required when persistence is enabled and ignored otherwise.
    pub fn start(
        config: &SchedulerConfig,
        transport: Arc<dyn MailTransport>,
        backend: Option<Arc<dyn SortedSetBackend>>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let levels = config.priority_levels;
        let persistence = &config.persistence;

        let store = if persistence.enabled {
            let backend = backend.ok_or_else(|| {
                SchedulerError::InvalidConfig(
                    "persistence enabled but no durable store backend supplied".into(),
                )
            })?;
            Some(Arc::new(DurableStore::new(backend, levels)))
        } else {
            if backend.is_some() {
                debug!("persistence disabled; ignoring supplied backend");
            }
            None
        };
        let bound = store.as_ref().map(|_| persistence.max_in_memory);

        let shared = Arc::new(SchedulerShared {
            queue: SchedulingQueue::new(levels, bound),
            store,
            transport,
            status: StatusCell::new(),
            counters: SchedulerCounters::default(),
            signal: DispatchSignal::default(),
            in_flight: Mutex::new(None),
            dispatch_tolerance: config.dispatch_tolerance(),
            max_idle_wait: config.max_idle_wait(),
        });

        let scheduler = Self {
            shared: Arc::clone(&shared),
            handles: Mutex::new(LoopHandles::default()),
        };

        let dispatch = spawn_dispatch_loop(Arc::clone(&shared))?;
        scheduler.handles.lock().dispatch = Some(dispatch);

        if let Some(store) = &shared.store {
            let settings = BackfillSettings {
                desired_batch_size: persistence.desired_batch_size,
                min_in_memory: persistence.min_in_memory,
                max_in_memory: persistence.max_in_memory,
                interval: config.backfill_interval(),
            };
            let (tx, rx) = crossbeam_channel::bounded(0);
            match spawn_backfill_loop(Arc::clone(&shared), Arc::clone(store), settings, rx) {
                Ok(handle) => {
                    let mut handles = scheduler.handles.lock();
                    handles.backfill = Some(handle);
                    handles.backfill_shutdown = Some(tx);
                }
                Err(e) => {
                    scheduler.shutdown();
                    return Err(e);
                }
            }
        }

        info!(
            levels,
            persistent = shared.store.is_some(),
            max_in_memory = ?bound,
            dispatch_tolerance_ms = config.dispatch_tolerance_ms,
            "mail scheduler started"
        );
        Ok(scheduler)
    }

    /// Schedule `message` for `scheduled_at_ms` (now if `None`).
    pub fn schedule(
        &self,
        message: MailMessage,
        scheduled_at_ms: Option<u128>,
        desired_priority: u32,
    ) -> Result<RecordId, SchedulerError> {
        self.submit(MailPayload::Plain { message }, scheduled_at_ms, desired_priority)
    }

    /// Schedule `message` to be rendered through `template_name` with `model`.
    pub fn schedule_template(
        &self,
        message: MailMessage,
        scheduled_at_ms: Option<u128>,
        desired_priority: u32,
        template_name: impl Into<String>,
        model: serde_json::Value,
    ) -> Result<RecordId, SchedulerError> {
        let payload = MailPayload::Templated {
            message,
            template_name: template_name.into(),
            model,
        };
        self.submit(payload, scheduled_at_ms, desired_priority)
    }

    /// Schedule from a serializable request.
    pub fn schedule_request(&self, request: ScheduleRequest) -> Result<RecordId, SchedulerError> {
        let ScheduleRequest {
            message,
            scheduled_at_ms,
            priority,
            template,
        } = request;
        match template {
            Some(TemplateSpec { name, model }) => {
                self.schedule_template(message, scheduled_at_ms, priority, name, model)
            }
            None => self.schedule(message, scheduled_at_ms, priority),
        }
    }

    fn submit(
        &self,
        payload: MailPayload,
        scheduled_at_ms: Option<u128>,
        desired_priority: u32,
    ) -> Result<RecordId, SchedulerError> {
        let shared = &self.shared;
        if !shared.status.is_running() {
            return Err(SchedulerError::ShuttingDown);
        }
        if desired_priority == 0 {
            return Err(SchedulerError::InvalidPriority(desired_priority));
        }
        payload.message().validate()?;
        if let MailPayload::Templated { template_name, .. } = &payload {
            if template_name.trim().is_empty() {
                return Err(SchedulerError::InvalidMessage(
                    "template name must not be empty".into(),
                ));
            }
        }

        let levels = shared.queue.number_of_levels();
        let assigned_priority = if desired_priority > levels {
            warn!(
                desired_priority,
                levels, "priority beyond configured levels; clamping to lowest"
            );
            levels
        } else {
            desired_priority
        };
        let scheduled_at_ms = scheduled_at_ms.unwrap_or_else(now_ms);
        let record = Arc::new(SchedulingRecord::new(
            payload,
            scheduled_at_ms,
            desired_priority,
            assigned_priority,
        ));
        let id = record.id();

        let session = shared
            .queue
            .begin_enqueue()
            .ok_or(SchedulerError::ShuttingDown)?;
        let write_error = shared.store.as_ref().and_then(|store| match store.add(&record) {
            Ok(()) => None,
            Err(e) => {
                SchedulerCounters::bump(&shared.counters.store_errors);
                warn!(record_id = %id, error = %e, "durable write failed; record kept in memory only");
                Some(e)
            }
        });
        let admission = session.offer(Arc::clone(&record), false);
        session.complete();

        // Neither resident nor persisted: the record would never be sent.
        if let (Admission::Deferred, Some(e)) = (&admission, &write_error) {
            error!(record_id = %id, error = %e, "working set full and durable write failed; record rejected");
            return Err(SchedulerError::Backend(format!(
                "working set full and durable write failed: {e}"
            )));
        }

        SchedulerCounters::bump(&shared.counters.scheduled);
        match &admission {
            Admission::Admitted => SchedulerCounters::bump(&shared.counters.admitted),
            Admission::Evicted(evicted) => {
                SchedulerCounters::bump(&shared.counters.admitted);
                SchedulerCounters::bump(&shared.counters.evicted);
                debug!(record_id = %id, evicted_id = %evicted.id(), "evicted latest resident record");
            }
            Admission::Deferred => {
                SchedulerCounters::bump(&shared.counters.deferred);
                debug!(record_id = %id, "working set full; record deferred to backfill");
            }
            Admission::Duplicate | Admission::Rejected => {
                warn!(record_id = %id, outcome = ?admission, "record not admitted");
            }
            Admission::Closed => return Err(SchedulerError::ShuttingDown),
        }

        if admission.is_admitted() {
            shared.signal.notify_scheduled(scheduled_at_ms);
        }
        debug!(
            record_id = %id,
            scheduled_at_ms,
            desired_priority,
            level = assigned_priority,
            "mail scheduled"
        );
        Ok(id)
    }

    /// Snapshot of scheduler counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.shared
            .counters
            .snapshot(self.shared.queue.currently_in_queue())
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        self.shared.status.get()
    }

    /// Number of priority levels.
    #[must_use]
    pub fn number_of_levels(&self) -> u32 {
        self.shared.queue.number_of_levels()
    }

    /// Records currently resident in memory.
    #[must_use]
    pub fn in_memory(&self) -> usize {
        self.shared.queue.currently_in_queue()
    }

    /// Records held by the durable store, or 0 without persistence.
    pub fn durable_len(&self) -> Result<usize, SchedulerError> {
        self.shared.store.as_ref().map_or(Ok(0), |store| store.len())
    }

    /// Stop both loops and wait for them to exit. Safe to call repeatedly.
    ///
    /// Records still scheduled stay in the durable store for the next start.
    pub fn shutdown(&self) {
        if self.shared.status.begin_closing() {
            info!("mail scheduler shutting down");
        }
        let mut handles = self.handles.lock();
        self.signal_loops(&mut handles);

        for (name, handle) in [
            ("dispatch", handles.dispatch.take()),
            ("backfill", handles.backfill.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    error!(thread = name, "scheduler loop panicked");
                }
            }
        }

        if self.shared.status.get() != SchedulerStatus::Closed {
            self.shared.status.mark_closed();
            info!("mail scheduler closed");
        }
    }

    fn signal_loops(&self, handles: &mut LoopHandles) {
        self.shared.queue.close();
        self.shared.signal.shutdown();
        drop(handles.backfill_shutdown.take());
    }
}

impl Drop for MailScheduler {
    fn drop(&mut self) {
        if self.shared.status.begin_closing() {
            debug!("mail scheduler dropped without shutdown; signalling loops");
        }
        let mut handles = self.handles.lock();
        self.signal_loops(&mut handles);
    }
}
