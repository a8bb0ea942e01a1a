//! Background loop topping up the working set from the durable store.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, trace, warn};

use crate::core::durable::DurableStore;
use crate::core::queue::{Admission, SchedulingQueue};
use crate::core::record::RecordId;
use crate::core::scheduler::SchedulerShared;
use crate::core::stats::SchedulerCounters;
use crate::core::SchedulerError;

/// How much the backfill loop loads and when.
#[derive(Debug, Clone, Copy)]
pub struct BackfillSettings {
    /// Records requested beyond the current resident count.
    pub desired_batch_size: usize,
    /// Backfill runs while fewer than this many records are resident.
    pub min_in_memory: usize,
    /// Upper bound on resident records.
    pub max_in_memory: usize,
    /// Pause between cycles.
    pub interval: Duration,
}

impl BackfillSettings {
    /// Records to request given `resident` records already in memory.
    #[must_use]
    pub fn request_size(&self, resident: usize) -> usize {
        resident
            .saturating_add(self.desired_batch_size)
            .min(self.max_in_memory)
    }
}

/// Result of one backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillPass {
    /// Records newly resident.
    pub loaded: usize,
    /// Resident records evicted to make room.
    pub evicted: usize,
    /// Earliest due instant among newly resident records.
    pub earliest_loaded_ms: Option<u128>,
}

/// Run a single backfill pass.
///
/// Does nothing while at least `min_in_memory` records are resident; an
/// empty working set always gets a pass. The store is read under an enqueue
/// claim; records for which `skip` returns `true` (the one being dispatched)
/// are not offered.
pub fn backfill_once<F>(
    queue: &SchedulingQueue,
    store: &DurableStore,
    settings: &BackfillSettings,
    skip: F,
) -> Result<BackfillPass, SchedulerError>
where
    F: Fn(RecordId) -> bool,
{
    let resident = queue.currently_in_queue();
    if resident > 0 && resident >= settings.min_in_memory {
        trace!(resident, "working set above minimum; backfill idle");
        return Ok(BackfillPass::default());
    }

    let mut pass = BackfillPass::default();
    let Some(session) = queue.begin_enqueue() else {
        return Ok(pass);
    };
    let wanted = settings.request_size(queue.currently_in_queue());
    let batch = store.next_batch(wanted)?;
    for record in batch {
        if skip(record.id()) {
            continue;
        }
        let due = record.scheduled_at_ms();
        match session.offer(Arc::new(record), true) {
            Admission::Admitted => pass.loaded += 1,
            Admission::Evicted(_) => {
                pass.loaded += 1;
                pass.evicted += 1;
            }
            Admission::Duplicate | Admission::Deferred | Admission::Rejected => continue,
            Admission::Closed => break,
        }
        pass.earliest_loaded_ms = Some(pass.earliest_loaded_ms.map_or(due, |e| e.min(due)));
    }
    session.complete();

    if pass.loaded > 0 {
        debug!(
            loaded = pass.loaded,
            evicted = pass.evicted,
            requested = wanted,
            resident = queue.currently_in_queue(),
            "backfilled from durable store"
        );
    }
    Ok(pass)
}

/// Spawn the backfill thread. It exits when `shutdown` fires or disconnects.
pub(crate) fn spawn_backfill_loop(
    shared: Arc<SchedulerShared>,
    store: Arc<DurableStore>,
    settings: BackfillSettings,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<()>, SchedulerError> {
    thread::Builder::new()
        .name("mail-backfill".into())
        .spawn(move || run_backfill_loop(&shared, &store, &settings, &shutdown))
        .map_err(SchedulerError::from)
}

fn run_backfill_loop(
    shared: &SchedulerShared,
    store: &DurableStore,
    settings: &BackfillSettings,
    shutdown: &Receiver<()>,
) {
    debug!(
        min_in_memory = settings.min_in_memory,
        max_in_memory = settings.max_in_memory,
        batch = settings.desired_batch_size,
        "backfill loop started"
    );

    while shared.status.is_running() {
        let in_flight = |id: RecordId| *shared.in_flight.lock() == Some(id);
        match backfill_once(&shared.queue, store, settings, in_flight) {
            Ok(pass) => {
                for _ in 0..pass.loaded {
                    SchedulerCounters::bump(&shared.counters.backfilled);
                }
                for _ in 0..pass.evicted {
                    SchedulerCounters::bump(&shared.counters.evicted);
                }
                if let Some(due) = pass.earliest_loaded_ms {
                    shared.signal.notify_scheduled(due);
                }
            }
            Err(e) => {
                SchedulerCounters::bump(&shared.counters.store_errors);
                warn!(error = %e, "backfill read failed; retrying next cycle");
            }
        }

        match shutdown.recv_timeout(settings.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("backfill loop exiting");
}
