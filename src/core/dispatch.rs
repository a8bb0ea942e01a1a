//! Single-threaded dispatch loop.
//!
//! One OS thread pulls due records from the working set and hands them to the
//! transport, strictly one at a time. When nothing is due the thread parks on
//! a condvar until the next deadline, a sooner newly scheduled record, or
//! shutdown, whichever comes first.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::core::durable::DurableStore;
use crate::core::queue::SchedulingQueue;
use crate::core::record::{MailPayload, RecordId, SchedulingRecord};
use crate::core::scheduler::SchedulerShared;
use crate::core::stats::SchedulerCounters;
use crate::core::SchedulerError;
use crate::util::clock::{millis_until, now_ms};

/// Shared state for Condvar-based wake notifications.
#[derive(Debug, Default)]
struct WakeState {
    /// A sooner deadline (or shutdown) arrived since the dispatcher last looked.
    wake_requested: bool,
    /// Shutdown has been signalled.
    shutdown: bool,
    /// Deadline the dispatcher is currently sleeping towards.
    earliest_known: Option<u128>,
}

/// Wakes the dispatch thread early.
#[derive(Debug, Default)]
pub(crate) struct DispatchSignal {
    state: Mutex<WakeState>,
    condvar: Condvar,
}

impl DispatchSignal {
    /// A record due at `due_at_ms` entered the working set.
    ///
    /// Only wakes the dispatcher if it precedes the deadline it sleeps towards.
    pub(crate) fn notify_scheduled(&self, due_at_ms: u128) {
        let mut state = self.state.lock();
        if state.earliest_known.is_some_and(|known| known <= due_at_ms) {
            return;
        }
        state.earliest_known = Some(due_at_ms);
        state.wake_requested = true;
        drop(state);
        self.condvar.notify_one();
    }

    /// Wake the dispatcher for good.
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        state.wake_requested = true;
        drop(state);
        self.condvar.notify_all();
    }

    /// Park until the earliest resident record is within `tolerance` of due,
    /// bounded by `max_idle`, or until woken.
    ///
    /// The queue is consulted while the signal lock is held, so a record
    /// scheduled concurrently is either seen here or triggers a wake.
    pub(crate) fn wait_until_due(
        &self,
        queue: &SchedulingQueue,
        tolerance: Duration,
        max_idle: Duration,
    ) {
        let mut state = self.state.lock();
        if state.shutdown {
            return;
        }
        if std::mem::take(&mut state.wake_requested) {
            return;
        }
        let next_due = queue.next_due_at_ms();
        state.earliest_known = next_due;
        let timeout = next_due.map_or(max_idle, |due| {
            let wake_at = due.saturating_sub(tolerance.as_millis());
            Duration::from_millis(millis_until(wake_at, now_ms())).min(max_idle)
        });
        if timeout.is_zero() {
            return;
        }
        trace!(timeout_ms = timeout.as_millis(), "dispatcher idle");
        let _ = self.condvar.wait_for(&mut state, timeout);
        state.wake_requested = false;
    }
}

/// Spawn the dispatch thread.
pub(crate) fn spawn_dispatch_loop(
    shared: Arc<SchedulerShared>,
) -> Result<JoinHandle<()>, SchedulerError> {
    thread::Builder::new()
        .name("mail-dispatch".into())
        .spawn(move || run_dispatch_loop(&shared))
        .map_err(SchedulerError::from)
}

fn run_dispatch_loop(shared: &SchedulerShared) {
    // Transport calls are async; this thread drives them on its own runtime.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to create dispatch runtime");
            return;
        }
    };
    debug!("dispatch loop started");

    while shared.status.is_running() {
        // Marked in flight before the dequeue claim is released, so backfill skips it until retired.
        let next = shared.queue.begin_dequeue().and_then(|session| {
            let record = session.next_due(shared.dispatch_tolerance)?;
            *shared.in_flight.lock() = Some(record.id());
            Some(record)
        });
        match next {
            Some(record) => {
                let sent = shared.status.is_running();
                if sent {
                    dispatch_one(shared, &rt, &record);
                } else {
                    debug!(record_id = %record.id(), "shutdown requested; record left for next start");
                }
                let store = shared.store.as_deref().filter(|_| sent);
                if let Err(e) = retire(&shared.queue, store, &shared.in_flight, record.id()) {
                    SchedulerCounters::bump(&shared.counters.store_errors);
                    warn!(record_id = %record.id(), error = %e, "failed to remove dispatched record from durable store");
                }
            }
            None => shared.signal.wait_until_due(
                &shared.queue,
                shared.dispatch_tolerance,
                shared.max_idle_wait,
            ),
        }
    }

    debug!("dispatch loop exiting");
}

fn dispatch_one(shared: &SchedulerShared, rt: &tokio::runtime::Runtime, record: &SchedulingRecord) {
    let transport = &shared.transport;
    let outcome = rt.block_on(async {
        match record.payload() {
            MailPayload::Plain { message } => transport.send(message).await,
            MailPayload::Templated {
                message,
                template_name,
                model,
            } => transport.send_template(message, template_name, model).await,
        }
    });

    match outcome {
        Ok(()) => {
            SchedulerCounters::bump(&shared.counters.dispatched);
            info!(
                record_id = %record.id(),
                kind = record.payload().kind(),
                priority = record.assigned_priority(),
                lateness_ms = now_ms().saturating_sub(record.scheduled_at_ms()),
                "mail dispatched"
            );
        }
        Err(e) => {
            SchedulerCounters::bump(&shared.counters.failed);
            error!(
                record_id = %record.id(),
                kind = record.payload().kind(),
                error = %e,
                "mail dispatch failed; record dropped"
            );
        }
    }
}

/// Drop a finished record from `store` and clear the in-flight mark.
///
/// Runs under a dequeue claim so it cannot interleave with a backfill pass,
/// which reads the store under an enqueue claim: the pass either sees the
/// record gone or still sees it marked in flight. Once the queue is closing
/// no pass can admit anything, so the claim is skipped.
pub(crate) fn retire(
    queue: &SchedulingQueue,
    store: Option<&DurableStore>,
    in_flight: &Mutex<Option<RecordId>>,
    id: RecordId,
) -> Result<(), SchedulerError> {
    let claim = queue.begin_dequeue();
    // A send attempt is final either way; a leftover entry would be redelivered.
    let removed = store.map_or(Ok(false), |store| store.remove(id));
    *in_flight.lock() = None;
    if let Some(claim) = claim {
        claim.complete();
    }
    removed.map(|_| ())
}
