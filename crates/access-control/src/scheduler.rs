use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use graceguard_core::error::GraceGuardError;
use graceguard_core::ids::ReblockId;
use graceguard_core::types::ReblockTicket;
use hosts_store::HostsStore;

/// Runs deferred re-blocks as tokio tasks on the given runtime.
///
/// Every granted activation gets its own timer; timers never cancel each
/// other and each re-applies an idempotent `block`, so overlapping re-blocks
/// are harmless.
pub struct ReblockScheduler {
    runtime: Handle,
    store: Arc<HostsStore>,
    pending: Arc<Mutex<Vec<PendingReblock>>>,
}

struct PendingReblock {
    ticket: ReblockTicket,
    handle: JoinHandle<()>,
}

impl ReblockScheduler {
    pub fn new(runtime: Handle, store: Arc<HostsStore>) -> Self {
        Self {
            runtime,
            store,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Wall-clock time at which a re-block scheduled at `activated_at` fires.
    pub fn fire_time(
        activated_at: OffsetDateTime,
        delay: Duration,
    ) -> Result<OffsetDateTime, GraceGuardError> {
        time::Duration::try_from(delay)
            .ok()
            .and_then(|delay| activated_at.checked_add(delay))
            .ok_or_else(|| {
                GraceGuardError::Schedule(format!("delay of {}s is out of range", delay.as_secs()))
            })
    }

    /// Arranges for `selectors` to be blocked again `delay` after
    /// `activated_at` and returns immediately. Nothing is spawned on error.
    pub fn schedule_reblock(
        &self,
        selectors: Vec<String>,
        delay: Duration,
        activated_at: OffsetDateTime,
    ) -> Result<ReblockTicket, GraceGuardError> {
        let ticket = ReblockTicket {
            id: ReblockId::new(),
            selectors,
            fire_at: Self::fire_time(activated_at, delay)?,
        };

        let store = self.store.clone();
        let pending = self.pending.clone();
        let task_ticket = ticket.clone();

        let mut guard = lock_pending(&self.pending);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            run_reblock(&store, &task_ticket);
            lock_pending(&pending).retain(|entry| entry.ticket.id != task_ticket.id);
        });
        guard.push(PendingReblock {
            ticket: ticket.clone(),
            handle,
        });
        drop(guard);

        info!(
            id = %ticket.id,
            fire_at = %ticket.fire_at,
            selectors = ?ticket.selectors,
            "re-block scheduled"
        );
        Ok(ticket)
    }

    /// Timers that have not fired yet, earliest first.
    pub fn pending(&self) -> Vec<ReblockTicket> {
        let mut guard = lock_pending(&self.pending);
        guard.retain(|entry| !entry.handle.is_finished());
        let mut tickets: Vec<ReblockTicket> =
            guard.iter().map(|entry| entry.ticket.clone()).collect();
        tickets.sort_by_key(|ticket| ticket.fire_at);
        tickets
    }

    pub fn has_pending(&self) -> bool {
        !self.pending().is_empty()
    }

    /// Aborts every pending timer. Only process shutdown does this.
    pub fn cancel_all(&self) -> usize {
        let cancelled: Vec<PendingReblock> = lock_pending(&self.pending).drain(..).collect();
        for entry in &cancelled {
            entry.handle.abort();
            debug!(id = %entry.ticket.id, "re-block cancelled");
        }
        cancelled.len()
    }

    /// Waits until every timer scheduled so far has fired. Timers being
    /// awaited are no longer listed by `pending`.
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = lock_pending(&self.pending)
                .drain(..)
                .map(|entry| entry.handle)
                .collect();
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    if !err.is_cancelled() {
                        warn!(error = %err, "re-block task failed");
                    }
                }
            }
        }
    }
}

fn run_reblock(store: &HostsStore, ticket: &ReblockTicket) {
    match store.block(&ticket.selectors) {
        Ok(true) => info!(id = %ticket.id, selectors = ?ticket.selectors, "guarded selectors re-blocked"),
        Ok(false) => debug!(id = %ticket.id, "guarded selectors already blocked"),
        Err(err) => error!(id = %ticket.id, error = %err, "re-block failed"),
    }
}

fn lock_pending(pending: &Mutex<Vec<PendingReblock>>) -> MutexGuard<'_, Vec<PendingReblock>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
