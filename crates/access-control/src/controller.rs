use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use graceguard_core::types::{AccessStatus, ActivationOutcome};
use hosts_store::{BackupGuardian, HostsStore, RestoreOutcome};

use crate::policy::GracePolicy;
use crate::rate_limiter::RateLimiter;
use crate::scheduler::ReblockScheduler;

/// Single owner of blocking state for the guarded subset.
///
/// The presentation layer only calls `request_grace_activation` and `status`;
/// the lifecycle host calls `shutdown` (or `restore_once`) on every exit path.
pub struct AccessController {
    policy: GracePolicy,
    store: Arc<HostsStore>,
    guardian: Arc<BackupGuardian>,
    limiter: RateLimiter,
    scheduler: ReblockScheduler,
}

impl AccessController {
    /// Captures the original hosts content, then establishes the blocked
    /// baseline. A failed baseline write is logged; the controller still starts
    /// so the guardian stays armed.
    pub fn initialize(
        policy: GracePolicy,
        store: Arc<HostsStore>,
        scratch_dir: Option<&Path>,
        runtime: Handle,
    ) -> Self {
        let guardian = Arc::new(BackupGuardian::capture(store.clone(), scratch_dir));

        match store.block(&policy.managed_selectors) {
            Ok(true) => info!(count = policy.managed_selectors.len(), "blocklist applied"),
            Ok(false) => info!("blocklist already present"),
            Err(err) => error!(error = %err, "failed to apply blocklist"),
        }

        Self {
            limiter: RateLimiter::new(policy.max_activations, policy.window_duration),
            scheduler: ReblockScheduler::new(runtime, store.clone()),
            policy,
            store,
            guardian,
        }
    }

    /// Grants a grace window if the rate limit allows it: unblocks the guarded
    /// subset now and schedules its re-block for `now` plus the grace duration.
    pub fn request_grace_activation(&self, now: OffsetDateTime) -> ActivationOutcome {
        if self.store.is_sealed() {
            return ActivationOutcome::limit_reached("shutting down, hosts file already restored");
        }

        // Validated before the limiter or the store change.
        if let Err(err) = ReblockScheduler::fire_time(now, self.policy.grace_duration) {
            error!(error = %err, "grace activation refused");
            return ActivationOutcome::limit_reached(format!("grace activation refused: {err}"));
        }

        if !self.limiter.try_acquire(now) {
            let status = self.limiter.status_at(now);
            info!(used = status.used, max = status.max, "grace activation denied");
            return ActivationOutcome::limit_reached(format!(
                "unblock limit reached: {} of {} used in this {}-hour window",
                status.used,
                status.max,
                self.policy.window_hours()
            ));
        }

        let matcher = &self.policy.matcher;
        let unblocked = self.store.unblock(|line| matcher.matches(line));
        let ticket = match self.scheduler.schedule_reblock(
            self.policy.guarded_selectors.clone(),
            self.policy.grace_duration,
            now,
        ) {
            Ok(ticket) => ticket,
            Err(err) => {
                error!(error = %err, "re-block could not be scheduled, blocking again now");
                if let Err(block_err) = self.store.block(&self.policy.guarded_selectors) {
                    error!(error = %block_err, "immediate re-block failed");
                }
                return ActivationOutcome::limit_reached(format!(
                    "grace activation refused: {err}"
                ));
            }
        };

        match unblocked {
            Ok(_) => {
                info!(reblock_at = %ticket.fire_at, "grace activation granted");
                ActivationOutcome::granted(
                    format!("unblocked, will re-block in {} minutes", self.policy.grace_minutes()),
                    ticket.fire_at,
                )
            }
            Err(err) => {
                error!(error = %err, "grace activation could not edit hosts file");
                ActivationOutcome::limit_reached(format!(
                    "hosts file could not be edited, activation consumed: {err}"
                ))
            }
        }
    }

    pub fn status(&self) -> AccessStatus {
        self.status_at(OffsetDateTime::now_utc())
    }

    pub fn status_at(&self, now: OffsetDateTime) -> AccessStatus {
        let window = self.limiter.status_at(now);
        AccessStatus {
            used: window.used,
            max: window.max,
            window_start: window.window_start,
            guarded_blocked: self.guarded_blocked(),
            pending_reblocks: self.scheduler.pending(),
        }
    }

    /// Derived from the hosts content on every call. Falls back to "no timer
    /// pending" when the file cannot be read.
    pub fn guarded_blocked(&self) -> bool {
        let mut blocked = true;
        for selector in &self.policy.guarded_selectors {
            match self.store.is_blocked(selector) {
                Ok(true) => {}
                Ok(false) => blocked = false,
                Err(err) => {
                    warn!(error = %err, "hosts unreadable, deriving state from timers");
                    return !self.scheduler.has_pending();
                }
            }
        }
        blocked
    }

    /// Shutdown hook: restores the original hosts file exactly once.
    pub fn restore_once(&self) -> RestoreOutcome {
        self.guardian.restore_once()
    }

    /// Cancels pending re-blocks and restores the hosts file, giving up after
    /// `timeout`. The restore keeps running on its blocking thread if the
    /// timeout elapses.
    pub async fn shutdown(&self, timeout: Duration) -> RestoreOutcome {
        let cancelled = self.scheduler.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "pending re-blocks cancelled for shutdown");
        }

        let guardian = self.guardian.clone();
        let restore = tokio::task::spawn_blocking(move || guardian.restore_once());
        match tokio::time::timeout(timeout, restore).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                error!(error = %err, "restore task failed");
                RestoreOutcome::Failed(err.to_string())
            }
            Err(_) => {
                error!(timeout_secs = timeout.as_secs(), "restore timed out");
                RestoreOutcome::Failed("restore timed out".to_string())
            }
        }
    }

    pub fn policy(&self) -> &GracePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<HostsStore> {
        &self.store
    }

    pub fn guardian(&self) -> &BackupGuardian {
        &self.guardian
    }

    pub fn scheduler(&self) -> &ReblockScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use graceguard_core::config::Config;
    use tempfile::TempDir;
    use time::macros::datetime;

    const ORIGINAL: &str = "127.0.0.1 localhost\n::1 localhost ip6-localhost\n";

    fn setup() -> (TempDir, AccessController) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hosts");
        fs::write(&path, ORIGINAL).unwrap();
        let store = Arc::new(HostsStore::without_flush(&path, "127.0.0.1"));
        let policy = GracePolicy::from_config(&Config::default_config()).unwrap();
        let controller =
            AccessController::initialize(policy, store, Some(temp_dir.path()), Handle::current());
        (temp_dir, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_blocks_every_managed_selector() {
        let (_dir, controller) = setup();

        for selector in &controller.policy().managed_selectors {
            assert!(controller.store().is_blocked(selector).unwrap(), "{selector} not blocked");
        }
        assert!(controller.guarded_blocked());
        assert_eq!(controller.guardian().snapshot().content, ORIGINAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_activation_denied() {
        let (_dir, controller) = setup();
        let start = datetime!(2024-05-01 09:00 UTC);

        let first = controller.request_grace_activation(start);
        assert!(first.granted);
        assert_eq!(first.message, "unblocked, will re-block in 30 minutes");
        assert_eq!(first.reblock_at, Some(start + time::Duration::minutes(30)));

        assert!(controller.request_grace_activation(start + time::Duration::minutes(1)).granted);

        let third = controller.request_grace_activation(start + time::Duration::minutes(2));
        assert!(!third.granted);
        assert!(third.message.contains("limit reached"));
        assert!(third.reblock_at.is_none());

        let status = controller.status_at(start + time::Duration::minutes(3));
        assert_eq!(status.used, 2);
        assert_eq!(status.max, 2);
        assert_eq!(status.remaining(), 0);
        assert_eq!(status.pending_reblocks.len(), 2);
        assert_eq!(status.pending_reblocks[0].fire_at, datetime!(2024-05-01 09:30 UTC));
        assert_eq!(status.pending_reblocks[1].fire_at, datetime!(2024-05-01 09:31 UTC));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_unblocks_then_reblocks() {
        let (_dir, controller) = setup();
        let now = OffsetDateTime::now_utc();

        assert!(controller.request_grace_activation(now).granted);
        let contents = controller.store().read().unwrap();
        assert!(!contents.to_lowercase().contains("youtube.com"));
        assert!(contents.contains("127.0.0.1 reddit.com"));
        assert!(!controller.guarded_blocked());

        tokio::time::sleep(Duration::from_secs(29 * 60)).await;
        assert!(!controller.guarded_blocked());

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        tokio::task::yield_now().await;
        assert!(controller.store().is_blocked("youtube.com").unwrap());
        assert!(controller.store().is_blocked("www.youtube.com").unwrap());
        assert!(controller.guarded_blocked());
        assert!(controller.status().pending_reblocks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_timer_ends_grace_for_overlapping_activations() {
        let (_dir, controller) = setup();
        let now = OffsetDateTime::now_utc();

        assert!(controller.request_grace_activation(now).granted);
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert!(controller
            .request_grace_activation(now + time::Duration::minutes(10))
            .granted);

        tokio::time::sleep(Duration::from_secs(21 * 60)).await;
        tokio::task::yield_now().await;
        assert!(controller.guarded_blocked());
        assert_eq!(controller.scheduler().pending().len(), 1);

        controller.scheduler().wait_idle().await;
        let contents = controller.store().read().unwrap();
        assert_eq!(contents.matches("127.0.0.1 youtube.com").count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_restores_original_bytes() {
        let (_dir, controller) = setup();
        assert!(controller.request_grace_activation(OffsetDateTime::now_utc()).granted);
        assert_eq!(controller.scheduler().pending().len(), 1);

        let outcome = controller.shutdown(Duration::from_secs(5)).await;
        assert_eq!(outcome, RestoreOutcome::Restored);
        assert_eq!(fs::read(controller.store().path()).unwrap(), ORIGINAL.as_bytes());
        assert!(controller.scheduler().pending().is_empty());

        assert!(!controller.store().block(&["youtube.com"]).unwrap());
        assert_eq!(fs::read(controller.store().path()).unwrap(), ORIGINAL.as_bytes());
        assert_eq!(controller.restore_once(), RestoreOutcome::AlreadyRestored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_after_restore_is_refused() {
        let (_dir, controller) = setup();
        assert_eq!(controller.restore_once(), RestoreOutcome::Restored);

        let outcome = controller.request_grace_activation(OffsetDateTime::now_utc());
        assert!(!outcome.granted);
        assert_eq!(controller.status().used, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_unblock_keeps_activation_and_timer() {
        let (_dir, controller) = setup();
        let path = controller.store().path().to_path_buf();
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        let now = datetime!(2024-05-01 09:00 UTC);

        let outcome = controller.request_grace_activation(now);
        assert!(!outcome.granted);
        assert!(outcome.message.contains("activation consumed"));
        assert!(outcome.reblock_at.is_none());

        let status = controller.status_at(now);
        assert_eq!(status.used, 1);
        assert_eq!(status.pending_reblocks.len(), 1);
        assert_eq!(status.pending_reblocks[0].fire_at, now + time::Duration::minutes(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_hosts_state_follows_timers() {
        let (_dir, controller) = setup();
        let path = controller.store().path().to_path_buf();
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(controller.guarded_blocked());

        controller.request_grace_activation(OffsetDateTime::now_utc());
        assert!(controller.scheduler().has_pending());
        assert!(!controller.guarded_blocked());

        controller.scheduler().wait_idle().await;
        assert!(controller.guarded_blocked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_activation_time_changes_nothing() {
        let (_dir, controller) = setup();
        let before = controller.store().read().unwrap();

        let outcome = controller.request_grace_activation(datetime!(9999-12-31 23:59 UTC));
        assert!(!outcome.granted);
        assert!(outcome.message.contains("refused"));
        assert!(controller.limiter.window().is_none());
        assert!(!controller.scheduler().has_pending());
        assert_eq!(controller.store().read().unwrap(), before);
    }
}
