use std::sync::{Mutex, MutexGuard};

use time::{Duration, OffsetDateTime};
use tracing::debug;

/// The rolling rate-limit window. `count` never exceeds the limiter's maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationWindow {
    pub window_start: OffsetDateTime,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStatus {
    pub used: u32,
    pub max: u32,
    pub window_start: Option<OffsetDateTime>,
}

/// Caps grace activations at `max_activations` per `window` of wall-clock
/// time. The window starts with the first request and is reset, not extended,
/// once it is older than `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_activations: u32,
    window: Duration,
    state: Mutex<Option<ActivationWindow>>,
}

impl ActivationWindow {
    fn is_stale(&self, now: OffsetDateTime, window: Duration) -> bool {
        now - self.window_start > window
    }
}

impl RateLimiter {
    pub fn new(max_activations: u32, window: Duration) -> Self {
        Self {
            max_activations,
            window,
            state: Mutex::new(None),
        }
    }

    /// Consumes one activation slot if any remain. The whole check-and-increment
    /// runs under the lock, so concurrent callers cannot share the last slot.
    pub fn try_acquire(&self, now: OffsetDateTime) -> bool {
        let mut state = self.lock_state();
        let window = state.get_or_insert(ActivationWindow {
            window_start: now,
            count: 0,
        });

        if window.is_stale(now, self.window) {
            debug!(started = %window.window_start, "activation window expired, resetting");
            *window = ActivationWindow {
                window_start: now,
                count: 0,
            };
        }

        if window.count < self.max_activations {
            window.count += 1;
            true
        } else {
            false
        }
    }

    /// Read-only view at `now`; a stale window reports zero usage without
    /// being reset.
    pub fn status_at(&self, now: OffsetDateTime) -> WindowStatus {
        let state = self.lock_state();
        match *state {
            Some(window) if !window.is_stale(now, self.window) => WindowStatus {
                used: window.count,
                max: self.max_activations,
                window_start: Some(window.window_start),
            },
            _ => WindowStatus {
                used: 0,
                max: self.max_activations,
                window_start: None,
            },
        }
    }

    pub fn status(&self) -> WindowStatus {
        self.status_at(OffsetDateTime::now_utc())
    }

    pub fn window(&self) -> Option<ActivationWindow> {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<ActivationWindow>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use time::macros::datetime;

    fn limiter() -> RateLimiter {
        RateLimiter::new(2, Duration::hours(10))
    }

    #[test]
    fn test_two_grants_then_denied() {
        let limiter = limiter();
        let start = datetime!(2024-05-01 09:00 UTC);

        assert!(limiter.try_acquire(start));
        assert!(limiter.try_acquire(start + Duration::minutes(1)));
        assert!(!limiter.try_acquire(start + Duration::minutes(2)));

        let window = limiter.window().unwrap();
        assert_eq!(window.window_start, start);
        assert_eq!(window.count, 2);
    }

    #[test]
    fn test_grants_never_exceed_max_within_window() {
        let limiter = limiter();
        let start = datetime!(2024-05-01 09:00 UTC);

        let granted = (0..50)
            .filter(|minute| limiter.try_acquire(start + Duration::minutes(*minute)))
            .count();
        assert_eq!(granted, 2);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = limiter();
        let start = datetime!(2024-05-01 09:00 UTC);
        assert!(limiter.try_acquire(start));
        assert!(limiter.try_acquire(start));
        assert!(!limiter.try_acquire(start + Duration::hours(10)));

        let later = start + Duration::hours(10) + Duration::seconds(1);
        assert!(limiter.try_acquire(later));

        let window = limiter.window().unwrap();
        assert_eq!(window.window_start, later);
        assert_eq!(window.count, 1);
    }

    #[test]
    fn test_status_does_not_mutate() {
        let limiter = limiter();
        let start = datetime!(2024-05-01 09:00 UTC);

        let status = limiter.status_at(start);
        assert_eq!(status, WindowStatus { used: 0, max: 2, window_start: None });
        assert!(limiter.window().is_none());

        limiter.try_acquire(start);
        let status = limiter.status_at(start + Duration::hours(1));
        assert_eq!(status.used, 1);
        assert_eq!(status.window_start, Some(start));

        let stale = limiter.status_at(start + Duration::hours(11));
        assert_eq!(stale.used, 0);
        assert_eq!(limiter.window().unwrap().count, 1);
    }

    #[test]
    fn test_zero_limit_denies_everything() {
        let limiter = RateLimiter::new(0, Duration::hours(10));
        assert!(!limiter.try_acquire(datetime!(2024-05-01 09:00 UTC)));
    }

    #[test]
    fn test_concurrent_callers_share_last_slot() {
        let limiter = Arc::new(limiter());
        let now = datetime!(2024-05-01 09:00 UTC);
        assert!(limiter.try_acquire(now));

        let barrier = Arc::new(Barrier::new(100));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    limiter.try_acquire(now)
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(granted, 1);
        assert_eq!(limiter.window().unwrap().count, 2);
    }
}
