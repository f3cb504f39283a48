//! # Throttle Limiter
//!
//! Per-signature minimum-interval gate. A call is allowed when no prior
//! allowed call with the same signature exists or the interval has passed
//! since it. Rejected calls fail fast and never move the window.

use crate::signature::RequestSignature;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ThrottleLimiter {
    /// Signature to the instant of its last allowed call
    last_allowed: DashMap<RequestSignature, Instant>,
}

impl ThrottleLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a call at `now`, or report how long until the next one may pass
    pub fn try_acquire(
        &self,
        signature: &RequestSignature,
        interval: Duration,
        now: Instant,
    ) -> Result<(), Duration> {
        match self.last_allowed.entry(signature.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(())
            }
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed >= interval {
                    entry.insert(now);
                    Ok(())
                } else {
                    Err(interval - elapsed)
                }
            }
        }
    }

    pub fn allow(&self, signature: &RequestSignature, interval: Duration, now: Instant) -> bool {
        self.try_acquire(signature, interval, now).is_ok()
    }

    /// Drop entries whose last allowed call is at least `max_age` old
    pub fn sweep(&self, now: Instant, max_age: Duration) -> usize {
        let mut removed = 0;
        self.last_allowed.retain(|_, last| {
            let keep = now.saturating_duration_since(*last) < max_age;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed, remaining = self.last_allowed.len(), "🧹 Swept throttle table");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.last_allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_allowed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::RequestDescriptor;

    #[test]
    fn test_second_call_inside_interval_rejected() {
        let limiter = ThrottleLimiter::new();
        let signature = RequestDescriptor::get("/api/analytics").signature();
        let interval = Duration::from_millis(500);
        let start = Instant::now();

        assert!(limiter.allow(&signature, interval, start));
        assert_eq!(
            limiter.try_acquire(&signature, interval, start + Duration::from_millis(200)),
            Err(Duration::from_millis(300))
        );
        // The rejection did not move the window
        assert!(limiter.allow(&signature, interval, start + Duration::from_millis(500)));
        assert!(!limiter.allow(&signature, interval, start + Duration::from_millis(900)));
    }

    #[test]
    fn test_signatures_are_independent() {
        let limiter = ThrottleLimiter::new();
        let interval = Duration::from_millis(500);
        let now = Instant::now();

        assert!(limiter.allow(&RequestDescriptor::get("/a").signature(), interval, now));
        assert!(limiter.allow(&RequestDescriptor::get("/b").signature(), interval, now));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_sweep() {
        let limiter = ThrottleLimiter::new();
        let signature = RequestDescriptor::get("/a").signature();
        let start = Instant::now();
        limiter.allow(&signature, Duration::from_millis(500), start);

        let max_age = Duration::from_secs(300);
        assert_eq!(limiter.sweep(start + Duration::from_secs(10), max_age), 0);
        assert_eq!(limiter.sweep(start + max_age, max_age), 1);
        assert!(limiter.is_empty());
    }
}
