use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Mutual exclusion plus a cooldown between runs.
///
/// At most one holder exists at a time. [`try_acquire`](Self::try_acquire)
/// also refuses until `cooldown` has passed since the last
/// [`release`](Self::release).
#[derive(Debug)]
pub struct CooldownGate {
    cooldown: Duration,
    in_flight: AtomicBool,
    last_completed: Mutex<Option<Instant>>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            in_flight: AtomicBool::new(false),
            last_completed: Mutex::new(None),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Acquire if nothing is in flight and the cooldown has elapsed.
    pub fn try_acquire(&self) -> bool {
        if !self.cooled_down() || !self.claim() {
            return false;
        }
        // A holder may have released between the check and the claim.
        if !self.cooled_down() {
            self.in_flight.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Acquire if nothing is in flight, whatever the cooldown says.
    pub fn try_acquire_ignoring_cooldown(&self) -> bool {
        self.claim()
    }

    /// Record the completion instant and let the next caller in.
    pub fn release(&self) {
        *self.last_completed.lock() = Some(Instant::now());
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn claim(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cooled_down(&self) -> bool {
        self.last_completed
            .lock()
            .is_none_or(|at| at.elapsed() >= self.cooldown)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn excludes_concurrent_holders() {
        let gate = CooldownGate::new(Duration::from_secs(300));
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert!(!gate.try_acquire_ignoring_cooldown());
        assert!(gate.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_applies_after_release() {
        let gate = CooldownGate::new(Duration::from_secs(300));
        assert!(gate.try_acquire());
        gate.release();

        assert!(!gate.try_acquire());
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!gate.try_acquire());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(gate.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn ignoring_cooldown_still_excludes() {
        let gate = CooldownGate::new(Duration::from_secs(300));
        assert!(gate.try_acquire());
        gate.release();

        assert!(gate.try_acquire_ignoring_cooldown());
        assert!(!gate.try_acquire_ignoring_cooldown());
        gate.release();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_winner_under_contention() {
        let gate = Arc::new(CooldownGate::new(Duration::from_secs(300)));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.try_acquire() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
