//! Bounded-parallelism semaphore with retry and adaptive throttle/recover.
//!
//! Generalizes the `buffer_unordered`-style fixed-concurrency fan-out used
//! elsewhere in the pipeline into a gate whose ceiling can shrink under
//! upstream pressure (429s) and grow back once things settle.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    current_max: AtomicUsize,
    initial_max: usize,
    retry_attempts: usize,
    retry_delay: Duration,
}

impl ConcurrencyGate {
    pub fn new(max: usize, retry_attempts: usize, retry_delay: Duration) -> Self {
        let max = max.max(1);
        ConcurrencyGate {
            semaphore: Arc::new(Semaphore::new(max)),
            current_max: AtomicUsize::new(max),
            initial_max: max,
            retry_attempts,
            retry_delay,
        }
    }

    /// Acquires a permit, runs `f` with up to `retryAttempts` retries using
    /// linear backoff (`retryDelay * (attempt + 1)`), then releases. A
    /// thrown permit is held across retries — throttling only affects
    /// newly-arriving acquirers, never work already in flight.
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("gate semaphore is never closed");

        let mut attempt = 0usize;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt >= self.retry_attempts {
                        return Err(e);
                    }
                    let delay = self.retry_delay * (attempt as u32 + 1);
                    debug!(attempt, ?delay, "concurrency gate retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Halves the ceiling (floor 2). In-flight permits already acquired are
    /// unaffected; only future acquirers see the smaller ceiling.
    pub fn throttle(&self) {
        let current = self.current_max.load(Ordering::SeqCst);
        let new_max = (current / 2).max(2);
        if new_max >= current {
            return;
        }
        let delta = (current - new_max) as u32;
        if let Ok(permits) = self.semaphore.try_acquire_many(delta) {
            permits.forget();
            self.current_max.store(new_max, Ordering::SeqCst);
            debug!(from = current, to = new_max, "concurrency gate throttled");
        }
    }

    /// Increments the ceiling by one, capped at the initial max.
    pub fn recover(&self) {
        let current = self.current_max.load(Ordering::SeqCst);
        let new_max = (current + 1).min(self.initial_max);
        if new_max <= current {
            return;
        }
        self.semaphore.add_permits(new_max - current);
        self.current_max.store(new_max, Ordering::SeqCst);
        debug!(from = current, to = new_max, "concurrency gate recovered");
    }

    pub fn current_max(&self) -> usize {
        self.current_max.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn executes_successful_work_once() {
        let gate = ConcurrencyGate::new(2, 3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result = gate
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, &'static str>(42) }
            })
            .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_gives_up() {
        let gate = ConcurrencyGate::new(1, 2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result = gate
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>("boom") }
            })
            .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn throttle_halves_with_floor_two_and_recover_restores() {
        let gate = ConcurrencyGate::new(8, 0, Duration::from_millis(1));
        gate.throttle();
        assert_eq!(gate.current_max(), 4);
        gate.throttle();
        assert_eq!(gate.current_max(), 2);
        gate.throttle();
        assert_eq!(gate.current_max(), 2);
        gate.recover();
        assert_eq!(gate.current_max(), 3);
    }
}
