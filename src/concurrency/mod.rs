//! Concurrency control.
//!
//! Bounds in-flight requests with a counting semaphore, correlates each
//! acquisition with a monotonically increasing request ID, aggregates
//! per-request metrics behind a single mutex, and — when dynamic rate
//! limiting is enabled — resizes the effective permit cap from observed
//! latency and error rates.
//!
//! Permits are detached from the semaphore on acquisition and returned
//! explicitly on release so that cap shrinks can intercept returns as "debt"
//! instead of preempting outstanding work.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// Sliding-window length for latency/error observations.
const WINDOW_SIZE: usize = 50;
/// Minimum observations before the adaptive policy acts.
const MIN_WINDOW_FOR_ADJUSTMENT: usize = 10;
/// EWMA smoothing factor for the long-run latency baseline. Deliberately
/// small: the baseline must remember the long run, not chase the window.
const EWMA_ALPHA: f64 = 0.01;
/// Window rate-limit share above which the cap shrinks by a quarter.
const RATE_LIMIT_SHRINK_THRESHOLD: f64 = 0.10;
/// Window error share above which the cap shrinks by a tenth.
const ERROR_SHRINK_THRESHOLD: f64 = 0.20;
/// Window error share below which the cap may grow.
const GROW_ERROR_CEILING: f64 = 0.01;
/// Default minimum spacing between cap adjustments.
const DEFAULT_EVALUATION_COOLDOWN: Duration = Duration::from_secs(1);

/// One completed request's contribution to the window.
#[derive(Debug, Clone, Copy)]
struct Observation {
    duration: Duration,
    error: bool,
    rate_limited: bool,
}

#[derive(Debug)]
struct CapState {
    /// Effective permit cap; always in [1, max_concurrent].
    cap: usize,
    /// Permits to swallow on release instead of returning to the semaphore.
    shrink_debt: usize,
    last_adjustment: Option<Instant>,
}

#[derive(Debug, Default)]
struct MetricsState {
    total_requests: u64,
    successful: u64,
    failed: u64,
    rate_limited: u64,
    permits_in_use: usize,
    window: VecDeque<Observation>,
    /// Long-run EWMA of request latency, in seconds.
    baseline_latency: Option<f64>,
}

/// A consistent point-in-time view of the metrics record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub permits_in_use: usize,
    pub current_cap: usize,
}

/// Semaphore-backed permit issuance plus the adaptive resize policy.
pub struct ConcurrencyController {
    semaphore: Semaphore,
    state: Mutex<CapState>,
    metrics: Mutex<MetricsState>,
    next_request_id: AtomicU64,
    max_concurrent: usize,
    dynamic: bool,
    evaluation_cooldown: Duration,
}

/// A held unit of the concurrency budget. Released exactly once, on drop,
/// whatever the exit path.
pub struct ConcurrencyPermit<'a> {
    controller: &'a ConcurrencyController,
    request_id: u64,
}

impl ConcurrencyPermit<'_> {
    /// Request ID correlating this permit with log lines and metrics.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

impl Drop for ConcurrencyPermit<'_> {
    fn drop(&mut self) {
        self.controller.release();
    }
}

impl ConcurrencyController {
    pub fn new(max_concurrent: usize, dynamic: bool) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Semaphore::new(max_concurrent),
            state: Mutex::new(CapState {
                cap: max_concurrent,
                shrink_debt: 0,
                last_adjustment: None,
            }),
            metrics: Mutex::new(MetricsState::default()),
            next_request_id: AtomicU64::new(0),
            max_concurrent,
            dynamic,
            evaluation_cooldown: DEFAULT_EVALUATION_COOLDOWN,
        }
    }

    /// Override the spacing between cap adjustments (used by tests to make
    /// the policy react on every observation).
    pub fn with_evaluation_cooldown(mut self, cooldown: Duration) -> Self {
        self.evaluation_cooldown = cooldown;
        self
    }

    /// Block until a permit is free or the caller cancels.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ConcurrencyPermit<'_>, ClientError> {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            acquired = self.semaphore.acquire() => acquired
                .map_err(|_| ClientError::Transport("concurrency semaphore closed".to_string()))?,
        };
        // Detach so release goes through the controller, not the semaphore's
        // own RAII, letting shrink debt intercept it.
        permit.forget();

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut metrics = lock(&self.metrics);
            metrics.total_requests += 1;
            metrics.permits_in_use += 1;
        }
        tracing::trace!(target: "manifold::concurrency", request_id, "permit acquired");
        Ok(ConcurrencyPermit {
            controller: self,
            request_id,
        })
    }

    fn release(&self) {
        {
            let mut state = lock(&self.state);
            if state.shrink_debt > 0 {
                state.shrink_debt -= 1;
            } else {
                self.semaphore.add_permits(1);
            }
        }
        let mut metrics = lock(&self.metrics);
        metrics.permits_in_use = metrics.permits_in_use.saturating_sub(1);
    }

    /// Record one completed request and, when dynamic rate limiting is on,
    /// re-evaluate the permit cap.
    pub fn record_completion(&self, duration: Duration, success: bool, rate_limited: bool) {
        {
            let mut metrics = lock(&self.metrics);
            if success {
                metrics.successful += 1;
            } else {
                metrics.failed += 1;
            }
            if rate_limited {
                metrics.rate_limited += 1;
            }

            if metrics.window.len() == WINDOW_SIZE {
                metrics.window.pop_front();
            }
            metrics.window.push_back(Observation {
                duration,
                error: !success,
                rate_limited,
            });

            let sample = duration.as_secs_f64();
            metrics.baseline_latency = Some(match metrics.baseline_latency {
                Some(baseline) => EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * baseline,
                None => sample,
            });
        }

        if self.dynamic {
            self.evaluate_and_adjust();
        }
    }

    /// Apply the adaptive policy once, honoring the evaluation cooldown.
    fn evaluate_and_adjust(&self) {
        let (window_len, rate_limited_share, error_share, p95, baseline) = {
            let metrics = lock(&self.metrics);
            let len = metrics.window.len();
            if len < MIN_WINDOW_FOR_ADJUSTMENT {
                return;
            }
            let rate_limited = metrics.window.iter().filter(|o| o.rate_limited).count();
            let errors = metrics.window.iter().filter(|o| o.error).count();
            let mut durations: Vec<Duration> =
                metrics.window.iter().map(|o| o.duration).collect();
            durations.sort_unstable();
            let p95 = durations[(len * 95 / 100).min(len - 1)];
            (
                len,
                rate_limited as f64 / len as f64,
                errors as f64 / len as f64,
                p95,
                metrics.baseline_latency,
            )
        };

        let mut state = lock(&self.state);
        if let Some(last) = state.last_adjustment {
            if last.elapsed() < self.evaluation_cooldown {
                return;
            }
        }

        let cap = state.cap;
        let new_cap = if rate_limited_share > RATE_LIMIT_SHRINK_THRESHOLD {
            cap.saturating_sub((cap + 3) / 4).max(1)
        } else if error_share > ERROR_SHRINK_THRESHOLD {
            cap.saturating_sub((cap + 9) / 10).max(1)
        } else if error_share < GROW_ERROR_CEILING
            && baseline.is_some_and(|b| p95.as_secs_f64() < b * 0.5)
        {
            (cap + 1).min(self.max_concurrent)
        } else {
            cap
        };

        if new_cap != cap {
            tracing::info!(
                target: "manifold::concurrency",
                old_cap = cap,
                new_cap,
                window_len,
                rate_limited_share,
                error_share,
                "adjusting concurrency cap"
            );
            self.resize_locked(&mut state, new_cap);
            state.last_adjustment = Some(Instant::now());
        }
    }

    /// Change the effective cap. Shrinking consumes idle permits immediately
    /// and defers the remainder as debt settled on release; outstanding
    /// permits are never preempted.
    fn resize_locked(&self, state: &mut MutexGuard<'_, CapState>, new_cap: usize) {
        let new_cap = new_cap.clamp(1, self.max_concurrent);
        if new_cap < state.cap {
            let mut to_remove = state.cap - new_cap;
            while to_remove > 0 {
                match self.semaphore.try_acquire() {
                    Ok(permit) => {
                        permit.forget();
                        to_remove -= 1;
                    }
                    Err(_) => {
                        state.shrink_debt += to_remove;
                        break;
                    }
                }
            }
        } else if new_cap > state.cap {
            let mut to_add = new_cap - state.cap;
            let settled = to_add.min(state.shrink_debt);
            state.shrink_debt -= settled;
            to_add -= settled;
            if to_add > 0 {
                self.semaphore.add_permits(to_add);
            }
        }
        state.cap = new_cap;
    }

    /// Effective permit cap right now.
    pub fn current_cap(&self) -> usize {
        lock(&self.state).cap
    }

    /// Consistent snapshot of the metrics record.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (total_requests, successful, failed, rate_limited, permits_in_use) = {
            let metrics = lock(&self.metrics);
            (
                metrics.total_requests,
                metrics.successful,
                metrics.failed,
                metrics.rate_limited,
                metrics.permits_in_use,
            )
        };
        MetricsSnapshot {
            total_requests,
            successful,
            failed,
            rate_limited,
            permits_in_use,
            current_cap: lock(&self.state).cap,
        }
    }
}

/// Lock with poison recovery: a panicked holder must not wedge permit
/// accounting for every later request.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn permits_are_acquired_and_released() {
        let controller = ConcurrencyController::new(3, false);

        let a = controller.acquire(&cancel()).await.unwrap();
        let b = controller.acquire(&cancel()).await.unwrap();
        assert_eq!(controller.snapshot().permits_in_use, 2);
        assert!(b.request_id() > a.request_id());

        drop(a);
        drop(b);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.permits_in_use, 0);
        assert_eq!(snapshot.total_requests, 2);
    }

    #[tokio::test]
    async fn acquire_blocks_at_the_cap() {
        let controller = ConcurrencyController::new(1, false);
        let held = controller.acquire(&cancel()).await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), controller.acquire(&cancel())).await;
        assert!(blocked.is_err(), "second acquire should still be waiting");

        drop(held);
        let acquired =
            tokio::time::timeout(Duration::from_millis(50), controller.acquire(&cancel())).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn acquire_honors_cancellation() {
        let controller = ConcurrencyController::new(1, false);
        let _held = controller.acquire(&cancel()).await.unwrap();

        let token = cancel();
        token.cancel();
        let result = controller.acquire(&token).await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert_eq!(controller.snapshot().permits_in_use, 1);
    }

    #[test]
    fn heavy_rate_limiting_shrinks_the_cap_by_a_quarter() {
        let controller =
            ConcurrencyController::new(8, true).with_evaluation_cooldown(Duration::ZERO);
        for i in 0..MIN_WINDOW_FOR_ADJUSTMENT {
            let rate_limited = i % 2 == 0; // 50% > 10% threshold
            controller.record_completion(Duration::from_millis(100), !rate_limited, rate_limited);
        }
        assert_eq!(controller.current_cap(), 6);
    }

    #[test]
    fn cap_never_drops_below_one() {
        let controller =
            ConcurrencyController::new(4, true).with_evaluation_cooldown(Duration::ZERO);
        for _ in 0..200 {
            controller.record_completion(Duration::from_millis(100), false, true);
        }
        assert_eq!(controller.current_cap(), 1);
    }

    #[test]
    fn fast_healthy_window_grows_the_cap_up_to_the_maximum() {
        let controller =
            ConcurrencyController::new(4, true).with_evaluation_cooldown(Duration::ZERO);

        // Shrink first so there is headroom to grow back.
        for _ in 0..WINDOW_SIZE {
            controller.record_completion(Duration::from_millis(100), false, true);
        }
        assert_eq!(controller.current_cap(), 1);

        // Healthy and much faster than the established baseline.
        for _ in 0..(WINDOW_SIZE * 4) {
            controller.record_completion(Duration::from_millis(5), true, false);
        }
        let cap = controller.current_cap();
        assert!(cap > 1, "cap should have grown, got {cap}");
        assert!(cap <= 4, "cap must never exceed the configured maximum");
    }

    #[test]
    fn static_mode_never_adjusts() {
        let controller = ConcurrencyController::new(4, false);
        for _ in 0..100 {
            controller.record_completion(Duration::from_millis(100), false, true);
        }
        assert_eq!(controller.current_cap(), 4);
    }

    #[tokio::test]
    async fn shrink_defers_to_debt_while_permits_are_outstanding() {
        let controller =
            ConcurrencyController::new(2, true).with_evaluation_cooldown(Duration::ZERO);
        let a = controller.acquire(&cancel()).await.unwrap();
        let b = controller.acquire(&cancel()).await.unwrap();

        // All permits are in flight; a shrink must not preempt them.
        for _ in 0..MIN_WINDOW_FOR_ADJUSTMENT {
            controller.record_completion(Duration::from_millis(100), false, true);
        }
        assert_eq!(controller.current_cap(), 1);
        assert_eq!(controller.snapshot().permits_in_use, 2);

        drop(a);
        drop(b);
        // After the debt settles only one permit remains issuable.
        let _held = controller.acquire(&cancel()).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), controller.acquire(&cancel())).await;
        assert!(blocked.is_err());
    }
}
