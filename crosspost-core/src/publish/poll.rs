use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::trace;

use crate::driver::{DriverError, DriverResult};

/// Explicit budget for the bounded polling loops around page state: a fixed
/// number of probes at a fixed interval, with optional jitter so repeated
/// probes do not land in lockstep with the page's own timers.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub max_attempts: usize,
    pub interval: Duration,
    pub jitter: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: usize, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    async fn pause(&self) {
        let mut delay = self.interval;
        if !self.jitter.is_zero() {
            let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
            delay += Duration::from_millis(extra);
        }
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

#[derive(Debug)]
pub enum PollOutcome<T> {
    /// The probe produced a value within the budget.
    Completed(T),
    /// Budget exhausted without a definitive signal.
    Exhausted { attempts: usize },
    /// A non-transient error aborted the loop.
    Fatal(DriverError),
}

/// Runs `probe` up to the policy's budget. A probe returning `Ok(None)`
/// means "no signal yet, keep going"; transient errors are treated the same
/// way, while fatal ones abort immediately.
pub async fn poll_until<F, Fut, T>(policy: &PollPolicy, mut probe: F) -> PollOutcome<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = DriverResult<Option<T>>>,
{
    for attempt in 0..policy.max_attempts {
        match probe(attempt).await {
            Ok(Some(value)) => return PollOutcome::Completed(value),
            Ok(None) => {}
            Err(err) if err.is_transient() => {
                trace!(attempt, error = %err, "transient probe failure; polling continues");
            }
            Err(err) => return PollOutcome::Fatal(err),
        }
        if attempt + 1 < policy.max_attempts {
            policy.pause().await;
        }
    }
    PollOutcome::Exhausted {
        attempts: policy.max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant_policy(max_attempts: usize) -> PollPolicy {
        PollPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn completes_when_the_signal_appears() {
        let calls = Cell::new(0usize);
        let outcome = poll_until(&instant_policy(10), |attempt| {
            calls.set(calls.get() + 1);
            async move { Ok(if attempt >= 3 { Some(attempt) } else { None }) }
        })
        .await;
        assert!(matches!(outcome, PollOutcome::Completed(3)));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn exhausts_after_the_budget() {
        let outcome: PollOutcome<()> =
            poll_until(&instant_policy(5), |_| async { Ok(None) }).await;
        assert!(matches!(outcome, PollOutcome::Exhausted { attempts: 5 }));
    }

    #[tokio::test]
    async fn transient_errors_keep_the_loop_alive() {
        let outcome = poll_until(&instant_policy(4), |attempt| async move {
            if attempt < 2 {
                Err(DriverError::Evaluation("flaky selector".into()))
            } else {
                Ok(Some(attempt))
            }
        })
        .await;
        assert!(matches!(outcome, PollOutcome::Completed(2)));
    }

    #[tokio::test]
    async fn fatal_errors_abort_immediately() {
        let calls = Cell::new(0usize);
        let outcome: PollOutcome<()> = poll_until(&instant_policy(50), |_| {
            calls.set(calls.get() + 1);
            async { Err(DriverError::TargetClosed) }
        })
        .await;
        assert!(matches!(outcome, PollOutcome::Fatal(DriverError::TargetClosed)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(instant_policy(0).max_attempts, 1);
    }
}
