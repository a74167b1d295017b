//! Circuit breaker guarding the network tier.
//!
//! ```text
//! Healthy ──failure──▶ CoolingDown ──interval elapsed──▶ Probing
//!    ▲                     ▲                                │
//!    │                     └─────────failure (interval×k)───┤
//!    └──────────────────────────success─────────────────────┘
//! ```
//!
//! Admission is handed out as a [`BreakerPermit`]. A permit that is dropped
//! without being settled (the caller's future was cancelled) counts as a
//! failure, the same as a timeout.
//!
//! Every transition starts a new epoch. Permits remember the epoch that
//! admitted them, and results from an earlier epoch are ignored.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Cool-down bounds for the breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerSettings {
    pub initial_cooldown: Duration,
    pub max_cooldown: Duration,
    pub multiplier: f64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            initial_cooldown: Duration::from_secs(1),
            max_cooldown: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Healthy,
    CoolingDown { until: Instant, interval: Duration },
    Probing { interval: Duration },
}

impl State {
    fn publish(&self) {
        let value = match self {
            State::Healthy => 0,
            State::Probing { .. } => 1,
            State::CoolingDown { .. } => 2,
        };
        crate::metrics::set_breaker_state(value);
    }
}

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Healthy,
    CoolingDown {
        /// Time left before the next probe is admitted.
        remaining_ms: u64,
        interval_ms: u64,
    },
    Probing,
}

impl BreakerState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, BreakerState::Healthy)
    }
}

#[derive(Debug)]
struct Inner {
    state: State,
    epoch: u64,
}

impl Inner {
    fn transition(&mut self, next: State) {
        self.state = next;
        self.epoch += 1;
    }
}

/// Circuit breaker with exponential cool-down.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    settings: BreakerSettings,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        let settings = BreakerSettings {
            max_cooldown: settings.max_cooldown.max(settings.initial_cooldown),
            multiplier: settings.multiplier.max(1.0),
            ..settings
        };
        Self {
            inner: Mutex::new(Inner {
                state: State::Healthy,
                epoch: 0,
            }),
            settings,
        }
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Ask to call the network tier.
    ///
    /// Returns `None` while cooling down, and while another caller holds the
    /// single probe permit.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let current = inner.state;
        match current {
            State::Healthy => Some(BreakerPermit::new(self, inner.epoch)),
            State::CoolingDown { until, interval } if now >= until => {
                inner.transition(State::Probing { interval });
                let epoch = inner.epoch;
                drop(inner);
                tracing::debug!("network tier cool-down elapsed, probing");
                State::Probing { interval }.publish();
                Some(BreakerPermit::new(self, epoch))
            }
            State::CoolingDown { .. } | State::Probing { .. } => None,
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> BreakerState {
        let now = Instant::now();
        match self.inner.lock().state {
            State::Healthy => BreakerState::Healthy,
            State::CoolingDown { until, interval } => BreakerState::CoolingDown {
                remaining_ms: until.saturating_duration_since(now).as_millis() as u64,
                interval_ms: interval.as_millis() as u64,
            },
            State::Probing { .. } => BreakerState::Probing,
        }
    }

    fn on_success(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch == epoch && matches!(inner.state, State::Probing { .. }) {
            inner.transition(State::Healthy);
            drop(inner);
            tracing::info!("network cache tier recovered");
            State::Healthy.publish();
        }
    }

    fn on_failure(&self, epoch: u64) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        // Late result from a call admitted before the last transition
        if inner.epoch != epoch {
            return;
        }
        let current = inner.state;
        let interval = match current {
            State::Healthy => self.settings.initial_cooldown,
            State::Probing { interval } => interval
                .mul_f64(self.settings.multiplier)
                .min(self.settings.max_cooldown),
            State::CoolingDown { .. } => return,
        };
        let next = State::CoolingDown {
            until: now + interval,
            interval,
        };
        inner.transition(next);
        drop(inner);

        tracing::warn!(
            cooldown_ms = interval.as_millis() as u64,
            "network cache tier unavailable, cooling down"
        );
        next.publish();
    }
}

/// Admission to call the network tier.
///
/// Settle it with [`BreakerPermit::succeed`] or [`BreakerPermit::fail`];
/// dropping it unsettled records a failure.
#[must_use = "an unsettled permit records a failure when dropped"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, epoch: u64) -> Self {
        Self {
            breaker,
            epoch,
            settled: false,
        }
    }

    /// The backend answered (hit, miss, or a non-I/O error).
    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.epoch);
    }

    /// The backend was unreachable or timed out.
    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.epoch);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_failure(self.epoch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerSettings {
            initial_cooldown: Duration::from_secs(1),
            max_cooldown: Duration::from_secs(5),
            multiplier: 2.0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_healthy_and_stays_healthy_on_success() {
        let breaker = breaker();
        assert_eq!(breaker.state(), BreakerState::Healthy);

        breaker.try_acquire().unwrap().succeed();
        breaker.try_acquire().unwrap().succeed();
        assert_eq!(breaker.state(), BreakerState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_opens_for_cooldown() {
        let breaker = breaker();
        breaker.try_acquire().unwrap().fail();

        assert_eq!(
            breaker.state(),
            BreakerState::CoolingDown {
                remaining_ms: 1000,
                interval_ms: 1000
            }
        );
        assert!(breaker.try_acquire().is_none());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(breaker.try_acquire().is_none());

        tokio::time::advance(Duration::from_millis(1)).await;
        let probe = breaker.try_acquire().expect("probe admitted after cool-down");
        assert_eq!(breaker.state(), BreakerState::Probing);

        probe.succeed();
        assert_eq!(breaker.state(), BreakerState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_call_in_flight() {
        let breaker = breaker();
        breaker.try_acquire().unwrap().fail();
        tokio::time::advance(Duration::from_secs(1)).await;

        let probe = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_none());
        probe.succeed();
        assert!(breaker.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_call_grows_interval_up_to_cap() {
        let breaker = breaker();
        breaker.try_acquire().unwrap().fail();

        let mut intervals = Vec::new();
        for _ in 0..5 {
            let BreakerState::CoolingDown { interval_ms, .. } = breaker.state() else {
                panic!("expected cooling down");
            };
            intervals.push(interval_ms);
            tokio::time::advance(Duration::from_millis(interval_ms)).await;
            breaker.try_acquire().unwrap().fail();
        }

        assert_eq!(intervals, vec![1000, 2000, 4000, 5000, 5000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_resets_interval() {
        let breaker = breaker();
        breaker.try_acquire().unwrap().fail();
        tokio::time::advance(Duration::from_secs(1)).await;
        breaker.try_acquire().unwrap().fail();
        tokio::time::advance(Duration::from_secs(2)).await;
        breaker.try_acquire().unwrap().succeed();

        breaker.try_acquire().unwrap().fail();
        assert!(matches!(
            breaker.state(),
            BreakerState::CoolingDown {
                interval_ms: 1000,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_permit_counts_as_failure() {
        let breaker = breaker();
        {
            let _permit = breaker.try_acquire().unwrap();
        }
        assert!(!breaker.state().is_healthy());

        // An abandoned probe must not leave the breaker stuck in Probing
        tokio::time::advance(Duration::from_secs(1)).await;
        {
            let _probe = breaker.try_acquire().unwrap();
        }
        assert!(matches!(
            breaker.state(),
            BreakerState::CoolingDown {
                interval_ms: 2000,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_results_do_not_disturb_cooldown() {
        let breaker = breaker();
        let first = breaker.try_acquire().unwrap();
        let second = breaker.try_acquire().unwrap();

        first.fail();
        let before = breaker.state();
        second.succeed();
        assert_eq!(breaker.state(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_failure_does_not_override_trial_call() {
        let breaker = breaker();
        let slow = breaker.try_acquire().unwrap();
        breaker.try_acquire().unwrap().fail();

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = breaker.try_acquire().unwrap();

        // Admitted while healthy, finishes after the cool-down
        slow.fail();
        assert_eq!(breaker.state(), BreakerState::Probing);

        trial.succeed();
        assert_eq!(breaker.state(), BreakerState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_success_does_not_close_half_open() {
        let breaker = breaker();
        let slow = breaker.try_acquire().unwrap();
        breaker.try_acquire().unwrap().fail();

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = breaker.try_acquire().unwrap();

        slow.succeed();
        assert_eq!(breaker.state(), BreakerState::Probing);
        assert!(breaker.try_acquire().is_none());

        trial.fail();
        assert!(matches!(
            breaker.state(),
            BreakerState::CoolingDown {
                interval_ms: 2000,
                ..
            }
        ));
    }

    #[test]
    fn test_settings_are_normalized() {
        let breaker = CircuitBreaker::new(BreakerSettings {
            initial_cooldown: Duration::from_secs(10),
            max_cooldown: Duration::from_secs(1),
            multiplier: 0.5,
        });
        assert_eq!(breaker.settings().max_cooldown, Duration::from_secs(10));
        assert_eq!(breaker.settings().multiplier, 1.0);
    }
}
