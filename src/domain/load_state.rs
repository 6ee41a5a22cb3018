// Load lifecycle of a single widget
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadState {
    Idle,
    Loading,
    Success,
    Error,
    AutoRetrying,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Reloads attempted with backoff before switching to interval retries.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub auto_retry_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_secs(2),
            auto_retry_interval: Duration::from_secs(30),
        }
    }
}

/// What the caller should do after a failed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    RetryAfter(Duration),
    AutoRetryEvery(Duration),
}

/// `idle -> loading -> {success, error}`, bounded backoff retries out of
/// `error`, then `auto-retrying` until a load succeeds.
#[derive(Debug, Clone)]
pub struct LoadTracker {
    state: LoadState,
    policy: RetryPolicy,
    retries: u32,
    last_attempt: Option<Instant>,
    last_success: Option<Instant>,
    last_error: Option<String>,
}

impl LoadTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: LoadState::Idle,
            policy,
            retries: 0,
            last_attempt: None,
            last_success: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a request at `now` should trigger a load.
    ///
    /// `success` reloads only on explicit refresh or once the widget's
    /// auto-refresh interval has passed; `auto-retrying` waits for its interval.
    pub fn should_load(&self, now: Instant, refresh: bool, auto_refresh: Option<Duration>) -> bool {
        match self.state {
            LoadState::Idle | LoadState::Error | LoadState::Loading => true,
            LoadState::Success => {
                refresh
                    || match (auto_refresh, self.last_success) {
                        (Some(interval), Some(at)) => now.duration_since(at) >= interval,
                        _ => false,
                    }
            }
            LoadState::AutoRetrying => refresh || self.retry_in(now).is_none(),
        }
    }

    /// Time left before the next interval retry, if one is pending.
    pub fn retry_in(&self, now: Instant) -> Option<Duration> {
        if self.state != LoadState::AutoRetrying {
            return None;
        }
        let at = self.last_attempt?;
        self.policy
            .auto_retry_interval
            .checked_sub(now.duration_since(at))
            .filter(|left| !left.is_zero())
    }

    pub fn begin(&mut self, now: Instant) {
        self.state = LoadState::Loading;
        self.last_attempt = Some(now);
    }

    pub fn succeed(&mut self, now: Instant) {
        self.state = LoadState::Success;
        self.retries = 0;
        self.last_success = Some(now);
        self.last_error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) -> NextStep {
        self.last_error = Some(error.into());

        if self.state == LoadState::AutoRetrying || self.retries >= self.policy.max_retries {
            self.state = LoadState::AutoRetrying;
            return NextStep::AutoRetryEvery(self.policy.auto_retry_interval);
        }

        self.state = LoadState::Error;
        let delay = self.policy.backoff_base * 2u32.saturating_pow(self.retries);
        self.retries += 1;
        NextStep::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_base: Duration::from_secs(2),
            auto_retry_interval: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_bounded_backoff_then_auto_retry() {
        let now = Instant::now();
        let mut tracker = LoadTracker::new(policy());
        assert_eq!(tracker.state(), LoadState::Idle);

        tracker.begin(now);
        assert_eq!(tracker.state(), LoadState::Loading);
        assert_eq!(tracker.fail("boom"), NextStep::RetryAfter(Duration::from_secs(2)));
        assert_eq!(tracker.state(), LoadState::Error);

        tracker.begin(now);
        assert_eq!(tracker.fail("boom"), NextStep::RetryAfter(Duration::from_secs(4)));

        tracker.begin(now);
        assert_eq!(
            tracker.fail("still down"),
            NextStep::AutoRetryEvery(Duration::from_secs(30))
        );
        assert_eq!(tracker.state(), LoadState::AutoRetrying);
        assert_eq!(tracker.last_error(), Some("still down"));
    }

    #[test]
    fn test_auto_retry_waits_for_interval() {
        let start = Instant::now();
        let mut tracker = LoadTracker::new(RetryPolicy {
            max_retries: 0,
            ..policy()
        });
        tracker.begin(start);
        tracker.fail("down");

        let soon = start + Duration::from_secs(10);
        assert!(!tracker.should_load(soon, false, None));
        assert_eq!(tracker.retry_in(soon), Some(Duration::from_secs(20)));
        assert!(tracker.should_load(soon, true, None));

        let later = start + Duration::from_secs(31);
        assert!(tracker.should_load(later, false, None));

        // A failure while auto-retrying stays in the steady state.
        tracker.begin(later);
        assert_eq!(
            tracker.fail("down"),
            NextStep::AutoRetryEvery(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_success_clears_retries_and_reloads_on_refresh_only() {
        let start = Instant::now();
        let mut tracker = LoadTracker::new(policy());
        tracker.begin(start);
        tracker.fail("flaky");
        tracker.begin(start);
        tracker.succeed(start);

        assert_eq!(tracker.state(), LoadState::Success);
        assert_eq!(tracker.last_error(), None);
        assert!(!tracker.should_load(start + Duration::from_secs(600), false, None));
        assert!(tracker.should_load(start, true, None));

        let auto = Some(Duration::from_secs(60));
        assert!(!tracker.should_load(start + Duration::from_secs(59), false, auto));
        assert!(tracker.should_load(start + Duration::from_secs(60), false, auto));

        // Retry budget is back to full after a success.
        tracker.begin(start);
        assert_eq!(tracker.fail("x"), NextStep::RetryAfter(Duration::from_secs(2)));
    }
}
