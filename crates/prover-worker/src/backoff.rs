//! Rate-limit backoff and per-identity run state.

use std::time::Duration;

/// Escalating delays applied on successive rate-limit strikes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    schedule: Vec<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(60),
        ])
    }
}

impl BackoffPolicy {
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self { schedule }
    }

    /// Delay for the `strike`-th consecutive rate limit (1-based).
    ///
    /// Strikes beyond the end of the schedule reuse its last entry; strike 0
    /// is treated as strike 1. An empty schedule never waits.
    pub fn delay_for(&self, strike: u32) -> Duration {
        if self.schedule.is_empty() {
            return Duration::ZERO;
        }
        let idx = (strike.max(1) as usize).min(self.schedule.len()) - 1;
        self.schedule[idx]
    }
}

/// Mutable state owned by a single worker cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRunState {
    /// 1-based index of the iteration in progress
    pub iteration_index: u64,
    pub rate_limit_strikes: u32,
    last_claimed: Option<u64>,
}

impl Default for WorkerRunState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRunState {
    pub fn new() -> Self {
        Self {
            iteration_index: 1,
            rate_limit_strikes: 0,
            last_claimed: None,
        }
    }

    /// Completed iterations so far
    pub fn completed(&self) -> u64 {
        self.iteration_index - 1
    }

    /// Whether another iteration fits in `loop_count` (0 = unbounded)
    pub fn has_budget(&self, loop_count: u64) -> bool {
        loop_count == 0 || self.iteration_index <= loop_count
    }

    /// Record a rate limit and return the new strike count
    pub fn strike(&mut self) -> u32 {
        self.rate_limit_strikes = self.rate_limit_strikes.saturating_add(1);
        self.rate_limit_strikes
    }

    pub fn reset_strikes(&mut self) {
        self.rate_limit_strikes = 0;
    }

    pub fn advance(&mut self) {
        self.iteration_index += 1;
    }

    /// True when a claim is due at the current index and has not yet been
    /// made for it. Marks the index as claimed.
    pub fn take_claim(&mut self, claim_every: u64) -> bool {
        if claim_every == 0 || self.iteration_index % claim_every != 0 {
            return false;
        }
        if self.last_claimed == Some(self.iteration_index) {
            return false;
        }
        self.last_claimed = Some(self.iteration_index);
        true
    }
}
