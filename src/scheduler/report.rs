use std::fmt;
use std::time::Duration;

/// Terminal state of one invocation. None of them is resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The horizon elapsed, the next tick would fall on or after it, or the
    /// single pass finished.
    Completed,
    /// The call ceiling was reached; no further calls are issued.
    BudgetExhausted,
    /// A stop signal arrived.
    Interrupted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::BudgetExhausted => "budget exhausted",
            RunOutcome::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

/// Per-tick counters, logged at the end of every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub fetched: u64,
    pub stored: u64,
    pub skipped: u64,
    pub fetch_failures: u64,
    pub store_failures: u64,
    pub dropped_empty: u64,
    pub elapsed: Duration,
}

impl TickSummary {
    pub fn failures(&self) -> u64 {
        self.fetch_failures + self.store_failures
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub ticks: u64,
    pub calls_used: u64,
    pub calls_limit: u64,
    pub samples_stored: u64,
    pub skipped: u64,
    pub fetch_failures: u64,
    pub store_failures: u64,
    pub dropped_empty: u64,
    pub elapsed: Duration,
}

impl RunReport {
    pub(crate) fn new(calls_limit: u64) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            ticks: 0,
            calls_used: 0,
            calls_limit,
            samples_stored: 0,
            skipped: 0,
            fetch_failures: 0,
            store_failures: 0,
            dropped_empty: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn absorb(&mut self, tick: &TickSummary) {
        self.ticks = self.ticks.max(tick.tick);
        self.samples_stored += tick.stored;
        self.skipped += tick.skipped;
        self.fetch_failures += tick.fetch_failures;
        self.store_failures += tick.store_failures;
        self.dropped_empty += tick.dropped_empty;
    }

    pub fn remaining(&self) -> u64 {
        self.calls_limit.saturating_sub(self.calls_used)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} after {} collection(s) in {}: {} call(s) used, {} remaining of {}; \
             {} stored, {} skipped, {} fetch failure(s), {} store failure(s), {} empty",
            self.outcome,
            self.ticks,
            format_elapsed(self.elapsed),
            self.calls_used,
            self.remaining(),
            self.calls_limit,
            self.samples_stored,
            self.skipped,
            self.fetch_failures,
            self.store_failures,
            self.dropped_empty,
        )
    }
}

/// `HH:MM:SS`, hours not wrapped at 24.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
