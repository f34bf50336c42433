use std::sync::atomic::{AtomicU64, Ordering};

/// Absolute ceiling on provider calls for one run. Once exhausted it stays
/// exhausted; a new run gets a new guard.
#[derive(Debug)]
pub struct BudgetGuard {
    used: AtomicU64,
    limit: u64,
}

impl BudgetGuard {
    pub fn new(limit: u64) -> Self {
        Self {
            used: AtomicU64::new(0),
            limit,
        }
    }

    /// Reserves one call. Returns false, without counting, once the limit is reached.
    pub fn try_consume(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used())
    }
}
