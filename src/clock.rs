//! Wall-clock access for the scheduler.
//!
//! The scheduler never calls `Local::now()` or `tokio::time::sleep` directly,
//! so a run can be driven through a simulated day in tests.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
