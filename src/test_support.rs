use crate::clock::Clock;
use crate::coordinates::{Coordinate, CoordinateKey};
use crate::error::{ApiError, StoreError};
use crate::provider::FlowProvider;
use crate::sample::{FlowPayload, Sample};
use crate::store::SampleStore;
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn local_time(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .earliest()
        .expect("representable local time")
}

pub fn flow_body(coordinate: &Coordinate) -> serde_json::Value {
    json!({
        "flowSegmentData": {
            "frc": "FRC3",
            "currentSpeed": 32,
            "freeFlowSpeed": 50,
            "confidence": 1.0,
            "coordinates": {"coordinate": [
                {"latitude": coordinate.lat, "longitude": coordinate.lon},
                {"latitude": coordinate.lat + 0.0003, "longitude": coordinate.lon + 0.0004}
            ]}
        }
    })
}

/// Store double. Successful writes also make the point visible to `contains`.
#[derive(Default)]
pub struct MemoryStore {
    keys: Mutex<HashSet<CoordinateKey>>,
    samples: Mutex<Vec<Sample>>,
    failing: Mutex<HashSet<CoordinateKey>>,
    fail_contains: AtomicBool,
    contains_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn with_keys(keys: impl IntoIterator<Item = CoordinateKey>) -> Self {
        let store = Self::default();
        store.keys.lock().expect("keys").extend(keys);
        store
    }

    pub fn fail_store_for(&self, coordinate: &Coordinate) {
        self.failing.lock().expect("failing").insert(coordinate.key());
    }

    pub fn fail_contains(&self, fail: bool) {
        self.fail_contains.store(fail, Ordering::SeqCst);
    }

    pub fn contains_calls(&self) -> usize {
        self.contains_calls.load(Ordering::SeqCst)
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().expect("samples").clone()
    }
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn contains(&self, coordinate: &Coordinate) -> Result<bool, StoreError> {
        let key = coordinate.key();
        self.contains_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_contains.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(sqlx::Error::PoolTimedOut));
        }
        Ok(self.keys.lock().expect("keys").contains(&key))
    }

    async fn store(&self, sample: &Sample) -> Result<(), StoreError> {
        let key = sample.coordinate.key();
        if self.failing.lock().expect("failing").contains(&key) {
            return Err(StoreError::Connection(sqlx::Error::PoolTimedOut));
        }
        self.keys.lock().expect("keys").insert(key);
        self.samples.lock().expect("samples").push(sample.clone());
        Ok(())
    }
}

/// Provider double that answers with a two-point segment unless told otherwise.
#[derive(Default)]
pub struct MockProvider {
    calls: Mutex<Vec<Coordinate>>,
    failing: Mutex<HashSet<CoordinateKey>>,
    empty: Mutex<HashSet<CoordinateKey>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl MockProvider {
    pub fn fail_for(&self, coordinate: &Coordinate) {
        self.failing.lock().expect("failing").insert(coordinate.key());
    }

    pub fn succeed_for(&self, coordinate: &Coordinate) {
        self.failing.lock().expect("failing").remove(&coordinate.key());
    }

    pub fn empty_for(&self, coordinate: &Coordinate) {
        self.empty.lock().expect("empty").insert(coordinate.key());
    }

    /// Cancels `token` once `calls` fetches have been made.
    pub fn cancel_after(&self, calls: usize, token: CancellationToken) {
        *self.cancel_after.lock().expect("cancel_after") = Some((calls, token));
    }

    pub fn calls(&self) -> Vec<Coordinate> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls").len()
    }
}

#[async_trait]
impl FlowProvider for MockProvider {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<FlowPayload, ApiError> {
        let count = {
            let mut calls = self.calls.lock().expect("calls");
            calls.push(*coordinate);
            calls.len()
        };
        if let Some((after, token)) = self.cancel_after.lock().expect("cancel_after").as_ref() {
            if count >= *after {
                token.cancel();
            }
        }

        let key = coordinate.key();
        if self.failing.lock().expect("failing").contains(&key) {
            return Err(ApiError::Status {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "try later".to_string(),
            });
        }
        if self.empty.lock().expect("empty").contains(&key) {
            return Ok(FlowPayload::from_value(json!({}))?);
        }
        Ok(FlowPayload::from_value(flow_body(coordinate))?)
    }
}

/// Simulated wall clock: `sleep` returns immediately and advances time.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    wake_times: Arc<Mutex<Vec<DateTime<Local>>>>,
}

impl ManualClock {
    pub fn starting_at(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
            wake_times: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("sleeps").clone()
    }

    /// Times at which sleeps longer than a minute ended, i.e. tick starts.
    pub fn wake_times(&self) -> Vec<DateTime<Local>> {
        self.wake_times.lock().expect("wake_times").clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().expect("now")
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("sleeps").push(duration);
        let woke = {
            let mut now = self.now.lock().expect("now");
            *now += chrono::Duration::from_std(duration).expect("duration in range");
            *now
        };
        if duration >= Duration::from_secs(60) {
            self.wake_times.lock().expect("wake_times").push(woke);
        }
    }
}
