use crate::error::ConfigError;
use chrono::{NaiveTime, Timelike};
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

pub const DEFAULT_PEAK_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_STANDARD_INTERVAL: Duration = Duration::from_secs(75 * 60);

/// Hour-of-day range with a shorter sampling interval. Both bounds are
/// inclusive hours, so 21..=23 covers 21:00:00 through 23:59:59.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl PeakWindow {
    pub const fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        (self.start_hour..=self.end_hour).contains(&time.hour())
    }

    fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.end_hour - self.start_hour + 1) * 3600)
    }

    fn secs_until_start(&self, time: NaiveTime) -> u64 {
        let now = i64::from(time.num_seconds_from_midnight());
        let start = i64::from(self.start_hour) * 3600;
        (start - now).rem_euclid(SECS_PER_DAY as i64) as u64
    }
}

/// Evening wind-down and morning rush.
pub const DEFAULT_PEAK_WINDOWS: [PeakWindow; 2] = [PeakWindow::new(21, 23), PeakWindow::new(5, 7)];

/// Maps wall-clock time of day to a sampling interval. Stateless: every
/// method is a pure function of its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalPlanner {
    windows: Vec<PeakWindow>,
    peak_interval: Duration,
    standard_interval: Duration,
}

impl Default for IntervalPlanner {
    fn default() -> Self {
        Self {
            windows: DEFAULT_PEAK_WINDOWS.to_vec(),
            peak_interval: DEFAULT_PEAK_INTERVAL,
            standard_interval: DEFAULT_STANDARD_INTERVAL,
        }
    }
}

impl IntervalPlanner {
    pub fn new(
        windows: Vec<PeakWindow>,
        peak_interval: Duration,
        standard_interval: Duration,
    ) -> Result<Self, ConfigError> {
        if peak_interval.is_zero() {
            return Err(ConfigError::NonPositive {
                key: "peak interval",
            });
        }
        if standard_interval.is_zero() {
            return Err(ConfigError::NonPositive {
                key: "standard interval",
            });
        }
        for window in &windows {
            if window.start_hour > window.end_hour || window.end_hour > 23 {
                return Err(ConfigError::InvalidValue {
                    key: "peak window",
                    value: format!("{}..={}", window.start_hour, window.end_hour),
                });
            }
        }
        Ok(Self {
            windows,
            peak_interval,
            standard_interval,
        })
    }

    /// Peak/off-peak policy with the default windows.
    pub fn peak_aware(
        peak_interval: Duration,
        standard_interval: Duration,
    ) -> Result<Self, ConfigError> {
        Self::new(
            DEFAULT_PEAK_WINDOWS.to_vec(),
            peak_interval,
            standard_interval,
        )
    }

    /// One cadence all day, no peak windows.
    pub fn fixed(interval: Duration) -> Result<Self, ConfigError> {
        Self::new(Vec::new(), interval, interval)
    }

    pub fn windows(&self) -> &[PeakWindow] {
        &self.windows
    }

    pub fn is_peak(&self, time: NaiveTime) -> bool {
        self.windows.iter().any(|w| w.contains(time))
    }

    pub fn interval_for(&self, time: NaiveTime) -> Duration {
        if self.is_peak(time) {
            self.peak_interval
        } else {
            self.standard_interval
        }
    }

    /// How long to wait after a tick finishing at `time`.
    ///
    /// Off-peak waits are cut short so the collector does not sleep through
    /// the start of a peak window: it wakes on the first peak-cadence step
    /// that lands inside the window (20:50 wakes at 21:05, 20:00 at 21:00).
    pub fn next_wait(&self, time: NaiveTime) -> Duration {
        let interval = self.interval_for(time);
        if self.is_peak(time) || self.peak_interval >= interval {
            return interval;
        }
        let Some(until_peak) = self
            .windows
            .iter()
            .map(|w| w.secs_until_start(time))
            .min()
        else {
            return interval;
        };
        if until_peak >= interval.as_secs() {
            return interval;
        }
        let step = self.peak_interval.as_secs();
        let steps = until_peak.div_ceil(step).max(1);
        Duration::from_secs(steps * step)
    }

    /// Projected provider calls for one 24-hour day: ticks in the peak
    /// windows plus ticks in the remaining hours, times the coordinate count.
    pub fn expected_calls(&self, num_coordinates: usize) -> u64 {
        let peak_secs: u64 = self.windows.iter().map(|w| w.duration().as_secs()).sum();
        let peak_secs = peak_secs.min(SECS_PER_DAY);
        let standard_secs = SECS_PER_DAY - peak_secs;
        let ticks =
            peak_secs / self.peak_interval.as_secs() + standard_secs / self.standard_interval.as_secs();
        ticks * num_coordinates as u64
    }

    /// `expected_calls` scaled to a horizon other than one day.
    pub fn expected_calls_over(&self, num_coordinates: usize, horizon: Duration) -> u64 {
        let per_day = self.expected_calls(num_coordinates);
        ((u128::from(per_day) * horizon.as_secs() as u128) / u128::from(SECS_PER_DAY)) as u64
    }
}
