mod report;


pub use report::{format_elapsed, RunOutcome, RunReport, TickSummary};

use crate::budget::BudgetGuard;
use crate::clock::Clock;
use crate::coordinates::Coordinate;
use crate::error::ConfigError;
use crate::dedupe::DedupeIndex;
use crate::planner::IntervalPlanner;
use crate::provider::FlowProvider;
use crate::sample::Sample;
use crate::store::SampleStore;
use chrono::{DateTime, Local, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One pass over the coordinate set, no waiting.
    SinglePass,
    /// Repeated passes on the planner's cadence until the horizon elapses.
    Continuous,
}

/// Immutable run parameters, fixed at construction.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub mode: RunMode,
    pub horizon: Duration,
    pub calls_limit: u64,
    pub pacing_delay: Duration,
    pub check_store: bool,
}

/// Mutable per-invocation state. Created fresh by every `run`, never persisted.
struct RunState {
    start_time: DateTime<Local>,
    /// `None` only when the horizon ends past the last representable instant.
    end_time: Option<DateTime<Local>>,
    budget: BudgetGuard,
    dedupe: DedupeIndex,
    collection_count: u64,
}

impl RunState {
    fn new(
        start_time: DateTime<Local>,
        horizon: chrono::Duration,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            start_time,
            end_time: start_time.checked_add_signed(horizon),
            budget: BudgetGuard::new(config.calls_limit),
            dedupe: DedupeIndex::new(config.check_store),
            collection_count: 0,
        }
    }

    fn reaches_horizon(&self, at: DateTime<Local>) -> bool {
        self.end_time.is_some_and(|end| at >= end)
    }
}

enum TickEnd {
    Finished,
    Stopped(RunOutcome),
}

pub struct CollectionScheduler<P, S, C> {
    provider: P,
    store: S,
    clock: C,
    planner: IntervalPlanner,
    config: SchedulerConfig,
    horizon: chrono::Duration,
}

impl<P, S, C> CollectionScheduler<P, S, C>
where
    P: FlowProvider,
    S: SampleStore,
    C: Clock,
{
    /// Fails if the horizon is zero or too large to place on the calendar.
    pub fn new(
        provider: P,
        store: S,
        clock: C,
        planner: IntervalPlanner,
        config: SchedulerConfig,
    ) -> Result<Self, ConfigError> {
        if config.horizon.is_zero() {
            return Err(ConfigError::NonPositive {
                key: "run horizon",
            });
        }
        let horizon = chrono::Duration::from_std(config.horizon).map_err(|_| {
            ConfigError::InvalidValue {
                key: "run horizon",
                value: format!("{:?}", config.horizon),
            }
        })?;
        Ok(Self {
            provider,
            store,
            clock,
            planner,
            config,
            horizon,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Projected calls for a run over `num_coordinates` points.
    pub fn expected_calls(&self, num_coordinates: usize) -> u64 {
        match self.config.mode {
            RunMode::SinglePass => num_coordinates as u64,
            RunMode::Continuous => self
                .planner
                .expected_calls_over(num_coordinates, self.config.horizon),
        }
    }

    /// Drives one invocation from start to a terminal state. Per-coordinate
    /// failures are logged and counted; nothing here returns an error.
    pub async fn run(&self, coordinates: &[Coordinate], cancel: &CancellationToken) -> RunReport {
        let span = tracing::info_span!(
            "run",
            run_id = %Uuid::new_v4(),
            mode = ?self.config.mode,
        );
        self.run_inner(coordinates, cancel).instrument(span).await
    }

    async fn run_inner(&self, coordinates: &[Coordinate], cancel: &CancellationToken) -> RunReport {
        let mut state = RunState::new(self.clock.now(), self.horizon, &self.config);
        let mut report = RunReport::new(self.config.calls_limit);

        if coordinates.is_empty() {
            tracing::warn!("no coordinates to collect; nothing to do");
            return report;
        }

        let expected = self.expected_calls(coordinates.len());
        if expected > self.config.calls_limit {
            tracing::warn!(
                expected,
                calls_limit = self.config.calls_limit,
                "projected calls exceed the budget; the run will stop early"
            );
        }
        tracing::info!(
            start = %state.start_time,
            end = ?state.end_time,
            coordinates = coordinates.len(),
            calls_limit = self.config.calls_limit,
            expected,
            "collection run started"
        );

        let outcome = loop {
            state.collection_count += 1;
            let tick_started = self.clock.now();
            tracing::info!(
                collection = state.collection_count,
                at = %tick_started,
                "collection started"
            );

            let (summary, end) = self
                .run_tick(&mut state, coordinates, tick_started, cancel)
                .await;
            tracing::info!(
                collection = summary.tick,
                fetched = summary.fetched,
                stored = summary.stored,
                skipped = summary.skipped,
                failures = summary.failures(),
                dropped_empty = summary.dropped_empty,
                elapsed = %format_elapsed(summary.elapsed),
                calls_used = state.budget.used(),
                calls_remaining = state.budget.remaining(),
                seen = state.dedupe.seen_count(),
                "collection finished"
            );
            report.absorb(&summary);

            if let TickEnd::Stopped(outcome) = end {
                break outcome;
            }
            if self.config.mode == RunMode::SinglePass {
                break RunOutcome::Completed;
            }

            let wait = self.planner.next_wait(tick_started.time());
            let next_tick = match chrono::Duration::from_std(wait)
                .ok()
                .and_then(|wait| tick_started.checked_add_signed(wait))
            {
                Some(next_tick) if !state.reaches_horizon(next_tick) => next_tick,
                next_tick => {
                    tracing::info!(next_tick = ?next_tick, end = ?state.end_time, "next collection falls past the run horizon");
                    break RunOutcome::Completed;
                }
            };

            let now = self.clock.now();
            let remaining_wait = (next_tick - now).to_std().unwrap_or_default();
            if remaining_wait.is_zero() {
                continue;
            }
            tracing::info!(
                minutes = %format!("{:.1}", remaining_wait.as_secs_f64() / 60.0),
                next_tick = %next_tick,
                "waiting until next collection"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("stop requested while waiting");
                    break RunOutcome::Interrupted;
                }
                _ = self.clock.sleep(remaining_wait) => {}
            }
        };

        report.outcome = outcome;
        report.calls_used = state.budget.used();
        report.elapsed = (self.clock.now() - state.start_time)
            .to_std()
            .unwrap_or_default();

        match outcome {
            RunOutcome::BudgetExhausted => tracing::warn!(
                calls_used = report.calls_used,
                remaining = report.remaining(),
                "call budget exhausted; stopping"
            ),
            _ => tracing::info!(
                outcome = %outcome,
                collections = report.ticks,
                calls_used = report.calls_used,
                remaining = report.remaining(),
                "collection run ended"
            ),
        }
        report
    }

    async fn run_tick(
        &self,
        state: &mut RunState,
        coordinates: &[Coordinate],
        tick_started: DateTime<Local>,
        cancel: &CancellationToken,
    ) -> (TickSummary, TickEnd) {
        let mut summary = TickSummary {
            tick: state.collection_count,
            ..TickSummary::default()
        };
        let timestamp: DateTime<Utc> = tick_started.with_timezone(&Utc);
        let total = coordinates.len();
        let mut end = TickEnd::Finished;

        for (idx, coordinate) in coordinates.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("stop requested; abandoning the rest of this collection");
                end = TickEnd::Stopped(RunOutcome::Interrupted);
                break;
            }

            let position = idx + 1;
            let percent = (position as f64 / total as f64) * 100.0;
            tracing::info!(
                index = position,
                total,
                percent = %format!("{percent:.2}"),
                lat = coordinate.lat,
                lon = coordinate.lon,
                "processing coordinate"
            );

            if state.dedupe.should_skip(&self.store, coordinate).await {
                tracing::debug!(point = %coordinate, "already sampled; skipping");
                summary.skipped += 1;
                continue;
            }

            if !state.budget.try_consume() {
                end = TickEnd::Stopped(RunOutcome::BudgetExhausted);
                break;
            }

            summary.fetched += 1;
            match self.provider.fetch(coordinate).await {
                Ok(payload) => {
                    match Sample::from_payload(*coordinate, timestamp, &payload) {
                        Some(sample) => match self.store.store(&sample).await {
                            Ok(()) => summary.stored += 1,
                            Err(err) => {
                                summary.store_failures += 1;
                                tracing::error!(point = %coordinate, error = %err, "failed to store sample");
                            }
                        },
                        None => {
                            summary.dropped_empty += 1;
                            tracing::warn!(point = %coordinate, "no segment coordinates in provider response");
                        }
                    }
                    state.dedupe.mark_seen(coordinate);
                }
                Err(err) => {
                    summary.fetch_failures += 1;
                    tracing::warn!(point = %coordinate, error = %err, "provider call failed");
                }
            }

            if !self.config.pacing_delay.is_zero() {
                self.clock.sleep(self.config.pacing_delay).await;
            }
        }

        summary.elapsed = (self.clock.now() - tick_started)
            .to_std()
            .unwrap_or_default();
        (summary, end)
    }
}
