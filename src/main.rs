use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use traffic_collector::cli::{self, Args, Command};
use traffic_collector::clock::SystemClock;
use traffic_collector::config::Config;
use traffic_collector::coordinates::load_coordinates;
use traffic_collector::db::build_pool;
use traffic_collector::dump::export_traffic;
use traffic_collector::provider::TomTomClient;
use traffic_collector::scheduler::{CollectionScheduler, RunMode, SchedulerConfig};
use traffic_collector::store::PgSampleStore;
use traffic_collector::telemetry::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env()?;
    init_tracing(config.otlp_endpoint.as_deref())?;

    let result = match args.command {
        Command::Collect {
            coordinates,
            continuous,
            interval,
            calls_limit,
            hours,
        } => {
            if let Some(limit) = calls_limit {
                config.calls_limit = limit;
            }
            if let Some(horizon) = cli::hours(hours) {
                config.run_horizon = horizon;
            }
            let mode = if continuous {
                RunMode::Continuous
            } else {
                RunMode::SinglePass
            };
            collect(&config, &coordinates, mode, cli::minutes(interval)).await
        }
        Command::Plan {
            coordinates,
            interval,
        } => plan(&config, &coordinates, cli::minutes(interval)),
        Command::Dump { output } => dump(&config, &output).await,
    };

    shutdown_tracing();
    result
}

async fn collect(
    config: &Config,
    path: &Path,
    mode: RunMode,
    interval: Option<Duration>,
) -> Result<()> {
    let api_key = config.require_api_key()?;
    let database_url = config.require_database_url()?;
    let coordinates = load_coordinates(path)?;
    if coordinates.is_empty() {
        tracing::warn!(path = %path.display(), "no valid coordinates found; nothing to collect");
        return Ok(());
    }
    let planner = config.planner(interval)?;

    let pool = build_pool(database_url, config.db_pool_size).await?;
    let store = PgSampleStore::new(pool);
    if config.bootstrap_schema {
        store
            .ensure_schema()
            .await
            .context("failed to bootstrap traffic schema")?;
    }

    let provider = TomTomClient::new(
        config.api_url.as_str(),
        config.api_unit.as_str(),
        api_key,
        config.request_timeout,
    )
    .context("failed to build http client")?;

    let scheduler = CollectionScheduler::new(
        provider,
        store,
        SystemClock,
        planner,
        SchedulerConfig {
            mode,
            horizon: config.run_horizon,
            calls_limit: config.calls_limit,
            pacing_delay: config.pacing_delay,
            check_store: config.dedupe_store_check,
        },
    )?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    let report = scheduler.run(&coordinates, &cancel).await;
    println!("{report}");
    Ok(())
}

fn plan(config: &Config, path: &Path, interval: Option<Duration>) -> Result<()> {
    let coordinates = load_coordinates(path)?;
    let planner = config.planner(interval)?;
    let per_day = planner.expected_calls(coordinates.len());
    let over_horizon = planner.expected_calls_over(coordinates.len(), config.run_horizon);

    println!(
        "{} coordinate(s): {} call(s) per single pass, {} per day, {} over {}h",
        coordinates.len(),
        coordinates.len(),
        per_day,
        over_horizon,
        config.run_horizon.as_secs() / 3600
    );
    if over_horizon > config.calls_limit {
        println!(
            "warning: continuous run exceeds the budget of {} call(s) by {}",
            config.calls_limit,
            over_horizon - config.calls_limit
        );
    } else {
        println!("within the budget of {} call(s)", config.calls_limit);
    }
    Ok(())
}

async fn dump(config: &Config, output: &Path) -> Result<()> {
    let pool = build_pool(config.require_database_url()?, config.db_pool_size).await?;
    let rows = export_traffic(&pool, output).await?;
    println!("wrote {rows} row(s) to {}", output.display());
    Ok(())
}
