use crate::config::{MAX_INTERVAL_MINUTES, MAX_RUN_HOURS};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "traffic-collector",
    version,
    about = "Collect traffic-flow samples for a set of points into PostGIS"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sample every coordinate once, or repeatedly over the run horizon.
    Collect {
        /// CSV file with lat/latitude and lon/lng/longitude columns.
        coordinates: PathBuf,
        /// Keep collecting on the peak-aware cadence until the horizon elapses.
        #[arg(long, short = 'c', default_value_t = false)]
        continuous: bool,
        /// Fixed interval in minutes, replacing the peak/off-peak cadence.
        #[arg(long, short = 'i', value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_MINUTES))]
        interval: Option<u64>,
        /// Override the per-run call ceiling.
        #[arg(long)]
        calls_limit: Option<u64>,
        /// Override the run horizon, in hours.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_RUN_HOURS))]
        hours: Option<u64>,
    },
    /// Print the projected number of provider calls without collecting.
    Plan {
        coordinates: PathBuf,
        #[arg(long, short = 'i', value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_MINUTES))]
        interval: Option<u64>,
    },
    /// Export the traffic table to a gzip-compressed CSV.
    Dump {
        #[arg(long, short = 'o', default_value = "postgis/traffic.csv.gz")]
        output: PathBuf,
    },
}

pub fn minutes(value: Option<u64>) -> Option<Duration> {
    value.map(|m| Duration::from_secs(m.saturating_mul(60)))
}

pub fn hours(value: Option<u64>) -> Option<Duration> {
    value.map(|h| Duration::from_secs(h.saturating_mul(3600)))
}
