pub mod budget;
pub mod cli;
pub mod clock;
pub mod config;
pub mod coordinates;
pub mod db;
pub mod dedupe;
pub mod dump;
pub mod error;
pub mod planner;
pub mod provider;
pub mod sample;
pub mod scheduler;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub mod test_support;
