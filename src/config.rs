use crate::error::ConfigError;
use crate::planner::{IntervalPlanner, DEFAULT_PEAK_INTERVAL, DEFAULT_STANDARD_INTERVAL};
use dotenvy::dotenv;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str =
    "https://api.tomtom.com/traffic/services/4/flowSegmentData/absolute/10/json";
const DEFAULT_CALLS_LIMIT: u64 = 2500;

/// Longest accepted sampling interval: one day.
pub const MAX_INTERVAL_MINUTES: u64 = 24 * 60;
/// Longest accepted run horizon: one leap year.
pub const MAX_RUN_HOURS: u64 = 366 * 24;

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    calls_limit: Option<u64>,
    #[serde(default)]
    peak_interval_minutes: Option<u64>,
    #[serde(default)]
    standard_interval_minutes: Option<u64>,
    #[serde(default)]
    pacing_delay_ms: Option<u64>,
}

fn load_setup_config_overrides(path: &Path) -> Option<SetupConfigOverrides> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "traffic-collector failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    let mut bytes = contents.into_bytes();
    match simd_json::serde::from_slice(&mut bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "traffic-collector failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

/// Process configuration, loaded once at startup and immutable afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: Option<String>,
    pub database_url: Option<String>,
    pub db_pool_size: u32,
    pub api_url: String,
    pub api_unit: String,
    pub request_timeout: Duration,
    pub pacing_delay: Duration,
    pub calls_limit: u64,
    pub run_horizon: Duration,
    pub peak_interval: Duration,
    pub standard_interval: Duration,
    pub dedupe_store_check: bool,
    pub bootstrap_schema: bool,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Environment values
    /// win over the setup file; the setup file wins over defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let overrides = get("TRAFFIC_SETUP_CONFIG_PATH")
            .map(PathBuf::from)
            .and_then(|path| load_setup_config_overrides(&path))
            .unwrap_or_default();

        let api_key = get("TOMTOM_API_KEY");
        let database_url = get("TRAFFIC_DATABASE_URL")
            .or_else(|| get("DATABASE_URL"))
            .or_else(|| {
                overrides
                    .database_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            })
            .map(normalize_database_url);

        let api_url = get("TRAFFIC_API_URL")
            .or_else(|| overrides.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_unit = get("TRAFFIC_API_UNIT").unwrap_or_else(|| "KMPH".to_string());

        let db_pool_size = parse_u64(&get, "TRAFFIC_DB_POOL_SIZE", 4)?;
        let db_pool_size = u32::try_from(db_pool_size).map_err(|_| ConfigError::InvalidValue {
            key: "TRAFFIC_DB_POOL_SIZE",
            value: db_pool_size.to_string(),
        })?;
        let request_timeout =
            Duration::from_secs(parse_u64(&get, "TRAFFIC_REQUEST_TIMEOUT_SECS", 15)?);
        let pacing_delay = Duration::from_millis(parse_u64(
            &get,
            "TRAFFIC_PACING_DELAY_MS",
            overrides.pacing_delay_ms.unwrap_or(100),
        )?);
        let calls_limit = parse_u64(
            &get,
            "TRAFFIC_CALLS_LIMIT",
            overrides.calls_limit.unwrap_or(DEFAULT_CALLS_LIMIT),
        )?;
        let run_hours = parse_u64(&get, "TRAFFIC_RUN_HOURS", 24)?;
        let peak_minutes = parse_u64(
            &get,
            "TRAFFIC_PEAK_INTERVAL_MINUTES",
            overrides
                .peak_interval_minutes
                .unwrap_or(DEFAULT_PEAK_INTERVAL.as_secs() / 60),
        )?;
        let standard_minutes = parse_u64(
            &get,
            "TRAFFIC_STANDARD_INTERVAL_MINUTES",
            overrides
                .standard_interval_minutes
                .unwrap_or(DEFAULT_STANDARD_INTERVAL.as_secs() / 60),
        )?;
        let dedupe_store_check = parse_bool(&get, "TRAFFIC_DEDUPE_STORE_CHECK", true)?;
        let bootstrap_schema = parse_bool(&get, "TRAFFIC_BOOTSTRAP_SCHEMA", true)?;
        let otlp_endpoint = get("OTEL_EXPORTER_OTLP_ENDPOINT");

        if db_pool_size == 0 {
            return Err(ConfigError::NonPositive {
                key: "TRAFFIC_DB_POOL_SIZE",
            });
        }
        if request_timeout.is_zero() {
            return Err(ConfigError::NonPositive {
                key: "TRAFFIC_REQUEST_TIMEOUT_SECS",
            });
        }
        check_range("TRAFFIC_RUN_HOURS", run_hours, MAX_RUN_HOURS)?;
        check_range("TRAFFIC_PEAK_INTERVAL_MINUTES", peak_minutes, MAX_INTERVAL_MINUTES)?;
        check_range(
            "TRAFFIC_STANDARD_INTERVAL_MINUTES",
            standard_minutes,
            MAX_INTERVAL_MINUTES,
        )?;

        Ok(Self {
            api_key,
            database_url,
            db_pool_size,
            api_url,
            api_unit,
            request_timeout,
            pacing_delay,
            calls_limit,
            run_horizon: Duration::from_secs(run_hours * 3600),
            peak_interval: Duration::from_secs(peak_minutes * 60),
            standard_interval: Duration::from_secs(standard_minutes * 60),
            dedupe_store_check,
            bootstrap_schema,
            otlp_endpoint,
        })
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }

    /// The planner for a run: a fixed cadence when `interval` is given,
    /// otherwise the peak-aware policy.
    pub fn planner(&self, interval: Option<Duration>) -> Result<IntervalPlanner, ConfigError> {
        match interval {
            Some(interval) => IntervalPlanner::fixed(interval),
            None => IntervalPlanner::peak_aware(self.peak_interval, self.standard_interval),
        }
    }
}

fn parse_u64<G>(get: &G, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw,
        }),
        None => Ok(default),
    }
}

fn check_range(key: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NonPositive { key });
    }
    if value > max {
        return Err(ConfigError::InvalidValue {
            key,
            value: format!("{value} (maximum {max})"),
        });
    }
    Ok(())
}

fn parse_bool<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { key, value: raw }),
        },
        None => Ok(default),
    }
}

fn normalize_database_url(url: String) -> String {
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg2://") {
        return format!("postgresql://{stripped}");
    }
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg://") {
        return format!("postgresql://{stripped}");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("TOMTOM_API_KEY", "k")])).expect("config");
        assert_eq!(config.require_api_key().expect("key"), "k");
        assert_eq!(config.calls_limit, 2500);
        assert_eq!(config.pacing_delay, Duration::from_millis(100));
        assert_eq!(config.run_horizon, Duration::from_secs(24 * 3600));
        assert_eq!(config.peak_interval, Duration::from_secs(15 * 60));
        assert_eq!(config.standard_interval, Duration::from_secs(75 * 60));
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.dedupe_store_check);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn missing_credential_is_reported_on_demand() {
        let config = Config::from_lookup(lookup(&[("TOMTOM_API_KEY", "   ")])).expect("config");
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingApiKey)
        ));
        assert!(matches!(
            config.require_database_url(),
            Err(ConfigError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn invalid_numbers_and_zero_intervals_are_errors() {
        let err = Config::from_lookup(lookup(&[("TRAFFIC_CALLS_LIMIT", "lots")]))
            .expect_err("invalid");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "TRAFFIC_CALLS_LIMIT",
                ..
            }
        ));

        let err = Config::from_lookup(lookup(&[("TRAFFIC_PEAK_INTERVAL_MINUTES", "0")]))
            .expect_err("zero");
        assert!(matches!(err, ConfigError::NonPositive { .. }));

        let err = Config::from_lookup(lookup(&[("TRAFFIC_DEDUPE_STORE_CHECK", "maybe")]))
            .expect_err("bool");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn out_of_range_values_are_rejected_not_truncated() {
        let err = Config::from_lookup(lookup(&[("TRAFFIC_DB_POOL_SIZE", "4294967297")]))
            .expect_err("pool size");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "TRAFFIC_DB_POOL_SIZE",
                ..
            }
        ));

        let err = Config::from_lookup(lookup(&[("TRAFFIC_RUN_HOURS", "18446744073709551615")]))
            .expect_err("run hours");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "TRAFFIC_RUN_HOURS",
                ..
            }
        ));

        let err = Config::from_lookup(lookup(&[("TRAFFIC_STANDARD_INTERVAL_MINUTES", "1441")]))
            .expect_err("interval");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let config = Config::from_lookup(lookup(&[("TRAFFIC_RUN_HOURS", "8784")])).expect("config");
        assert_eq!(config.run_horizon, Duration::from_secs(8784 * 3600));
    }

    #[test]
    fn database_url_prefers_specific_variable_and_normalizes() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://generic/db"),
            ("TRAFFIC_DATABASE_URL", "postgresql+psycopg://traffic@localhost/traffic"),
        ]))
        .expect("config");
        assert_eq!(
            config.require_database_url().expect("url"),
            "postgresql://traffic@localhost/traffic"
        );
    }

    #[test]
    fn setup_file_fills_gaps_but_env_wins() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{"database_url": "postgresql://setup/db", "calls_limit": 50000, "pacing_delay_ms": 0}}"#
        )
        .expect("write");
        let path = file.path().display().to_string();

        let config = Config::from_lookup(lookup(&[
            ("TRAFFIC_SETUP_CONFIG_PATH", path.as_str()),
            ("TRAFFIC_PACING_DELAY_MS", "250"),
        ]))
        .expect("config");
        assert_eq!(config.database_url.as_deref(), Some("postgresql://setup/db"));
        assert_eq!(config.calls_limit, 50_000);
        assert_eq!(config.pacing_delay, Duration::from_millis(250));
    }

    #[test]
    fn interval_override_selects_fixed_planner() {
        let config = Config::from_lookup(lookup(&[])).expect("config");
        let fixed = config
            .planner(Some(Duration::from_secs(3600)))
            .expect("planner");
        assert!(fixed.windows().is_empty());
        let peak = config.planner(None).expect("planner");
        assert_eq!(peak.windows().len(), 2);
        assert!(config.planner(Some(Duration::ZERO)).is_err());
    }
}
