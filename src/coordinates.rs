use crate::error::ConfigError;
use std::fmt;
use std::path::Path;

const KEY_SCALE: f64 = 100_000.0;
const KEY_DECIMALS: i32 = 5;

const LAT_ALIASES: &[&str] = &["lat", "latitude"];
const LON_ALIASES: &[&str] = &["lon", "lng", "longitude"];

/// A WGS84 sampling point, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn key(&self) -> CoordinateKey {
        CoordinateKey {
            lat_e5: scale(self.lat),
            lon_e5: scale(self.lon),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// Dedup identity: the coordinate rounded to 5 decimal places (~1.1 m),
/// held as scaled integers so it hashes and compares exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordinateKey {
    lat_e5: i64,
    lon_e5: i64,
}

impl CoordinateKey {
    pub fn lat(&self) -> f64 {
        self.lat_e5 as f64 / KEY_SCALE
    }

    pub fn lon(&self) -> f64 {
        self.lon_e5 as f64 / KEY_SCALE
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat(), self.lon())
    }
}

/// Decimal half-away-from-zero rounding to 5 places, on the same 15
/// significant digits Postgres keeps when casting `float8` to `numeric`.
/// Rounding the binary product `value * 1e5` would disagree with the
/// store for values sitting on a half step, such as 1.234565.
fn scale(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let text = format!("{:.14e}", value.abs());
    let Some((mantissa, exponent)) = text.split_once('e') else {
        return 0;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return 0;
    };
    let digits: Vec<i64> = mantissa
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| i64::from(b - b'0'))
        .collect();

    // Digits of `digits` that land at or above the fifth decimal place.
    let keep = exponent + 1 + KEY_DECIMALS;
    let scaled = if keep < 0 {
        0
    } else {
        let keep = keep as usize;
        let kept = digits
            .iter()
            .take(keep)
            .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(*d));
        let padded = (digits.len()..keep).fold(kept, |acc, _| acc.saturating_mul(10));
        let round_up = digits.get(keep).is_some_and(|d| *d >= 5);
        padded + i64::from(round_up)
    };
    if value.is_sign_negative() {
        -scaled
    } else {
        scaled
    }
}

pub fn round5(value: f64) -> f64 {
    scale(value) as f64 / KEY_SCALE
}

/// Reads the coordinate set from a CSV file with `lat|latitude` and
/// `lon|lng|longitude` columns (case-insensitive). Row order is preserved.
pub fn load_coordinates(path: &Path) -> Result<Vec<Coordinate>, ConfigError> {
    let path_label = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| ConfigError::CoordinateFile {
            path: path_label.clone(),
            source,
        })?;

    let headers = reader
        .headers()
        .map_err(|source| ConfigError::CoordinateFile {
            path: path_label.clone(),
            source,
        })?
        .clone();
    let available: Vec<String> = headers.iter().map(str::to_string).collect();

    let lat_idx = find_column(&headers, LAT_ALIASES).ok_or_else(|| ConfigError::MissingColumn {
        path: path_label.clone(),
        missing: "lat",
        available: available.clone(),
    })?;
    let lon_idx = find_column(&headers, LON_ALIASES).ok_or_else(|| ConfigError::MissingColumn {
        path: path_label.clone(),
        missing: "lon",
        available: available.clone(),
    })?;

    let mut coordinates = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| ConfigError::CoordinateFile {
            path: path_label.clone(),
            source,
        })?;
        let line = record.position().map(|pos| pos.line()).unwrap_or(0);
        let lat = parse_field(&record, lat_idx, "lat", &path_label, line)?;
        let lon = parse_field(&record, lon_idx, "lon", &path_label, line)?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(ConfigError::MalformedRow {
                path: path_label,
                line,
                reason: format!("coordinate {lat},{lon} is outside WGS84 bounds"),
            });
        }
        coordinates.push(Coordinate::new(lat, lon));
    }

    tracing::info!(
        path = %path_label,
        count = coordinates.len(),
        lat_column = %headers.get(lat_idx).unwrap_or_default(),
        lon_column = %headers.get(lon_idx).unwrap_or_default(),
        "loaded coordinate set"
    );
    Ok(coordinates)
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = header.trim();
        aliases.iter().any(|alias| header.eq_ignore_ascii_case(alias))
    })
}

fn parse_field(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
    path: &str,
    line: u64,
) -> Result<f64, ConfigError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ConfigError::MalformedRow {
            path: path.to_string(),
            line,
            reason: format!("{name} value {raw:?} is not a number"),
        })
}
