use thiserror::Error;

/// Startup-time failures. Any of these aborts the process before a run begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOMTOM_API_KEY is required (set it in the environment or a .env file)")]
    MissingApiKey,

    #[error("TRAFFIC_DATABASE_URL or DATABASE_URL is required (or present as database_url in the setup config)")]
    MissingDatabaseUrl,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} must be strictly positive")]
    NonPositive { key: &'static str },

    #[error("failed to read coordinate file {path}: {source}")]
    CoordinateFile {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("coordinate file {path} is missing a {missing} column (available columns: {available:?})")]
    MissingColumn {
        path: String,
        missing: &'static str,
        available: Vec<String>,
    },

    #[error("coordinate file {path} line {line}: {reason}")]
    MalformedRow {
        path: String,
        line: u64,
        reason: String,
    },
}

/// A single provider call that did not yield a usable payload.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest errors carry the request URL, which includes the API key.
        ApiError::Transport(err.without_url())
    }
}

/// A failed write or existence check against the geospatial store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("constraint violation: {0}")]
    Constraint(#[source] sqlx::Error),

    #[error("malformed geometry: {0}")]
    MalformedGeometry(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let class = match &err {
            sqlx::Error::Database(db) => db.code().map(|code| code.chars().take(2).collect::<String>()),
            _ => None,
        };
        let transport = matches!(
            err,
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
        );
        if transport {
            return StoreError::Connection(err);
        }
        match class.as_deref() {
            Some("08") => StoreError::Connection(err),
            Some("23") => StoreError::Constraint(err),
            // 22xxx data exceptions and XX000 are what PostGIS raises for unparsable WKT.
            Some("22") | Some("XX") => StoreError::MalformedGeometry(err),
            _ => StoreError::Database(err),
        }
    }
}
