use crate::coordinates::Coordinate;
use crate::error::ApiError;
use crate::sample::FlowPayload;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;

const ERROR_BODY_LIMIT: usize = 512;

/// Source of traffic-flow observations for a single point.
///
/// One call is one provider request. Implementations never retry; a failure
/// forfeits the coordinate for the current tick only.
#[async_trait]
pub trait FlowProvider: Send + Sync {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<FlowPayload, ApiError>;
}

#[derive(Clone)]
pub struct TomTomClient {
    http: Client,
    url: String,
    unit: String,
    api_key: String,
}

impl TomTomClient {
    pub fn new(
        url: impl Into<String>,
        unit: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("traffic-collector/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            unit: unit.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl FlowProvider for TomTomClient {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<FlowPayload, ApiError> {
        let point = format!("{},{}", coordinate.lat, coordinate.lon);
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("point", point.as_str()),
                ("unit", self.unit.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status,
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        let bytes = response.bytes().await?;
        let raw: JsonValue = serde_json::from_slice(&bytes)?;
        let payload = FlowPayload::from_value(raw)?;
        tracing::debug!(
            point = %coordinate,
            segment_points = payload.points.len(),
            current_speed = ?payload.metrics.current_speed,
            free_flow_speed = ?payload.metrics.free_flow_speed,
            "provider response decoded"
        );
        Ok(payload)
    }
}

fn truncate(body: &str, limit: usize) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= limit {
        return trimmed.to_string();
    }
    let mut end = limit;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}
