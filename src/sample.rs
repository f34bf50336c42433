use crate::coordinates::Coordinate;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt::Write as _;

/// A provider response, kept verbatim for storage plus the decoded parts the
/// collector needs.
#[derive(Debug, Clone)]
pub struct FlowPayload {
    pub raw: JsonValue,
    pub metrics: FlowMetrics,
    pub points: Vec<SegmentPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SegmentPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowMetrics {
    #[serde(default)]
    pub frc: Option<String>,
    #[serde(default)]
    pub current_speed: Option<f64>,
    #[serde(default)]
    pub free_flow_speed: Option<f64>,
    #[serde(default)]
    pub current_travel_time: Option<f64>,
    #[serde(default)]
    pub free_flow_travel_time: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub road_closure: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowEnvelope {
    #[serde(default)]
    flow_segment_data: Option<FlowSegmentData>,
}

#[derive(Deserialize)]
struct FlowSegmentData {
    #[serde(flatten)]
    metrics: FlowMetrics,
    #[serde(default)]
    coordinates: Option<CoordinateList>,
}

#[derive(Deserialize)]
struct CoordinateList {
    #[serde(default)]
    coordinate: Vec<SegmentPoint>,
}

impl FlowPayload {
    /// Decodes a provider body. A body without the
    /// `flowSegmentData.coordinates.coordinate` path decodes to an empty payload.
    pub fn from_value(raw: JsonValue) -> Result<Self, serde_json::Error> {
        let envelope = FlowEnvelope::deserialize(&raw)?;
        let (metrics, points) = match envelope.flow_segment_data {
            Some(data) => (
                data.metrics,
                data.coordinates.map(|c| c.coordinate).unwrap_or_default(),
            ),
            None => (FlowMetrics::default(), Vec::new()),
        };
        Ok(Self {
            raw,
            metrics,
            points,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The road segment as a polyline, or `None` when the payload has too few
    /// points to form a line.
    pub fn segment(&self) -> Option<SegmentGeometry> {
        SegmentGeometry::from_points(&self.points)
    }
}

/// Polyline in (lon, lat) order, as PostGIS expects.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentGeometry {
    vertices: Vec<(f64, f64)>,
}

impl SegmentGeometry {
    pub fn from_points(points: &[SegmentPoint]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        Some(Self {
            vertices: points.iter().map(|p| (p.longitude, p.latitude)).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn to_wkt(&self) -> String {
        let mut wkt = String::from("LINESTRING (");
        for (idx, (lon, lat)) in self.vertices.iter().enumerate() {
            if idx > 0 {
                wkt.push_str(", ");
            }
            let _ = write!(wkt, "{lon} {lat}");
        }
        wkt.push(')');
        wkt
    }
}

/// One successful, storable observation.
#[derive(Debug, Clone)]
pub struct Sample {
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
    pub payload: JsonValue,
    pub segment: SegmentGeometry,
}

impl Sample {
    /// Builds a sample from a fetched payload; `None` if there is no geometry.
    pub fn from_payload(
        coordinate: Coordinate,
        timestamp: DateTime<Utc>,
        payload: &FlowPayload,
    ) -> Option<Self> {
        let segment = payload.segment()?;
        Some(Self {
            coordinate,
            timestamp,
            payload: payload.raw.clone(),
            segment,
        })
    }
}
