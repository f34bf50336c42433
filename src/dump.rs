use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::TryStreamExt;
use sqlx::PgPool;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

const HEADER: [&str; 7] = [
    "id",
    "timestamp",
    "lat",
    "lon",
    "querypoint_wkt",
    "segment_wkt",
    "data",
];

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrafficRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub querypoint_wkt: Option<String>,
    pub segment_wkt: Option<String>,
    pub data: String,
}

impl TrafficRow {
    fn record(&self) -> [String; 7] {
        [
            self.id.to_string(),
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.lat.to_string(),
            self.lon.to_string(),
            self.querypoint_wkt.clone().unwrap_or_default(),
            self.segment_wkt.clone().unwrap_or_default(),
            self.data.clone(),
        ]
    }
}

/// Streams the whole `traffic` table, ordered by id, into a gzip CSV at `output`.
/// Returns the number of rows written.
pub async fn export_traffic(pool: &PgPool, output: &Path) -> Result<u64> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;

    let mut rows = sqlx::query_as::<_, TrafficRow>(
        r#"
        SELECT
            id,
            timestamp,
            lat,
            lon,
            ST_AsText(querypoint) AS querypoint_wkt,
            ST_AsText(segment) AS segment_wkt,
            data::text AS data
        FROM traffic
        ORDER BY id
        "#,
    )
    .fetch(pool);

    let mut writer = csv_writer(GzEncoder::new(file, Compression::default()))?;
    let mut written = 0u64;
    while let Some(row) = rows.try_next().await.context("failed to read traffic row")? {
        writer.write_record(row.record())?;
        written += 1;
    }
    finish(writer)?;

    tracing::info!(rows = written, path = %output.display(), "traffic table exported");
    Ok(written)
}

fn csv_writer<W: Write>(inner: W) -> Result<csv::Writer<W>> {
    let mut writer = csv::Writer::from_writer(inner);
    writer.write_record(HEADER)?;
    Ok(writer)
}

fn finish(writer: csv::Writer<GzEncoder<File>>) -> Result<()> {
    let encoder = writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush csv writer: {}", err.error()))?;
    let mut file = encoder.finish().context("failed to finish gzip stream")?;
    file.flush()?;
    Ok(())
}
