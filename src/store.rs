use crate::coordinates::Coordinate;
use crate::error::StoreError;
use crate::sample::Sample;
use async_trait::async_trait;
use sqlx::PgPool;

/// Durable side of the collector: sample writes and the point-existence check
/// that lets a fresh run skip points stored by earlier runs.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// True if any stored row matches `coordinate` once both sides are
    /// rounded to 5 decimals.
    async fn contains(&self, coordinate: &Coordinate) -> Result<bool, StoreError>;

    /// Writes one sample as a single atomic record.
    async fn store(&self, sample: &Sample) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgSampleStore {
    pool: PgPool,
}

impl PgSampleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS postgis")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS traffic (
                id bigserial primary key,
                timestamp timestamptz not null default now(),
                lat double precision not null,
                lon double precision not null,
                querypoint geometry(Point, 4326) not null,
                segment geometry(LineString, 4326) null,
                data jsonb not null
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS traffic_rounded_point_idx
            ON traffic ((round(lat::numeric, 5)), (round(lon::numeric, 5)))
            "#,
        )
        .execute(&self.pool)
        .await?;
        tracing::debug!("traffic schema ensured");
        Ok(())
    }
}

#[async_trait]
impl SampleStore for PgSampleStore {
    async fn contains(&self, coordinate: &Coordinate) -> Result<bool, StoreError> {
        // Raw values are bound so Postgres applies the same float8 -> numeric
        // rounding to the probe as to the stored columns.
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM traffic
                WHERE round(lat::numeric, 5) = round($1::numeric, 5)
                  AND round(lon::numeric, 5) = round($2::numeric, 5)
            )
            "#,
        )
        .bind(coordinate.lat)
        .bind(coordinate.lon)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn store(&self, sample: &Sample) -> Result<(), StoreError> {
        let data = serde_json::to_string(&sample.payload)?;
        let wkt = sample.segment.to_wkt();

        // The transaction returns its connection to the pool on every path;
        // dropping it uncommitted rolls back.
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO traffic (lat, lon, data, querypoint, segment, timestamp)
            VALUES (
                $1,
                $2,
                $3::jsonb,
                ST_SetSRID(ST_MakePoint($2, $1), 4326),
                ST_SetSRID(ST_GeomFromText($4), 4326),
                $5
            )
            "#,
        )
        .bind(sample.coordinate.lat)
        .bind(sample.coordinate.lon)
        .bind(data)
        .bind(wkt)
        .bind(sample.timestamp)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::trace!(
            point = %sample.coordinate,
            vertices = sample.segment.len(),
            "sample stored"
        );
        Ok(())
    }
}
