use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgPool, Postgres};
use tracing::{debug, info};

use super::{Store, StoreSession};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::record::VehicleRecord;

const UPSERT_VEHICLE: &str = r#"
    INSERT INTO vehicle_positions
      (vehicle_id, trip_id, route_id, latitude, longitude, timestamp,
       congestion, stop_id, status, is_active, last_seen)
    VALUES
      ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10)
    ON CONFLICT (vehicle_id)
    DO UPDATE SET
      trip_id = EXCLUDED.trip_id,
      route_id = EXCLUDED.route_id,
      latitude = EXCLUDED.latitude,
      longitude = EXCLUDED.longitude,
      timestamp = EXCLUDED.timestamp,
      congestion = EXCLUDED.congestion,
      stop_id = EXCLUDED.stop_id,
      status = EXCLUDED.status,
      is_active = TRUE,
      last_seen = EXCLUDED.last_seen,
      updated_at = NOW()
"#;

const DEACTIVATE_MISSING: &str = r#"
    UPDATE vehicle_positions
    SET is_active = FALSE, updated_at = NOW()
    WHERE is_active = TRUE AND NOT (vehicle_id = ANY($1))
"#;

const PURGE_INACTIVE: &str = r#"
    DELETE FROM vehicle_positions
    WHERE is_active = FALSE AND last_seen < $1
"#;

/// Run the embedded migrations that create `vehicle_positions`.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed vehicle store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!(
            max_connections = config.max_connections,
            acquire_timeout = ?config.acquire_timeout,
            "Connecting to PostgreSQL"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(StoreError::Connectivity)?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Deletes inactive rows last seen before `cutoff`. Active rows are never
    /// touched.
    pub async fn purge_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(PURGE_INACTIVE)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Purge)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Store for PgStore {
    type Session = PgSession;

    async fn session(&self) -> Result<PgSession, StoreError> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(StoreError::Connectivity)?;

        Ok(PgSession { conn })
    }
}

/// A pooled connection held for the duration of one pull.
pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl StoreSession for PgSession {
    async fn upsert_all(&mut self, records: &[VehicleRecord]) -> Result<u64, StoreError> {
        // Dropping `tx` on an early return rolls the transaction back.
        let mut tx = self.conn.begin().await.map_err(StoreError::Connectivity)?;

        let mut written = 0;
        for record in records {
            let result = sqlx::query(UPSERT_VEHICLE)
                .bind(&record.vehicle_id)
                .bind(&record.trip_id)
                .bind(&record.route_id)
                .bind(record.latitude)
                .bind(record.longitude)
                .bind(record.timestamp)
                .bind(record.congestion.as_deref())
                .bind(record.stop_id.as_deref())
                .bind(record.status.as_deref())
                .bind(record.last_seen)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Transaction)?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(StoreError::Transaction)?;
        debug!(written, "Upsert transaction committed");

        Ok(written)
    }

    async fn deactivate_missing(&mut self, keep: &[String]) -> Result<u64, StoreError> {
        let result = sqlx::query(DEACTIVATE_MISSING)
            .bind(keep)
            .execute(&mut *self.conn)
            .await
            .map_err(StoreError::Deactivation)?;

        Ok(result.rows_affected())
    }
}
