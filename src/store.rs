//! Single-document reading store: replace-or-create semantics over one
//! logical "current state" document. The in-memory copy is the source of
//! truth; Postgres, when configured, mirrors it in a single row so the
//! document survives restarts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;

use telemetry_core::{Reading, ReadingPatch, StoredReading};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request body cannot be empty")]
    EmptyUpdate,
    #[error("no data found")]
    NotFound,
    #[error("store unavailable")]
    Unavailable(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct ReadingStore {
    // Singleton document behind an async RwLock: many readers, single writer.
    current: Arc<RwLock<Option<StoredReading>>>,
    // Optional Postgres pool; None means run in-memory only.
    db: Option<PgPool>,
}

impl ReadingStore {
    pub fn in_memory() -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            db: None,
        }
    }

    pub fn with_db(pool: PgPool) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            db: Some(pool),
        }
    }

    /// Replace-or-create: merge the patch over the existing document, or over
    /// schema defaults if nothing has been written yet. An empty patch is a
    /// validation error, not a no-op.
    pub async fn put_reading(&self, patch: &ReadingPatch) -> Result<StoredReading, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }

        let mut guard = self.current.write().await;
        let now = Utc::now();
        let next = match guard.as_ref() {
            Some(existing) => {
                let mut reading = existing.reading.clone();
                patch.apply(&mut reading);
                StoredReading {
                    reading,
                    created_at: existing.created_at,
                    updated_at: now,
                }
            }
            None => {
                let mut reading = Reading::default();
                patch.apply(&mut reading);
                StoredReading {
                    reading,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        // Persist before committing to memory so a failed write surfaces as
        // 500 without leaving the two copies disagreeing.
        if let Some(pool) = &self.db {
            persist_reading(pool, &next).await?;
        }
        *guard = Some(next.clone());
        Ok(next)
    }

    pub async fn latest_reading(&self) -> Result<StoredReading, StoreError> {
        self.current.read().await.clone().ok_or(StoreError::NotFound)
    }

    /// Pull the singleton row back into memory after a restart.
    pub async fn restore_from_db(&self) -> Result<(), StoreError> {
        let Some(pool) = &self.db else {
            return Ok(());
        };
        if let Some(stored) = load_reading(pool).await? {
            tracing::info!(updated_at = %stored.updated_at, "restored reading from database");
            *self.current.write().await = Some(stored);
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    voltage: f64,
    current: f64,
    power: f64,
    energy_total: f64,
    efficiency: f64,
    light_intensity: f64,
    panel_temp: f64,
    dust_level: f64,
    inclination_angle: f64,
    panel_direction: String,
    sensor_health: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReadingRow> for StoredReading {
    fn from(row: ReadingRow) -> Self {
        StoredReading {
            reading: Reading {
                voltage: row.voltage,
                current: row.current,
                power: row.power,
                energy_total: row.energy_total,
                efficiency: row.efficiency,
                light_intensity: row.light_intensity,
                panel_temp: row.panel_temp,
                dust_level: row.dust_level,
                inclination_angle: row.inclination_angle,
                panel_direction: row.panel_direction,
                sensor_health: row.sensor_health,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_reading (
            id int PRIMARY KEY,
            voltage double precision NOT NULL,
            current double precision NOT NULL,
            power double precision NOT NULL,
            energy_total double precision NOT NULL,
            efficiency double precision NOT NULL,
            light_intensity double precision NOT NULL,
            panel_temp double precision NOT NULL,
            dust_level double precision NOT NULL,
            inclination_angle double precision NOT NULL,
            panel_direction text NOT NULL,
            sensor_health text NOT NULL,
            created_at timestamptz NOT NULL,
            updated_at timestamptz NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn persist_reading(pool: &PgPool, stored: &StoredReading) -> Result<(), sqlx::Error> {
    // One fixed-id row keeps the document singular at the database level too.
    sqlx::query(
        r#"INSERT INTO sensor_reading (
               id, voltage, current, power, energy_total, efficiency,
               light_intensity, panel_temp, dust_level, inclination_angle,
               panel_direction, sensor_health, created_at, updated_at)
           VALUES (1,$1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
           ON CONFLICT (id) DO UPDATE SET
             voltage = EXCLUDED.voltage,
             current = EXCLUDED.current,
             power = EXCLUDED.power,
             energy_total = EXCLUDED.energy_total,
             efficiency = EXCLUDED.efficiency,
             light_intensity = EXCLUDED.light_intensity,
             panel_temp = EXCLUDED.panel_temp,
             dust_level = EXCLUDED.dust_level,
             inclination_angle = EXCLUDED.inclination_angle,
             panel_direction = EXCLUDED.panel_direction,
             sensor_health = EXCLUDED.sensor_health,
             updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(stored.reading.voltage)
    .bind(stored.reading.current)
    .bind(stored.reading.power)
    .bind(stored.reading.energy_total)
    .bind(stored.reading.efficiency)
    .bind(stored.reading.light_intensity)
    .bind(stored.reading.panel_temp)
    .bind(stored.reading.dust_level)
    .bind(stored.reading.inclination_angle)
    .bind(&stored.reading.panel_direction)
    .bind(&stored.reading.sensor_health)
    .bind(stored.created_at)
    .bind(stored.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

async fn load_reading(pool: &PgPool) -> Result<Option<StoredReading>, sqlx::Error> {
    let row = sqlx::query_as::<_, ReadingRow>(
        r#"SELECT voltage, current, power, energy_total, efficiency,
                  light_intensity, panel_temp, dust_level, inclination_angle,
                  panel_direction, sensor_health, created_at, updated_at
           FROM sensor_reading
           WHERE id = 1"#,
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(StoredReading::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let store = ReadingStore::in_memory();
        let err = store.put_reading(&ReadingPatch::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyUpdate));
    }

    #[tokio::test]
    async fn get_before_any_write_is_not_found() {
        let store = ReadingStore::in_memory();
        let err = store.latest_reading().await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn create_merges_patch_with_schema_defaults() {
        let store = ReadingStore::in_memory();
        let patch = ReadingPatch {
            panel_temp: Some(45.2),
            power: Some(350.5),
            ..Default::default()
        };
        let stored = store.put_reading(&patch).await.unwrap();
        assert_eq!(stored.reading.panel_temp, 45.2);
        assert_eq!(stored.reading.power, 350.5);
        assert_eq!(stored.reading.voltage, 0.0);
        assert_eq!(stored.reading.panel_direction, "South");
        assert_eq!(stored.reading.sensor_health, "OK");

        let fetched = store.latest_reading().await.unwrap();
        assert_eq!(fetched.reading, stored.reading);
        assert_eq!(fetched.created_at, stored.created_at);
    }

    #[tokio::test]
    async fn update_overwrites_only_provided_fields() {
        let store = ReadingStore::in_memory();
        let first = ReadingPatch {
            voltage: Some(480.0),
            current: Some(25.0),
            ..Default::default()
        };
        let created = store.put_reading(&first).await.unwrap();

        let second = ReadingPatch {
            current: Some(26.5),
            ..Default::default()
        };
        let updated = store.put_reading(&second).await.unwrap();
        assert_eq!(updated.reading.voltage, 480.0);
        assert_eq!(updated.reading.current, 26.5);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }
}
