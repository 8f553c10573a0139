// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! PostgreSQL implementation of [`TelemetryStore`].
//!
//! The schema lives in `migrations/` at the workspace root; this store never
//! migrates on its own.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{NewDevice, NewReading, SensorChannel, TelemetryStore};
use crate::error::{StoreError, StoreResult};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(StoreError::Connection)?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_error(command: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |error| StoreError::Query { command, error }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn apartment_exists(&self, apartment_id: &str) -> StoreResult<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT ap_id FROM apartment WHERE ap_id = $1")
                .bind(apartment_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error("SELECT apartment"))?;

        Ok(found.is_some())
    }

    async fn insert_apartment(&self, apartment_id: &str) -> StoreResult<()> {
        // A concurrent consumer may have registered it since the existence check.
        sqlx::query("INSERT INTO apartment (ap_id) VALUES ($1) ON CONFLICT (ap_id) DO NOTHING")
            .bind(apartment_id)
            .execute(&self.pool)
            .await
            .map_err(query_error("INSERT apartment"))?;

        Ok(())
    }

    async fn insert_device(&self, device: &NewDevice) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
INSERT INTO device
    (device_id, description, appt_id)
VALUES
    ($1, $2, $3)
ON CONFLICT (device_id) DO NOTHING
            "#,
        )
        .bind(&device.device_id)
        .bind(&device.description)
        .bind(&device.apartment_id)
        .execute(&self.pool)
        .await
        .map_err(query_error("INSERT device"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn sensor_id_for_type(&self, sensor_type: &str) -> StoreResult<Option<i32>> {
        sqlx::query_scalar("SELECT s_id FROM sensor WHERE sensor_type = $1")
            .bind(sensor_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("SELECT sensor"))
    }

    async fn sensor_parameters(&self, device_id: &str) -> StoreResult<Vec<SensorChannel>> {
        sqlx::query_as("SELECT slave_id, reg_add FROM sensor_parameters WHERE device_id = $1")
            .bind(device_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT sensor_parameters"))
    }

    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<()> {
        sqlx::query(
            r#"
INSERT INTO sensor_value
    (s_id, device_id, reg_add, value, u_time, d_time)
VALUES
    ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&reading.sensor_id)
        .bind(&reading.device_id)
        .bind(&reading.reg_add)
        .bind(reading.value)
        .bind(reading.received_at)
        .bind(&reading.device_time)
        .execute(&self.pool)
        .await
        .map_err(query_error("INSERT sensor_value"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
    async fn test_device_registration_is_idempotent(db: PgPool) {
        let store = PgStore::from_pool(db.clone());
        let device = NewDevice {
            device_id: "D1".to_owned(),
            description: Some("desc".to_owned()),
            apartment_id: None,
        };

        assert!(store.insert_device(&device).await.unwrap());
        assert!(!store.insert_device(&device).await.unwrap());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM device")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires a PostgreSQL instance at DATABASE_URL"]
    async fn test_reading_round_trip(db: PgPool) {
        let store = PgStore::from_pool(db.clone());
        store.insert_apartment("A12").await.unwrap();
        store.insert_apartment("A12").await.unwrap();
        assert!(store.apartment_exists("A12").await.unwrap());

        store
            .insert_device(&NewDevice {
                device_id: "GW-1".to_owned(),
                description: None,
                apartment_id: Some("A12".to_owned()),
            })
            .await
            .unwrap();
        store
            .insert_reading(&NewReading {
                sensor_id: "2".to_owned(),
                device_id: "GW-1".to_owned(),
                reg_add: Some("2".to_owned()),
                value: 5.5,
                received_at: Utc::now(),
                device_time: Some("2024-03-01 10:15:00".to_owned()),
            })
            .await
            .unwrap();

        let (value, d_time): (f64, Option<String>) =
            sqlx::query_as("SELECT value, d_time FROM sensor_value WHERE device_id = 'GW-1'")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(value, 5.5);
        assert_eq!(d_time.as_deref(), Some("2024-03-01 10:15:00"));
    }
}
