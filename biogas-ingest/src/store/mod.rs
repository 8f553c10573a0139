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

//! Registry and reading storage.
//!
//! [`TelemetryStore`] is the seam between the pipeline and the relational
//! store. Each method maps to a single statement; nothing spans a transaction,
//! so every step is either idempotent or append-only and a message can be
//! safely re-run from any point.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{StoreError, StoreResult};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A device row to register on first sight.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub device_id: String,
    pub description: Option<String>,
    pub apartment_id: Option<String>,
}

/// A registered slave/register channel of a flat device.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SensorChannel {
    pub slave_id: String,
    pub reg_add: String,
}

impl SensorChannel {
    pub fn new(slave_id: impl Into<String>, reg_add: impl Into<String>) -> Self {
        Self {
            slave_id: slave_id.into(),
            reg_add: reg_add.into(),
        }
    }
}

/// One accepted measurement, ready to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    /// Surrogate sensor id (apartment variant) or slave id (flat-device variant).
    pub sensor_id: String,
    pub device_id: String,
    /// Register address, flat-device variant only.
    pub reg_add: Option<String>,
    pub value: f64,
    /// Ingestion time on the server clock.
    pub received_at: DateTime<Utc>,
    /// `DATE TIME` as reported by the device, stored unvalidated.
    pub device_time: Option<String>,
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn apartment_exists(&self, apartment_id: &str) -> StoreResult<bool>;

    /// Must not fail when the apartment already exists.
    async fn insert_apartment(&self, apartment_id: &str) -> StoreResult<()>;

    /// Returns `true` when the device was created, `false` when it was already
    /// registered. The first registration's description wins.
    async fn insert_device(&self, device: &NewDevice) -> StoreResult<bool>;

    async fn sensor_id_for_type(&self, sensor_type: &str) -> StoreResult<Option<i32>>;

    async fn sensor_parameters(&self, device_id: &str) -> StoreResult<Vec<SensorChannel>>;

    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<()>;
}

/// Wraps a store so that every call is bounded by `timeout`.
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn TelemetryStore>,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn TelemetryStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn timed<T>(
        &self,
        command: &'static str,
        call: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout {
                command,
                timeout: self.timeout,
            })?
    }
}

#[async_trait]
impl TelemetryStore for TimedStore {
    async fn apartment_exists(&self, apartment_id: &str) -> StoreResult<bool> {
        self.timed("SELECT apartment", self.inner.apartment_exists(apartment_id))
            .await
    }

    async fn insert_apartment(&self, apartment_id: &str) -> StoreResult<()> {
        self.timed("INSERT apartment", self.inner.insert_apartment(apartment_id))
            .await
    }

    async fn insert_device(&self, device: &NewDevice) -> StoreResult<bool> {
        self.timed("INSERT device", self.inner.insert_device(device))
            .await
    }

    async fn sensor_id_for_type(&self, sensor_type: &str) -> StoreResult<Option<i32>> {
        self.timed("SELECT sensor", self.inner.sensor_id_for_type(sensor_type))
            .await
    }

    async fn sensor_parameters(&self, device_id: &str) -> StoreResult<Vec<SensorChannel>> {
        self.timed(
            "SELECT sensor_parameters",
            self.inner.sensor_parameters(device_id),
        )
        .await
    }

    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<()> {
        self.timed("INSERT sensor_value", self.inner.insert_reading(reading))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timed_store_times_out_stalled_call() {
        let inner = Arc::new(MemoryStore::new());
        inner.stall(true);
        let store = TimedStore::new(inner, Duration::from_secs(5));

        let err = store.sensor_parameters("D1").await.unwrap_err();
        match err {
            StoreError::Timeout { command, timeout } => {
                assert_eq!(command, "SELECT sensor_parameters");
                assert_eq!(timeout, Duration::from_secs(5));
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timed_store_passes_results_through() {
        let inner = Arc::new(MemoryStore::new().with_sensor_type("temp", 7));
        let store = TimedStore::new(inner, Duration::from_secs(5));

        assert_eq!(store.sensor_id_for_type("temp").await.unwrap(), Some(7));
        assert_eq!(store.sensor_id_for_type("ph").await.unwrap(), None);
    }
}
