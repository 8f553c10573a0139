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

//! In-process [`TelemetryStore`] used by tests and local demos.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::RwLock;

use super::{NewDevice, NewReading, SensorChannel, TelemetryStore};
use crate::error::{StoreError, StoreResult};

/// Keeps the four registry tables and the reading log in memory.
///
/// Besides the store contract it can simulate an unreachable database
/// ([`MemoryStore::fail_writes`]) or a hung one ([`MemoryStore::stall`]).
#[derive(Default)]
pub struct MemoryStore {
    apartments: DashSet<String>,
    devices: DashMap<String, NewDevice>,
    sensor_types: DashMap<String, i32>,
    sensor_parameters: DashMap<String, Vec<SensorChannel>>,
    readings: RwLock<Vec<NewReading>>,
    fail_writes: AtomicBool,
    stalled: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensor_type(self, sensor_type: impl Into<String>, sensor_id: i32) -> Self {
        self.sensor_types.insert(sensor_type.into(), sensor_id);
        self
    }

    pub fn with_sensor_parameter(
        self,
        device_id: impl Into<String>,
        slave_id: impl Into<String>,
        reg_add: impl Into<String>,
    ) -> Self {
        self.sensor_parameters
            .entry(device_id.into())
            .or_default()
            .push(SensorChannel::new(slave_id, reg_add));
        self
    }

    /// Make every write fail as if the connection dropped.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every call hang until it is cancelled.
    pub fn stall(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn apartments(&self) -> Vec<String> {
        let mut apartments: Vec<String> = self.apartments.iter().map(|a| a.clone()).collect();
        apartments.sort();
        apartments
    }

    pub fn device(&self, device_id: &str) -> Option<NewDevice> {
        self.devices.get(device_id).map(|d| d.clone())
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn sensor_type_count(&self) -> usize {
        self.sensor_types.len()
    }

    pub async fn readings(&self) -> Vec<NewReading> {
        self.readings.read().await.clone()
    }

    async fn enter(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        }
    }

    fn check_writable(&self, command: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{command} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn apartment_exists(&self, apartment_id: &str) -> StoreResult<bool> {
        self.enter().await;
        Ok(self.apartments.contains(apartment_id))
    }

    async fn insert_apartment(&self, apartment_id: &str) -> StoreResult<()> {
        self.enter().await;
        self.check_writable("INSERT apartment")?;
        self.apartments.insert(apartment_id.to_owned());
        Ok(())
    }

    async fn insert_device(&self, device: &NewDevice) -> StoreResult<bool> {
        self.enter().await;
        self.check_writable("INSERT device")?;
        let created = match self.devices.entry(device.device_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(device.clone());
                true
            }
        };
        Ok(created)
    }

    async fn sensor_id_for_type(&self, sensor_type: &str) -> StoreResult<Option<i32>> {
        self.enter().await;
        Ok(self.sensor_types.get(sensor_type).map(|id| *id))
    }

    async fn sensor_parameters(&self, device_id: &str) -> StoreResult<Vec<SensorChannel>> {
        self.enter().await;
        Ok(self
            .sensor_parameters
            .get(device_id)
            .map(|channels| channels.clone())
            .unwrap_or_default())
    }

    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<()> {
        self.enter().await;
        self.check_writable("INSERT sensor_value")?;
        self.readings.write().await.push(reading.clone());
        Ok(())
    }
}
