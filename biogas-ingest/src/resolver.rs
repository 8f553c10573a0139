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

//! Identity resolution against the device/sensor registry.
//!
//! Apartments and devices are registered on first sight. Sensor types and
//! sensor parameters are never created here: an identity missing from those
//! tables is a field configuration error and rejects the message.

use log::info;

use crate::error::Rejection;
use crate::payload::{ApartmentTelemetry, FlatDeviceTelemetry, Telemetry};
use crate::store::{NewDevice, TelemetryStore};
use crate::topic::TopicRoute;

/// Registry-confirmed sensor identity of one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSensor {
    pub sensor_id: String,
    /// Register address of the matched channel, flat-device variant only.
    pub reg_add: Option<String>,
}

pub struct IdentityResolver<'a> {
    store: &'a dyn TelemetryStore,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(store: &'a dyn TelemetryStore) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        route: &TopicRoute,
        telemetry: &Telemetry,
    ) -> Result<ResolvedSensor, Rejection> {
        match telemetry {
            Telemetry::Apartment(t) => self.resolve_apartment(route, t).await,
            Telemetry::FlatDevice(t) => self.resolve_flat_device(t).await,
        }
    }

    async fn resolve_apartment(
        &self,
        route: &TopicRoute,
        telemetry: &ApartmentTelemetry,
    ) -> Result<ResolvedSensor, Rejection> {
        let device_id = telemetry.device_id.as_str();

        if let Some(apartment_id) = &route.apartment_id {
            let exists = self
                .store
                .apartment_exists(apartment_id)
                .await
                .map_err(Rejection::store(device_id))?;
            if !exists {
                self.store
                    .insert_apartment(apartment_id)
                    .await
                    .map_err(Rejection::store(device_id))?;
                info!("Registered apartment '{apartment_id}'");
            }
        }

        let device = NewDevice {
            device_id: device_id.to_owned(),
            description: telemetry.description.clone(),
            apartment_id: route.apartment_id.clone(),
        };
        if self
            .store
            .insert_device(&device)
            .await
            .map_err(Rejection::store(device_id))?
        {
            info!(
                "Registered device '{device_id}' in apartment '{}'",
                route.apartment_id.as_deref().unwrap_or("-")
            );
        }

        let sensor_type = route
            .sensor_type
            .as_deref()
            .ok_or_else(|| Rejection::MissingSensorType {
                device_id: device_id.to_owned(),
            })?;
        let sensor_id = self
            .store
            .sensor_id_for_type(sensor_type)
            .await
            .map_err(Rejection::store(device_id))?
            .ok_or_else(|| Rejection::UnknownSensorType {
                device_id: device_id.to_owned(),
                sensor_type: sensor_type.to_owned(),
            })?;

        Ok(ResolvedSensor {
            sensor_id: sensor_id.to_string(),
            reg_add: None,
        })
    }

    async fn resolve_flat_device(
        &self,
        telemetry: &FlatDeviceTelemetry,
    ) -> Result<ResolvedSensor, Rejection> {
        let device_id = telemetry.device_id.as_str();

        let device = NewDevice {
            device_id: device_id.to_owned(),
            description: None,
            apartment_id: None,
        };
        if self
            .store
            .insert_device(&device)
            .await
            .map_err(Rejection::store(device_id))?
        {
            info!("Registered device '{device_id}'");
        }

        let channels = self
            .store
            .sensor_parameters(device_id)
            .await
            .map_err(Rejection::store(device_id))?;
        if channels.is_empty() {
            return Err(Rejection::NoSensorParameters {
                device_id: device_id.to_owned(),
            });
        }

        // Identifiers are opaque tokens: "02" and "2" are different channels.
        let matched = channels
            .into_iter()
            .find(|c| c.slave_id == telemetry.slave_id && c.reg_add == telemetry.reg_add)
            .ok_or_else(|| Rejection::UnmatchedChannel {
                device_id: device_id.to_owned(),
                slave_id: telemetry.slave_id.clone(),
                reg_add: telemetry.reg_add.clone(),
            })?;

        // The slave id doubles as the sensor id in flat-device registries.
        Ok(ResolvedSensor {
            sensor_id: matched.slave_id,
            reg_add: Some(matched.reg_add),
        })
    }
}
