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

//! Final append of accepted readings.

use chrono::{DateTime, Utc};

use crate::error::Rejection;
use crate::payload::Telemetry;
use crate::resolver::ResolvedSensor;
use crate::store::{NewReading, TelemetryStore};

/// Device-reported time as `"<date> <time>"`. Not validated.
pub fn compose_device_time(date: &str, time: &str) -> String {
    format!("{date} {time}")
}

/// Assemble the fact row for `telemetry` with its already scaled `value`.
pub fn reading_for(
    telemetry: &Telemetry,
    sensor: ResolvedSensor,
    value: f64,
    received_at: DateTime<Utc>,
) -> NewReading {
    let device_time = match telemetry {
        Telemetry::Apartment(_) => None,
        Telemetry::FlatDevice(t) => Some(compose_device_time(&t.date, &t.time)),
    };

    NewReading {
        sensor_id: sensor.sensor_id,
        device_id: telemetry.device_id().to_owned(),
        reg_add: sensor.reg_add,
        value,
        received_at,
        device_time,
    }
}

pub struct ReadingWriter<'a> {
    store: &'a dyn TelemetryStore,
}

impl<'a> ReadingWriter<'a> {
    pub fn new(store: &'a dyn TelemetryStore) -> Self {
        Self { store }
    }

    /// Append `reading`. Failures are reported, never retried here.
    pub async fn write(&self, reading: &NewReading) -> Result<(), Rejection> {
        self.store
            .insert_reading(reading)
            .await
            .map_err(Rejection::store(&reading.device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ApartmentTelemetry, FlatDeviceTelemetry};
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_compose_device_time_is_verbatim() {
        assert_eq!(
            compose_device_time("2024-03-01", "10:15:00"),
            "2024-03-01 10:15:00"
        );
        assert_eq!(compose_device_time("01/03/24", ""), "01/03/24 ");
    }

    #[test]
    fn test_apartment_reading_has_no_device_time() {
        let telemetry = Telemetry::Apartment(ApartmentTelemetry {
            device_id: "D1".to_owned(),
            description: None,
            value: json!(21.5),
        });
        let sensor = ResolvedSensor {
            sensor_id: "7".to_owned(),
            reg_add: None,
        };
        let now = Utc::now();

        let reading = reading_for(&telemetry, sensor, 21.5, now);
        assert_eq!(reading.sensor_id, "7");
        assert_eq!(reading.device_id, "D1");
        assert_eq!(reading.received_at, now);
        assert_eq!(reading.device_time, None);
    }

    #[test]
    fn test_flat_device_reading_carries_device_time() {
        let telemetry = Telemetry::FlatDevice(FlatDeviceTelemetry {
            device_id: "GW-1".to_owned(),
            slave_id: "2".to_owned(),
            reg_add: "3".to_owned(),
            value: json!(550),
            date: "2024-03-01".to_owned(),
            time: "10:15:00".to_owned(),
        });
        let sensor = ResolvedSensor {
            sensor_id: "2".to_owned(),
            reg_add: Some("3".to_owned()),
        };

        let reading = reading_for(&telemetry, sensor, 550.0, Utc::now());
        assert_eq!(reading.reg_add.as_deref(), Some("3"));
        assert_eq!(reading.device_time.as_deref(), Some("2024-03-01 10:15:00"));
    }

    #[tokio::test]
    async fn test_write_failure_is_a_store_rejection() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        let reading = NewReading {
            sensor_id: "7".to_owned(),
            device_id: "D1".to_owned(),
            reg_add: None,
            value: 1.0,
            received_at: Utc::now(),
            device_time: None,
        };

        let err = ReadingWriter::new(&store).write(&reading).await.unwrap_err();
        assert!(matches!(err, Rejection::Store { .. }));
        assert!(store.readings().await.is_empty());
    }
}
