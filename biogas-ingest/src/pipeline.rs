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

//! Per-message normalization: topic → payload → identity → value → reading.

use std::sync::Arc;

use chrono::Utc;

use crate::config::PipelineConfig;
use crate::error::Rejection;
use crate::payload;
use crate::resolver::IdentityResolver;
use crate::store::{NewReading, TelemetryStore, TimedStore};
use crate::transform;
use crate::writer::{self, ReadingWriter};

/// Outcome of a message that produced a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub reading: NewReading,
}

/// Normalization pipeline for one deployment variant.
///
/// The store is injected so tests can run against
/// [`MemoryStore`](crate::store::MemoryStore). Every store call is bounded by
/// the configured timeout.
pub struct Pipeline {
    config: PipelineConfig,
    store: TimedStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn TelemetryStore>) -> Self {
        let store = TimedStore::new(store, config.store_timeout);
        Self { config, store }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one delivered message.
    ///
    /// Topic and payload are validated before any store access. Registry writes
    /// made before a later rejection are kept; they are idempotent.
    pub async fn process(&self, topic: &str, payload: &[u8]) -> Result<Accepted, Rejection> {
        let route = self.config.variant.route(topic)?;
        let telemetry = payload::decode(&self.config.variant, payload)?;

        let sensor = IdentityResolver::new(&self.store)
            .resolve(&route, &telemetry)
            .await?;

        let raw = transform::numeric_value(telemetry.device_id(), telemetry.raw_value())?;
        let value = self.config.scale_table.apply(&sensor, raw);

        let reading = writer::reading_for(&telemetry, sensor, value, Utc::now());
        ReadingWriter::new(&self.store).write(&reading).await?;

        Ok(Accepted { reading })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::FailurePolicy;
    use crate::error::{RejectionKind, StoreError};
    use crate::store::MemoryStore;
    use crate::topic::{PipelineVariant, TopicLayout};

    const TEMP_PAYLOAD: &[u8] = br#"{"mac_id":"D1","description":"desc","value":21.5}"#;

    fn apartment_pipeline(store: Arc<MemoryStore>) -> Pipeline {
        let config = PipelineConfig::builder(PipelineVariant::Apartment(TopicLayout::default()))
            .build();
        Pipeline::new(config, store)
    }

    fn flat_pipeline(store: Arc<MemoryStore>) -> Pipeline {
        Pipeline::new(
            PipelineConfig::builder(PipelineVariant::FlatDevice).build(),
            store,
        )
    }

    fn flat_payload(reg_add: &str) -> Vec<u8> {
        format!(
            r#"{{"ID":"GW-1","SL_ID":"2","RegAd":"{reg_add}","D1":550,"DATE":"2024-03-01","TIME":"10:15:00"}}"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_apartment_message_is_stored() {
        let store = Arc::new(MemoryStore::new().with_sensor_type("temp", 7));
        let pipeline = apartment_pipeline(store.clone());

        let before = Utc::now();
        let accepted = pipeline.process("/bio/A12/temp", TEMP_PAYLOAD).await.unwrap();

        let readings = store.readings().await;
        assert_eq!(readings.len(), 1);
        let reading = &readings[0];
        assert_eq!(reading, &accepted.reading);
        assert_eq!(reading.sensor_id, "7");
        assert_eq!(reading.device_id, "D1");
        assert_eq!(reading.value, 21.5);
        assert_eq!(reading.device_time, None);
        assert!(reading.received_at >= before);

        assert_eq!(store.apartments(), vec!["A12".to_string()]);
        assert_eq!(store.device_count(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_appends_reading_only() {
        let store = Arc::new(MemoryStore::new().with_sensor_type("temp", 7));
        let pipeline = apartment_pipeline(store.clone());

        pipeline.process("/bio/A12/temp", TEMP_PAYLOAD).await.unwrap();
        pipeline.process("/bio/A12/temp", TEMP_PAYLOAD).await.unwrap();

        assert_eq!(store.apartments().len(), 1);
        assert_eq!(store.device_count(), 1);
        assert_eq!(store.readings().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_sensor_type_writes_nothing() {
        let store = Arc::new(MemoryStore::new().with_sensor_type("temp", 7));
        let pipeline = apartment_pipeline(store.clone());

        let err = pipeline
            .process("/bio/A12/humidity", TEMP_PAYLOAD)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), RejectionKind::UnknownIdentity);
        assert!(store.readings().await.is_empty());
        assert_eq!(store.sensor_type_count(), 1);
    }

    #[tokio::test]
    async fn test_short_topic_touches_no_store() {
        let store = Arc::new(MemoryStore::new().with_sensor_type("temp", 7));
        let pipeline = apartment_pipeline(store.clone());

        let err = pipeline.process("/bio", TEMP_PAYLOAD).await.unwrap_err();

        assert_eq!(err.kind(), RejectionKind::Malformed);
        assert!(store.apartments().is_empty());
        assert_eq!(store.device_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_touches_no_store() {
        let store = Arc::new(MemoryStore::new().with_sensor_type("temp", 7));
        let pipeline = apartment_pipeline(store.clone());

        let err = pipeline
            .process("/bio/A12/temp", b"{\"mac_id\":")
            .await
            .unwrap_err();

        assert!(matches!(err, Rejection::Payload(_)));
        assert!(store.apartments().is_empty());
        assert_eq!(store.device_count(), 0);
    }

    #[tokio::test]
    async fn test_non_numeric_value_is_rejected_after_registration() {
        let store = Arc::new(MemoryStore::new().with_sensor_type("temp", 7));
        let pipeline = apartment_pipeline(store.clone());

        let err = pipeline
            .process(
                "/bio/A12/temp",
                br#"{"mac_id":"D1","description":"desc","value":"warm"}"#,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Rejection::InvalidValue { .. }));
        assert_eq!(store.device_count(), 1);
        assert!(store.readings().await.is_empty());
    }

    #[tokio::test]
    async fn test_flat_device_scaled_register() {
        let store = Arc::new(
            MemoryStore::new()
                .with_sensor_parameter("GW-1", "2", "2")
                .with_sensor_parameter("GW-1", "2", "3"),
        );
        let pipeline = flat_pipeline(store.clone());

        let scaled = pipeline.process("biogas", &flat_payload("2")).await.unwrap();
        assert_eq!(scaled.reading.value, 5.5);
        assert_eq!(scaled.reading.sensor_id, "2");
        assert_eq!(
            scaled.reading.device_time.as_deref(),
            Some("2024-03-01 10:15:00")
        );

        let raw = pipeline.process("biogas", &flat_payload("3")).await.unwrap();
        assert_eq!(raw.reading.value, 550.0);

        assert_eq!(store.readings().await.len(), 2);
    }

    #[tokio::test]
    async fn test_flat_device_without_parameters_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = flat_pipeline(store.clone());

        let err = pipeline
            .process("biogas", &flat_payload("2"))
            .await
            .unwrap_err();

        assert!(matches!(err, Rejection::NoSensorParameters { .. }));
        assert!(store.readings().await.is_empty());
    }

    #[tokio::test]
    async fn test_custom_scale_table() {
        let store = Arc::new(MemoryStore::new().with_sensor_parameter("GW-1", "2", "3"));
        let config = PipelineConfig::builder(PipelineVariant::FlatDevice)
            .scale_table("2:3/10".parse().unwrap())
            .failure_policy(FailurePolicy::FailFast)
            .build();
        let pipeline = Pipeline::new(config, store);

        let accepted = pipeline.process("biogas", &flat_payload("3")).await.unwrap();
        assert_eq!(accepted.reading.value, 55.0);
    }

    #[tokio::test]
    async fn test_reading_write_failure() {
        let store = Arc::new(MemoryStore::new().with_sensor_parameter("GW-1", "2", "2"));
        let pipeline = flat_pipeline(store.clone());

        // Register the device first, then lose the store.
        pipeline.process("biogas", &flat_payload("2")).await.unwrap();
        store.fail_writes(true);

        let err = pipeline
            .process("biogas", &flat_payload("2"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RejectionKind::Store);
        assert_eq!(err.device_id(), Some("GW-1"));
        assert_eq!(store.readings().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_store_times_out() {
        let store = Arc::new(MemoryStore::new().with_sensor_type("temp", 7));
        store.stall(true);
        let config = PipelineConfig::builder(PipelineVariant::Apartment(TopicLayout::default()))
            .store_timeout(Duration::from_millis(250))
            .build();
        let pipeline = Pipeline::new(config, store.clone());

        let err = pipeline
            .process("/bio/A12/temp", TEMP_PAYLOAD)
            .await
            .unwrap_err();

        match err {
            Rejection::Store {
                error: StoreError::Timeout { command, .. },
                ..
            } => assert_eq!(command, "SELECT apartment"),
            other => panic!("Expected store timeout, got {other:?}"),
        }
        assert!(store.readings().await.is_empty());
    }
}
