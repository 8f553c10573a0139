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

//! Configuration types for the MQTT telemetry source.

use biogas_ingest::RejectionKind;
use serde::Deserialize;

/// Configuration for the MQTT source.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSourceConfig {
    /// Unique source identifier, used as the log prefix.
    pub id: String,
    /// MQTT broker hostname or IP.
    pub broker_host: String,
    /// MQTT broker port (default: 1883).
    pub port: u16,
    /// MQTT topic filter to subscribe to (e.g. `/bio/+/+` or `biogas`).
    pub topic: String,
    /// MQTT client ID. Defaults to `"biogas-source-{id}"`.
    pub client_id: String,
    /// Optional MQTT username for authentication.
    pub username: Option<String>,
    /// Optional MQTT password for authentication.
    pub password: Option<String>,
    /// Keep-alive interval in seconds (default: 30).
    pub keep_alive_secs: u64,
    /// Rejection kinds forwarded to the dead-letter sink, if one is attached
    /// (default: store failures only).
    pub dead_letter_kinds: Vec<RejectionKind>,
}

impl MqttSourceConfig {
    /// Start building a new config with the required fields.
    pub fn builder(
        id: impl Into<String>,
        broker_host: impl Into<String>,
        topic: impl Into<String>,
    ) -> MqttSourceConfigBuilder {
        let id = id.into();
        MqttSourceConfigBuilder {
            id: id.clone(),
            broker_host: broker_host.into(),
            topic: topic.into(),
            port: 1883,
            client_id: format!("biogas-source-{id}"),
            username: None,
            password: None,
            keep_alive_secs: 30,
            dead_letter_kinds: vec![RejectionKind::Store],
        }
    }
}

/// Builder for [`MqttSourceConfig`].
pub struct MqttSourceConfigBuilder {
    id: String,
    broker_host: String,
    topic: String,
    port: u16,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    keep_alive_secs: u64,
    dead_letter_kinds: Vec<RejectionKind>,
}

impl MqttSourceConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub fn dead_letter_kinds(mut self, kinds: Vec<RejectionKind>) -> Self {
        self.dead_letter_kinds = kinds;
        self
    }

    /// Build the config.
    pub fn build(self) -> MqttSourceConfig {
        MqttSourceConfig {
            id: self.id,
            broker_host: self.broker_host,
            port: self.port,
            topic: self.topic,
            client_id: self.client_id,
            username: self.username,
            password: self.password,
            keep_alive_secs: self.keep_alive_secs,
            dead_letter_kinds: self.dead_letter_kinds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = MqttSourceConfig::builder("biogas-src", "broker.local", "biogas").build();
        assert_eq!(config.port, 1883);
        assert_eq!(config.client_id, "biogas-source-biogas-src");
        assert_eq!(config.dead_letter_kinds, vec![RejectionKind::Store]);
        assert!(config.username.is_none());
    }
}
