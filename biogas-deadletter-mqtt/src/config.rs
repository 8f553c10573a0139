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

//! Connection and publishing settings for the MQTT dead-letter sink.

use std::time::Duration;

use anyhow::{bail, Context};
use rumqttc::{MqttOptions, QoS};
use serde::Deserialize;

/// Where and how dead letters are published.
///
/// Construct with [`DeadLetterConfig::builder`]; `build` checks the topic
/// template so a bad `DEAD_LETTER_TOPIC` fails at startup instead of on the
/// first rejected message.
#[derive(Debug, Clone, Deserialize)]
pub struct DeadLetterConfig {
    pub id: String,
    pub broker_host: String,
    pub port: u16,
    /// Handlebars template over `kind`, `device_id` and `source_topic`,
    /// e.g. `biogas/deadletter/{{kind}}`.
    pub topic: String,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    /// MQTT QoS level, 0 to 2.
    pub qos_level: u8,
    pub retain: bool,
    /// Requests the client may buffer before `send` starts failing.
    pub queue_capacity: usize,
}

impl DeadLetterConfig {
    pub fn builder(
        id: impl Into<String>,
        broker_host: impl Into<String>,
        topic: impl Into<String>,
    ) -> DeadLetterConfigBuilder {
        let id = id.into();
        DeadLetterConfigBuilder {
            config: DeadLetterConfig {
                client_id: format!("biogas-deadletter-{id}"),
                id,
                broker_host: broker_host.into(),
                port: 1883,
                topic: topic.into(),
                credentials: None,
                qos_level: 1,
                retain: false,
                queue_capacity: 100,
            },
        }
    }

    pub fn qos(&self) -> QoS {
        match self.qos_level {
            0 => QoS::AtMostOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtLeastOnce,
        }
    }

    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker_host, self.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some((user, pass)) = &self.credentials {
            options.set_credentials(user, pass);
        }
        options
    }
}

pub struct DeadLetterConfigBuilder {
    config: DeadLetterConfig,
}

impl DeadLetterConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn qos_level(mut self, level: u8) -> Self {
        self.config.qos_level = level;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.config.retain = retain;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> anyhow::Result<DeadLetterConfig> {
        let config = self.config;
        if config.topic.trim().is_empty() {
            bail!("[{}] dead-letter topic is empty", config.id);
        }
        // Publish topics may not carry subscription wildcards.
        if config.topic.contains(['+', '#']) {
            bail!(
                "[{}] dead-letter topic '{}' contains a wildcard",
                config.id,
                config.topic
            );
        }
        handlebars::Template::compile(&config.topic)
            .with_context(|| format!("[{}] invalid dead-letter topic template", config.id))?;
        if config.qos_level > 2 {
            bail!("[{}] QoS level {} is out of range", config.id, config.qos_level);
        }
        if config.queue_capacity == 0 {
            bail!("[{}] queue capacity must be positive", config.id);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = DeadLetterConfig::builder("dlq", "broker.local", "biogas/deadletter/{{kind}}")
            .build()
            .unwrap();
        assert_eq!(config.client_id, "biogas-deadletter-dlq");
        assert_eq!(config.port, 1883);
        assert_eq!(config.qos(), QoS::AtLeastOnce);
        assert!(!config.retain);
        assert_eq!(config.mqtt_options().broker_address(), ("broker.local".to_owned(), 1883));
    }

    #[test]
    fn test_rejects_bad_topics() {
        for topic in ["", "dlq/#", "dlq/+/{{kind}}", "dlq/{{#if}}"] {
            assert!(
                DeadLetterConfig::builder("dlq", "broker.local", topic).build().is_err(),
                "topic {topic:?} was accepted"
            );
        }
    }

    #[test]
    fn test_rejects_bad_publish_settings() {
        let builder = || DeadLetterConfig::builder("dlq", "broker.local", "dlq/{{kind}}");
        assert!(builder().qos_level(3).build().is_err());
        assert!(builder().queue_capacity(0).build().is_err());
        assert_eq!(builder().qos_level(0).build().unwrap().qos(), QoS::AtMostOnce);
    }
}
