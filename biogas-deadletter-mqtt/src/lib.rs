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

//! MQTT dead-letter sink for the biogas ingest pipeline.
//!
//! Republishes messages the pipeline could not persist, wrapped with the
//! rejection reason, to a topic rendered from a Handlebars template.
//!
//! # Example
//!
//! ```ignore
//! use biogas_deadletter_mqtt::{DeadLetterConfig, MqttDeadLetter};
//!
//! let config = DeadLetterConfig::builder("dlq", "broker.local", "biogas/deadletter/{{kind}}")
//!     .port(1883)
//!     .build()?;
//!
//! let sink = Arc::new(MqttDeadLetter::new(config));
//! sink.start().await?;
//! // Pass `sink` to MqttSource::with_dead_letter
//! ```

pub mod config;
pub mod publisher;
pub mod sink;

pub use config::{DeadLetterConfig, DeadLetterConfigBuilder};
pub use sink::MqttDeadLetter;
