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

//! MQTT source for the biogas ingest pipeline.
//!
//! Subscribes to a gateway topic and feeds every publish through
//! [`biogas_ingest::Pipeline`]. Rejected messages are logged and, optionally,
//! forwarded to a [`biogas_ingest::DeadLetterSink`].
//!
//! # Example
//!
//! ```ignore
//! use biogas_source_mqtt::{MqttSource, MqttSourceConfig};
//!
//! let config = MqttSourceConfig::builder("biogas-src", "broker.local", "/bio/+/+")
//!     .port(1883)
//!     .username("biogas")
//!     .password("secret")
//!     .build();
//!
//! let source = MqttSource::new(config, pipeline);
//! source.start().await?;
//! ```

pub mod config;
pub mod handler;
pub mod source;

pub use config::{MqttSourceConfig, MqttSourceConfigBuilder};
pub use handler::{Flow, MessageHandler, SourceStats, StatsSnapshot};
pub use source::{MqttSource, SourceStatus};
