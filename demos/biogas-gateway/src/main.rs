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

mod config;

use std::sync::Arc;

use anyhow::Result;
use biogas_deadletter_mqtt::{DeadLetterConfig, MqttDeadLetter};
use biogas_ingest::{PgStore, Pipeline, PipelineConfig};
use biogas_source_mqtt::{MqttSource, MqttSourceConfig, SourceStatus};
use log::{error, info};

use crate::config::GatewayConfig;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = GatewayConfig::from_env().map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    info!(
        "Starting biogas gateway (variant={}, topic={})",
        config.variant.name(),
        config.topic
    );

    // 1. Connect the relational store
    let store = PgStore::connect(&config.database_url, config.db_max_connections).await?;

    // 2. Build the normalization pipeline
    let pipeline_config = PipelineConfig::builder(config.variant.clone())
        .scale_table(config.scale_table.clone())
        .store_timeout(config.store_timeout)
        .failure_policy(config.failure_policy)
        .build();
    let pipeline = Arc::new(Pipeline::new(pipeline_config, Arc::new(store)));

    // 3. Configure the MQTT source
    let mut source_config =
        MqttSourceConfig::builder("biogas-src", &config.broker_host, &config.topic)
            .port(config.port);
    if let Some(client_id) = &config.client_id {
        source_config = source_config.client_id(client_id);
    }
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        source_config = source_config.username(user).password(pass);
    }
    let mut source = MqttSource::new(source_config.build(), pipeline);

    // 4. Optionally attach the dead-letter sink
    let dead_letter = match &config.dead_letter_topic {
        Some(topic) => {
            let mut dlq_config =
                DeadLetterConfig::builder("biogas-dlq", &config.broker_host, topic)
                    .port(config.port);
            if let (Some(user), Some(pass)) = (&config.username, &config.password) {
                dlq_config = dlq_config.credentials(user, pass);
            }
            let sink = Arc::new(MqttDeadLetter::new(dlq_config.build()?));
            sink.start().await?;
            source = source.with_dead_letter(sink.clone());
            Some(sink)
        }
        None => None,
    };

    source.start().await?;

    // Run until ctrl-c or until the fail-fast policy halts the consumer
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received");
        }
        result = source.join() => {
            result?;
        }
    }

    source.stop().await?;
    if let Some(sink) = dead_letter {
        sink.stop().await?;
    }

    let stats = source.stats();
    info!(
        "Processed messages: accepted={}, rejected={}, dead_lettered={}",
        stats.accepted, stats.rejected, stats.dead_lettered
    );

    if source.status().await == SourceStatus::Failed {
        error!("Consumer halted after a store failure");
        anyhow::bail!("consumer halted after a store failure");
    }
    Ok(())
}
