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

//! MQTT implementation of [`DeadLetterSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use handlebars::Handlebars;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, Incoming};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use biogas_ingest::{DeadLetter, DeadLetterSink};

use crate::config::DeadLetterConfig;
use crate::publisher;

/// Publishes each dead letter as JSON to a templated MQTT topic.
///
/// Sending never waits on the broker: while the connection is down, or while
/// the client's request queue is full, [`send`](DeadLetterSink::send) fails
/// immediately so the consumer is never held up by its dead-letter path.
pub struct MqttDeadLetter {
    config: DeadLetterConfig,
    /// MQTT client handle (set on start, cleared on stop).
    client: Arc<RwLock<Option<AsyncClient>>>,
    /// True between a ConnAck and the next connection error.
    connected: Arc<AtomicBool>,
    /// Handlebars registry for rendering the topic template.
    registry: Arc<Handlebars<'static>>,
    eventloop_task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttDeadLetter {
    pub fn new(config: DeadLetterConfig) -> Self {
        Self {
            config,
            client: Arc::new(RwLock::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            registry: Arc::new(publisher::topic_registry()),
            eventloop_task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub async fn start(&self) -> Result<()> {
        info!(
            "[{}] Starting MQTT dead-letter sink (broker={}:{}, topic={})",
            self.config.id, self.config.broker_host, self.config.port, self.config.topic
        );

        let (client, mut eventloop) =
            AsyncClient::new(self.config.mqtt_options(), self.config.queue_capacity);
        *self.client.write().await = Some(client);

        // Spawn the MQTT eventloop driver (keeps connection alive).
        let sink_id = self.config.id.clone();
        let connected = self.connected.clone();
        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("[{sink_id}] Connected to dead-letter broker");
                        connected.store(true, Ordering::Release);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if connected.swap(false, Ordering::AcqRel) {
                            warn!("[{sink_id}] Lost dead-letter broker connection: {e}");
                        } else {
                            debug!("[{sink_id}] Dead-letter broker unreachable: {e}");
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        *self.eventloop_task.lock().await = Some(handle);

        info!("[{}] MQTT dead-letter sink started", self.config.id);
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        // The request queue may be full while the broker is unreachable.
        if let Some(client) = self.client.write().await.take() {
            let _ = client.try_disconnect();
        }
        if let Some(handle) = self.eventloop_task.lock().await.take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::Release);
        info!("[{}] MQTT dead-letter sink stopped", self.config.id);
        Ok(())
    }
}

#[async_trait]
impl DeadLetterSink for MqttDeadLetter {
    async fn send(&self, letter: &DeadLetter) -> Result<()> {
        let topic = publisher::render_topic(&self.registry, &self.config.topic, letter)?;
        let payload = publisher::letter_to_payload(letter)?;

        let client = self.client.read().await.clone().ok_or_else(|| {
            anyhow::anyhow!("[{}] dead-letter sink is not started", self.config.id)
        })?;
        if !self.connected.load(Ordering::Acquire) {
            anyhow::bail!("[{}] dead-letter broker is not connected", self.config.id);
        }
        client
            .try_publish(topic, self.config.qos(), self.config.retain, payload)
            .map_err(|e| anyhow::anyhow!("MQTT publish failed: {e}"))?;
        Ok(())
    }
}
