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

//! MQTT consumer driving the ingest [`Pipeline`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use biogas_ingest::{DeadLetterSink, Pipeline};

use crate::config::MqttSourceConfig;
use crate::handler::{Flow, MessageHandler, SourceStats, StatsSnapshot};

/// Lifecycle state of an [`MqttSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Stopped,
    Running,
    /// Halted by the fail-fast policy.
    Failed,
}

/// Subscribes to a broker topic and hands every publish to the pipeline.
///
/// Messages are processed one at a time in delivery order: the event loop does
/// not poll for the next publish until the current one is stored or rejected.
pub struct MqttSource {
    config: MqttSourceConfig,
    pipeline: Arc<Pipeline>,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
    stats: Arc<SourceStats>,
    status: Arc<RwLock<SourceStatus>>,
    /// MQTT client handle (set on start, cleared on stop).
    client: Arc<RwLock<Option<AsyncClient>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Flips to `true` whenever the event loop exits.
    finished: Arc<watch::Sender<bool>>,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            pipeline,
            dead_letter: None,
            stats: Arc::new(SourceStats::default()),
            status: Arc::new(RwLock::new(SourceStatus::Stopped)),
            client: Arc::new(RwLock::new(None)),
            shutdown_tx: Mutex::new(None),
            task: Mutex::new(None),
            finished: Arc::new(watch::channel(false).0),
        }
    }

    /// Forward rejected messages of the configured kinds to `sink`.
    pub fn with_dead_letter(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub async fn status(&self) -> SourceStatus {
        *self.status.read().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn start(&self) -> Result<()> {
        if *self.status.read().await == SourceStatus::Running {
            warn!("[{}] MQTT source already running", self.config.id);
            return Ok(());
        }

        info!(
            "[{}] Starting MQTT source (broker={}:{}, topic={}, variant={})",
            self.config.id,
            self.config.broker_host,
            self.config.port,
            self.config.topic,
            self.pipeline.config().variant.name()
        );

        // Build MQTT options.
        let mut mqtt_opts = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.port,
        );
        mqtt_opts.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            mqtt_opts.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 100);
        *self.client.write().await = Some(client.clone());

        let handler = MessageHandler::new(
            self.config.id.clone(),
            self.pipeline.clone(),
            self.dead_letter.clone(),
            self.config.dead_letter_kinds.clone(),
            self.stats.clone(),
        );
        let source_id = self.config.id.clone();
        let topic = self.config.topic.clone();
        let status = self.status.clone();
        let finished = self.finished.clone();
        finished.send_replace(false);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        *self.shutdown_tx.lock().await = Some(shutdown_tx);
        *self.status.write().await = SourceStatus::Running;

        let handle = tokio::spawn(async move {
            info!("[{source_id}] MQTT event loop started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("[{source_id}] Shutdown signal received");
                        break;
                    }
                    event = eventloop.poll() => {
                        match event {
                            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                                // Clean sessions drop subscriptions, so (re)subscribe on every connect.
                                match client.subscribe(&topic, QoS::AtLeastOnce).await {
                                    Ok(()) => info!("[{source_id}] Subscribed to topic: {topic}"),
                                    Err(e) => error!("[{source_id}] MQTT subscribe failed: {e}"),
                                }
                            }
                            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                                if handler.handle(&publish.topic, &publish.payload).await == Flow::Halt {
                                    *status.write().await = SourceStatus::Failed;
                                    let _ = client.disconnect().await;
                                    break;
                                }
                            }
                            Ok(_) => {} // Ignore other events (SubAck, PingResp, etc.)
                            Err(e) => {
                                error!("[{source_id}] MQTT connection error: {e}");
                                // rumqttc will auto-reconnect on next poll()
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            }
            finished.send_replace(true);
            info!("[{source_id}] MQTT event loop stopped");
        });

        *self.task.lock().await = Some(handle);
        info!("[{}] MQTT source started", self.config.id);
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        // Disconnect the MQTT client.
        if let Some(client) = self.client.write().await.take() {
            let _ = client.disconnect().await;
        }
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task.lock().await.take() {
            handle.await?;
        }

        let mut status = self.status.write().await;
        if *status == SourceStatus::Running {
            *status = SourceStatus::Stopped;
        }
        info!("[{}] MQTT source stopped", self.config.id);
        Ok(())
    }

    /// Resolves once the event loop has exited, either through [`stop`](Self::stop)
    /// or because the fail-fast policy halted it.
    ///
    /// Never resolves for a source that was not started.
    pub async fn join(&self) -> Result<()> {
        self.finished.subscribe().wait_for(|done| *done).await?;
        Ok(())
    }
}
