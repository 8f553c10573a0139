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

//! Per-message handling: run the pipeline, log, dead-letter, apply the failure policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};

use biogas_ingest::{
    DeadLetter, DeadLetterSink, FailurePolicy, Pipeline, Rejection, RejectionKind,
};

/// Upper bound on one dead-letter hand-off; a stuck sink must not stall ingest.
const DEAD_LETTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the consumer keeps going after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

/// Running message counters for one source.
#[derive(Debug, Default)]
pub struct SourceStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub dead_lettered: u64,
}

impl SourceStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

pub struct MessageHandler {
    source_id: String,
    pipeline: Arc<Pipeline>,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
    dead_letter_kinds: Vec<RejectionKind>,
    stats: Arc<SourceStats>,
}

impl MessageHandler {
    pub fn new(
        source_id: impl Into<String>,
        pipeline: Arc<Pipeline>,
        dead_letter: Option<Arc<dyn DeadLetterSink>>,
        dead_letter_kinds: Vec<RejectionKind>,
        stats: Arc<SourceStats>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            pipeline,
            dead_letter,
            dead_letter_kinds,
            stats,
        }
    }

    /// Process one delivered message. Never fails; rejections are logged here.
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Flow {
        let source_id = &self.source_id;
        match self.pipeline.process(topic, payload).await {
            Ok(accepted) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                let reading = &accepted.reading;
                debug!(
                    "[{source_id}] Stored reading device={} sensor={} value={}",
                    reading.device_id, reading.sensor_id, reading.value
                );
                Flow::Continue
            }
            Err(rejection) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                self.log_rejection(topic, &rejection);
                self.forward(topic, payload, &rejection).await;

                let policy = self.pipeline.config().failure_policy;
                if policy == FailurePolicy::FailFast && rejection.kind() == RejectionKind::Store {
                    error!("[{source_id}] Halting consumer after store failure (fail-fast)");
                    Flow::Halt
                } else {
                    Flow::Continue
                }
            }
        }
    }

    fn log_rejection(&self, topic: &str, rejection: &Rejection) {
        let source_id = &self.source_id;
        match rejection.kind() {
            RejectionKind::Malformed => {
                warn!("[{source_id}] Dropped malformed message on topic '{topic}': {rejection}");
            }
            RejectionKind::UnknownIdentity => {
                warn!(
                    "[{source_id}] Dropped message on topic '{topic}' with unknown identity: \
                     {rejection}"
                );
            }
            RejectionKind::Store => {
                error!("[{source_id}] Lost message on topic '{topic}': {rejection}");
            }
        }
    }

    async fn forward(&self, topic: &str, payload: &[u8], rejection: &Rejection) {
        let Some(sink) = &self.dead_letter else {
            return;
        };
        if !self.dead_letter_kinds.contains(&rejection.kind()) {
            return;
        }

        let letter = DeadLetter::new(topic, payload, rejection);
        match tokio::time::timeout(DEAD_LETTER_TIMEOUT, sink.send(&letter)).await {
            Ok(Ok(())) => {
                self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                error!(
                    "[{}] Failed to dead-letter message {}: {e}",
                    self.source_id, letter.id
                );
            }
            Err(_) => {
                error!(
                    "[{}] Dead-letter sink did not accept message {} within {:?}",
                    self.source_id, letter.id, DEAD_LETTER_TIMEOUT
                );
            }
        }
    }
}
