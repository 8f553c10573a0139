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

//! Dead-letter records for messages the pipeline could not persist.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Rejection, RejectionKind};

/// A rejected message together with why it was rejected.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub kind: RejectionKind,
    pub reason: String,
    pub device_id: Option<String>,
    pub source_topic: String,
    /// Original payload, lossily decoded as UTF-8.
    pub payload: String,
    pub rejected_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(source_topic: &str, payload: &[u8], rejection: &Rejection) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: rejection.kind(),
            reason: rejection.to_string(),
            device_id: rejection.device_id().map(str::to_owned),
            source_topic: source_topic.to_owned(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            rejected_at: Utc::now(),
        }
    }
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, letter: &DeadLetter) -> Result<()>;
}
