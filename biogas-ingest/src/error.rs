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

//! Error taxonomy for the ingest pipeline.
//!
//! Every per-message failure ends up as a [`Rejection`]. Rejections never cross
//! the transport boundary as panics; the caller decides whether to log and
//! continue, dead-letter, or stop.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failures while extracting routing identity from a topic string.
#[derive(Error, Debug)]
pub enum TopicError {
    #[error("topic '{topic}' has {found} segments, expected at least {required}")]
    TooFewSegments {
        topic: String,
        found: usize,
        required: usize,
    },
    #[error("topic '{topic}' has an empty {segment} segment")]
    EmptySegment {
        topic: String,
        segment: &'static str,
    },
}

/// Failures while decoding a message body.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("payload field '{0}' must be a string or a number")]
    InvalidField(&'static str),
}

/// Enumeration of errors for operations against the relational store.
/// Errors can originate from sqlx and are wrapped to provide the failing command.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {0}")]
    Connection(sqlx::Error),
    #[error("{command} query failed with: {error}")]
    Query {
        command: &'static str,
        error: sqlx::Error,
    },
    #[error("{command} did not complete within {timeout:?}")]
    Timeout {
        command: &'static str,
        timeout: Duration,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Coarse classification of a [`Rejection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionKind {
    /// Unparseable payload, bad topic or non-numeric value. No reading written.
    Malformed,
    /// Unknown sensor type or unregistered slave/register pair.
    UnknownIdentity,
    /// Connectivity, constraint or timeout failure on a store call.
    Store,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::Malformed => "malformed",
            RejectionKind::UnknownIdentity => "unknown-identity",
            RejectionKind::Store => "store",
        }
    }
}

impl std::str::FromStr for RejectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "malformed" => Ok(RejectionKind::Malformed),
            "unknown-identity" => Ok(RejectionKind::UnknownIdentity),
            "store" => Ok(RejectionKind::Store),
            other => Err(format!("{other} is not a valid rejection kind")),
        }
    }
}

/// Reason a single message was dropped.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error("malformed topic: {0}")]
    Topic(#[from] TopicError),
    #[error("malformed payload: {0}")]
    Payload(#[from] PayloadError),
    #[error("value '{raw}' from device '{device_id}' is not numeric")]
    InvalidValue { device_id: String, raw: String },
    #[error("no sensor type in topic for device '{device_id}'")]
    MissingSensorType { device_id: String },
    #[error("unknown sensor type '{sensor_type}' for device '{device_id}'")]
    UnknownSensorType {
        device_id: String,
        sensor_type: String,
    },
    #[error("no sensor parameters for device '{device_id}'")]
    NoSensorParameters { device_id: String },
    #[error("unmatched slave/register pair ({slave_id}, {reg_add}) for device '{device_id}'")]
    UnmatchedChannel {
        device_id: String,
        slave_id: String,
        reg_add: String,
    },
    #[error("store failure for device '{device_id}': {error}")]
    Store {
        device_id: String,
        error: StoreError,
    },
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::Topic(_) | Rejection::Payload(_) | Rejection::InvalidValue { .. } => {
                RejectionKind::Malformed
            }
            Rejection::MissingSensorType { .. }
            | Rejection::UnknownSensorType { .. }
            | Rejection::NoSensorParameters { .. }
            | Rejection::UnmatchedChannel { .. } => RejectionKind::UnknownIdentity,
            Rejection::Store { .. } => RejectionKind::Store,
        }
    }

    /// Device the message claimed to come from, when decoding got that far.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Rejection::Topic(_) | Rejection::Payload(_) => None,
            Rejection::InvalidValue { device_id, .. }
            | Rejection::MissingSensorType { device_id }
            | Rejection::UnknownSensorType { device_id, .. }
            | Rejection::NoSensorParameters { device_id }
            | Rejection::UnmatchedChannel { device_id, .. }
            | Rejection::Store { device_id, .. } => Some(device_id),
        }
    }

    pub(crate) fn store(device_id: &str) -> impl Fn(StoreError) -> Rejection + '_ {
        move |error| Rejection::Store {
            device_id: device_id.to_owned(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let topic = Rejection::from(TopicError::TooFewSegments {
            topic: "/bio".into(),
            found: 2,
            required: 4,
        });
        assert_eq!(topic.kind(), RejectionKind::Malformed);
        assert_eq!(topic.device_id(), None);

        let unknown = Rejection::UnknownSensorType {
            device_id: "D1".into(),
            sensor_type: "ph".into(),
        };
        assert_eq!(unknown.kind(), RejectionKind::UnknownIdentity);
        assert_eq!(unknown.device_id(), Some("D1"));

        let store = Rejection::store("D2")(StoreError::Unavailable("down".into()));
        assert_eq!(store.kind(), RejectionKind::Store);
        assert_eq!(store.device_id(), Some("D2"));
    }

    #[test]
    fn test_rejection_kind_from_str() {
        assert_eq!("store".parse::<RejectionKind>().unwrap(), RejectionKind::Store);
        assert_eq!(
            " unknown-identity".parse::<RejectionKind>().unwrap(),
            RejectionKind::UnknownIdentity
        );
        assert!("fatal".parse::<RejectionKind>().is_err());
    }
}
