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

//! Decoding of raw MQTT payloads into [`Telemetry`] records.
//!
//! Only shape is checked here: the body must be a JSON object carrying the
//! variant's required fields. Whether the value is numeric is decided later by
//! [`crate::transform`].

use serde_json::{Map, Value};

use crate::error::PayloadError;
use crate::topic::PipelineVariant;

/// Field names used on the wire.
pub mod fields {
    pub const MAC_ID: &str = "mac_id";
    pub const DESCRIPTION: &str = "description";
    pub const VALUE: &str = "value";

    pub const DEVICE_ID: &str = "ID";
    pub const SLAVE_ID: &str = "SL_ID";
    pub const REG_ADD: &str = "RegAd";
    pub const RAW_VALUE: &str = "D1";
    pub const DATE: &str = "DATE";
    pub const TIME: &str = "TIME";
}

/// A reading published by an apartment-scoped gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ApartmentTelemetry {
    pub device_id: String,
    pub description: Option<String>,
    pub value: Value,
}

/// A reading published by a flat-device gateway, addressed by slave/register.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatDeviceTelemetry {
    pub device_id: String,
    pub slave_id: String,
    pub reg_add: String,
    pub value: Value,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Apartment(ApartmentTelemetry),
    FlatDevice(FlatDeviceTelemetry),
}

impl Telemetry {
    pub fn device_id(&self) -> &str {
        match self {
            Telemetry::Apartment(t) => &t.device_id,
            Telemetry::FlatDevice(t) => &t.device_id,
        }
    }

    /// The undecoded reading, before numeric coercion and scaling.
    pub fn raw_value(&self) -> &Value {
        match self {
            Telemetry::Apartment(t) => &t.value,
            Telemetry::FlatDevice(t) => &t.value,
        }
    }
}

/// Decode `payload` according to the field conventions of `variant`.
pub fn decode(variant: &PipelineVariant, payload: &[u8]) -> Result<Telemetry, PayloadError> {
    let json: Value = serde_json::from_slice(payload)?;
    let Value::Object(map) = json else {
        return Err(PayloadError::NotAnObject);
    };

    let telemetry = match variant {
        PipelineVariant::Apartment(_) => Telemetry::Apartment(ApartmentTelemetry {
            device_id: token(&map, fields::MAC_ID)?,
            description: optional_text(&map, fields::DESCRIPTION)?,
            value: required(&map, fields::VALUE)?.clone(),
        }),
        PipelineVariant::FlatDevice => Telemetry::FlatDevice(FlatDeviceTelemetry {
            device_id: token(&map, fields::DEVICE_ID)?,
            slave_id: token(&map, fields::SLAVE_ID)?,
            reg_add: token(&map, fields::REG_ADD)?,
            value: required(&map, fields::RAW_VALUE)?.clone(),
            date: text(&map, fields::DATE)?,
            time: text(&map, fields::TIME)?,
        }),
    };

    Ok(telemetry)
}

fn required<'a>(
    map: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, PayloadError> {
    map.get(field).ok_or(PayloadError::MissingField(field))
}

/// Strings are carried verbatim and numbers as their JSON text, so `"02"` and
/// `2` stay distinct identifiers.
fn as_text(value: &Value, field: &'static str) -> Result<Option<String>, PayloadError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(PayloadError::InvalidField(field)),
    }
}

fn text(map: &Map<String, Value>, field: &'static str) -> Result<String, PayloadError> {
    as_text(required(map, field)?, field)?.ok_or(PayloadError::MissingField(field))
}

/// Like [`text`] but an empty identifier counts as missing.
fn token(map: &Map<String, Value>, field: &'static str) -> Result<String, PayloadError> {
    let value = text(map, field)?;
    if value.is_empty() {
        return Err(PayloadError::MissingField(field));
    }
    Ok(value)
}

fn optional_text(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, PayloadError> {
    as_text(required(map, field)?, field)
}
