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

use std::env;
use std::time::Duration;

use biogas_ingest::{FailurePolicy, PipelineVariant, ScaleTable};

/// Process configuration read from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub broker_host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub variant: PipelineVariant,
    pub database_url: String,
    pub db_max_connections: u32,
    pub store_timeout: Duration,
    pub failure_policy: FailurePolicy,
    pub scale_table: ScaleTable,
    pub dead_letter_topic: Option<String>,
}

/// Split `MQTT_BROKER_URL` into host and optional port.
///
/// Accepts `mqtt://host[:port][/]`, `tcp://host[:port]` or a bare host.
/// TLS and websocket schemes are refused since the client connects over plain TCP.
fn broker_address(url: &str) -> Result<(String, Option<u16>), String> {
    let rest = match url.split_once("://") {
        Some(("mqtt" | "tcp", rest)) => rest,
        Some((scheme, _)) => {
            return Err(format!("Unsupported MQTT_BROKER_URL scheme '{scheme}'"));
        }
        None => url,
    };
    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("Invalid port in MQTT_BROKER_URL '{url}'"))?;
            (host, Some(port))
        }
        None => (authority, None),
    };
    if host.is_empty() {
        return Err(format!("MQTT_BROKER_URL '{url}' has no host"));
    }
    Ok((host.to_string(), port))
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let broker_url = lookup("MQTT_BROKER_URL").ok_or("MQTT_BROKER_URL not set")?;
        let (broker_host, url_port) = broker_address(&broker_url)?;
        // An explicit MQTT_BROKER_PORT wins over a port inside the URL.
        let port = match lookup("MQTT_BROKER_PORT") {
            Some(port) => port.parse::<u16>().map_err(|_| "Invalid MQTT_BROKER_PORT")?,
            None => url_port.unwrap_or(1883),
        };
        let variant = or("PIPELINE_VARIANT", "apartment").parse::<PipelineVariant>()?;
        let topic = lookup("MQTT_TOPIC").unwrap_or_else(|| variant.default_topic().to_string());

        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                or("DB_USER", "postgres"),
                or("DB_PASSWORD", "postgres"),
                or("DB_HOST", "localhost"),
                or("DB_PORT", "5432"),
                or("DB_NAME", "biogas"),
            ),
        };
        let db_max_connections = or("DB_MAX_CONNECTIONS", "5")
            .parse::<u32>()
            .map_err(|_| "Invalid DB_MAX_CONNECTIONS")?;
        let store_timeout = or("STORE_TIMEOUT_MS", "5000")
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| "Invalid STORE_TIMEOUT_MS")?;
        let failure_policy = or("FAILURE_POLICY", "best-effort").parse::<FailurePolicy>()?;
        let scale_table = match lookup("SCALE_FACTORS") {
            Some(spec) => spec.parse::<ScaleTable>()?,
            None => ScaleTable::default(),
        };

        Ok(GatewayConfig {
            broker_host,
            port,
            topic,
            client_id: lookup("MQTT_CLIENT_ID"),
            username: lookup("MQTT_USERNAME"),
            password: lookup("MQTT_PASSWORD"),
            variant,
            database_url,
            db_max_connections,
            store_timeout,
            failure_policy,
            scale_table,
            dead_letter_topic: lookup("DEAD_LETTER_TOPIC").filter(|t| !t.is_empty()),
        })
    }
}
