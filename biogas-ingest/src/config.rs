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

//! Configuration types for the ingest pipeline.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::topic::PipelineVariant;
use crate::transform::ScaleTable;

/// What a consumer does after a store failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log, optionally dead-letter, and move on to the next message.
    #[default]
    BestEffort,
    /// Stop consuming on the first store failure.
    FailFast,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "best-effort" => Ok(FailurePolicy::BestEffort),
            "fail-fast" => Ok(FailurePolicy::FailFast),
            other => Err(format!("{other} is not a valid failure policy")),
        }
    }
}

/// Configuration for one pipeline instance.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Topic/payload convention of the deployment being consumed.
    pub variant: PipelineVariant,
    /// Fixed-point corrections applied before storage (default: sensor 2, register 2, /100).
    #[serde(default)]
    pub scale_table: ScaleTable,
    /// Upper bound on each store round-trip (default: 5s).
    #[serde(default = "default_store_timeout")]
    pub store_timeout: Duration,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(5)
}

impl PipelineConfig {
    /// Start building a config for the given variant.
    pub fn builder(variant: PipelineVariant) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            variant,
            scale_table: ScaleTable::default(),
            store_timeout: default_store_timeout(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    variant: PipelineVariant,
    scale_table: ScaleTable,
    store_timeout: Duration,
    failure_policy: FailurePolicy,
}

impl PipelineConfigBuilder {
    pub fn scale_table(mut self, table: ScaleTable) -> Self {
        self.scale_table = table;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Build the config.
    pub fn build(self) -> PipelineConfig {
        PipelineConfig {
            variant: self.variant,
            scale_table: self.scale_table,
            store_timeout: self.store_timeout,
            failure_policy: self.failure_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::TopicLayout;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let config = PipelineConfig::builder(PipelineVariant::FlatDevice).build();
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(config.scale_table, ScaleTable::default());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: PipelineConfig = serde_json::from_value(json!({
            "variant": {"kind": "apartment", "apartment_segment": 1, "sensor_type_segment": 2},
            "failure_policy": "fail-fast"
        }))
        .unwrap();

        assert_eq!(
            config.variant,
            PipelineVariant::Apartment(TopicLayout {
                delimiter: '/',
                apartment_segment: 1,
                sensor_type_segment: 2,
            })
        );
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.scale_table, ScaleTable::default());
    }

    #[test]
    fn test_deserialize_rejects_zero_scale_divisor() {
        let result = serde_json::from_value::<PipelineConfig>(json!({
            "variant": {"kind": "flat-device"},
            "scale_table": [{"sensor_id": "2", "reg_add": "2", "divisor": 0.0}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!(
            "fail-fast".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::FailFast
        );
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
