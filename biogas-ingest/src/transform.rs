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

//! Numeric coercion and per-channel scale correction.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Rejection;
use crate::resolver::ResolvedSensor;

/// One fixed-point correction: readings from `(sensor_id, reg_add)` are divided
/// by `divisor` before storage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScaleRule {
    pub sensor_id: String,
    pub reg_add: String,
    pub divisor: f64,
}

/// Lookup of `(sensor_id, reg_add) -> divisor`, defaulting to 1.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<ScaleRule>")]
pub struct ScaleTable {
    divisors: HashMap<(String, String), f64>,
}

impl Default for ScaleTable {
    /// Sensor 2 reports register 2 in hundredths.
    fn default() -> Self {
        Self::empty().with_rule("2", "2", 100.0)
    }
}

/// A divisor must be finite and non-zero, otherwise every matching reading
/// would be stored as infinity or NaN.
fn check_divisor(sensor_id: &str, reg_add: &str, divisor: f64) -> Result<f64, String> {
    if divisor == 0.0 || !divisor.is_finite() {
        return Err(format!("scale rule {sensor_id}:{reg_add} has an invalid divisor {divisor}"));
    }
    Ok(divisor)
}

impl TryFrom<Vec<ScaleRule>> for ScaleTable {
    type Error = String;

    fn try_from(rules: Vec<ScaleRule>) -> Result<Self, Self::Error> {
        rules.into_iter().try_fold(Self::empty(), |table, rule| {
            let divisor = check_divisor(&rule.sensor_id, &rule.reg_add, rule.divisor)?;
            Ok(table.with_rule(rule.sensor_id, rule.reg_add, divisor))
        })
    }
}

impl ScaleTable {
    pub fn empty() -> Self {
        Self {
            divisors: HashMap::new(),
        }
    }

    pub fn with_rule(
        mut self,
        sensor_id: impl Into<String>,
        reg_add: impl Into<String>,
        divisor: f64,
    ) -> Self {
        self.divisors.insert((sensor_id.into(), reg_add.into()), divisor);
        self
    }

    pub fn len(&self) -> usize {
        self.divisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.divisors.is_empty()
    }

    /// Readings without a register address are never scaled.
    pub fn divisor(&self, sensor: &ResolvedSensor) -> f64 {
        let Some(reg_add) = &sensor.reg_add else {
            return 1.0;
        };
        self.divisors
            .get(&(sensor.sensor_id.clone(), reg_add.clone()))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn apply(&self, sensor: &ResolvedSensor, raw: f64) -> f64 {
        raw / self.divisor(sensor)
    }
}

/// Parses `sensor:register/divisor` entries separated by commas, e.g. `2:2/100,5:1/10`.
impl FromStr for ScaleTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut table = Self::empty();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (channel, divisor) = entry
                .split_once('/')
                .ok_or_else(|| format!("scale entry '{entry}' is missing '/divisor'"))?;
            let (sensor_id, reg_add) = channel
                .split_once(':')
                .ok_or_else(|| format!("scale entry '{entry}' is missing 'sensor:register'"))?;
            let (sensor_id, reg_add) = (sensor_id.trim(), reg_add.trim());
            let divisor: f64 = divisor
                .trim()
                .parse()
                .map_err(|_| format!("scale entry '{entry}' has an invalid divisor"))?;
            let divisor = check_divisor(sensor_id, reg_add, divisor)?;
            table = table.with_rule(sensor_id, reg_add, divisor);
        }
        Ok(table)
    }
}

/// Coerce the payload's reading to a number. Numeric strings are accepted.
pub fn numeric_value(device_id: &str, raw: &Value) -> Result<f64, Rejection> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(value) if value.is_finite() => Ok(value),
        _ => Err(Rejection::InvalidValue {
            device_id: device_id.to_owned(),
            raw: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel(sensor_id: &str, reg_add: &str) -> ResolvedSensor {
        ResolvedSensor {
            sensor_id: sensor_id.to_owned(),
            reg_add: Some(reg_add.to_owned()),
        }
    }

    #[test]
    fn test_default_table_scales_sensor_2_register_2() {
        let table = ScaleTable::default();
        assert_eq!(table.apply(&channel("2", "2"), 550.0), 5.5);
        assert_eq!(table.apply(&channel("2", "3"), 550.0), 550.0);
        assert_eq!(table.apply(&channel("3", "2"), 550.0), 550.0);
    }

    #[test]
    fn test_unregistered_channel_passes_through() {
        let sensor = ResolvedSensor {
            sensor_id: "2".to_owned(),
            reg_add: None,
        };
        assert_eq!(ScaleTable::default().apply(&sensor, 21.5), 21.5);
    }

    #[test]
    fn test_channels_compare_as_text() {
        let table = ScaleTable::default();
        assert_eq!(table.divisor(&channel("02", "2")), 1.0);
    }

    #[test]
    fn test_parse_table() {
        let table: ScaleTable = "2:2/100, 5:1/10".parse().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.apply(&channel("5", "1"), 42.0), 4.2);

        assert!("".parse::<ScaleTable>().unwrap().is_empty());
        assert!("2:2".parse::<ScaleTable>().is_err());
        assert!("2/100".parse::<ScaleTable>().is_err());
        assert!("2:2/0".parse::<ScaleTable>().is_err());
        assert!("2:2/abc".parse::<ScaleTable>().is_err());
    }

    #[test]
    fn test_deserialize_from_rules() {
        let table: ScaleTable = serde_json::from_value(json!([
            {"sensor_id": "4", "reg_add": "7", "divisor": 1000.0}
        ]))
        .unwrap();
        assert_eq!(table.divisor(&channel("4", "7")), 1000.0);
        assert_eq!(table.divisor(&channel("2", "2")), 1.0);
    }

    #[test]
    fn test_deserialize_rejects_zero_divisor() {
        let err = serde_json::from_value::<ScaleTable>(json!([
            {"sensor_id": "2", "reg_add": "2", "divisor": 0.0}
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("invalid divisor"));
    }

    #[test]
    fn test_numeric_value() {
        assert_eq!(numeric_value("D1", &json!(21.5)).unwrap(), 21.5);
        assert_eq!(numeric_value("D1", &json!(550)).unwrap(), 550.0);
        assert_eq!(numeric_value("D1", &json!(" 12.25 ")).unwrap(), 12.25);

        let err = numeric_value("D1", &json!("warm")).unwrap_err();
        assert!(matches!(err, Rejection::InvalidValue { ref raw, .. } if raw == "\"warm\""));
        assert!(numeric_value("D1", &json!(null)).is_err());
        assert!(numeric_value("D1", &json!("NaN")).is_err());
    }
}
