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

//! Topic parsing and the two deployment variants.

use std::str::FromStr;

use serde::Deserialize;

use crate::error::TopicError;

/// Which deployment convention inbound messages follow.
///
/// The two variants come from separate sensor deployments and resolve identity
/// differently, so they are kept apart rather than merged into one rule set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PipelineVariant {
    /// Apartment and sensor type come from the topic (`/bio/<apartment>/<type>`),
    /// the payload carries `mac_id`, `description` and `value`.
    Apartment(TopicLayout),
    /// Topic carries no identity. The payload addresses a Modbus-style
    /// slave/register channel on the device.
    FlatDevice,
}

impl PipelineVariant {
    /// Extract routing identity from `topic` according to this variant.
    pub fn route(&self, topic: &str) -> Result<TopicRoute, TopicError> {
        match self {
            PipelineVariant::Apartment(layout) => layout.parse(topic),
            PipelineVariant::FlatDevice => Ok(TopicRoute::default()),
        }
    }

    /// Subscription filter used when none is configured explicitly.
    pub fn default_topic(&self) -> &'static str {
        match self {
            PipelineVariant::Apartment(_) => "/bio/+/+",
            PipelineVariant::FlatDevice => "biogas",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineVariant::Apartment(_) => "apartment",
            PipelineVariant::FlatDevice => "flat-device",
        }
    }
}

impl FromStr for PipelineVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "apartment" => Ok(PipelineVariant::Apartment(TopicLayout::default())),
            "flat-device" => Ok(PipelineVariant::FlatDevice),
            other => Err(format!("{other} is not a valid pipeline variant")),
        }
    }
}

/// Positions of the identity-bearing segments within a topic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TopicLayout {
    pub delimiter: char,
    pub apartment_segment: usize,
    pub sensor_type_segment: usize,
}

impl Default for TopicLayout {
    /// `/bio/A12/temp` splits into `["", "bio", "A12", "temp"]`.
    fn default() -> Self {
        Self {
            delimiter: '/',
            apartment_segment: 2,
            sensor_type_segment: 3,
        }
    }
}

impl TopicLayout {
    fn required_segments(&self) -> usize {
        self.apartment_segment.max(self.sensor_type_segment) + 1
    }

    pub fn parse(&self, topic: &str) -> Result<TopicRoute, TopicError> {
        let segments: Vec<&str> = topic.split(self.delimiter).collect();
        let required = self.required_segments();
        if segments.len() < required {
            return Err(TopicError::TooFewSegments {
                topic: topic.to_owned(),
                found: segments.len(),
                required,
            });
        }

        let segment = |index: usize, name: &'static str| {
            let value = segments[index];
            if value.is_empty() {
                Err(TopicError::EmptySegment {
                    topic: topic.to_owned(),
                    segment: name,
                })
            } else {
                Ok(value.to_owned())
            }
        };

        Ok(TopicRoute {
            apartment_id: Some(segment(self.apartment_segment, "apartment")?),
            sensor_type: Some(segment(self.sensor_type_segment, "sensor type")?),
        })
    }
}

/// Routing identity carried by a topic. Either part may be absent depending on
/// the variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicRoute {
    pub apartment_id: Option<String>,
    pub sensor_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apartment_topic() {
        let route = TopicLayout::default().parse("/bio/A12/temp").unwrap();
        assert_eq!(route.apartment_id.as_deref(), Some("A12"));
        assert_eq!(route.sensor_type.as_deref(), Some("temp"));
    }

    #[test]
    fn test_extra_segments_ignored() {
        let route = TopicLayout::default().parse("/bio/A12/temp/raw").unwrap();
        assert_eq!(route.sensor_type.as_deref(), Some("temp"));
    }

    #[test]
    fn test_too_few_segments() {
        let err = TopicLayout::default().parse("/bio/A12").unwrap_err();
        match err {
            TopicError::TooFewSegments { found, required, .. } => {
                assert_eq!(found, 3);
                assert_eq!(required, 4);
            }
            other => panic!("Expected TooFewSegments, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_segment() {
        let err = TopicLayout::default().parse("/bio//temp").unwrap_err();
        assert!(matches!(
            err,
            TopicError::EmptySegment {
                segment: "apartment",
                ..
            }
        ));
    }

    #[test]
    fn test_flat_device_has_no_route() {
        let route = PipelineVariant::FlatDevice.route("biogas").unwrap();
        assert_eq!(route, TopicRoute::default());
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!(
            "apartment".parse::<PipelineVariant>().unwrap(),
            PipelineVariant::Apartment(TopicLayout::default())
        );
        assert_eq!(
            "flat-device".parse::<PipelineVariant>().unwrap(),
            PipelineVariant::FlatDevice
        );
        assert!("mesh".parse::<PipelineVariant>().is_err());
    }
}
