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

//! Rendering of dead letters into MQTT topics and payloads.

use biogas_ingest::DeadLetter;
use handlebars::Handlebars;

/// Registry used for topic templates. Topics are not HTML, so nothing is escaped.
pub fn topic_registry() -> Handlebars<'static> {
    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    registry
}

/// Render `template` for `letter`. A missing device id renders as `unknown`.
///
/// Device ids come from untrusted payloads, so the rendered topic is checked
/// for MQTT wildcards.
pub fn render_topic(
    registry: &Handlebars<'_>,
    template: &str,
    letter: &DeadLetter,
) -> anyhow::Result<String> {
    let context = serde_json::json!({
        "kind": letter.kind.as_str(),
        "device_id": letter.device_id.as_deref().unwrap_or("unknown"),
        "source_topic": letter.source_topic,
    });
    let topic = registry.render_template(template, &context)?;
    if topic.is_empty() || topic.contains(['+', '#']) {
        anyhow::bail!("rendered dead-letter topic '{topic}' is not publishable");
    }
    Ok(topic)
}

pub fn letter_to_payload(letter: &DeadLetter) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(letter)
}
