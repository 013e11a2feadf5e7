// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inbound broker message and payload decoding.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A decoded MQTT payload.
///
/// Payloads are decoded to JSON when possible; anything else passes through
/// as raw text so a malformed publisher never breaks dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Payload parsed as a JSON document.
    Json(Value),
    /// Payload kept as an opaque string.
    Text(String),
}

impl Payload {
    /// Decodes raw payload bytes, falling back to text pass-through.
    ///
    /// Bytes that are not valid UTF-8 are decoded lossily; this mirrors
    /// treating the payload as a single opaque value.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text.into_owned()),
        }
    }

    /// Returns the JSON value if this payload decoded as JSON.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Converts the payload into a JSON value.
    ///
    /// Text payloads become JSON strings, so observers always receive a
    /// forwardable value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Text(text) => Value::String(text.clone()),
        }
    }

    /// Extracts `action` and `params` from a command payload of the form
    /// `{"action": <string>, "params": {<open map>}}`.
    ///
    /// Returns `None` when the payload is not a JSON object with a string
    /// `action` field. A missing `params` field yields an empty map.
    #[must_use]
    pub fn as_command(&self) -> Option<(&str, serde_json::Map<String, Value>)> {
        let obj = self.as_json()?.as_object()?;
        let action = obj.get("action")?.as_str()?;
        let params = obj
            .get("params")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Some((action, params))
    }
}

/// An inbound broker message, fanned out to every registered listener.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Decoded payload.
    pub payload: Payload,
    /// When the message was received by the client.
    pub received_at: DateTime<Utc>,
}

impl BrokerMessage {
    /// Builds a message from raw bytes, stamping the arrival time.
    #[must_use]
    pub fn new(topic: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            topic: topic.into(),
            payload: Payload::decode(bytes),
            received_at: Utc::now(),
        }
    }
}
