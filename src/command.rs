// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command request and outcome types exchanged with the request-routing
//! layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A command addressed to one device, constructed per request.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    /// Target device id.
    pub device_id: String,
    /// Action tag (e.g. `on`, `set_temp`).
    pub action: String,
    /// Open key/value parameters for the action.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Optional correlation id echoed back by the routing layer.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
}

impl Command {
    /// Creates a command without parameters.
    #[must_use]
    pub fn new(device_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            action: action.into(),
            params: Map::new(),
            correlation_id: None,
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Tags the command with a fresh correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self) -> Self {
        self.correlation_id = Some(Uuid::new_v4());
        self
    }
}

/// Result of handling a command, serialized with a `status` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CommandOutcome {
    /// The command was forwarded to the device's command topic
    /// fire-and-forget.
    Sent {
        /// Topic the command was published on.
        topic: String,
    },
    /// The command mutated local state directly; the new state is
    /// returned.
    Applied {
        /// Device state after the mutation.
        state: Map<String, Value>,
    },
    /// The command failed an authorization check and was not forwarded.
    Unauthorized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_builder() {
        let cmd = Command::new("lamp1", "set_brightness")
            .with_param("value", 80)
            .with_correlation_id();

        assert_eq!(cmd.device_id, "lamp1");
        assert_eq!(cmd.params["value"], 80);
        assert!(cmd.correlation_id.is_some());
    }

    #[test]
    fn command_deserializes_without_optionals() {
        let cmd: Command =
            serde_json::from_value(json!({"device_id": "tv1", "action": "power_on"}))
                .unwrap();
        assert!(cmd.params.is_empty());
        assert!(cmd.correlation_id.is_none());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let sent = CommandOutcome::Sent {
            topic: "home/tv/tv1/cmd".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&sent).unwrap(),
            json!({"status": "sent", "topic": "home/tv/tv1/cmd"})
        );

        assert_eq!(
            serde_json::to_value(CommandOutcome::Unauthorized).unwrap(),
            json!({"status": "unauthorized"})
        );
    }
}
