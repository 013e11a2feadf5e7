// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device registry: loads configured devices and routes commands to them.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::broker::BrokerClient;
use crate::command::{Command, CommandOutcome};
use crate::config::DeviceEntry;
use crate::device::{DeviceActor, DeviceKind};
use crate::error::{Error, Result};

/// One row in the device listing.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    /// Device id.
    pub id: String,
    /// Device kind, serialized lowercase.
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    /// Snapshot of the device state.
    pub state: Map<String, Value>,
}

/// Owns every device actor in the fleet and routes commands by id.
pub struct DeviceRegistry {
    broker: BrokerClient,
    devices: HashMap<String, DeviceActor>,
}

impl DeviceRegistry {
    /// Creates an empty registry bound to a broker connection.
    #[must_use]
    pub fn new(broker: BrokerClient) -> Self {
        Self {
            broker,
            devices: HashMap::new(),
        }
    }

    /// The broker connection shared with the actors.
    #[must_use]
    pub fn broker(&self) -> &BrokerClient {
        &self.broker
    }

    /// Number of loaded devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry has no devices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Instantiates actors from configuration entries.
    ///
    /// A bad entry (unknown type tag, duplicate id) is logged and skipped;
    /// the remaining entries still load. Returns the number of devices
    /// loaded by this call.
    pub fn load_devices(&mut self, entries: &[DeviceEntry]) -> usize {
        let mut loaded = 0;
        for entry in entries {
            let kind = match entry.kind.parse::<DeviceKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!(device_id = %entry.id, error = %e, "Skipping device");
                    continue;
                }
            };
            if self.devices.contains_key(&entry.id) {
                tracing::warn!(device_id = %entry.id, "Skipping duplicate device id");
                continue;
            }

            let actor = DeviceActor::new(
                entry.id.clone(),
                kind,
                entry.open_token.clone(),
                self.broker.clone(),
            );
            tracing::info!(device_id = %entry.id, kind = %kind, "Loaded device");
            self.devices.insert(entry.id.clone(), actor);
            loaded += 1;
        }
        loaded
    }

    /// Connects the broker and starts every loaded actor.
    ///
    /// A failed broker connection is logged and not fatal: actors still
    /// start, their publishes queue, and the supervisor keeps retrying in
    /// the background. A failed actor start does not stop the others.
    pub async fn start_all(&self) {
        if let Err(e) = self.broker.connect().await {
            tracing::warn!(error = %e, "Broker not reachable yet; starting devices anyway");
        }

        for actor in self.devices.values() {
            if let Err(e) = actor.start().await {
                tracing::warn!(device_id = %actor.id(), error = %e, "Failed to start device");
            }
        }
        tracing::info!(device_count = self.devices.len(), "Device fleet started");
    }

    /// Stops every actor, then disconnects the broker.
    pub async fn stop_all(&self) {
        for actor in self.devices.values() {
            actor.stop().await;
        }
        self.broker.disconnect().await;
        tracing::info!("Device fleet stopped");
    }

    /// Lists every device with a state snapshot, ordered by id.
    #[must_use]
    pub fn list_devices(&self) -> Vec<DeviceSummary> {
        let mut summaries: Vec<DeviceSummary> = self
            .devices
            .values()
            .map(|actor| DeviceSummary {
                id: actor.id().to_string(),
                kind: actor.kind(),
                state: actor.state(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Routes a command to the device with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown id, and
    /// [`Error::NotRunning`] when the target actor is not running.
    pub async fn route_command(
        &self,
        device_id: &str,
        action: &str,
        params: &Map<String, Value>,
    ) -> Result<CommandOutcome> {
        let actor = self
            .devices
            .get(device_id)
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;
        actor.handle_command(action, params).await
    }

    /// Routes a [`Command`] envelope, typically deserialized from a
    /// request body.
    ///
    /// # Errors
    ///
    /// Same as [`route_command`](Self::route_command).
    pub async fn dispatch(&self, command: &Command) -> Result<CommandOutcome> {
        tracing::debug!(
            device_id = %command.device_id,
            action = %command.action,
            correlation_id = ?command.correlation_id,
            "Dispatching command"
        );
        self.route_command(&command.device_id, &command.action, &command.params)
            .await
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("device_count", &self.devices.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use serde_json::json;
    use std::time::Duration;

    fn offline_registry() -> DeviceRegistry {
        DeviceRegistry::new(BrokerClient::new(
            BrokerConfig::new("127.0.0.1")
                .with_port(1)
                .with_connect_timeout(Duration::from_secs(1)),
        ))
    }

    fn entry(id: &str, kind: &str) -> DeviceEntry {
        DeviceEntry {
            id: id.to_string(),
            kind: kind.to_string(),
            open_token: None,
        }
    }

    #[test]
    fn load_skips_bad_entries_and_keeps_good_ones() {
        let mut registry = offline_registry();
        let loaded = registry.load_devices(&[
            entry("lamp1", "lamp"),
            entry("mystery", "toaster"),
            entry("lamp1", "lamp"),
            entry("t1", "thermostat"),
        ]);

        assert_eq!(loaded, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn load_accepts_legacy_type_tags() {
        let mut registry = offline_registry();
        registry.load_devices(&[entry("front", "smart_gate"), entry("ac1", "ac")]);

        let devices = registry.list_devices();
        assert_eq!(devices[0].kind, DeviceKind::Climate);
        assert_eq!(devices[1].kind, DeviceKind::Gate);
    }

    #[test]
    fn list_devices_is_ordered_and_snapshots_state() {
        let mut registry = offline_registry();
        registry.load_devices(&[entry("b-lamp", "lamp"), entry("a-lamp", "lamp")]);

        let devices = registry.list_devices();
        assert_eq!(devices[0].id, "a-lamp");
        assert_eq!(devices[1].id, "b-lamp");
        assert_eq!(devices[0].state["power"], "off");
    }

    #[test]
    fn summary_serializes_with_type_tag() {
        let mut registry = offline_registry();
        registry.load_devices(&[entry("lamp1", "lamp")]);

        let value = serde_json::to_value(&registry.list_devices()[0]).unwrap();
        assert_eq!(value["type"], "lamp");
        assert_eq!(value["state"]["brightness"], 0);
    }

    #[tokio::test]
    async fn route_to_unknown_device_is_not_found() {
        let registry = offline_registry();
        let err = registry
            .route_command("ghost", "on", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn route_before_start_reports_not_running() {
        let mut registry = offline_registry();
        registry.load_devices(&[entry("lamp1", "lamp")]);

        let err = registry
            .route_command("lamp1", "on", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotRunning { .. }));
    }

    #[tokio::test]
    async fn start_all_and_route_round_trip() {
        let mut registry = offline_registry();
        registry.load_devices(&[entry("lamp1", "lamp"), entry("t1", "thermostat")]);
        registry.start_all().await;

        let outcome = registry
            .route_command("lamp1", "on", &Map::new())
            .await
            .unwrap();
        assert!(matches!(outcome, CommandOutcome::Sent { .. }));

        let mut params = Map::new();
        params.insert("target_temp".to_string(), json!(19.5));
        let outcome = registry
            .route_command("t1", "set_temp", &params)
            .await
            .unwrap();
        assert!(matches!(outcome, CommandOutcome::Applied { .. }));

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn dispatch_routes_a_command_envelope() {
        let mut registry = offline_registry();
        registry.load_devices(&[entry("tv1", "tv")]);
        registry.start_all().await;

        let command = Command::new("tv1", "set_volume")
            .with_param("value", 25)
            .with_correlation_id();
        let outcome = registry.dispatch(&command).await.unwrap();
        assert!(matches!(outcome, CommandOutcome::Sent { .. }));

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn stop_all_stops_every_actor() {
        let mut registry = offline_registry();
        registry.load_devices(&[entry("lamp1", "lamp"), entry("front", "gate")]);
        registry.start_all().await;
        registry.stop_all().await;

        let err = registry
            .route_command("front", "open", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotRunning { .. }));
    }
}
