// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fleet facade: one call to bring the whole coordinator up or down.

use std::sync::Arc;

use serde::Serialize;

use crate::broker::{BrokerClient, ListenerId};
use crate::config::FleetConfig;
use crate::hub::{BroadcastHub, forward_broker_traffic};
use crate::registry::DeviceRegistry;

/// Health snapshot for liveness probes.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Whether the broker acknowledged the connection.
    pub mqtt_connected: bool,
    /// Number of loaded devices.
    pub device_count: usize,
}

/// A running fleet: broker connection, device registry and broadcast hub.
pub struct Fleet {
    registry: DeviceRegistry,
    hub: Arc<BroadcastHub>,
    traffic_listener: ListenerId,
}

impl Fleet {
    /// Brings the fleet up: connects the broker, loads the configured
    /// devices and starts every actor.
    ///
    /// An unreachable broker is tolerated; the connection supervisor
    /// keeps retrying in the background while the devices run.
    pub async fn start(config: FleetConfig) -> Self {
        let broker = BrokerClient::new(config.broker);
        let hub = Arc::new(BroadcastHub::new());
        let traffic_listener = forward_broker_traffic(&broker, Arc::clone(&hub));

        let mut registry = DeviceRegistry::new(broker);
        registry.load_devices(&config.devices);
        registry.start_all().await;

        Self {
            registry,
            hub,
            traffic_listener,
        }
    }

    /// The device registry.
    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The observer hub mirroring broker traffic.
    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Health snapshot.
    #[must_use]
    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            mqtt_connected: self.registry.broker().is_connected(),
            device_count: self.registry.len(),
        }
    }

    /// Brings the fleet down: stops every actor, then disconnects the
    /// broker. Observers stop receiving frames once this returns.
    pub async fn shutdown(&self) {
        self.registry.broker().remove_listener(self.traffic_listener);
        self.registry.stop_all().await;
    }
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("device_count", &self.registry.len())
            .field("observer_count", &self.hub.observer_count())
            .finish()
    }
}
