// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration types for the broker connection and the device fleet.
//!
//! The outer process layer typically reads these from JSON files; the
//! library only defines the shapes and a parser.
//!
//! # Examples
//!
//! ```
//! use homefleet::config::FleetConfig;
//!
//! let config = FleetConfig::from_json(
//!     r#"{
//!         "broker": {"host": "localhost", "port": 1883},
//!         "devices": [
//!             {"id": "lamp1", "type": "lamp"},
//!             {"id": "gate1", "type": "smart_gate", "open_token": "abc"}
//!         ]
//!     }"#,
//! ).unwrap();
//!
//! assert_eq!(config.devices.len(), 2);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

fn default_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Configuration for the MQTT broker connection.
///
/// Immutable after construction; the [`BrokerClient`](crate::BrokerClient)
/// takes it by value.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker port (default 1883).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optional broker username.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional broker password.
    #[serde(default)]
    pub password: Option<String>,
    /// Keep-alive interval in seconds (default 30).
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// How long `connect()` waits for the broker acknowledgement, in
    /// seconds (default 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Optional last-will message the broker publishes on an unexpected
    /// disconnect.
    #[serde(default)]
    pub last_will: Option<LastWill>,
}

impl BrokerConfig {
    /// Creates a configuration for the given host with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            last_will: None,
        }
    }

    /// Sets the broker port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the last-will message.
    #[must_use]
    pub fn with_last_will(mut self, last_will: LastWill) -> Self {
        self.last_will = Some(last_will);
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    /// Returns the keep-alive interval as a [`Duration`].
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Returns the connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// A last-will message registered with the broker at connect time.
#[derive(Debug, Clone, Deserialize)]
pub struct LastWill {
    /// Topic the broker publishes the will on.
    pub topic: String,
    /// Will payload.
    pub payload: String,
    /// Whether the will is retained (default true, matching typical
    /// availability topics).
    #[serde(default = "default_retain")]
    pub retain: bool,
}

fn default_retain() -> bool {
    true
}

/// One device entry from the fleet configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    /// Unique device id within the fleet.
    pub id: String,
    /// Device type tag, resolved against [`DeviceKind`](crate::DeviceKind).
    #[serde(rename = "type")]
    pub kind: String,
    /// Token required by gate devices for the `open` action.
    #[serde(default)]
    pub open_token: Option<String>,
}

/// Top-level configuration: broker connection plus the device fleet.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Devices to load into the registry.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl FleetConfig {
    /// Parses a fleet configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the broker host is
    /// empty.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.broker.host.is_empty() {
            return Err(ConfigError::Invalid(
                "broker host is required".to_string(),
            ));
        }
        Ok(config)
    }
}
