// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `HomeFleet` - a smart-home device fleet coordinator over MQTT.
//!
//! This library manages a fleet of simulated smart-home devices sharing one
//! MQTT broker connection: it routes commands to devices, publishes their
//! state and telemetry, and mirrors broker traffic to connected observers.
//!
//! # Features
//!
//! - **Shared broker connection**: one supervised MQTT connection with
//!   capped exponential reconnect backoff and automatic re-subscription
//! - **Device actors**: lamps, thermostats, cameras, gates, TVs and
//!   climate units, each with its own state and telemetry interval
//! - **Command routing**: by device id, with gate open-token checks and
//!   locally applied temperature setpoints
//! - **Observer broadcast**: best-effort fan-out of broker traffic to UI
//!   sessions, evicting dead observers
//!
//! # Quick Start
//!
//! ## Running a fleet from configuration
//!
//! ```no_run
//! use homefleet::{Fleet, FleetConfig};
//!
//! #[tokio::main]
//! async fn main() -> homefleet::Result<()> {
//!     let config = FleetConfig::from_json(
//!         r#"{
//!             "broker": {"host": "192.168.1.50"},
//!             "devices": [
//!                 {"id": "lamp1", "type": "lamp"},
//!                 {"id": "gate1", "type": "gate", "open_token": "abc"}
//!             ]
//!         }"#,
//!     )?;
//!
//!     let fleet = Fleet::start(config).await;
//!
//!     let outcome = fleet
//!         .registry()
//!         .route_command("lamp1", "on", &serde_json::Map::new())
//!         .await?;
//!     println!("{outcome:?}");
//!
//!     fleet.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Watching broker traffic
//!
//! ```no_run
//! use homefleet::{BrokerClient, BrokerConfig};
//!
//! # async fn example() -> homefleet::Result<()> {
//! let broker = BrokerClient::new(BrokerConfig::new("192.168.1.50"));
//! broker.connect().await?;
//!
//! broker.add_listener(|msg| {
//!     println!("{}: {:?}", msg.topic, msg.payload);
//! });
//! broker.subscribe("home/#", homefleet::QoS::AtLeastOnce).await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod fleet;
pub mod hub;
pub mod registry;

pub use broker::{BrokerClient, BrokerMessage, ConnectionState, ListenerId, Payload, QoS};
pub use command::{Command, CommandOutcome};
pub use config::{BrokerConfig, DeviceEntry, FleetConfig, LastWill};
pub use device::{ActorState, DeviceActor, DeviceKind, DeviceTopics};
pub use error::{BrokerError, ConfigError, Error, Result};
pub use fleet::{Fleet, Health};
pub use hub::{BroadcastHub, Frame, ObserverId, forward_broker_traffic};
pub use registry::{DeviceRegistry, DeviceSummary};
