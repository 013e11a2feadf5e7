// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT broker connection, message decoding and listener fan-out.

mod client;
mod listeners;
mod message;

pub use client::{BrokerClient, ConnectionState};
pub use listeners::ListenerId;
pub use message::{BrokerMessage, Payload};

pub use rumqttc::QoS;
