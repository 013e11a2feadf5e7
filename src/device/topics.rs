// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device topic set.
//!
//! Every device of type `T` with id `I` uses `home/T/I/cmd` for inbound
//! commands, `home/T/I/status` (or `.../telemetry` for temperature
//! devices) for outbound state, and `home/T/I/alert` for security events.

use super::kind::DeviceKind;

/// The MQTT topics owned by one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    /// Inbound command topic.
    pub command: String,
    /// Outbound state topic (`status` or `telemetry`).
    pub status: String,
    /// Security-relevant event topic.
    pub alert: String,
}

impl DeviceTopics {
    /// Builds the topic set for a device.
    #[must_use]
    pub fn for_device(kind: DeviceKind, device_id: &str) -> Self {
        let component = kind.topic_component();
        let status_leaf = if kind.uses_telemetry_topic() {
            "telemetry"
        } else {
            "status"
        };
        Self {
            command: format!("home/{component}/{device_id}/cmd"),
            status: format!("home/{component}/{device_id}/{status_leaf}"),
            alert: format!("home/{component}/{device_id}/alert"),
        }
    }
}
