// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Supported device types.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

/// The closed set of device types the fleet can manage.
///
/// New types are added here and in the per-kind rules in
/// [`behavior`](super::behavior); unknown configuration tags are rejected
/// at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Dimmable lamp with local on/off/brightness state.
    Lamp,
    /// Thermostat with a temperature setpoint.
    Thermostat,
    /// Camera publishing a liveness heartbeat only.
    Camera,
    /// Security gate guarded by an open token.
    Gate,
    /// Television, command-forwarding with a status heartbeat.
    Tv,
    /// Climate control (air conditioning) with a target temperature.
    Climate,
}

impl DeviceKind {
    /// All supported kinds, for iteration in tests and tooling.
    pub const ALL: [Self; 6] = [
        Self::Lamp,
        Self::Thermostat,
        Self::Camera,
        Self::Gate,
        Self::Tv,
        Self::Climate,
    ];

    /// Topic path component for this kind (`home/<component>/<id>/...`).
    #[must_use]
    pub fn topic_component(self) -> &'static str {
        match self {
            Self::Lamp => "lamp",
            Self::Thermostat => "thermostat",
            Self::Camera => "camera",
            Self::Gate => "gate",
            Self::Tv => "tv",
            Self::Climate => "ac",
        }
    }

    /// Interval between periodic telemetry publishes for this kind.
    #[must_use]
    pub fn telemetry_interval(self) -> Duration {
        match self {
            Self::Gate => Duration::from_secs(20),
            Self::Lamp | Self::Camera | Self::Tv => Duration::from_secs(30),
            Self::Climate => Duration::from_secs(45),
            Self::Thermostat => Duration::from_secs(60),
        }
    }

    /// Whether periodic state is published on a `telemetry` topic rather
    /// than `status`.
    #[must_use]
    pub fn uses_telemetry_topic(self) -> bool {
        matches!(self, Self::Thermostat | Self::Climate)
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Lamp => "lamp",
            Self::Thermostat => "thermostat",
            Self::Camera => "camera",
            Self::Gate => "gate",
            Self::Tv => "tv",
            Self::Climate => "climate",
        };
        write!(f, "{name}")
    }
}

/// Error returned when a configuration type tag is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device type: {0}")]
pub struct UnknownDeviceType(pub String);

impl FromStr for DeviceKind {
    type Err = UnknownDeviceType;

    /// Parses a configuration tag. The legacy tags `smart_gate` and `ac`
    /// are accepted as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lamp" => Ok(Self::Lamp),
            "thermostat" => Ok(Self::Thermostat),
            "camera" => Ok(Self::Camera),
            "gate" | "smart_gate" => Ok(Self::Gate),
            "tv" => Ok(Self::Tv),
            "climate" | "ac" => Ok(Self::Climate),
            other => Err(UnknownDeviceType(other.to_string())),
        }
    }
}
