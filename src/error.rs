// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `homefleet` library.
//!
//! Failures are grouped by origin: broker communication, configuration
//! loading, and fleet-level operations such as command routing.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while talking to the MQTT broker.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Error occurred while loading configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The requested device id is not present in the registry.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device actor is not in a state that can accept the operation.
    #[error("device {device_id} is not running")]
    NotRunning {
        /// Id of the device that rejected the operation.
        device_id: String,
    },
}

/// Errors related to the MQTT broker connection.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The underlying MQTT client rejected a request.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// The broker did not acknowledge the connection in time.
    #[error("connection timed out after {0} ms")]
    ConnectTimeout(u64),

    /// The connection supervisor was shut down before connecting.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

/// Errors related to configuration parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is missing or empty.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_not_found_display() {
        let err = Error::DeviceNotFound("lamp1".to_string());
        assert_eq!(err.to_string(), "device not found: lamp1");
    }

    #[test]
    fn error_from_broker_error() {
        let broker_err = BrokerError::ConnectTimeout(10_000);
        let err: Error = broker_err.into();
        assert!(matches!(
            err,
            Error::Broker(BrokerError::ConnectTimeout(10_000))
        ));
    }

    #[test]
    fn connect_timeout_display() {
        let err = BrokerError::ConnectTimeout(5000);
        assert_eq!(err.to_string(), "connection timed out after 5000 ms");
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::Invalid("broker host is required".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: broker host is required"
        );
    }
}
