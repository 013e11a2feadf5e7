// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-kind state transition rules.
//!
//! Rules are pure over the device state and return requested publishes as
//! data; the actor owns the actual broker calls. Two command patterns
//! share one interface: temperature devices apply `set_temp` locally and
//! answer with the new state, every other action is forwarded to the
//! device's command topic fire-and-forget.

use serde_json::{Map, Value, json};

use crate::command::CommandOutcome;

use super::kind::DeviceKind;
use super::topics::DeviceTopics;

/// A publish requested by a behavior rule.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Outbound {
    pub topic: String,
    pub payload: Value,
}

/// Initial state for a freshly constructed device.
pub(crate) fn initial_state(kind: DeviceKind) -> Map<String, Value> {
    let state = match kind {
        DeviceKind::Lamp => json!({"power": "off", "brightness": 0}),
        DeviceKind::Thermostat => {
            json!({"current_temp": 22.0, "setpoint": 24.0, "mode": "auto"})
        }
        DeviceKind::Camera => json!({"online": true}),
        DeviceKind::Gate => json!({"position": "closed", "locked": true}),
        DeviceKind::Tv => json!({"power": "off", "volume": 10, "input": "hdmi1"}),
        DeviceKind::Climate => {
            json!({"current_temp": 26.5, "target_temp": 24.0, "mode": "cool"})
        }
    };
    match state {
        Value::Object(map) => map,
        _ => unreachable!("initial states are objects"),
    }
}

/// Handles a command arriving from the routing layer.
pub(crate) fn handle_command(
    kind: DeviceKind,
    topics: &DeviceTopics,
    open_token: Option<&str>,
    state: &mut Map<String, Value>,
    action: &str,
    params: &Map<String, Value>,
) -> (CommandOutcome, Vec<Outbound>) {
    match (kind, action) {
        (DeviceKind::Gate, "open") => {
            let presented = params.get("auth_token").and_then(Value::as_str);
            if presented != open_token {
                let alert = Outbound {
                    topic: topics.alert.clone(),
                    payload: json!({
                        "event": "unauthorized_open_attempt",
                        "by": params.get("user").cloned().unwrap_or(Value::Null),
                    }),
                };
                return (CommandOutcome::Unauthorized, vec![alert]);
            }
            forward(topics, action, params)
        }
        (DeviceKind::Thermostat | DeviceKind::Climate, "set_temp") => {
            apply_set_temp(kind, state, params);
            let telemetry = Outbound {
                topic: topics.status.clone(),
                payload: json!({"state": Value::Object(state.clone())}),
            };
            (
                CommandOutcome::Applied {
                    state: state.clone(),
                },
                vec![telemetry],
            )
        }
        _ => forward(topics, action, params),
    }
}

/// Forwards a command to the device's command topic fire-and-forget.
fn forward(
    topics: &DeviceTopics,
    action: &str,
    params: &Map<String, Value>,
) -> (CommandOutcome, Vec<Outbound>) {
    let outbound = Outbound {
        topic: topics.command.clone(),
        payload: json!({"action": action, "params": Value::Object(params.clone())}),
    };
    (
        CommandOutcome::Sent {
            topic: topics.command.clone(),
        },
        vec![outbound],
    )
}

/// Applies a command observed on the device's own command topic.
///
/// This is where fire-and-forget instructions land after the broker round
/// trip; the device mutates its state and republishes it.
pub(crate) fn apply_broker_command(
    kind: DeviceKind,
    topics: &DeviceTopics,
    state: &mut Map<String, Value>,
    action: &str,
    params: &Map<String, Value>,
) -> Vec<Outbound> {
    match kind {
        DeviceKind::Lamp => {
            match action {
                "on" => {
                    state.insert("power".to_string(), json!("on"));
                }
                "off" => {
                    state.insert("power".to_string(), json!("off"));
                }
                "set_brightness" => {
                    let value = params.get("value").and_then(Value::as_i64).unwrap_or(0);
                    state.insert("brightness".to_string(), json!(value));
                }
                _ => {}
            }
            vec![status_publish(topics, state)]
        }
        DeviceKind::Thermostat => {
            if action == "set_temp" {
                apply_set_temp(kind, state, params);
                vec![status_publish(topics, state)]
            } else {
                Vec::new()
            }
        }
        DeviceKind::Climate => {
            if action == "set_temp" {
                apply_set_temp(kind, state, params);
            }
            vec![status_publish(topics, state)]
        }
        DeviceKind::Gate => {
            match action {
                "open" => {
                    state.insert("position".to_string(), json!("opening"));
                    state.insert("locked".to_string(), json!(false));
                }
                "close" => {
                    state.insert("position".to_string(), json!("closed"));
                }
                _ => {}
            }
            vec![status_publish(topics, state)]
        }
        DeviceKind::Tv => {
            match action {
                "power_on" => {
                    state.insert("power".to_string(), json!("on"));
                }
                "power_off" => {
                    state.insert("power".to_string(), json!("off"));
                }
                "set_volume" => {
                    if let Some(value) = params.get("value").and_then(Value::as_i64) {
                        state.insert("volume".to_string(), json!(value));
                    }
                }
                _ => {}
            }
            vec![status_publish(topics, state)]
        }
        DeviceKind::Camera => {
            tracing::info!(action = %action, "Camera command received");
            Vec::new()
        }
    }
}

/// Updates the temperature setpoint field, keeping the current value when
/// the parameter is missing or not numeric.
fn apply_set_temp(kind: DeviceKind, state: &mut Map<String, Value>, params: &Map<String, Value>) {
    let field = match kind {
        DeviceKind::Thermostat => "setpoint",
        _ => "target_temp",
    };
    if let Some(target) = params.get("target_temp").and_then(Value::as_f64) {
        state.insert(field.to_string(), json!(target));
    }
}

fn status_publish(topics: &DeviceTopics, state: &Map<String, Value>) -> Outbound {
    Outbound {
        topic: topics.status.clone(),
        payload: json!({"state": Value::Object(state.clone())}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(kind: DeviceKind, id: &str) -> (DeviceTopics, Map<String, Value>) {
        (DeviceTopics::for_device(kind, id), initial_state(kind))
    }

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn gate_open_with_wrong_token_is_unauthorized() {
        let (topics, mut state) = setup(DeviceKind::Gate, "front");
        let params = params(&[("auth_token", json!("wrong")), ("user", json!("mallory"))]);

        let (outcome, outbound) = handle_command(
            DeviceKind::Gate,
            &topics,
            Some("abc"),
            &mut state,
            "open",
            &params,
        );

        assert_eq!(outcome, CommandOutcome::Unauthorized);
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].topic, "home/gate/front/alert");
        assert_eq!(outbound[0].payload["event"], "unauthorized_open_attempt");
        assert_eq!(outbound[0].payload["by"], "mallory");
        // Unauthorized attempts never touch the gate state.
        assert_eq!(state["position"], "closed");
    }

    #[test]
    fn gate_open_with_matching_token_is_forwarded() {
        let (topics, mut state) = setup(DeviceKind::Gate, "front");
        let params = params(&[("auth_token", json!("abc"))]);

        let (outcome, outbound) = handle_command(
            DeviceKind::Gate,
            &topics,
            Some("abc"),
            &mut state,
            "open",
            &params,
        );

        assert_eq!(
            outcome,
            CommandOutcome::Sent {
                topic: "home/gate/front/cmd".to_string()
            }
        );
        assert_eq!(outbound[0].topic, "home/gate/front/cmd");
        assert_eq!(outbound[0].payload["action"], "open");
    }

    #[test]
    fn gate_without_configured_token_accepts_tokenless_open() {
        let (topics, mut state) = setup(DeviceKind::Gate, "front");

        let (outcome, _) = handle_command(
            DeviceKind::Gate,
            &topics,
            None,
            &mut state,
            "open",
            &Map::new(),
        );

        assert!(matches!(outcome, CommandOutcome::Sent { .. }));
    }

    #[test]
    fn thermostat_set_temp_applies_and_publishes_immediately() {
        let (topics, mut state) = setup(DeviceKind::Thermostat, "t1");
        let params = params(&[("target_temp", json!(19.5))]);

        let (outcome, outbound) = handle_command(
            DeviceKind::Thermostat,
            &topics,
            None,
            &mut state,
            "set_temp",
            &params,
        );

        assert_eq!(state["setpoint"], 19.5);
        let CommandOutcome::Applied { state: returned } = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(returned["setpoint"], 19.5);

        // Out-of-cycle telemetry publish, not waiting for the periodic tick.
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].topic, "home/thermostat/t1/telemetry");
        assert_eq!(outbound[0].payload["state"]["setpoint"], 19.5);
    }

    #[test]
    fn set_temp_without_target_keeps_setpoint() {
        let (topics, mut state) = setup(DeviceKind::Thermostat, "t1");

        let (_, _) = handle_command(
            DeviceKind::Thermostat,
            &topics,
            None,
            &mut state,
            "set_temp",
            &Map::new(),
        );

        assert_eq!(state["setpoint"], 24.0);
    }

    #[test]
    fn climate_set_temp_uses_target_temp_field() {
        let (topics, mut state) = setup(DeviceKind::Climate, "ac1");
        let params = params(&[("target_temp", json!(21.0))]);

        let (_, outbound) = handle_command(
            DeviceKind::Climate,
            &topics,
            None,
            &mut state,
            "set_temp",
            &params,
        );

        assert_eq!(state["target_temp"], 21.0);
        assert_eq!(outbound[0].topic, "home/ac/ac1/telemetry");
    }

    #[test]
    fn lamp_command_is_forwarded_not_applied() {
        let (topics, mut state) = setup(DeviceKind::Lamp, "l1");
        let params = params(&[("value", json!(80))]);

        let (outcome, outbound) = handle_command(
            DeviceKind::Lamp,
            &topics,
            None,
            &mut state,
            "set_brightness",
            &params,
        );

        assert!(matches!(outcome, CommandOutcome::Sent { .. }));
        assert_eq!(outbound[0].topic, "home/lamp/l1/cmd");
        assert_eq!(outbound[0].payload["params"]["value"], 80);
        // Local state mutates only after the broker round trip.
        assert_eq!(state["brightness"], 0);
    }

    #[test]
    fn lamp_broker_set_brightness_mutates_and_republishes() {
        let (topics, mut state) = setup(DeviceKind::Lamp, "l1");
        let params = params(&[("value", json!(80))]);

        let outbound = apply_broker_command(
            DeviceKind::Lamp,
            &topics,
            &mut state,
            "set_brightness",
            &params,
        );

        assert_eq!(state["brightness"], 80);
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].topic, "home/lamp/l1/status");
        assert_eq!(outbound[0].payload["state"]["brightness"], 80);
    }

    #[test]
    fn lamp_broker_power_cycle() {
        let (topics, mut state) = setup(DeviceKind::Lamp, "l1");

        apply_broker_command(DeviceKind::Lamp, &topics, &mut state, "on", &Map::new());
        assert_eq!(state["power"], "on");

        apply_broker_command(DeviceKind::Lamp, &topics, &mut state, "off", &Map::new());
        assert_eq!(state["power"], "off");
    }

    #[test]
    fn gate_broker_open_and_close() {
        let (topics, mut state) = setup(DeviceKind::Gate, "front");

        let outbound =
            apply_broker_command(DeviceKind::Gate, &topics, &mut state, "open", &Map::new());
        assert_eq!(state["position"], "opening");
        assert_eq!(state["locked"], false);
        assert_eq!(outbound[0].topic, "home/gate/front/status");

        apply_broker_command(DeviceKind::Gate, &topics, &mut state, "close", &Map::new());
        assert_eq!(state["position"], "closed");
    }

    #[test]
    fn tv_broker_commands_mutate_state() {
        let (topics, mut state) = setup(DeviceKind::Tv, "tv1");

        apply_broker_command(DeviceKind::Tv, &topics, &mut state, "power_on", &Map::new());
        assert_eq!(state["power"], "on");

        let params = params(&[("value", json!(25))]);
        apply_broker_command(DeviceKind::Tv, &topics, &mut state, "set_volume", &params);
        assert_eq!(state["volume"], 25);
    }

    #[test]
    fn camera_broker_command_produces_no_publish() {
        let (topics, mut state) = setup(DeviceKind::Camera, "cam1");

        let outbound = apply_broker_command(
            DeviceKind::Camera,
            &topics,
            &mut state,
            "start_stream",
            &Map::new(),
        );

        assert!(outbound.is_empty());
    }

    #[test]
    fn thermostat_ignores_unrelated_broker_actions() {
        let (topics, mut state) = setup(DeviceKind::Thermostat, "t1");

        let outbound =
            apply_broker_command(DeviceKind::Thermostat, &topics, &mut state, "noop", &Map::new());

        assert!(outbound.is_empty());
        assert_eq!(state["setpoint"], 24.0);
    }
}
