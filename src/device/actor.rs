// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device actor lifecycle and message plumbing.
//!
//! A [`DeviceActor`] owns one device's state and two inbound paths: a
//! broker listener for its command topic and a direct
//! [`handle_command`](DeviceActor::handle_command) entry point for the
//! routing layer. While running it publishes periodic telemetry on the
//! kind-specific interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerClient, ListenerId, QoS};
use crate::command::CommandOutcome;
use crate::error::{Error, Result};

use super::behavior;
use super::kind::DeviceKind;
use super::topics::DeviceTopics;

/// How long `stop()` waits for the telemetry task before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a device actor. Transitions are one-way:
/// `Created -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    /// Constructed, not yet started.
    Created,
    /// Listener registered and telemetry task running.
    Running,
    /// Stop requested, waiting for the telemetry task to finish.
    Stopping,
    /// Fully stopped; the actor cannot be restarted.
    Stopped,
}

/// One managed device: state, topics and the tasks serving them.
pub struct DeviceActor {
    inner: Arc<ActorInner>,
}

struct ActorInner {
    id: String,
    kind: DeviceKind,
    topics: DeviceTopics,
    open_token: Option<String>,
    broker: BrokerClient,
    state: parking_lot::Mutex<Map<String, Value>>,
    lifecycle: parking_lot::Mutex<ActorState>,
    listener: parking_lot::Mutex<Option<ListenerId>>,
    task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl DeviceActor {
    /// Creates an actor in the `Created` state with the kind's initial
    /// state. Nothing touches the broker until [`start`](Self::start).
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: DeviceKind,
        open_token: Option<String>,
        broker: BrokerClient,
    ) -> Self {
        let id = id.into();
        let topics = DeviceTopics::for_device(kind, &id);
        Self {
            inner: Arc::new(ActorInner {
                id,
                kind,
                topics,
                open_token,
                broker,
                state: parking_lot::Mutex::new(behavior::initial_state(kind)),
                lifecycle: parking_lot::Mutex::new(ActorState::Created),
                listener: parking_lot::Mutex::new(None),
                task: parking_lot::Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Device id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Device kind.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.inner.kind
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> ActorState {
        *self.inner.lifecycle.lock()
    }

    /// Whether the actor is in the `Running` state.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle() == ActorState::Running
    }

    /// Snapshot of the device state.
    #[must_use]
    pub fn state(&self) -> Map<String, Value> {
        self.inner.state.lock().clone()
    }

    /// Starts the actor: subscribes to its command topic, registers the
    /// broker listener and spawns the periodic telemetry task.
    ///
    /// Starting an actor that is not in the `Created` state is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the command-topic subscription cannot be
    /// handed to the connection worker.
    pub async fn start(&self) -> Result<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if *lifecycle != ActorState::Created {
                tracing::warn!(
                    device_id = %self.inner.id,
                    state = ?*lifecycle,
                    "Ignoring start of a non-fresh device actor"
                );
                return Ok(());
            }
            *lifecycle = ActorState::Running;
        }

        let weak = Arc::downgrade(&self.inner);
        let listener_id = self.inner.broker.add_listener(move |message| {
            if let Some(inner) = weak.upgrade() {
                inner.on_broker_message(message);
            }
        });
        *self.inner.listener.lock() = Some(listener_id);

        if let Err(e) = self
            .inner
            .broker
            .subscribe(&self.inner.topics.command, QoS::AtLeastOnce)
            .await
        {
            // A failed start leaves no listener behind and reports Stopped.
            if let Some(id) = self.inner.listener.lock().take() {
                self.inner.broker.remove_listener(id);
            }
            *self.inner.lifecycle.lock() = ActorState::Stopped;
            return Err(Error::Broker(e));
        }

        let inner = Arc::clone(&self.inner);
        *self.inner.task.lock() = Some(tokio::spawn(telemetry_loop(inner)));

        tracing::info!(
            device_id = %self.inner.id,
            kind = %self.inner.kind,
            "Device actor started"
        );
        Ok(())
    }

    /// Stops the actor: cancels the telemetry task, waits for it with a
    /// bounded timeout and unregisters the broker listener.
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if *lifecycle != ActorState::Running {
                *lifecycle = ActorState::Stopped;
                return;
            }
            *lifecycle = ActorState::Stopping;
        }

        self.inner.cancel.cancel();

        if let Some(id) = self.inner.listener.lock().take() {
            self.inner.broker.remove_listener(id);
        }

        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            let abort = task.abort_handle();
            match tokio::time::timeout(STOP_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(device_id = %self.inner.id, error = %e, "Telemetry task failed");
                }
                Err(_) => {
                    tracing::warn!(
                        device_id = %self.inner.id,
                        "Telemetry task did not stop in time; aborting"
                    );
                    abort.abort();
                }
            }
        }

        *self.inner.lifecycle.lock() = ActorState::Stopped;
        tracing::info!(device_id = %self.inner.id, "Device actor stopped");
    }

    /// Handles a command from the routing layer.
    ///
    /// Temperature devices apply `set_temp` locally and answer with the
    /// new state; every other action is forwarded to the device's command
    /// topic fire-and-forget. A failed publish is logged, not retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] when the actor is not running.
    pub async fn handle_command(
        &self,
        action: &str,
        params: &Map<String, Value>,
    ) -> Result<CommandOutcome> {
        if !self.is_running() {
            return Err(Error::NotRunning {
                device_id: self.inner.id.clone(),
            });
        }

        let (outcome, outbound) = {
            let mut state = self.inner.state.lock();
            behavior::handle_command(
                self.inner.kind,
                &self.inner.topics,
                self.inner.open_token.as_deref(),
                &mut state,
                action,
                params,
            )
        };

        for publish in outbound {
            if let Err(e) = self
                .inner
                .broker
                .publish(&publish.topic, &publish.payload, QoS::AtLeastOnce, false)
                .await
            {
                tracing::warn!(
                    device_id = %self.inner.id,
                    topic = %publish.topic,
                    error = %e,
                    "Failed to publish command result"
                );
            }
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for DeviceActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceActor")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

impl ActorInner {
    /// Runs on the broker worker for every inbound message; reacts only
    /// to well-formed commands on this device's command topic.
    fn on_broker_message(&self, message: &crate::broker::BrokerMessage) {
        if message.topic != self.topics.command {
            return;
        }
        let Some((action, params)) = message.payload.as_command() else {
            tracing::debug!(
                device_id = %self.id,
                topic = %message.topic,
                "Ignoring non-command payload"
            );
            return;
        };

        let outbound = {
            let mut state = self.state.lock();
            behavior::apply_broker_command(self.kind, &self.topics, &mut state, action, &params)
        };

        for publish in outbound {
            // Listener callbacks run on the connection worker; a blocking
            // publish here would stall dispatch.
            if let Err(e) =
                self.broker
                    .publish_now(&publish.topic, &publish.payload, QoS::AtLeastOnce, false)
            {
                tracing::warn!(
                    device_id = %self.id,
                    topic = %publish.topic,
                    error = %e,
                    "Failed to republish device state"
                );
            }
        }
    }

    fn telemetry_payload(&self) -> Value {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let state = self.state.lock().clone();
        match self.kind {
            // Cameras publish a flat liveness heartbeat.
            DeviceKind::Camera => json!({"online": true, "timestamp": timestamp}),
            _ => json!({"timestamp": timestamp, "state": Value::Object(state)}),
        }
    }
}

/// Publishes telemetry immediately, then on the kind's interval until
/// cancelled.
async fn telemetry_loop(inner: Arc<ActorInner>) {
    let interval = inner.kind.telemetry_interval();
    loop {
        let payload = inner.telemetry_payload();
        if let Err(e) = inner
            .broker
            .publish(&inner.topics.status, &payload, QoS::AtLeastOnce, false)
            .await
        {
            tracing::warn!(
                device_id = %inner.id,
                error = %e,
                "Failed to publish telemetry"
            );
        }

        tokio::select! {
            () = inner.cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
}
