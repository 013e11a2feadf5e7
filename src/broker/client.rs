// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT broker connection shared by the whole fleet.
//!
//! One [`BrokerClient`] owns the single connection to the broker. Device
//! actors and the broadcast hub hold clones (via `Arc`) and use it for
//! publish/subscribe; inbound traffic is fanned out to every registered
//! listener from the connection's own worker task.
//!
//! # Examples
//!
//! ```no_run
//! use homefleet::{BrokerClient, BrokerConfig};
//!
//! # async fn example() -> homefleet::Result<()> {
//! let broker = BrokerClient::new(BrokerConfig::new("192.168.1.50"));
//! broker.connect().await?;
//!
//! let id = broker.add_listener(|msg| {
//!     println!("{}: {:?}", msg.topic, msg.payload);
//! });
//!
//! broker.subscribe("home/+/+/status", homefleet::QoS::AtLeastOnce).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::error::BrokerError;

use super::listeners::{ListenerId, ListenerSet};
use super::message::BrokerMessage;

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// First reconnect delay after a dropped connection.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Reconnect delay ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Request channel capacity for the underlying MQTT client.
const REQUEST_CAPACITY: usize = 64;

/// Connection state of the broker client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    Disconnected,
    /// A connection attempt (or reconnect) is in progress.
    Connecting,
    /// The broker acknowledged the connection.
    Connected,
}

/// Shared handle to the fleet's MQTT broker connection.
///
/// Cheaply cloneable; all clones share the same connection, listener set
/// and subscription set. Publish and subscribe calls are safe from any
/// task without external locking.
#[derive(Clone)]
pub struct BrokerClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: AsyncClient,
    config: BrokerConfig,
    listeners: ListenerSet,
    /// Topics to re-subscribe after a reconnect.
    subscriptions: parking_lot::Mutex<BTreeSet<String>>,
    state_tx: watch::Sender<ConnectionState>,
    /// Taken by the first `connect()` call; `None` once the supervisor runs.
    event_loop: parking_lot::Mutex<Option<EventLoop>>,
    shutdown: CancellationToken,
    /// Topics handed to the connection worker, in order.
    #[cfg(test)]
    publish_log: parking_lot::Mutex<Vec<String>>,
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Re-issues every remembered subscription after a reconnect, so
    /// inbound command routing survives a broker drop.
    fn resubscribe(&self) {
        for topic in self.subscriptions.lock().iter() {
            if let Err(e) = self.client.try_subscribe(topic, QoS::AtLeastOnce) {
                tracing::warn!(topic = %topic, error = %e, "Failed to restore subscription");
            }
        }
    }
}

impl BrokerClient {
    /// Creates a client for the given broker without touching the network.
    ///
    /// The connection is established by [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("home_{}_{}", std::process::id(), counter);

        let mut options = MqttOptions::new(&client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        if let Some(will) = &config.last_will {
            options.set_last_will(rumqttc::LastWill::new(
                &will.topic,
                will.payload.clone().into_bytes(),
                QoS::AtLeastOnce,
                will.retain,
            ));
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(Inner {
                client,
                config,
                listeners: ListenerSet::new(),
                subscriptions: parking_lot::Mutex::new(BTreeSet::new()),
                state_tx,
                event_loop: parking_lot::Mutex::new(Some(event_loop)),
                shutdown: CancellationToken::new(),
                #[cfg(test)]
                publish_log: parking_lot::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Connects to the broker, waiting up to the configured timeout for
    /// the acknowledgement.
    ///
    /// The first call spawns the connection supervisor, which keeps
    /// retrying with exponential backoff (1 s doubling up to 60 s) until
    /// [`disconnect`](Self::disconnect) is called. Later calls only wait
    /// for the `Connected` state, so `connect()` is safe to call again
    /// after a drop.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectTimeout`] if the broker does not
    /// acknowledge in time (the supervisor keeps retrying in the
    /// background), or [`BrokerError::ConnectionClosed`] after shutdown.
    pub async fn connect(&self) -> Result<(), BrokerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(BrokerError::ConnectionClosed(
                "broker client was shut down".to_string(),
            ));
        }

        if let Some(event_loop) = self.inner.event_loop.lock().take() {
            self.inner.set_state(ConnectionState::Connecting);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(supervise(inner, event_loop));
        }

        let timeout = self.inner.config.connect_timeout();
        let mut state_rx = self.inner.state_tx.subscribe();

        let wait = async {
            loop {
                if *state_rx.borrow_and_update() == ConnectionState::Connected {
                    return Ok(());
                }
                if state_rx.changed().await.is_err() {
                    return Err(BrokerError::ConnectionClosed(
                        "connection supervisor terminated".to_string(),
                    ));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            // Safe: timeout in practical use will never exceed u64::MAX milliseconds
            #[allow(clippy::cast_possible_truncation)]
            Err(_) => Err(BrokerError::ConnectTimeout(timeout.as_millis() as u64)),
        }
    }

    /// Shuts down the connection supervisor and disconnects.
    pub async fn disconnect(&self) {
        tracing::info!(
            host = %self.inner.config.host,
            port = self.inner.config.port,
            "Disconnecting from MQTT broker"
        );
        self.inner.shutdown.cancel();
        if let Err(e) = self.inner.client.disconnect().await {
            tracing::debug!(error = %e, "MQTT disconnect request not delivered");
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Returns whether the broker acknowledged the connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.inner.state_tx.borrow() == ConnectionState::Connected
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Publishes a JSON value to a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be handed to the connection
    /// worker. A failed publish is not retried.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &serde_json::Value,
        qos: QoS,
        retain: bool,
    ) -> Result<(), BrokerError> {
        tracing::debug!(topic = %topic, "Publishing MQTT message");
        #[cfg(test)]
        self.inner.publish_log.lock().push(topic.to_string());
        self.inner
            .client
            .publish(topic, qos, retain, payload.to_string())
            .await
            .map_err(BrokerError::Mqtt)
    }

    /// Non-blocking publish for use from the broker worker's listener
    /// callbacks, where awaiting would stall message delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the request queue is full or closed.
    pub fn publish_now(
        &self,
        topic: &str,
        payload: &serde_json::Value,
        qos: QoS,
        retain: bool,
    ) -> Result<(), BrokerError> {
        #[cfg(test)]
        self.inner.publish_log.lock().push(topic.to_string());
        self.inner
            .client
            .try_publish(topic, qos, retain, payload.to_string())
            .map_err(BrokerError::Mqtt)
    }

    /// Subscribes to a topic and remembers it for re-subscription after a
    /// reconnect.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be handed to the connection
    /// worker.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), BrokerError> {
        self.inner.subscriptions.lock().insert(topic.to_string());
        self.inner
            .client
            .subscribe(topic, qos)
            .await
            .map_err(BrokerError::Mqtt)
    }

    /// Registers a listener invoked for every inbound message.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BrokerMessage) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    /// Unregisters a listener. Returns `true` if it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Returns the number of remembered subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn dispatch_for_test(&self, message: &BrokerMessage) {
        self.inner.listeners.dispatch(message);
    }

    #[cfg(test)]
    pub(crate) fn published_topics(&self) -> Vec<String> {
        self.inner.publish_log.lock().clone()
    }
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .finish()
    }
}

/// Owns the MQTT event loop: dispatches inbound traffic and retries the
/// connection with capped exponential backoff until shutdown.
async fn supervise(inner: Arc<Inner>, mut event_loop: EventLoop) {
    let shutdown = inner.shutdown.clone();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!(
                        host = %inner.config.host,
                        port = inner.config.port,
                        "Connected to MQTT broker"
                    );
                    inner.set_state(ConnectionState::Connected);
                    backoff = INITIAL_BACKOFF;
                    inner.resubscribe();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = BrokerMessage::new(publish.topic.clone(), &publish.payload);
                    tracing::debug!(topic = %message.topic, "MQTT message received");
                    inner.listeners.dispatch(&message);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    tracing::warn!("MQTT broker requested disconnect");
                    inner.set_state(ConnectionState::Disconnected);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in = ?backoff,
                        "MQTT connection lost; scheduling reconnect"
                    );
                    inner.set_state(ConnectionState::Disconnected);
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    inner.set_state(ConnectionState::Connecting);
                }
            }
        }
    }

    inner.set_state(ConnectionState::Disconnected);
    tracing::debug!("MQTT connection supervisor stopped");
}
