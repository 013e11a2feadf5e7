// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast hub fanning fleet traffic out to connected observers.
//!
//! Observers are anything with a pull side for a frame channel, typically
//! one per connected UI session. Delivery is best-effort: an observer
//! whose channel is gone is evicted on the first failed send, and a
//! broadcast with no observers is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::broker::{BrokerClient, ListenerId};

/// Handle for a registered observer, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Observer({})", self.0)
    }
}

/// A frame pushed to observers, serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Broker traffic mirrored to observers.
    Mqtt {
        /// Topic the message arrived on.
        topic: String,
        /// Decoded payload (text payloads become JSON strings).
        payload: Value,
    },
    /// Acknowledgement of an observer's inbound message.
    Ack {
        /// The message being acknowledged.
        received: Value,
    },
}

/// Thread-safe observer set with best-effort delivery.
pub struct BroadcastHub {
    next_id: AtomicU64,
    observers: parking_lot::Mutex<HashMap<ObserverId, mpsc::UnboundedSender<Frame>>>,
}

impl BroadcastHub {
    /// Creates a hub with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Registers an observer and returns its handle plus the receiving
    /// end of its frame channel.
    pub fn add_observer(&self) -> (ObserverId, mpsc::UnboundedReceiver<Frame>) {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().insert(id, tx);
        tracing::debug!(observer = %id, "Observer connected");
        (id, rx)
    }

    /// Unregisters an observer. Returns `true` if it was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let removed = self.observers.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(observer = %id, "Observer disconnected");
        }
        removed
    }

    /// Number of connected observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Delivers a frame to every observer, evicting any whose channel is
    /// closed. With no observers this is a no-op.
    pub fn broadcast(&self, frame: &Frame) {
        let mut observers = self.observers.lock();
        observers.retain(|id, tx| {
            if tx.send(frame.clone()).is_ok() {
                true
            } else {
                tracing::debug!(observer = %id, "Evicting dead observer");
                false
            }
        });
    }

    /// Sends a frame to one observer, evicting it on failure. Returns
    /// `false` if the observer was gone.
    pub fn send_to(&self, id: ObserverId, frame: Frame) -> bool {
        let mut observers = self.observers.lock();
        let Some(tx) = observers.get(&id) else {
            return false;
        };
        if tx.send(frame).is_err() {
            observers.remove(&id);
            return false;
        }
        true
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// Mirrors every broker message into the hub as an `mqtt` frame.
///
/// The hub must live at least as long as the listener; the returned id
/// removes the listener when observers are no longer served.
pub fn forward_broker_traffic(
    broker: &BrokerClient,
    hub: std::sync::Arc<BroadcastHub>,
) -> ListenerId {
    broker.add_listener(move |message| {
        hub.broadcast(&Frame::Mqtt {
            topic: message.topic.clone(),
            payload: message.payload.to_value(),
        });
    })
}
