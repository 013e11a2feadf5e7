// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Listener registration and isolated fan-out for inbound broker traffic.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::message::BrokerMessage;

/// Handle for a registered broker listener, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Listener({})", self.0)
    }
}

type Listener = Arc<dyn Fn(&BrokerMessage) + Send + Sync>;

/// Ordered set of message listeners with isolated invocation.
///
/// Listeners run synchronously on the broker worker in registration order.
/// A panicking listener is logged and skipped; the remaining listeners
/// still receive the message.
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

impl ListenerSet {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Registers a listener and returns its handle.
    pub(crate) fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BrokerMessage) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Delivers a message to every listener, isolating failures.
    pub(crate) fn dispatch(&self, message: &BrokerMessage) {
        // Clone the handles so a listener registering another listener
        // from within its callback cannot deadlock the set.
        let listeners: Vec<(ListenerId, Listener)> = self.listeners.read().clone();

        for (id, listener) in listeners {
            let result = catch_unwind(AssertUnwindSafe(|| listener(message)));
            if result.is_err() {
                tracing::error!(
                    listener = %id,
                    topic = %message.topic,
                    "Listener panicked during message dispatch"
                );
            }
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listener_count", &self.len())
            .finish()
    }
}
