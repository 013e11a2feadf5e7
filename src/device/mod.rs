// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device actors: per-kind rules, topics and lifecycle.

mod actor;
mod behavior;
mod kind;
mod topics;

pub use actor::{ActorState, DeviceActor};
pub use kind::{DeviceKind, UnknownDeviceType};
pub use topics::DeviceTopics;
