// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![warn(missing_docs)]
//! # Relayer Events Watcher Module 🕸️
//!
//! A module that keeps live subscriptions to the bridge contract events.
//!
//! ## Overview
//!
//! A [`SubscriptionHandle`] owns one subscription to one event on one contract.
//! It checks every log against the expected event signature, turns it into a
//! claim with an [`EventNormalizer`] and pushes the claim to the relay pool.
//! Subscriptions are renewed before the provider expires them, and the new one
//! is always live before the old one is dropped.
//!
//! Handles never restart themselves. They report failures, tagged with their
//! [`WatchKey`], to the [`WatcherSupervisor`], which decides what to do.

use ebrelayer_types::{ChainEvent, EventKind, WitnessClaim};
use ethers::types::{Address, H256};

mod handle;
mod subscriber;
mod supervisor;

pub use handle::{start_watch, HandleState, SubscriptionHandle, WatchWiring};
pub use subscriber::{LogSubscriber, LogSubscription};
pub use supervisor::WatcherSupervisor;

#[cfg(test)]
mod tests;

/// Turns raw observations into claims.
///
/// Implementations must be pure: the same event always gives the same result,
/// and they are called from many watcher tasks at once.
pub trait EventNormalizer: Send + Sync {
    /// Normalizes one event, or explains which part of it is unusable.
    fn normalize(
        &self,
        event: &ChainEvent,
    ) -> ebrelayer_utils::Result<WitnessClaim>;
}

/// Identifies one watch: an event on a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchKey {
    /// The contract emitting the event.
    pub contract: Address,
    /// The watched event.
    pub event: EventKind,
}

impl WatchKey {
    /// Creates a new key.
    pub fn new(contract: Address, event: EventKind) -> Self {
        Self { contract, event }
    }
}

impl std::fmt::Display for WatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{:#x}", self.event, self.contract)
    }
}

/// Everything needed to start a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTarget {
    /// Which watch this is.
    pub key: WatchKey,
    /// Expected topic 0 of the watched logs.
    pub signature_hash: H256,
    /// Replay the logs from this block before serving live ones.
    pub resume_from: Option<u64>,
}

/// A terminal failure of a subscription handle.
#[derive(Debug)]
pub struct WatchError {
    /// The watch that failed.
    pub key: WatchKey,
    /// Why it failed.
    pub error: ebrelayer_utils::Error,
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watcher {} failed: {}", self.key, self.error)
    }
}
