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

//! # Relayer Configuration Module 🕸️
//!
//! A module for configuring the bridge relayer.
//!
//! ## Overview
//!
//! The configuration is read from every `toml` and `json` file found in the
//! config directory, merged with `EBRELAYER_*` environment variables.
//! Possible configuration include:
//! * `port`: The port the HTTP API will listen on. Defaults to 9955
//! * `ethereum`: the source chain, its websocket endpoint, the bridge contract
//!   and the watched event, plus the tokens the relayer knows about.
//! * `cosmos`: the destination chain, its LCD endpoint and the validator accounts.
//! * `relay`: pacing and resequencing of claim submissions.
//! * `events-watcher`: subscription lifetime settings.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Destination chain configuration
pub mod cosmos;
/// Default values of the optional settings
pub mod defaults;
/// Source chain configuration
pub mod ethereum;
/// Event watcher configuration
pub mod event_watcher;
/// Relay pool configuration
pub mod relay;
/// Utils for processing configuration
pub mod utils;

use serde::{Deserialize, Serialize};

pub use cosmos::CosmosConfig;
pub use ethereum::{EthereumConfig, TokenConfig};
pub use event_watcher::EventsWatcherConfig;
pub use relay::RelayConfig;

/// RelayerConfig is the configuration for the bridge relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    /// HTTP API port number
    ///
    /// default to 9955
    #[serde(default = "defaults::port", skip_serializing)]
    pub port: u16,
    /// The source chain where the bridge contract emits lock events.
    pub ethereum: EthereumConfig,
    /// The destination chain that receives the claims.
    pub cosmos: CosmosConfig,
    /// Relay pool settings.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Subscription settings for the event watchers.
    #[serde(default)]
    pub events_watcher: EventsWatcherConfig,
}
