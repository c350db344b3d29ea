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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Relay pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayConfig {
    /// Minimum milliseconds between two claim dispatches.
    #[serde(default = "defaults::rate_limit", rename(serialize = "rateLimit"))]
    pub rate_limit: u64,
    /// Block time of the destination chain in milliseconds, waited before
    /// a validator refreshes its sequence after a failure.
    #[serde(default = "defaults::block_time", rename(serialize = "blockTime"))]
    pub block_time: u64,
    /// A validator refreshes its sequence after this many successful submissions.
    #[serde(
        default = "defaults::resequence_threshold",
        rename(serialize = "resequenceThreshold")
    )]
    pub resequence_threshold: u32,
    /// Claims buffered between the watchers and the relay pool.
    #[serde(default = "defaults::claim_channel_capacity", skip_serializing)]
    pub claim_channel_capacity: usize,
    /// print stats frequency in milliseconds
    /// if it is zero, means no stats will be printed.
    #[serde(default = "defaults::stats_report_interval", skip_serializing)]
    pub stats_report_interval: u64,
    /// How many validator accounts are initialized concurrently at startup.
    #[serde(default = "defaults::spawn_concurrency", skip_serializing)]
    pub spawn_concurrency: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            rate_limit: defaults::rate_limit(),
            block_time: defaults::block_time(),
            resequence_threshold: defaults::resequence_threshold(),
            claim_channel_capacity: defaults::claim_channel_capacity(),
            stats_report_interval: defaults::stats_report_interval(),
            spawn_concurrency: defaults::spawn_concurrency(),
        }
    }
}

impl RelayConfig {
    /// [`Self::rate_limit`] as a duration.
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit)
    }

    /// [`Self::block_time`] as a duration.
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time)
    }

    /// [`Self::stats_report_interval`] as a duration.
    pub fn stats_report_interval(&self) -> Duration {
        Duration::from_millis(self.stats_report_interval)
    }
}
