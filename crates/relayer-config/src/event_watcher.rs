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

/// EventsWatchConfig is the configuration for the events watchers.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EventsWatcherConfig {
    /// Milliseconds an upstream subscription has to attach before giving up.
    #[serde(
        default = "defaults::attach_timeout",
        rename(serialize = "attachTimeout")
    )]
    pub attach_timeout: u64,
    /// Milliseconds after which a live subscription is preemptively renewed.
    #[serde(
        default = "defaults::resubscribe_interval",
        rename(serialize = "resubscribeInterval")
    )]
    pub resubscribe_interval: u64,
    /// Logs buffered per subscription while the watcher is busy.
    #[serde(default = "defaults::log_buffer", skip_serializing)]
    pub log_buffer: usize,
    /// Upper bound, in milliseconds, of the delay between two restarts of a
    /// failed watcher.
    #[serde(default = "defaults::max_restart_interval", skip_serializing)]
    pub max_restart_interval: u64,
}

impl Default for EventsWatcherConfig {
    fn default() -> Self {
        Self {
            attach_timeout: defaults::attach_timeout(),
            resubscribe_interval: defaults::resubscribe_interval(),
            log_buffer: defaults::log_buffer(),
            max_restart_interval: defaults::max_restart_interval(),
        }
    }
}

impl EventsWatcherConfig {
    /// [`Self::attach_timeout`] as a duration.
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout)
    }

    /// [`Self::resubscribe_interval`] as a duration.
    pub fn resubscribe_interval(&self) -> Duration {
        Duration::from_millis(self.resubscribe_interval)
    }

    /// [`Self::max_restart_interval`] as a duration.
    pub fn max_restart_interval(&self) -> Duration {
        Duration::from_millis(self.max_restart_interval)
    }
}
