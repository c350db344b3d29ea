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

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use derive_more::Display;
use ethers::types::{Address, Bytes, Log, H256};
use serde::{Deserialize, Serialize};

/// The source chain events the relayer knows how to turn into claims.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum EventKind {
    /// Funds locked in the bridge contract.
    #[display(fmt = "LogLock")]
    LogLock,
}

impl EventKind {
    /// The event name as emitted by the contract.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::LogLock => "LogLock",
        }
    }
}

impl FromStr for EventKind {
    type Err = ebrelayer_utils::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LogLock" => Ok(EventKind::LogLock),
            other => Err(ebrelayer_utils::Error::UnsupportedEvent {
                name: other.to_owned(),
            }),
        }
    }
}

/// Where an observation came from.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Pushed by a live subscription.
    #[display(fmt = "watcher")]
    Watcher,
    /// Fetched from history after a (re)start.
    #[display(fmt = "backfill")]
    Backfill,
}

/// A log as delivered by the source chain client, before any checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawLog {
    /// The emitting contract.
    pub address: Address,
    /// Indexed topics, topic 0 being the event signature hash.
    pub topics: Vec<H256>,
    /// Non-indexed data.
    pub data: Bytes,
    /// Block this log was included in, if mined.
    pub block_number: Option<u64>,
    /// Transaction that emitted this log, if mined.
    pub transaction_hash: Option<H256>,
}

impl From<Log> for RawLog {
    fn from(log: Log) -> Self {
        Self {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number: log.block_number.map(|n| n.as_u64()),
            transaction_hash: log.transaction_hash,
        }
    }
}

/// One raw observation of a watched event, stamped with when and how it
/// was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    name: String,
    contract_address: Address,
    topics: Vec<H256>,
    block_number: Option<u64>,
    transaction_hash: Option<H256>,
    observed_at: u64,
    provenance: Provenance,
}

impl ChainEvent {
    /// Builds the observation of `log` under the event `name`, stamped now.
    pub fn new(
        name: impl Into<String>,
        log: RawLog,
        provenance: Provenance,
    ) -> Self {
        let observed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            name: name.into(),
            contract_address: log.address,
            topics: log.topics,
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            observed_at,
            provenance,
        }
    }

    /// The event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The contract that emitted the event.
    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// The topics in the order the chain reported them.
    pub fn topics(&self) -> &[H256] {
        &self.topics
    }

    /// Block number of the log, if known.
    pub fn block_number(&self) -> Option<u64> {
        self.block_number
    }

    /// Transaction hash of the log, if known.
    pub fn transaction_hash(&self) -> Option<H256> {
        self.transaction_hash
    }

    /// Seconds since the unix epoch at which the event was observed.
    pub fn observed_at(&self) -> u64 {
        self.observed_at
    }

    /// Whether this came from a live subscription or a backfill.
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }
}
