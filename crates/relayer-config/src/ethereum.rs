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

use std::collections::HashMap;

use ebrelayer_types::rpc_url::RpcUrl;
use ebrelayer_types::EventKind;
use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// Source chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EthereumConfig {
    /// Websocket Endpoint for long living subscriptions
    #[serde(skip_serializing)]
    pub ws_endpoint: RpcUrl,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u64,
    /// The bridge contract that emits the lock events.
    #[serde(rename(serialize = "contractAddress"))]
    pub contract_address: Address,
    /// The kind of event to watch.
    #[serde(default = "default_event")]
    pub event: EventKind,
    /// The full event signature, hashed to match topic 0 of every log.
    #[serde(
        default = "defaults::event_signature",
        rename(serialize = "eventSignature")
    )]
    pub event_signature: String,
    /// Denomination of claims for the native asset (zero token address).
    #[serde(
        default = "defaults::native_denom",
        rename(serialize = "nativeDenom")
    )]
    pub native_denom: String,
    /// Tokens other than the native asset, by contract address.
    #[serde(default)]
    pub tokens: HashMap<Address, TokenConfig>,
    /// When set, watchers first replay the lock events from this block.
    #[serde(skip_serializing)]
    pub resume_from_block: Option<u64>,
}

fn default_event() -> EventKind {
    EventKind::LogLock
}

impl EthereumConfig {
    /// The keccak hash of [`Self::event_signature`], i.e. the expected topic 0.
    pub fn event_signature_hash(&self) -> H256 {
        H256::from(keccak256(self.event_signature.as_bytes()))
    }
}

/// Metadata of a token that can be locked in the bridge contract.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TokenConfig {
    /// The denomination used on the destination chain.
    pub symbol: String,
    /// The number of decimals of the token on the source chain.
    pub decimals: u8,
}
