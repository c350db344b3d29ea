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

use ebrelayer_types::passphrase::Passphrase;
use ebrelayer_types::rpc_url::RpcUrl;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// Destination chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CosmosConfig {
    /// The chain id every transaction is signed for.
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: String,
    /// The LCD (REST) server that holds the validator keys and broadcasts.
    #[serde(skip_serializing)]
    pub lcd_endpoint: RpcUrl,
    /// Route, relative to the LCD endpoint, that accepts claims.
    #[serde(default = "defaults::claim_route", skip_serializing)]
    pub claim_route: String,
    /// Key store entries whose name starts with this are used as validators.
    #[serde(
        default = "defaults::validator_prefix",
        rename(serialize = "validatorPrefix")
    )]
    pub validator_prefix: String,
    /// Unlocks the validator keys.
    ///
    /// Either the passphrase itself, or `$ENV_VAR` to read it from the environment.
    #[serde(skip_serializing)]
    pub validator_passphrase: Passphrase,
    /// Timeout of a single LCD request in milliseconds.
    #[serde(default = "defaults::request_timeout", skip_serializing)]
    pub request_timeout: u64,
}

impl CosmosConfig {
    /// [`Self::request_timeout`] as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }
}
