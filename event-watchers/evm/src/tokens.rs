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

use ebrelayer_config::ethereum::TokenConfig;
use ethers::types::Address;

/// What the normalizer needs to know about a locked token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// Destination chain denomination.
    pub symbol: String,
    /// Decimals on the source chain.
    pub decimals: u8,
}

/// Looks up the tokens that can be locked in the bridge contract.
pub trait TokenRegistry: Send + Sync {
    /// The metadata of `token`, if it is known.
    fn lookup(&self, token: &Address) -> Option<TokenMetadata>;
}

/// A [`TokenRegistry`] with a fixed set of tokens, usually from the config.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenRegistry {
    tokens: HashMap<Address, TokenMetadata>,
}

impl StaticTokenRegistry {
    /// Creates a new StaticTokenRegistry.
    #[must_use]
    pub fn new(tokens: HashMap<Address, TokenMetadata>) -> Self {
        Self { tokens }
    }

    /// Builds the registry from the `[ethereum.tokens]` config table.
    pub fn from_config(tokens: &HashMap<Address, TokenConfig>) -> Self {
        tokens
            .iter()
            .map(|(address, token)| {
                let metadata = TokenMetadata {
                    symbol: token.symbol.clone(),
                    decimals: token.decimals,
                };
                (*address, metadata)
            })
            .collect()
    }

    /// How many tokens are registered.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token is registered.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<(Address, TokenMetadata)> for StaticTokenRegistry {
    fn from_iter<T: IntoIterator<Item = (Address, TokenMetadata)>>(
        iter: T,
    ) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl TokenRegistry for StaticTokenRegistry {
    fn lookup(&self, token: &Address) -> Option<TokenMetadata> {
        self.tokens.get(token).cloned()
    }
}
