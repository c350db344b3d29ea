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

use ethers::types::{Address, U256};
use serde::Serialize;

/// An amount of one denomination on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coin {
    /// The denomination symbol.
    pub denom: String,
    /// The integer amount in that denomination.
    pub amount: U256,
}

impl Coin {
    /// Creates a new coin.
    pub fn new(amount: U256, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl std::fmt::Display for Coin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// A lock on the source chain, normalized into the fact the destination
/// chain's oracle attests to.
///
/// Claims are built by the event normalizer and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessClaim {
    nonce: u64,
    ethereum_sender: Address,
    cosmos_receiver: String,
    token_denomination: String,
    amount: U256,
}

impl WitnessClaim {
    /// Creates a claim. `amount` must already be in destination units.
    pub fn new(
        nonce: u64,
        ethereum_sender: Address,
        cosmos_receiver: impl Into<String>,
        token_denomination: impl Into<String>,
        amount: U256,
    ) -> Self {
        Self {
            nonce,
            ethereum_sender,
            cosmos_receiver: cosmos_receiver.into(),
            token_denomination: token_denomination.into(),
            amount,
        }
    }

    /// The nonce the bridge contract assigned to the lock.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Who locked the funds on the source chain.
    pub fn ethereum_sender(&self) -> Address {
        self.ethereum_sender
    }

    /// Who receives the funds on the destination chain.
    pub fn cosmos_receiver(&self) -> &str {
        &self.cosmos_receiver
    }

    /// The destination denomination of the locked token.
    pub fn token_denomination(&self) -> &str {
        &self.token_denomination
    }

    /// The rescaled amount.
    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// The amount together with its denomination.
    pub fn coin(&self) -> Coin {
        Coin::new(self.amount, self.token_denomination.clone())
    }
}

impl std::fmt::Display for WitnessClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "claim #{} of {} from {:#x} to {}",
            self.nonce,
            self.coin(),
            self.ethereum_sender,
            self.cosmos_receiver
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_amount_with_denom() {
        let claim = WitnessClaim::new(
            7,
            Address::repeat_byte(0xab),
            "cosmos1gn8409qq9hnrxde37kuxwx5hrxpfpv8426szuv",
            "ethereum",
            U256::from(5u64),
        );
        assert_eq!(claim.coin().to_string(), "5ethereum");
        assert_eq!(
            claim.to_string(),
            "claim #7 of 5ethereum from 0xabababababababababababababababababababab to cosmos1gn8409qq9hnrxde37kuxwx5hrxpfpv8426szuv"
        );
    }
}
