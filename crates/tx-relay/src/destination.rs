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

use ebrelayer_types::{Coin, WitnessClaim};
use ebrelayer_utils::Rejection;
use ethers::utils::to_checksum;
use serde::Serialize;

use crate::keystore::SigningCredential;

/// A coin as the destination chain encodes it in messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MsgCoin {
    /// The denomination.
    pub denom: String,
    /// The integer amount, in decimal.
    pub amount: String,
}

impl From<Coin> for MsgCoin {
    fn from(coin: Coin) -> Self {
        Self {
            denom: coin.denom,
            amount: coin.amount.to_string(),
        }
    }
}

/// The claim a validator attests to on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimMsg {
    /// The nonce of the lock.
    pub nonce: u64,
    /// The checksummed address of the locker.
    pub ethereum_sender: String,
    /// Who receives the funds.
    pub cosmos_receiver: String,
    /// The attesting validator.
    pub validator: String,
    /// What is received.
    pub amount: Vec<MsgCoin>,
}

impl ClaimMsg {
    /// The message type on the destination chain.
    pub const TYPE: &'static str = "ethbridge/MsgMakeEthBridgeClaim";

    /// The message `validator` submits for `claim`.
    pub fn new(claim: &WitnessClaim, validator: impl Into<String>) -> Self {
        Self {
            nonce: claim.nonce(),
            ethereum_sender: to_checksum(&claim.ethereum_sender(), None),
            cosmos_receiver: claim.cosmos_receiver().to_owned(),
            validator: validator.into(),
            amount: vec![claim.coin().into()],
        }
    }
}

/// A claim message plus everything needed to sign it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimTx {
    /// The message.
    pub msg: ClaimMsg,
    /// The destination chain id.
    pub chain_id: String,
    /// Account number of the signer.
    pub account_number: u64,
    /// Sequence the transaction is signed at.
    pub sequence: u64,
}

/// The on chain state of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// The account address.
    pub address: String,
    /// The account number.
    pub account_number: u64,
    /// The sequence of the next transaction.
    pub sequence: u64,
    /// The balance.
    pub coins: Vec<Coin>,
}

/// What the destination chain made of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Included in the mempool at `sequence`.
    Accepted {
        /// The sequence the transaction consumed.
        sequence: u64,
        /// Hash of the transaction.
        tx_hash: String,
    },
    /// Refused.
    Rejected(Rejection),
}

/// The destination chain, as seen by a validator.
#[async_trait::async_trait]
pub trait DestinationClient: Send + Sync {
    /// The current state of `address`.
    async fn query_account(
        &self,
        address: &str,
    ) -> ebrelayer_utils::Result<AccountSnapshot>;

    /// Signs `tx` with `credential` and broadcasts it.
    ///
    /// `Err` means the chain could not be reached, a refusal is
    /// `Ok(BroadcastOutcome::Rejected)`.
    async fn broadcast_claim(
        &self,
        credential: &SigningCredential,
        tx: &ClaimTx,
    ) -> ebrelayer_utils::Result<BroadcastOutcome>;
}
