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

use ebrelayer_types::EventKind;
use ebrelayer_utils::Error;
use ethers::types::{Address, H256, U256};

/// The fields of a `LogLock` event, by topic position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLockFields {
    /// Who locked the funds.
    pub sender: Address,
    /// Who receives them on the destination chain.
    pub recipient: String,
    /// The locked amount, in the token's smallest unit.
    pub amount: U256,
    /// The nonce the contract assigned to this lock.
    pub nonce: u64,
    /// The locked token, zero for the native asset.
    pub token: Address,
}

/// Every event the normalizer understands, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportedEvent {
    /// Funds locked in the bridge contract.
    LogLock(LogLockFields),
}

impl SupportedEvent {
    /// Decodes the topics of an event of the given kind.
    pub fn decode(
        kind: EventKind,
        topics: &[H256],
    ) -> ebrelayer_utils::Result<Self> {
        match kind {
            EventKind::LogLock => LogLockFields::decode(topics).map(Self::LogLock),
        }
    }
}

impl LogLockFields {
    fn decode(topics: &[H256]) -> ebrelayer_utils::Result<Self> {
        let sender = address_at(topic(topics, 1, "sender")?);
        let recipient = format!("{:#x}", address_at(topic(topics, 2, "recipient")?));
        let amount = U256::from_big_endian(topic(topics, 3, "amount")?.as_bytes());
        let nonce = U256::from_big_endian(topic(topics, 4, "nonce")?.as_bytes());
        if nonce > U256::from(u64::MAX) {
            return Err(Error::MalformedEvent {
                field: "nonce",
                reason: format!("{nonce} does not fit in 64 bits"),
            });
        }
        let token = topics.get(5).map(address_at).unwrap_or_else(Address::zero);
        Ok(Self {
            sender,
            recipient,
            amount,
            nonce: nonce.as_u64(),
            token,
        })
    }
}

fn topic<'a>(
    topics: &'a [H256],
    index: usize,
    field: &'static str,
) -> ebrelayer_utils::Result<&'a H256> {
    topics.get(index).ok_or_else(|| Error::MalformedEvent {
        field,
        reason: format!("missing topic {index}"),
    })
}

/// An indexed address is the last 20 bytes of its topic.
fn address_at(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}
