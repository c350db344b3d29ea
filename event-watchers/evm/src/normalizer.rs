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

use ebrelayer_config::defaults;
use ebrelayer_config::ethereum::EthereumConfig;
use ebrelayer_event_watcher_traits::EventNormalizer;
use ebrelayer_types::{ChainEvent, EventKind, WitnessClaim};
use ebrelayer_utils::Error;
use ethers::types::U256;

use crate::lock_event::{LogLockFields, SupportedEvent};
use crate::tokens::{StaticTokenRegistry, TokenRegistry};

/// Turns `LogLock` observations into claims.
///
/// Amounts are rescaled from the token decimals to whole destination units,
/// truncating.
#[derive(Debug, Clone)]
pub struct LockEventNormalizer<R = StaticTokenRegistry> {
    native_denom: String,
    registry: R,
}

impl<R: TokenRegistry> LockEventNormalizer<R> {
    /// Creates a new normalizer. `native_denom` is used for locks of the
    /// native asset (zero token address).
    pub fn new(native_denom: impl Into<String>, registry: R) -> Self {
        Self {
            native_denom: native_denom.into(),
            registry,
        }
    }

    fn lock_claim(
        &self,
        fields: LogLockFields,
    ) -> ebrelayer_utils::Result<WitnessClaim> {
        let (denom, decimals) = if fields.token.is_zero() {
            (self.native_denom.clone(), defaults::native_decimals())
        } else {
            let token = self.registry.lookup(&fields.token).ok_or_else(|| {
                Error::UnknownToken {
                    token: format!("{:#x}", fields.token),
                }
            })?;
            (token.symbol, token.decimals)
        };
        Ok(WitnessClaim::new(
            fields.nonce,
            fields.sender,
            fields.recipient,
            denom,
            rescale(fields.amount, decimals),
        ))
    }
}

impl LockEventNormalizer<StaticTokenRegistry> {
    /// A normalizer for the source chain in `config`.
    pub fn from_config(config: &EthereumConfig) -> Self {
        Self::new(
            config.native_denom.clone(),
            StaticTokenRegistry::from_config(&config.tokens),
        )
    }
}

impl<R: TokenRegistry> EventNormalizer for LockEventNormalizer<R> {
    fn normalize(
        &self,
        event: &ChainEvent,
    ) -> ebrelayer_utils::Result<WitnessClaim> {
        let kind: EventKind = event.name().parse()?;
        match SupportedEvent::decode(kind, event.topics())? {
            SupportedEvent::LogLock(fields) => self.lock_claim(fields),
        }
    }
}

/// `amount / 10^decimals`, zero when the scale does not fit in 256 bits.
fn rescale(amount: U256, decimals: u8) -> U256 {
    U256::from(10u8)
        .checked_pow(U256::from(decimals))
        .map_or_else(U256::zero, |scale| amount / scale)
}
