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

use ebrelayer_tx_relay::{AccountSnapshot, ClaimMsg, ClaimTx, KeyInfo, SigningCredential};
use ebrelayer_types::Coin;
use ebrelayer_utils::Error;
use ethers::types::U256;
use serde::{Deserialize, Deserializer, Serialize};

/// Responses come either bare or wrapped as `{height, result}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { result: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { result } => result,
            Envelope::Bare(inner) => inner,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyOutput {
    name: String,
    address: String,
    #[serde(default)]
    pub_key: String,
}

impl From<KeyOutput> for KeyInfo {
    fn from(key: KeyOutput) -> Self {
        KeyInfo {
            name: key.name,
            address: key.address,
            public_key: key.pub_key,
        }
    }
}

/// An account, optionally tagged with its amino type.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AccountBody {
    Typed { value: BaseAccount },
    Plain(BaseAccount),
}

impl AccountBody {
    pub fn into_snapshot(
        self,
        queried: &str,
    ) -> ebrelayer_utils::Result<AccountSnapshot> {
        let account = match self {
            AccountBody::Typed { value } => value,
            AccountBody::Plain(account) => account,
        };
        let coins = account
            .coins
            .into_iter()
            .map(|coin| {
                U256::from_dec_str(&coin.amount)
                    .map(|amount| Coin::new(amount, coin.denom))
                    .map_err(|e| Error::Lcd {
                        status: 200,
                        message: format!("invalid coin amount {}: {e}", coin.amount),
                    })
            })
            .collect::<ebrelayer_utils::Result<_>>()?;
        let address = if account.address.is_empty() {
            queried.to_owned()
        } else {
            account.address
        };
        Ok(AccountSnapshot {
            address,
            account_number: account.account_number,
            sequence: account.sequence,
            coins,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BaseAccount {
    #[serde(default)]
    address: String,
    #[serde(default)]
    coins: Vec<WireCoin>,
    #[serde(deserialize_with = "u64_from_str_or_int")]
    account_number: u64,
    #[serde(deserialize_with = "u64_from_str_or_int")]
    sequence: u64,
}

#[derive(Debug, Deserialize)]
struct WireCoin {
    denom: String,
    amount: String,
}

fn u64_from_str_or_int<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrInt {
        Int(u64),
        Str(String),
    }
    match StrOrInt::deserialize(deserializer)? {
        StrOrInt::Int(n) => Ok(n),
        StrOrInt::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Serialize)]
struct BaseReq<'a> {
    from: &'a str,
    password: &'a str,
    chain_id: &'a str,
    account_number: String,
    sequence: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimRequest<'a> {
    base_req: BaseReq<'a>,
    #[serde(flatten)]
    msg: &'a ClaimMsg,
}

impl<'a> ClaimRequest<'a> {
    pub fn new(credential: &'a SigningCredential, tx: &'a ClaimTx) -> Self {
        Self {
            base_req: BaseReq {
                from: credential.name(),
                password: credential.passphrase().expose(),
                chain_id: &tx.chain_id,
                account_number: tx.account_number.to_string(),
                sequence: tx.sequence.to_string(),
            },
            msg: &tx.msg,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TxResponse {
    #[serde(default)]
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
    #[serde(default)]
    pub error: Option<String>,
}
