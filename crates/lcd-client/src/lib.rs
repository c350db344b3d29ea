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

//! A client for the REST (LCD) server of the destination chain.
//!
//! The LCD server holds the validator keys, so the same client is both the
//! [`KeyStore`] and the [`DestinationClient`] of the relay pool.

use ebrelayer_config::cosmos::CosmosConfig;
use ebrelayer_config::defaults;
use ebrelayer_tx_relay::{
    AccountSnapshot, BroadcastOutcome, ClaimTx, DestinationClient, KeyInfo,
    KeyStore, SigningCredential,
};
use ebrelayer_types::passphrase::Passphrase;
use ebrelayer_types::rpc_url::RpcUrl;
use ebrelayer_utils::{Error, Rejection};
use reqwest::StatusCode;
use typed_builder::TypedBuilder;

mod wire;

use wire::{AccountBody, ClaimRequest, Envelope, ErrorBody, KeyOutput, TxResponse};


/// Talks to the LCD server of the destination chain.
#[derive(Debug, Clone, TypedBuilder)]
pub struct LcdClient {
    /// Base URL of the LCD server.
    endpoint: RpcUrl,
    /// Route that accepts claims, relative to the endpoint.
    #[builder(default = defaults::claim_route(), setter(into))]
    claim_route: String,
    #[builder(default)]
    http: reqwest::Client,
}

impl LcdClient {
    /// A client for the LCD server in `config`.
    pub fn from_config(config: &CosmosConfig) -> ebrelayer_utils::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::builder()
            .endpoint(config.lcd_endpoint.clone())
            .claim_route(config.claim_route.clone())
            .http(http)
            .build())
    }

    fn url(&self, route: &str) -> ebrelayer_utils::Result<url::Url> {
        Ok(self.endpoint.join_route(route)?)
    }
}

/// Reads the error message of a failed response.
async fn lcd_error(status: StatusCode, response: reqwest::Response) -> Error {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Error::Lcd {
        status: status.as_u16(),
        message,
    }
}

#[async_trait::async_trait]
impl KeyStore for LcdClient {
    #[tracing::instrument(skip_all)]
    async fn list_accounts(&self) -> ebrelayer_utils::Result<Vec<KeyInfo>> {
        let response = self.http.get(self.url("keys")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(lcd_error(status, response).await);
        }
        let keys: Envelope<Vec<KeyOutput>> = response.json().await?;
        Ok(keys.into_inner().into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(skip(self, passphrase))]
    async fn export_signing_key(
        &self,
        name: &str,
        passphrase: &Passphrase,
    ) -> ebrelayer_utils::Result<SigningCredential> {
        // the key never leaves the keybase, only check that it is there.
        let response = self
            .http
            .get(self.url(&format!("keys/{name}"))?)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(lcd_error(status, response).await);
        }
        Ok(SigningCredential::new(name, passphrase.clone()))
    }
}

#[async_trait::async_trait]
impl DestinationClient for LcdClient {
    #[tracing::instrument(skip(self))]
    async fn query_account(
        &self,
        address: &str,
    ) -> ebrelayer_utils::Result<AccountSnapshot> {
        let response = self
            .http
            .get(self.url(&format!("auth/accounts/{address}"))?)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Err(Error::AccountNotFound {
                address: address.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(lcd_error(status, response).await);
        }
        let account: Envelope<AccountBody> = response.json().await?;
        account.into_inner().into_snapshot(address)
    }

    #[tracing::instrument(
        skip_all,
        fields(validator = %credential.name(), sequence = tx.sequence),
    )]
    async fn broadcast_claim(
        &self,
        credential: &SigningCredential,
        tx: &ClaimTx,
    ) -> ebrelayer_utils::Result<BroadcastOutcome> {
        let request = ClaimRequest::new(credential, tx);
        let response = self
            .http
            .post(self.url(&self.claim_route)?)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let error = lcd_error(status, response).await;
            // the rest server reports signature errors as plain errors.
            if let Error::Lcd { message, .. } = &error {
                if let Some(expected) = expected_sequence(message) {
                    return Ok(BroadcastOutcome::Rejected(
                        Rejection::BadSequence {
                            expected: Some(expected),
                        },
                    ));
                }
            }
            return Err(error);
        }
        let result: TxResponse = response.json().await?;
        if let Some(message) = result.error {
            return Err(Error::Lcd {
                status: status.as_u16(),
                message,
            });
        }
        if result.code == 0 {
            tracing::trace!(txhash = %result.txhash, "claim accepted");
            Ok(BroadcastOutcome::Accepted {
                sequence: tx.sequence,
                tx_hash: result.txhash,
            })
        } else {
            Ok(BroadcastOutcome::Rejected(rejection(
                result.code,
                result.raw_log,
            )))
        }
    }
}

/// Maps an ABCI result code to why the transaction was refused.
pub fn rejection(code: u32, raw_log: String) -> Rejection {
    match code {
        3 => Rejection::BadSequence {
            expected: expected_sequence(&raw_log),
        },
        4 => Rejection::InvalidSignature,
        5 | 10 => Rejection::InsufficientFunds,
        14 => Rejection::InsufficientFee,
        code => Rejection::Other { code, log: raw_log },
    }
}

/// Finds `expected N` in a sequence mismatch log.
fn expected_sequence(log: &str) -> Option<u64> {
    log.split("expected ")
        .nth(1)?
        .split(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()
}
