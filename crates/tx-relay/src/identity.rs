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

use std::sync::Arc;
use std::time::Duration;

use ebrelayer_config::cosmos::CosmosConfig;
use ebrelayer_config::relay::RelayConfig;
use ebrelayer_types::passphrase::Passphrase;
use ebrelayer_types::{Coin, WitnessClaim};
use ebrelayer_utils::retry::ConstantWithMaxRetryCount;
use ebrelayer_utils::{probe, Error, Rejection};
use futures::StreamExt;
use tokio::sync::{Mutex, MutexGuard};
use typed_builder::TypedBuilder;

use crate::destination::{
    AccountSnapshot, BroadcastOutcome, ClaimMsg, ClaimTx, DestinationClient,
};
use crate::keystore::{KeyInfo, KeyStore, SigningCredential};
use crate::stats::RelayStats;

/// How many times the first account query of a validator is retried.
const INIT_RETRY_COUNT: usize = 3;

/// The part of a validator that changes while relaying. Guarded by the
/// availability gate.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IdentityState {
    sequence: u64,
    account_number: u64,
    consecutive_submissions: u32,
    balance: Vec<Coin>,
}

impl From<AccountSnapshot> for IdentityState {
    fn from(account: AccountSnapshot) -> Self {
        Self {
            sequence: account.sequence,
            account_number: account.account_number,
            consecutive_submissions: 0,
            balance: account.coins,
        }
    }
}

/// What happened to one claim submission.
#[derive(Debug)]
pub enum RelayOutcome {
    /// Accepted by the destination chain.
    Relayed {
        /// The sequence the transaction was signed at.
        sequence: u64,
        /// Hash of the transaction.
        tx_hash: String,
    },
    /// Not accepted.
    Failed(Error),
}

impl RelayOutcome {
    /// Whether the claim made it.
    pub fn is_relayed(&self) -> bool {
        matches!(self, RelayOutcome::Relayed { .. })
    }

    /// Whether submitting the same claim again may succeed.
    ///
    /// Transport errors, stale sequences and fee or balance shortfalls pass
    /// with time. A bad signature or a claim the chain refuses outright, such
    /// as a nonce it already holds, never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayOutcome::Relayed { .. } => false,
            RelayOutcome::Failed(Error::SubmissionRejected(
                Rejection::InvalidSignature | Rejection::Other { .. },
            )) => false,
            RelayOutcome::Failed(_) => true,
        }
    }
}

/// One validator account submitting claims.
///
/// Submissions through the same identity never overlap: each one holds the
/// identity's gate from signing until its sequence bookkeeping is done.
pub struct ValidatorIdentity {
    index: usize,
    name: String,
    address: String,
    chain_id: String,
    credential: SigningCredential,
    client: Arc<dyn DestinationClient>,
    state: Mutex<IdentityState>,
    block_time: Duration,
    resequence_threshold: u32,
}

impl std::fmt::Debug for ValidatorIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorIdentity")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl ValidatorIdentity {
    /// Position in the validator pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name of the key in the key store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The account address, also the attester of every claim.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The sequence the next submission will be signed at.
    ///
    /// Waits for the submission in flight, if any.
    pub async fn sequence(&self) -> u64 {
        self.state.lock().await.sequence
    }

    /// The balance seen at the last account query.
    pub async fn balance(&self) -> Vec<Coin> {
        self.state.lock().await.balance.clone()
    }

    /// Whether a submission is in flight.
    pub fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// Submits one claim and settles the sequence before returning.
    ///
    /// On success the sequence moves up by one. On failure the sequence is
    /// refreshed from the destination chain, one block later.
    #[tracing::instrument(
        skip_all,
        fields(validator = %self.name, nonce = claim.nonce()),
    )]
    pub async fn relay(
        &self,
        claim: &WitnessClaim,
        stats: &RelayStats,
    ) -> RelayOutcome {
        let mut state = self.state.lock().await;
        let tx = ClaimTx {
            msg: ClaimMsg::new(claim, self.address.clone()),
            chain_id: self.chain_id.clone(),
            account_number: state.account_number,
            sequence: state.sequence,
        };
        let submitted = match self.client.broadcast_claim(&self.credential, &tx).await {
            Ok(BroadcastOutcome::Accepted { tx_hash, .. }) => Ok(tx_hash),
            Ok(BroadcastOutcome::Rejected(rejection)) => {
                Err(Error::SubmissionRejected(rejection))
            }
            Err(e) => Err(e),
        };
        match submitted {
            Ok(tx_hash) => {
                let sequence = tx.sequence;
                state.sequence = sequence + 1;
                state.consecutive_submissions += 1;
                stats.record_success();
                tracing::info!(sequence, %tx_hash, "relayed {}", claim);
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Relay,
                    validator = %self.name,
                    nonce = claim.nonce(),
                    sequence,
                    success = true,
                );
                if state.consecutive_submissions >= self.resequence_threshold {
                    tracing::debug!(
                        submissions = state.consecutive_submissions,
                        "forcing a resequence"
                    );
                    // let the last submission land first.
                    tokio::time::sleep(self.block_time).await;
                    self.resequence(&mut state, stats).await;
                }
                RelayOutcome::Relayed { sequence, tx_hash }
            }
            Err(error) => {
                stats.record_error();
                tracing::warn!(sequence = tx.sequence, %error, "failed to relay {}", claim);
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Relay,
                    validator = %self.name,
                    nonce = claim.nonce(),
                    sequence = tx.sequence,
                    success = false,
                );
                tokio::time::sleep(self.block_time).await;
                self.resequence(&mut state, stats).await;
                RelayOutcome::Failed(error)
            }
        }
    }

    /// Overwrites the local sequence with the chain's. Keeps the old one if
    /// the chain cannot be queried.
    async fn resequence(
        &self,
        state: &mut MutexGuard<'_, IdentityState>,
        stats: &RelayStats,
    ) {
        state.consecutive_submissions = 0;
        match self.client.query_account(&self.address).await {
            Ok(account) => {
                let previous = state.sequence;
                **state = IdentityState::from(account);
                stats.record_resequence();
                tracing::debug!(previous, current = state.sequence, "resequenced");
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Resequence,
                    validator = %self.name,
                    previous,
                    current = state.sequence,
                );
            }
            Err(e) => {
                tracing::warn!(%e, sequence = state.sequence, "resequence failed, keeping the local sequence");
            }
        }
    }
}

/// How the validator pool is built.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SpawnOptions {
    /// Only keys whose name starts with this become validators.
    #[builder(setter(into))]
    pub prefix: String,
    /// Unlocks the validator keys.
    pub passphrase: Passphrase,
    /// The destination chain id.
    #[builder(setter(into))]
    pub chain_id: String,
    /// Wait before refreshing a sequence after a failure.
    #[builder(default = Duration::from_secs(1))]
    pub block_time: Duration,
    /// Successful submissions between two forced resequences.
    #[builder(default = 200)]
    pub resequence_threshold: u32,
    /// Validators initialized at the same time.
    #[builder(default = 50)]
    pub concurrency: usize,
}

impl SpawnOptions {
    /// Options from the relayer config sections.
    pub fn from_config(cosmos: &CosmosConfig, relay: &RelayConfig) -> Self {
        Self::builder()
            .prefix(cosmos.validator_prefix.clone())
            .passphrase(cosmos.validator_passphrase.clone())
            .chain_id(cosmos.chain_id.clone())
            .block_time(relay.block_time())
            .resequence_threshold(relay.resequence_threshold)
            .concurrency(relay.spawn_concurrency)
            .build()
    }
}

/// Builds one [`ValidatorIdentity`] per key store account matching the
/// prefix, starting at the sequence the chain reports.
///
/// Accounts that cannot be initialized are skipped. Fails if none is left.
#[tracing::instrument(skip_all, fields(prefix = %options.prefix))]
pub async fn spawn_validators(
    key_store: &dyn KeyStore,
    client: Arc<dyn DestinationClient>,
    options: &SpawnOptions,
) -> ebrelayer_utils::Result<Vec<Arc<ValidatorIdentity>>> {
    let mut keys: Vec<_> = key_store
        .list_accounts()
        .await?
        .into_iter()
        .filter(|key| key.name.starts_with(&options.prefix))
        .collect();
    keys.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!("Found #{} validator keys", keys.len());

    let initialized: Vec<_> = futures::stream::iter(keys)
        .map(|key| init_validator(key_store, &client, options, key))
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    let validators: Vec<_> = initialized
        .into_iter()
        .filter_map(|result| match result {
            Ok(parts) => Some(parts),
            Err((name, e)) => {
                tracing::warn!(%name, %e, "skipping validator");
                None
            }
        })
        .enumerate()
        .map(|(index, (key, credential, account))| {
            Arc::new(ValidatorIdentity {
                index,
                name: key.name,
                address: key.address,
                chain_id: options.chain_id.clone(),
                credential,
                client: client.clone(),
                state: Mutex::new(IdentityState::from(account)),
                block_time: options.block_time,
                resequence_threshold: options.resequence_threshold.max(1),
            })
        })
        .collect();

    if validators.is_empty() {
        return Err(Error::NoValidators {
            prefix: options.prefix.clone(),
        });
    }
    tracing::info!("{} validators are online", validators.len());
    Ok(validators)
}

async fn init_validator(
    key_store: &dyn KeyStore,
    client: &Arc<dyn DestinationClient>,
    options: &SpawnOptions,
    key: KeyInfo,
) -> Result<(KeyInfo, SigningCredential, AccountSnapshot), (String, Error)> {
    let credential = key_store
        .export_signing_key(&key.name, &options.passphrase)
        .await
        .map_err(|e| (key.name.clone(), e))?;
    let address = key.address.as_str();
    let backoff =
        ConstantWithMaxRetryCount::new(options.block_time, INIT_RETRY_COUNT);
    let account = backoff::future::retry(backoff, || async move {
        client.query_account(address).await.map_err(|e| match e {
            e @ Error::AccountNotFound { .. } => backoff::Error::permanent(e),
            e => backoff::Error::transient(e),
        })
    })
    .await
    .map_err(|e| (key.name.clone(), e))?;
    tracing::debug!(
        name = %key.name,
        sequence = account.sequence,
        account_number = account.account_number,
        "validator initialized"
    );
    Ok((key, credential, account))
}

#[cfg(test)]
impl ValidatorIdentity {
    /// An identity that skips the key store, for tests.
    pub(crate) fn for_tests(
        index: usize,
        name: &str,
        client: Arc<dyn DestinationClient>,
        sequence: u64,
        block_time: Duration,
        resequence_threshold: u32,
    ) -> Self {
        Self {
            index,
            name: name.to_owned(),
            address: format!("cosmos1{name}"),
            chain_id: String::from("testing"),
            credential: SigningCredential::new(
                name,
                Passphrase::new("12345678").unwrap(),
            ),
            client,
            state: Mutex::new(IdentityState {
                sequence,
                account_number: 0,
                consecutive_submissions: 0,
                balance: Vec::new(),
            }),
            block_time,
            resequence_threshold,
        }
    }
}
