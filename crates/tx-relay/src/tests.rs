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

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use ebrelayer_types::passphrase::Passphrase;
use ebrelayer_types::{Coin, WitnessClaim};
use ebrelayer_utils::{Error, Rejection};
use ethers::types::{Address, U256};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::test_utils::setup_tracing;
use crate::*;

const BLOCK_TIME: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone)]
enum Script {
    Reject(Rejection),
    Unreachable,
}

#[derive(Default)]
struct Chain {
    sequences: HashMap<String, u64>,
    script: VecDeque<Script>,
    submissions: Vec<(String, u64)>,
    in_flight: HashMap<String, usize>,
    max_in_flight: usize,
    account_queries: usize,
    unreachable_queries: bool,
    refused_nonces: HashSet<u64>,
    broadcasts: usize,
}

/// A destination chain that checks sequences like the real one.
#[derive(Default)]
struct MockChain {
    inner: Mutex<Chain>,
    broadcast_delay: Duration,
}

impl MockChain {
    fn with_accounts(accounts: &[(&str, u64)]) -> Self {
        let chain = Self::default();
        chain.inner.lock().sequences = accounts
            .iter()
            .map(|(address, sequence)| (address.to_string(), *sequence))
            .collect();
        chain
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.broadcast_delay = delay;
        self
    }

    fn sequence_of(&self, address: &str) -> u64 {
        self.inner.lock().sequences[address]
    }
}

#[async_trait::async_trait]
impl DestinationClient for MockChain {
    async fn query_account(
        &self,
        address: &str,
    ) -> ebrelayer_utils::Result<AccountSnapshot> {
        let mut chain = self.inner.lock();
        chain.account_queries += 1;
        if chain.unreachable_queries {
            return Err(Error::Generic("lcd unreachable"));
        }
        let sequence = *chain.sequences.get(address).ok_or_else(|| {
            Error::AccountNotFound {
                address: address.to_owned(),
            }
        })?;
        Ok(AccountSnapshot {
            address: address.to_owned(),
            account_number: 1,
            sequence,
            coins: vec![Coin::new(U256::from(100), "stake")],
        })
    }

    async fn broadcast_claim(
        &self,
        _credential: &SigningCredential,
        tx: &ClaimTx,
    ) -> ebrelayer_utils::Result<BroadcastOutcome> {
        let validator = tx.msg.validator.clone();
        {
            let mut chain = self.inner.lock();
            let in_flight = chain.in_flight.entry(validator.clone()).or_default();
            *in_flight += 1;
            let in_flight = *in_flight;
            chain.max_in_flight = chain.max_in_flight.max(in_flight);
        }
        tokio::time::sleep(self.broadcast_delay).await;
        let mut chain = self.inner.lock();
        if let Some(n) = chain.in_flight.get_mut(&validator) {
            *n -= 1;
        }
        chain.broadcasts += 1;
        if chain.refused_nonces.contains(&tx.msg.nonce) {
            return Ok(BroadcastOutcome::Rejected(Rejection::Other {
                code: 101,
                log: String::from("claim already made by validator"),
            }));
        }
        match chain.script.pop_front() {
            Some(Script::Reject(rejection)) => {
                return Ok(BroadcastOutcome::Rejected(rejection))
            }
            Some(Script::Unreachable) => {
                return Err(Error::Generic("connection refused"))
            }
            None => {}
        }
        let expected = chain.sequences.get(&validator).copied().unwrap_or_default();
        if tx.sequence != expected {
            return Ok(BroadcastOutcome::Rejected(Rejection::BadSequence {
                expected: Some(expected),
            }));
        }
        chain.sequences.insert(validator.clone(), expected + 1);
        chain.submissions.push((validator, tx.sequence));
        Ok(BroadcastOutcome::Accepted {
            sequence: tx.sequence,
            tx_hash: format!("{:064X}", chain.submissions.len()),
        })
    }
}

struct MockKeyStore {
    keys: Vec<KeyInfo>,
}

impl MockKeyStore {
    fn new(names: &[&str]) -> Self {
        let keys = names
            .iter()
            .map(|name| KeyInfo {
                name: name.to_string(),
                address: format!("cosmos1{name}"),
                public_key: format!("cosmospub1{name}"),
            })
            .collect();
        Self { keys }
    }
}

#[async_trait::async_trait]
impl KeyStore for MockKeyStore {
    async fn list_accounts(&self) -> ebrelayer_utils::Result<Vec<KeyInfo>> {
        Ok(self.keys.clone())
    }

    async fn export_signing_key(
        &self,
        name: &str,
        passphrase: &Passphrase,
    ) -> ebrelayer_utils::Result<SigningCredential> {
        if passphrase.expose() != "12345678" {
            return Err(Error::Generic("wrong passphrase"));
        }
        Ok(SigningCredential::new(name, passphrase.clone()))
    }
}

fn claim(nonce: u64) -> WitnessClaim {
    WitnessClaim::new(
        nonce,
        Address::repeat_byte(0x7b),
        "cosmos1gn8409qq9hnrxde37kuxwx5hrxpfpv8426szuv",
        "ethereum",
        U256::from(5),
    )
}

fn identity(
    name: &str,
    chain: &Arc<MockChain>,
    sequence: u64,
    threshold: u32,
) -> Arc<ValidatorIdentity> {
    Arc::new(ValidatorIdentity::for_tests(
        0,
        name,
        chain.clone(),
        sequence,
        BLOCK_TIME,
        threshold,
    ))
}

fn options(prefix: &str, passphrase: &str) -> SpawnOptions {
    SpawnOptions::builder()
        .prefix(prefix)
        .passphrase(Passphrase::new(passphrase).unwrap())
        .chain_id("testing")
        .block_time(Duration::from_millis(10))
        .build()
}

#[tokio::test]
async fn sequence_moves_up_by_one_per_success() {
    let chain = Arc::new(MockChain::with_accounts(&[("cosmos1validator", 4)]));
    let validator = identity("validator", &chain, 4, 200);
    let stats = RelayStats::new();

    for nonce in 0..5 {
        let outcome = validator.relay(&claim(nonce), &stats).await;
        assert!(outcome.is_relayed());
    }

    let used: Vec<_> = chain
        .inner
        .lock()
        .submissions
        .iter()
        .map(|(_, sequence)| *sequence)
        .collect();
    assert_eq!(used, vec![4, 5, 6, 7, 8]);
    assert_eq!(validator.sequence().await, 9);
    assert_eq!(stats.snapshot().successes, 5);
    assert_eq!(chain.inner.lock().account_queries, 0);
}

#[tokio::test(start_paused = true)]
async fn submissions_through_one_identity_never_overlap() {
    let _guard = setup_tracing();
    let chain = Arc::new(
        MockChain::with_accounts(&[("cosmos1validator", 0)])
            .slow(Duration::from_millis(100)),
    );
    let validator = identity("validator", &chain, 0, 200);
    let stats = Arc::new(RelayStats::new());

    let attempts: Vec<_> = (0..8)
        .map(|nonce| {
            let validator = validator.clone();
            let stats = stats.clone();
            tokio::spawn(async move { validator.relay(&claim(nonce), &stats).await })
        })
        .collect();
    for attempt in attempts {
        assert!(attempt.await.unwrap().is_relayed());
    }

    let chain = chain.inner.lock();
    assert_eq!(chain.max_in_flight, 1);
    let used: Vec<_> = chain.submissions.iter().map(|(_, s)| *s).collect();
    assert_eq!(used, (0..8).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn rejected_sequence_is_resynced() {
    let chain = Arc::new(MockChain::with_accounts(&[("cosmos1validator", 10)]));
    // the local sequence is stale, the chain is at 10.
    let validator = identity("validator", &chain, 3, 200);
    let stats = RelayStats::new();

    let first = validator.relay(&claim(1), &stats).await;
    assert!(matches!(
        first,
        RelayOutcome::Failed(Error::SubmissionRejected(Rejection::BadSequence {
            expected: Some(10)
        }))
    ));
    assert_eq!(validator.sequence().await, 10);

    let second = validator.relay(&claim(1), &stats).await;
    assert!(matches!(second, RelayOutcome::Relayed { sequence: 10, .. }));

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.successes, 1);
    assert_eq!(snapshot.errors, 1);
    assert_eq!(validator.sequence().await, 11);
}

#[tokio::test(start_paused = true)]
async fn failed_resync_keeps_the_local_sequence() {
    let chain = Arc::new(MockChain::with_accounts(&[("cosmos1validator", 0)]));
    {
        let mut inner = chain.inner.lock();
        inner.script.push_back(Script::Unreachable);
        inner.unreachable_queries = true;
    }
    let validator = identity("validator", &chain, 0, 200);
    let stats = RelayStats::new();

    let started = tokio::time::Instant::now();
    let outcome = validator.relay(&claim(1), &stats).await;

    assert!(matches!(outcome, RelayOutcome::Failed(Error::Generic(_))));
    assert!(started.elapsed() >= BLOCK_TIME);
    assert_eq!(validator.sequence().await, 0);
    assert_eq!(stats.snapshot().errors, 1);
    assert_eq!(stats.snapshot().resequences, 0);
}

#[tokio::test(start_paused = true)]
async fn resequence_is_forced_every_threshold_successes() {
    let chain = Arc::new(MockChain::with_accounts(&[("cosmos1validator", 0)]));
    let validator = identity("validator", &chain, 0, 3);
    let stats = RelayStats::new();

    for nonce in 0..3 {
        validator.relay(&claim(nonce), &stats).await;
    }
    assert_eq!(chain.inner.lock().account_queries, 1);
    assert_eq!(stats.snapshot().resequences, 1);

    // someone else used the account in the meantime: one rejection and
    // resync, then three more successes until the next forced resequence.
    chain.inner.lock().sequences.insert(String::from("cosmos1validator"), 7);
    for nonce in 3..7 {
        validator.relay(&claim(nonce), &stats).await;
    }
    assert_eq!(chain.inner.lock().account_queries, 3);
    assert_eq!(validator.sequence().await, chain.sequence_of("cosmos1validator"));
}

#[tokio::test]
async fn spawns_one_validator_per_matching_key() {
    let chain = Arc::new(MockChain::with_accounts(&[
        ("cosmos1validator-b", 2),
        ("cosmos1validator-a", 5),
        ("cosmos1faucet", 0),
    ]));
    let key_store =
        MockKeyStore::new(&["validator-b", "faucet", "validator-a", "validator-c"]);

    let validators =
        spawn_validators(&key_store, chain.clone(), &options("validator", "12345678"))
            .await
            .unwrap();

    // validator-c has no account on chain and is skipped.
    let names: Vec<_> = validators.iter().map(|v| v.name().to_owned()).collect();
    assert_eq!(names, vec!["validator-a", "validator-b"]);
    assert_eq!(validators[0].index(), 0);
    assert_eq!(validators[1].index(), 1);
    assert_eq!(validators[0].sequence().await, 5);
    assert_eq!(validators[1].sequence().await, 2);
    assert_eq!(validators[0].balance().await.len(), 1);
}

#[tokio::test]
async fn no_validators_is_fatal() {
    let chain = Arc::new(MockChain::with_accounts(&[("cosmos1validator", 0)]));
    let key_store = MockKeyStore::new(&["validator"]);

    let err = spawn_validators(&key_store, chain.clone(), &options("relayer", "12345678"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoValidators { ref prefix } if prefix == "relayer"));

    let err = spawn_validators(&key_store, chain, &options("validator", "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoValidators { .. }));
}

#[test]
fn dispatch_is_round_robin() {
    let chain = Arc::new(MockChain::default());
    let validators = vec![
        identity("a", &chain, 0, 200),
        identity("b", &chain, 0, 200),
        identity("c", &chain, 0, 200),
    ];
    let orchestrator =
        RelayOrchestrator::new(validators, Arc::new(RelayStats::new()), BLOCK_TIME)
            .unwrap();

    let turns: Vec<_> = (0..7)
        .map(|_| orchestrator.next_validator().name().to_owned())
        .collect();
    assert_eq!(turns, vec!["a", "b", "c", "a", "b", "c", "a"]);
}

#[test]
fn orchestrator_needs_validators() {
    let result = RelayOrchestrator::new(
        Vec::new(),
        Arc::new(RelayStats::new()),
        BLOCK_TIME,
    );
    assert!(matches!(result, Err(Error::NoValidators { .. })));
}

#[test]
fn orchestrator_needs_a_rate_limit() {
    let chain = Arc::new(MockChain::with_accounts(&[("cosmos1a", 0)]));
    let result = RelayOrchestrator::new(
        vec![identity("a", &chain, 0, 200)],
        Arc::new(RelayStats::new()),
        Duration::ZERO,
    );
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn only_passing_failures_are_retryable() {
    let failed = |error| RelayOutcome::Failed(error);
    assert!(failed(Error::Generic("connection refused")).is_retryable());
    assert!(failed(Error::SubmissionRejected(Rejection::BadSequence {
        expected: Some(3)
    }))
    .is_retryable());
    assert!(failed(Error::SubmissionRejected(Rejection::InsufficientFee))
        .is_retryable());
    assert!(!failed(Error::SubmissionRejected(Rejection::InvalidSignature))
        .is_retryable());
    assert!(!failed(Error::SubmissionRejected(Rejection::Other {
        code: 101,
        log: String::from("claim already made by validator"),
    }))
    .is_retryable());
    assert!(!RelayOutcome::Relayed {
        sequence: 0,
        tx_hash: String::new(),
    }
    .is_retryable());
}

#[tokio::test(start_paused = true)]
async fn refused_claims_are_dropped() {
    let _guard = setup_tracing();
    let chain = Arc::new(MockChain::with_accounts(&[("cosmos1solo", 0)]));
    chain.inner.lock().refused_nonces.insert(7);
    let stats = Arc::new(RelayStats::new());
    let orchestrator = RelayOrchestrator::new(
        vec![identity("solo", &chain, 0, 200)],
        stats.clone(),
        Duration::from_millis(500),
    )
    .unwrap();

    let (claims_tx, claims_rx) = mpsc::channel(8);
    claims_tx.send(claim(7)).await.unwrap();
    claims_tx.send(claim(8)).await.unwrap();
    drop(claims_tx);
    tokio::time::timeout(Duration::from_secs(600), orchestrator.run(claims_rx))
        .await
        .expect("orchestrator drains")
        .unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.successes, 1);
    assert_eq!(snapshot.errors, 1);
    let chain = chain.inner.lock();
    // the refused claim went out once.
    assert_eq!(chain.broadcasts, 2);
    assert_eq!(chain.submissions, vec![(String::from("cosmos1solo"), 0)]);
}

#[tokio::test(start_paused = true)]
async fn failed_claims_are_relayed_again() {
    let _guard = setup_tracing();
    let chain = Arc::new(MockChain::with_accounts(&[
        ("cosmos1stale", 5),
        ("cosmos1fresh", 0),
    ]));
    let validators = vec![
        identity("stale", &chain, 0, 200),
        identity("fresh", &chain, 0, 200),
    ];
    let stats = Arc::new(RelayStats::new());
    let orchestrator = RelayOrchestrator::new(
        validators,
        stats.clone(),
        Duration::from_millis(500),
    )
    .unwrap();

    let (claims_tx, claims_rx) = mpsc::channel(8);
    for nonce in 1..=4 {
        claims_tx.send(claim(nonce)).await.unwrap();
    }
    drop(claims_tx);
    let started = tokio::time::Instant::now();
    tokio::time::timeout(Duration::from_secs(60), orchestrator.run(claims_rx))
        .await
        .expect("orchestrator drains")
        .unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.successes, 4);
    assert_eq!(snapshot.errors, 1);
    let mut relayed: Vec<_> = chain.inner.lock().submissions.clone();
    relayed.sort();
    assert_eq!(relayed.len(), 4);
    // dispatches are at least one rate limit interval apart.
    assert!(started.elapsed() >= Duration::from_millis(4 * 500));
}
