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

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ebrelayer_types::WitnessClaim;
use ebrelayer_utils::{probe, Error};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::identity::{RelayOutcome, ValidatorIdentity};
use crate::stats::RelayStats;

/// Paces claims and hands them to the validators in turn.
///
/// Each claim is submitted in its own task, so a slow validator only holds
/// up the claims given to it. Claims that fail for a passing reason are
/// dispatched again on a later tick, the ones the chain refuses are dropped.
#[derive(Debug)]
pub struct RelayOrchestrator {
    validators: Vec<Arc<ValidatorIdentity>>,
    stats: Arc<RelayStats>,
    rate_limit: Duration,
    next: AtomicUsize,
}

impl RelayOrchestrator {
    /// Creates an orchestrator over a non-empty validator pool.
    ///
    /// At most one claim is dispatched every `rate_limit`, which must not be
    /// zero.
    pub fn new(
        validators: Vec<Arc<ValidatorIdentity>>,
        stats: Arc<RelayStats>,
        rate_limit: Duration,
    ) -> ebrelayer_utils::Result<Self> {
        if validators.is_empty() {
            return Err(Error::NoValidators {
                prefix: String::new(),
            });
        }
        if rate_limit.is_zero() {
            return Err(Error::InvalidConfig(String::from(
                "the relay rate limit must be at least 1ms",
            )));
        }
        Ok(Self {
            validators,
            stats,
            rate_limit,
            next: AtomicUsize::new(0),
        })
    }

    /// The shared relay counters.
    pub fn stats(&self) -> Arc<RelayStats> {
        self.stats.clone()
    }

    /// The validator pool.
    pub fn validators(&self) -> &[Arc<ValidatorIdentity>] {
        &self.validators
    }

    /// The validator whose turn it is, advancing the turn.
    pub fn next_validator(&self) -> Arc<ValidatorIdentity> {
        // fetch the index to use, moving the cursor by one and wrapping around.
        let index = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(1) % self.validators.len())
            })
            .unwrap_or_default();
        self.validators[index].clone()
    }

    /// Relays every claim from `claims`. Once the channel closes, keeps
    /// going until the claims in flight and the retryable failed ones are
    /// settled, then returns.
    ///
    /// Dropping the returned future aborts the submissions in flight.
    #[tracing::instrument(skip_all, fields(validators = self.validators.len()))]
    pub async fn run(
        self,
        mut claims: mpsc::Receiver<WitnessClaim>,
    ) -> ebrelayer_utils::Result<()> {
        let mut ticker = tokio::time::interval(self.rate_limit);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = JoinSet::new();
        let mut failed = VecDeque::new();
        let mut open = true;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            validators = self.validators.len(),
            relaying = true,
        );

        loop {
            let claim = match failed.pop_front() {
                Some(claim) => claim,
                None => tokio::select! {
                    claim = claims.recv(), if open => match claim {
                        Some(claim) => claim,
                        None => {
                            tracing::debug!(
                                in_flight = attempts.len(),
                                "claim channel closed, draining"
                            );
                            open = false;
                            continue;
                        }
                    },
                    Some(joined) = attempts.join_next() => {
                        failed.extend(reap(joined));
                        continue;
                    }
                    else => break,
                },
            };
            ticker.tick().await;
            let validator = self.next_validator();
            tracing::trace!(
                validator = %validator.name(),
                nonce = claim.nonce(),
                "dispatching claim"
            );
            let stats = self.stats.clone();
            attempts.spawn(async move {
                let outcome = validator.relay(&claim, &stats).await;
                if outcome.is_retryable() {
                    return Some(claim);
                }
                if let RelayOutcome::Failed(error) = outcome {
                    tracing::warn!(
                        nonce = claim.nonce(),
                        %error,
                        "dropping a claim the destination refuses"
                    );
                }
                None
            });
        }

        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            relaying = false,
        );
        Ok(())
    }
}

/// The claim to dispatch again, if the attempt failed.
fn reap(
    joined: Result<Option<WitnessClaim>, JoinError>,
) -> Option<WitnessClaim> {
    match joined {
        Ok(retry) => retry,
        Err(e) => {
            if e.is_panic() {
                tracing::error!(%e, "relay attempt panicked");
            }
            None
        }
    }
}
