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

//! # Relay Pool 🕸️
//!
//! Submits claims to the destination chain through a pool of validator
//! accounts.
//!
//! Every [`ValidatorIdentity`] tracks its own account sequence and submits
//! one transaction at a time. The [`RelayOrchestrator`] paces incoming claims
//! and hands them to the identities in turn, and [`RelayStats`] counts what
//! happened.

mod destination;
mod identity;
mod keystore;
mod orchestrator;
mod stats;

pub use destination::{
    AccountSnapshot, BroadcastOutcome, ClaimMsg, ClaimTx, DestinationClient,
    MsgCoin,
};
pub use identity::{spawn_validators, RelayOutcome, SpawnOptions, ValidatorIdentity};
pub use keystore::{KeyInfo, KeyStore, SigningCredential};
pub use orchestrator::RelayOrchestrator;
pub use stats::{report_stats, RelayStats, StatsSnapshot};

#[cfg(test)]
pub(crate) mod test_utils {
    pub fn setup_tracing() -> tracing::subscriber::DefaultGuard {
        // Setup tracing for tests
        let s = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(
                        tracing_subscriber::filter::LevelFilter::DEBUG.into(),
                    )
                    .from_env_lossy(),
            )
            .with_test_writer()
            .pretty()
            .finish();
        tracing::subscriber::set_default(s)
    }
}

#[cfg(test)]
mod tests;
