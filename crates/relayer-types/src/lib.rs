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

//! Shared types of the bridge relayer: what the watchers observe, what the
//! relay pool submits, and config values that may come from the environment.

pub mod claim;
pub mod event;
pub mod passphrase;
pub mod rpc_url;

pub use claim::{Coin, WitnessClaim};
pub use event::{ChainEvent, EventKind, Provenance, RawLog};

/// Resolves a config value that may point at an environment variable
/// using the `$VAR_NAME` syntax.
pub(crate) fn read_env_indirection(value: &str) -> Result<String, String> {
    match value.strip_prefix('$') {
        Some(var) => {
            tracing::trace!("Reading {} from env", var);
            std::env::var(var).map_err(|e| {
                format!("error while loading this env {var}: {e}")
            })
        }
        None => Ok(value.to_owned()),
    }
}
