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

use ebrelayer_types::RawLog;
use ethers::types::{Address, H256};
use tokio::sync::mpsc;

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// A source chain client that can push contract logs.
#[async_trait::async_trait]
pub trait LogSubscriber: Send + Sync + 'static {
    /// A Helper tag used to identify the subscriber during the logs.
    const TAG: &'static str;

    /// Subscribes to the logs of `contract` whose topic 0 is `signature`.
    ///
    /// The returned future may be dropped before it completes (attach
    /// timeout), so it must not leave a live subscription behind in that case.
    async fn subscribe(
        &self,
        contract: Address,
        signature: H256,
    ) -> ebrelayer_utils::Result<LogSubscription>;

    /// Fetches the past logs of `contract` with topic 0 `signature`,
    /// starting at `from_block`.
    ///
    /// Subscribers without history access return nothing.
    async fn fetch_logs(
        &self,
        _contract: Address,
        _signature: H256,
        _from_block: u64,
    ) -> ebrelayer_utils::Result<Vec<RawLog>> {
        Ok(Vec::new())
    }
}

/// One attached upstream subscription: a log stream, an error stream and a
/// way to tear it down.
///
/// The upstream is unsubscribed at most once: by [`Self::unsubscribe`], or on
/// drop. [`Self::detach`] gives up the ability to unsubscribe.
pub struct LogSubscription {
    pub(crate) logs: mpsc::Receiver<RawLog>,
    pub(crate) errors: mpsc::Receiver<ebrelayer_utils::Error>,
    unsubscribe: Option<Unsubscribe>,
}

impl LogSubscription {
    /// Wraps the streams of a subscription together with its teardown.
    pub fn new(
        logs: mpsc::Receiver<RawLog>,
        errors: mpsc::Receiver<ebrelayer_utils::Error>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            logs,
            errors,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Tears the upstream subscription down. Logs already buffered can
    /// still be read.
    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    /// Leaves the upstream subscription as it is.
    pub fn detach(&mut self) {
        self.unsubscribe = None;
    }

    /// Whether the upstream subscription can still be torn down.
    pub fn is_attached(&self) -> bool {
        self.unsubscribe.is_some()
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for LogSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSubscription")
            .field("attached", &self.is_attached())
            .finish()
    }
}
