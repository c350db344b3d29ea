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

use std::collections::HashMap;
use std::sync::Arc;

use backoff::backoff::Backoff;
use ebrelayer_config::event_watcher::EventsWatcherConfig;
use ebrelayer_types::WitnessClaim;
use ebrelayer_utils::metric::Metrics;
use ebrelayer_utils::{probe, Error};
use tokio::sync::mpsc;

use crate::handle::{start_watch, SubscriptionHandle, WatchWiring};
use crate::{EventNormalizer, LogSubscriber, WatchError, WatchKey, WatchTarget};

/// Buffered failure reports before handles block on reporting.
const ERROR_CHANNEL_CAPACITY: usize = 32;

/// Owns every subscription handle and decides what happens when one fails.
///
/// Handles report failures here instead of retrying on their own, see
/// [`Self::next_error`].
pub struct WatcherSupervisor<S> {
    wiring: WatchWiring<S>,
    errors: mpsc::Receiver<WatchError>,
    targets: HashMap<WatchKey, WatchTarget>,
    handles: HashMap<WatchKey, SubscriptionHandle>,
}

impl<S: LogSubscriber> WatcherSupervisor<S> {
    /// Creates a supervisor with no watches.
    pub fn new(
        subscriber: Arc<S>,
        normalizer: Arc<dyn EventNormalizer>,
        claims: mpsc::Sender<WitnessClaim>,
        config: EventsWatcherConfig,
    ) -> Self {
        let (errors_tx, errors) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            wiring: WatchWiring {
                subscriber,
                normalizer,
                claims,
                errors: errors_tx,
                config,
                metrics: None,
            },
            errors,
            targets: HashMap::new(),
            handles: HashMap::new(),
        }
    }

    /// Counts watcher activity in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.wiring.metrics = Some(metrics);
        self
    }

    /// Registers a watch to be started by [`Self::start`].
    pub fn register(&mut self, target: WatchTarget) {
        self.targets.insert(target.key, target);
    }

    /// Registers a watch and starts it right away.
    pub async fn add(
        &mut self,
        target: WatchTarget,
    ) -> ebrelayer_utils::Result<()> {
        self.register(target);
        self.spawn(target).await
    }

    /// Starts every registered watch that is not running.
    ///
    /// All or nothing: if one watch cannot attach, the ones started by this
    /// call are stopped again and the error is returned.
    pub async fn start(&mut self) -> ebrelayer_utils::Result<()> {
        if self.targets.is_empty() {
            return Err(Error::NoWatchersStarted);
        }
        let pending: Vec<_> = self
            .targets
            .values()
            .filter(|t| !self.handles.contains_key(&t.key))
            .copied()
            .collect();
        let mut started = Vec::with_capacity(pending.len());
        for target in pending {
            if let Err(e) = self.spawn(target).await {
                for key in started {
                    if let Some(handle) = self.handles.remove(&key) {
                        handle.stop(true).await;
                    }
                }
                return Err(e);
            }
            started.push(target.key);
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            watchers = self.handles.len(),
            started = true,
        );
        Ok(())
    }

    /// Stops every running watch. Registered watches stay registered.
    pub async fn stop(&mut self, unsubscribe: bool) {
        for (key, handle) in self.handles.drain() {
            tracing::debug!(%key, "stopping watcher");
            handle.stop(unsubscribe).await;
        }
    }

    /// Stops a watch and forgets about it.
    pub async fn remove(&mut self, key: WatchKey) -> ebrelayer_utils::Result<()> {
        if self.targets.remove(&key).is_none() {
            return Err(Error::WatcherNotFound {
                key: key.to_string(),
            });
        }
        if let Some(handle) = self.handles.remove(&key) {
            handle.stop(true).await;
        }
        Ok(())
    }

    /// Replaces the handle of a watch with a fresh one.
    ///
    /// The new handle backfills from the block of the last claim the old
    /// one delivered, so nothing observed in between is lost.
    #[tracing::instrument(skip(self), fields(tag = %S::TAG))]
    pub async fn restart(&mut self, key: WatchKey) -> ebrelayer_utils::Result<()> {
        let mut target =
            *self.targets.get(&key).ok_or_else(|| Error::WatcherNotFound {
                key: key.to_string(),
            })?;
        if let Some(old) = self.handles.remove(&key) {
            if let Some(block) = old.last_block() {
                target.resume_from = Some(block);
            }
            old.stop(true).await;
        }
        self.targets.insert(key, target);
        tracing::info!(resume_from = ?target.resume_from, "restarting watcher");
        self.spawn(target).await
    }

    /// [`Self::restart`], retried following `backoff` until it attaches or
    /// the backoff gives up.
    pub async fn restart_with_backoff(
        &mut self,
        key: WatchKey,
        mut backoff: impl Backoff,
    ) -> ebrelayer_utils::Result<()> {
        loop {
            let e = match self.restart(key).await {
                Ok(()) => return Ok(()),
                Err(e @ Error::WatcherNotFound { .. }) => return Err(e),
                Err(e) => e,
            };
            let Some(delay) = backoff.next_backoff() else {
                return Err(e);
            };
            tracing::warn!(%key, %e, "restart failed, retrying in {}ms", delay.as_millis());
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Retry,
                %key,
                delay_ms = delay.as_millis() as u64,
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Waits for the next terminal failure of a handle.
    pub async fn next_error(&mut self) -> Option<WatchError> {
        self.errors.recv().await
    }

    /// The running handle of a watch.
    pub fn handle(&self, key: &WatchKey) -> Option<&SubscriptionHandle> {
        self.handles.get(key)
    }

    /// Every registered watch.
    pub fn keys(&self) -> impl Iterator<Item = &WatchKey> {
        self.targets.keys()
    }

    async fn spawn(
        &mut self,
        target: WatchTarget,
    ) -> ebrelayer_utils::Result<()> {
        let handle = start_watch(self.wiring.clone(), target).await?;
        if let Some(old) = self.handles.insert(target.key, handle) {
            old.stop(true).await;
        }
        Ok(())
    }
}
