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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use derive_more::Display;
use ebrelayer_config::event_watcher::EventsWatcherConfig;
use ebrelayer_types::{ChainEvent, Provenance, RawLog, WitnessClaim};
use ebrelayer_utils::metric::Metrics;
use ebrelayer_utils::{probe, Error};
use ethers::types::H256;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{
    EventNormalizer, LogSubscriber, LogSubscription, WatchError, WatchKey,
    WatchTarget,
};

/// Lifecycle of a [`SubscriptionHandle`].
///
/// `Failed` and `Stopped` are terminal.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Waiting for the upstream subscription to attach.
    #[display(fmt = "attaching")]
    Attaching,
    /// Forwarding logs.
    #[display(fmt = "active")]
    Active,
    /// Ended because of an upstream problem, reported to the error sink.
    #[display(fmt = "failed")]
    Failed,
    /// Ended because it was asked to.
    #[display(fmt = "stopped")]
    Stopped,
}

impl HandleState {
    /// Whether the handle is done for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandleState::Failed | HandleState::Stopped)
    }
}

/// What to do with the upstream subscription when stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopMode {
    Unsubscribe,
    Detach,
}

/// The shared pieces every subscription handle is plugged into.
pub struct WatchWiring<S> {
    /// Source chain client.
    pub subscriber: Arc<S>,
    /// Turns observations into claims.
    pub normalizer: Arc<dyn EventNormalizer>,
    /// Where claims go, usually the relay orchestrator.
    pub claims: mpsc::Sender<WitnessClaim>,
    /// Where terminal failures go, usually the supervisor.
    pub errors: mpsc::Sender<WatchError>,
    /// Timeouts and buffer sizes.
    pub config: EventsWatcherConfig,
    /// Optional counters.
    pub metrics: Option<Arc<Metrics>>,
}

impl<S> Clone for WatchWiring<S> {
    fn clone(&self) -> Self {
        Self {
            subscriber: self.subscriber.clone(),
            normalizer: self.normalizer.clone(),
            claims: self.claims.clone(),
            errors: self.errors.clone(),
            config: self.config,
            metrics: self.metrics.clone(),
        }
    }
}

/// A live watch on one event of one contract.
///
/// Dropping the handle stops the watch and unsubscribes upstream, without
/// waiting for it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    key: WatchKey,
    started_at: SystemTime,
    state: watch::Receiver<HandleState>,
    last_block: Arc<AtomicU64>,
    quit: Option<oneshot::Sender<StopMode>>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// The watch this handle serves.
    pub fn key(&self) -> WatchKey {
        self.key
    }

    /// When the handle was started.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// The current state.
    pub fn state(&self) -> HandleState {
        *self.state.borrow()
    }

    /// A receiver that sees every state change from now on.
    pub fn state_changes(&self) -> watch::Receiver<HandleState> {
        self.state.clone()
    }

    /// Block of the last log whose claim was accepted by the claim sink.
    pub fn last_block(&self) -> Option<u64> {
        match self.last_block.load(Ordering::SeqCst) {
            0 => None,
            n => Some(n),
        }
    }

    /// Whether the background task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the handle and waits for it to wind down.
    ///
    /// With `unsubscribe` the upstream subscription is torn down, otherwise
    /// it is left as is. A claim being delivered is abandoned.
    pub async fn stop(self, unsubscribe: bool) {
        let Self { key, quit, task, .. } = self;
        let mode = if unsubscribe {
            StopMode::Unsubscribe
        } else {
            StopMode::Detach
        };
        if let Some(quit) = quit {
            // the task may be gone already, that's fine.
            let _ = quit.send(mode);
        }
        if let Err(e) = task.await {
            tracing::warn!(%key, %e, "watcher task ended abnormally");
        }
    }
}

/// Attaches to the upstream and starts forwarding claims in the background.
///
/// Fails if the upstream does not attach within the configured attach
/// timeout. This first failure is only returned, never sent to the error sink.
#[tracing::instrument(
    skip_all,
    fields(key = %target.key, tag = %S::TAG),
)]
pub async fn start_watch<S: LogSubscriber>(
    wiring: WatchWiring<S>,
    target: WatchTarget,
) -> ebrelayer_utils::Result<SubscriptionHandle> {
    let (state_tx, state_rx) = watch::channel(HandleState::Attaching);
    let task = WatchTask {
        wiring,
        target,
        state: state_tx,
        last_block: Arc::new(AtomicU64::new(0)),
    };
    task.probe(HandleState::Attaching);
    let subscription = match task.attach().await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::error!(%e, "could not attach");
            task.count_failure();
            task.set_state(HandleState::Failed);
            return Err(e);
        }
    };
    task.set_state(HandleState::Active);
    tracing::info!("watcher attached");

    let (quit_tx, quit_rx) = oneshot::channel();
    let last_block = task.last_block.clone();
    let span = tracing::info_span!("watcher", key = %target.key);
    let join = tokio::spawn(task.run(subscription, quit_rx).instrument(span));
    Ok(SubscriptionHandle {
        key: target.key,
        started_at: SystemTime::now(),
        state: state_rx,
        last_block,
        quit: Some(quit_tx),
        task: join,
    })
}

enum Flow {
    Continue,
    Quit(StopMode),
    Fail(Error),
}

struct WatchTask<S> {
    wiring: WatchWiring<S>,
    target: WatchTarget,
    state: watch::Sender<HandleState>,
    last_block: Arc<AtomicU64>,
}

fn stop_mode(received: Result<StopMode, oneshot::error::RecvError>) -> StopMode {
    // a dropped handle means stop with unsubscribe.
    received.unwrap_or(StopMode::Unsubscribe)
}

impl<S: LogSubscriber> WatchTask<S> {
    fn key(&self) -> WatchKey {
        self.target.key
    }

    fn signature(&self) -> H256 {
        self.target.signature_hash
    }

    fn disconnected(&self, reason: &str) -> Error {
        Error::UpstreamDisconnect {
            key: self.key().to_string(),
            reason: reason.to_owned(),
        }
    }

    fn probe(&self, state: HandleState) {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Watcher,
            key = %self.key(),
            %state,
        );
    }

    fn set_state(&self, state: HandleState) {
        self.state.send_replace(state);
        self.probe(state);
    }

    fn count_failure(&self) {
        if let Some(metrics) = &self.wiring.metrics {
            metrics.watcher_failures.inc();
        }
    }

    async fn attach(&self) -> ebrelayer_utils::Result<LogSubscription> {
        let timeout = self.wiring.config.attach_timeout();
        let attaching = self
            .wiring
            .subscriber
            .subscribe(self.key().contract, self.signature());
        match tokio::time::timeout(timeout, attaching).await {
            Ok(Ok(subscription)) => Ok(subscription),
            Ok(Err(e @ Error::Subscribe { .. })) => Err(e),
            Ok(Err(e)) => Err(Error::Subscribe {
                key: self.key().to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::Subscribe {
                key: self.key().to_string(),
                reason: format!(
                    "attach timed out after {}ms",
                    timeout.as_millis()
                ),
            }),
        }
    }

    async fn run(
        self,
        mut current: LogSubscription,
        mut quit: oneshot::Receiver<StopMode>,
    ) {
        if let Some(from_block) = self.target.resume_from {
            match self.backfill(from_block, &mut current, &mut quit).await {
                Flow::Continue => {}
                Flow::Quit(mode) => return self.stop(current, mode),
                Flow::Fail(e) => return self.fail(current, e, &mut quit).await,
            }
        }

        let interval = self.wiring.config.resubscribe_interval();
        let resubscribe = tokio::time::sleep(interval);
        tokio::pin!(resubscribe);
        loop {
            tokio::select! {
                mode = &mut quit => {
                    return self.stop(current, stop_mode(mode));
                }
                error = current.errors.recv() => {
                    let error = error.unwrap_or_else(|| {
                        self.disconnected("error stream closed")
                    });
                    return self.fail(current, error, &mut quit).await;
                }
                _ = &mut resubscribe => {
                    let fresh = tokio::select! {
                        mode = &mut quit => {
                            return self.stop(current, stop_mode(mode));
                        }
                        fresh = self.attach() => fresh,
                    };
                    let fresh = match fresh {
                        Ok(fresh) => fresh,
                        Err(e) => return self.fail(current, e, &mut quit).await,
                    };
                    // the new subscription is live, only now let go of the old one.
                    let mut old = std::mem::replace(&mut current, fresh);
                    old.unsubscribe();
                    while let Ok(log) = old.logs.try_recv() {
                        match self
                            .forward(log, Provenance::Watcher, &mut current.errors, &mut quit)
                            .await
                        {
                            Flow::Continue => {}
                            Flow::Quit(mode) => return self.stop(current, mode),
                            Flow::Fail(e) => return self.fail(current, e, &mut quit).await,
                        }
                    }
                    drop(old);
                    if let Some(metrics) = &self.wiring.metrics {
                        metrics.watcher_resubscriptions.inc();
                    }
                    tracing::debug!("preemptively resubscribed");
                    resubscribe
                        .as_mut()
                        .reset(tokio::time::Instant::now() + interval);
                }
                log = current.logs.recv() => {
                    let Some(log) = log else {
                        let error = self.disconnected("log stream closed");
                        return self.fail(current, error, &mut quit).await;
                    };
                    match self
                        .forward(log, Provenance::Watcher, &mut current.errors, &mut quit)
                        .await
                    {
                        Flow::Continue => {}
                        Flow::Quit(mode) => return self.stop(current, mode),
                        Flow::Fail(e) => return self.fail(current, e, &mut quit).await,
                    }
                }
            }
        }
    }

    async fn backfill(
        &self,
        from_block: u64,
        current: &mut LogSubscription,
        quit: &mut oneshot::Receiver<StopMode>,
    ) -> Flow {
        let fetched = tokio::select! {
            mode = &mut *quit => return Flow::Quit(stop_mode(mode)),
            fetched = self.wiring.subscriber.fetch_logs(
                self.key().contract,
                self.signature(),
                from_block,
            ) => fetched,
        };
        let logs = match fetched {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(%e, from_block, "backfill failed, serving live logs only");
                return Flow::Continue;
            }
        };
        tracing::debug!(from_block, count = logs.len(), "backfilling");
        for log in logs {
            match self
                .forward(log, Provenance::Backfill, &mut current.errors, quit)
                .await
            {
                Flow::Continue => {}
                other => return other,
            }
        }
        Flow::Continue
    }

    /// Checks, normalizes and delivers one log.
    async fn forward(
        &self,
        log: RawLog,
        provenance: Provenance,
        errors: &mut mpsc::Receiver<Error>,
        quit: &mut oneshot::Receiver<StopMode>,
    ) -> Flow {
        if log.topics.first() != Some(&self.signature()) {
            tracing::trace!(?log.transaction_hash, "ignoring log of another event");
            return Flow::Continue;
        }
        if let Some(metrics) = &self.wiring.metrics {
            metrics.events_observed.inc();
        }
        let block = log.block_number;
        let event = ChainEvent::new(self.key().event.name(), log, provenance);
        let claim = match self.wiring.normalizer.normalize(&event) {
            Ok(claim) => claim,
            Err(e) => {
                tracing::warn!(
                    %e,
                    tx = ?event.transaction_hash(),
                    "dropping event that could not be normalized"
                );
                if let Some(metrics) = &self.wiring.metrics {
                    metrics.events_dropped.inc();
                }
                return Flow::Continue;
            }
        };
        tracing::debug!(%claim, %provenance, "forwarding claim");
        tokio::select! {
            biased;
            mode = &mut *quit => Flow::Quit(stop_mode(mode)),
            error = errors.recv() => Flow::Fail(
                error.unwrap_or_else(|| self.disconnected("error stream closed"))
            ),
            sent = self.wiring.claims.send(claim) => match sent {
                Ok(()) => {
                    if let Some(block) = block {
                        self.last_block.fetch_max(block, Ordering::SeqCst);
                    }
                    Flow::Continue
                }
                Err(_) => {
                    tracing::debug!("claim sink closed, stopping");
                    Flow::Quit(StopMode::Unsubscribe)
                }
            },
        }
    }

    fn stop(&self, mut current: LogSubscription, mode: StopMode) {
        match mode {
            StopMode::Unsubscribe => current.unsubscribe(),
            StopMode::Detach => current.detach(),
        }
        self.set_state(HandleState::Stopped);
        tracing::info!(?mode, "watcher stopped");
    }

    async fn fail(
        &self,
        mut current: LogSubscription,
        error: Error,
        quit: &mut oneshot::Receiver<StopMode>,
    ) {
        current.unsubscribe();
        self.count_failure();
        self.set_state(HandleState::Failed);
        tracing::error!(%error, "watcher failed");
        let report = WatchError {
            key: self.key(),
            error,
        };
        tokio::select! {
            biased;
            _ = quit => {}
            _ = self.wiring.errors.send(report) => {}
        }
    }
}
