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

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use ebrelayer_config::event_watcher::EventsWatcherConfig;
use ebrelayer_types::{ChainEvent, EventKind, RawLog, WitnessClaim};
use ebrelayer_utils::metric::Metrics;
use ebrelayer_utils::retry::ConstantWithMaxRetryCount;
use ebrelayer_utils::Error;
use ethers::types::{Address, H256, U256};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Succeed,
    Fail,
    Hang,
    /// Attaches after this many milliseconds.
    Slow(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Subscribed(usize),
    Unsubscribed(usize),
}

#[derive(Default)]
struct Upstream {
    plan: VecDeque<Behaviour>,
    calls: Vec<Call>,
    live: HashMap<usize, (mpsc::Sender<RawLog>, mpsc::Sender<Error>)>,
    next_id: usize,
    active: usize,
    min_active: Option<usize>,
    backfill: Vec<RawLog>,
    fetched_from: Vec<u64>,
}

/// A source chain that records every subscribe and unsubscribe.
#[derive(Clone, Default)]
struct MockUpstream {
    inner: Arc<Mutex<Upstream>>,
    changed: Arc<Notify>,
}

impl MockUpstream {
    fn with_plan(plan: impl IntoIterator<Item = Behaviour>) -> Self {
        let upstream = Self::default();
        upstream.inner.lock().plan = plan.into_iter().collect();
        upstream
    }

    fn unsubscribed(&self, id: usize) {
        let mut inner = self.inner.lock();
        inner.live.remove(&id);
        inner.calls.push(Call::Unsubscribed(id));
        inner.active -= 1;
        let active = inner.active;
        inner.min_active = Some(inner.min_active.map_or(active, |m| m.min(active)));
        drop(inner);
        self.changed.notify_waiters();
    }

    fn push(&self, id: usize, log: RawLog) {
        let sender = self.inner.lock().live.get(&id).map(|(l, _)| l.clone());
        sender
            .expect("subscription is live")
            .try_send(log)
            .expect("log buffer has room");
    }

    fn break_subscription(&self, id: usize, error: Error) {
        let sender = self.inner.lock().live.get(&id).map(|(_, e)| e.clone());
        sender
            .expect("subscription is live")
            .try_send(error)
            .expect("error buffer has room");
    }

    fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    fn active(&self) -> usize {
        self.inner.lock().active
    }

    fn unsubscribe_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Unsubscribed(_)))
            .count()
    }

    async fn wait_for(&self, done: impl Fn(&Upstream) -> bool) {
        let waiting = async {
            loop {
                let notified = self.changed.notified();
                if done(&self.inner.lock()) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("upstream reached the expected state");
    }
}

#[async_trait::async_trait]
impl LogSubscriber for MockUpstream {
    const TAG: &'static str = "Mock Upstream";

    async fn subscribe(
        &self,
        _contract: Address,
        _signature: H256,
    ) -> ebrelayer_utils::Result<LogSubscription> {
        let behaviour = self
            .inner
            .lock()
            .plan
            .pop_front()
            .unwrap_or(Behaviour::Succeed);
        match behaviour {
            Behaviour::Hang => return std::future::pending().await,
            Behaviour::Fail => return Err(Error::Generic("upstream refused")),
            Behaviour::Slow(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await
            }
            Behaviour::Succeed => {}
        }
        let (logs_tx, logs_rx) = mpsc::channel(16);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.active += 1;
            inner.calls.push(Call::Subscribed(id));
            inner.live.insert(id, (logs_tx, errors_tx));
            id
        };
        self.changed.notify_waiters();
        let upstream = self.clone();
        Ok(LogSubscription::new(logs_rx, errors_rx, move || {
            upstream.unsubscribed(id)
        }))
    }

    async fn fetch_logs(
        &self,
        _contract: Address,
        _signature: H256,
        from_block: u64,
    ) -> ebrelayer_utils::Result<Vec<RawLog>> {
        let mut inner = self.inner.lock();
        inner.fetched_from.push(from_block);
        Ok(inner.backfill.clone())
    }
}

/// Takes the nonce from topic 1, everything else is fixed.
struct NonceNormalizer;

impl EventNormalizer for NonceNormalizer {
    fn normalize(
        &self,
        event: &ChainEvent,
    ) -> ebrelayer_utils::Result<WitnessClaim> {
        let nonce = event.topics().get(1).ok_or_else(|| {
            Error::MalformedEvent {
                field: "nonce",
                reason: String::from("missing topic"),
            }
        })?;
        Ok(WitnessClaim::new(
            nonce.to_low_u64_be(),
            Address::zero(),
            "cosmos1gn8409qq9hnrxde37kuxwx5hrxpfpv8426szuv",
            "ethereum",
            U256::one(),
        ))
    }
}

const SIGNATURE: H256 = H256::repeat_byte(0x5a);

fn target(contract: u8) -> WatchTarget {
    WatchTarget {
        key: WatchKey::new(Address::repeat_byte(contract), EventKind::LogLock),
        signature_hash: SIGNATURE,
        resume_from: None,
    }
}

fn lock_log(nonce: u64, block: u64) -> RawLog {
    RawLog {
        address: Address::repeat_byte(1),
        topics: vec![SIGNATURE, H256::from_low_u64_be(nonce)],
        block_number: Some(block),
        ..Default::default()
    }
}

fn config() -> EventsWatcherConfig {
    EventsWatcherConfig {
        attach_timeout: 10_000,
        resubscribe_interval: 60_000,
        log_buffer: 16,
        max_restart_interval: 60_000,
    }
}

fn wiring(
    upstream: &MockUpstream,
    claims_capacity: usize,
) -> (
    WatchWiring<MockUpstream>,
    mpsc::Receiver<WitnessClaim>,
    mpsc::Receiver<WatchError>,
) {
    let (claims, claims_rx) = mpsc::channel(claims_capacity);
    let (errors, errors_rx) = mpsc::channel(4);
    let wiring = WatchWiring {
        subscriber: Arc::new(upstream.clone()),
        normalizer: Arc::new(NonceNormalizer),
        claims,
        errors,
        config: config(),
        metrics: Some(Arc::new(Metrics::new().unwrap())),
    };
    (wiring, claims_rx, errors_rx)
}

async fn next_nonce(claims: &mut mpsc::Receiver<WitnessClaim>) -> u64 {
    tokio::time::timeout(Duration::from_secs(5), claims.recv())
        .await
        .expect("a claim in time")
        .expect("claim channel open")
        .nonce()
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn attach_timeout_fails_the_start() {
    let upstream = MockUpstream::with_plan([Behaviour::Hang]);
    let (wiring, _claims, mut errors) = wiring(&upstream, 4);

    let err = start_watch(wiring, target(1)).await.unwrap_err();

    assert!(
        matches!(err, Error::Subscribe { ref reason, .. } if reason.contains("timed out")),
        "unexpected error: {err}"
    );
    assert_eq!(upstream.active(), 0);
    assert!(upstream.unsubscribe_count() <= 1);
    // the first failure is returned, not reported.
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn refused_attach_is_a_subscribe_error() {
    let upstream = MockUpstream::with_plan([Behaviour::Fail]);
    let (wiring, _claims, _errors) = wiring(&upstream, 4);
    let metrics = wiring.metrics.clone().unwrap();

    let err = start_watch(wiring, target(1)).await.unwrap_err();

    assert!(matches!(err, Error::Subscribe { ref reason, .. } if reason == "upstream refused"));
    assert_eq!(metrics.watcher_failures.get() as u64, 1);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn forwards_matching_logs_in_order() {
    let upstream = MockUpstream::default();
    let (wiring, mut claims, _errors) = wiring(&upstream, 16);
    let metrics = wiring.metrics.clone().unwrap();
    let handle = start_watch(wiring, target(1)).await.unwrap();
    assert_eq!(handle.state(), HandleState::Active);

    upstream.push(0, lock_log(1, 10));
    upstream.push(
        0,
        RawLog {
            topics: vec![H256::repeat_byte(0x01), H256::from_low_u64_be(99)],
            ..Default::default()
        },
    );
    upstream.push(
        0,
        RawLog {
            topics: vec![SIGNATURE],
            ..Default::default()
        },
    );
    upstream.push(0, lock_log(2, 11));
    upstream.push(0, lock_log(3, 12));

    assert_eq!(next_nonce(&mut claims).await, 1);
    assert_eq!(next_nonce(&mut claims).await, 2);
    assert_eq!(next_nonce(&mut claims).await, 3);
    assert!(claims.try_recv().is_err());
    assert_eq!(handle.last_block(), Some(12));
    assert_eq!(metrics.events_observed.get() as u64, 4);
    assert_eq!(metrics.events_dropped.get() as u64, 1);

    handle.stop(true).await;
}

#[tokio::test]
async fn upstream_error_fails_the_handle() {
    let upstream = MockUpstream::default();
    let (wiring, _claims, mut errors) = wiring(&upstream, 4);
    let handle = start_watch(wiring, target(7)).await.unwrap();

    upstream.break_subscription(
        0,
        Error::UpstreamDisconnect {
            key: String::from("ws"),
            reason: String::from("connection reset"),
        },
    );

    let report = tokio::time::timeout(Duration::from_secs(5), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.key, target(7).key);
    assert!(matches!(report.error, Error::UpstreamDisconnect { .. }));
    assert_eq!(handle.state(), HandleState::Failed);
    assert_eq!(
        upstream.calls(),
        vec![Call::Subscribed(0), Call::Unsubscribed(0)]
    );

    // stopping a failed handle does not unsubscribe twice.
    handle.stop(true).await;
    assert_eq!(upstream.unsubscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn preemptive_resubscribe_keeps_a_live_subscription() {
    let upstream = MockUpstream::default();
    let (wiring, mut claims, _errors) = wiring(&upstream, 4);
    let metrics = wiring.metrics.clone().unwrap();
    let handle = start_watch(wiring, target(1)).await.unwrap();

    upstream.push(0, lock_log(1, 10));
    assert_eq!(next_nonce(&mut claims).await, 1);

    tokio::time::sleep(Duration::from_millis(60_001)).await;
    upstream
        .wait_for(|u| u.calls.contains(&Call::Unsubscribed(0)))
        .await;

    assert_eq!(
        upstream.calls(),
        vec![
            Call::Subscribed(0),
            Call::Subscribed(1),
            Call::Unsubscribed(0)
        ]
    );
    assert!(upstream.inner.lock().min_active.unwrap() >= 1);
    assert_eq!(metrics.watcher_resubscriptions.get() as u64, 1);

    upstream.push(1, lock_log(2, 11));
    assert_eq!(next_nonce(&mut claims).await, 2);
    assert_eq!(handle.state(), HandleState::Active);

    handle.stop(true).await;
    assert_eq!(upstream.active(), 0);
}

/// Lets the first resubscribe attempt behave like `second` and returns what
/// the handle reports.
async fn failed_resubscribe(second: Behaviour) -> WatchError {
    let upstream = MockUpstream::with_plan([Behaviour::Succeed, second]);
    let (wiring, _claims, mut errors) = wiring(&upstream, 4);
    let handle = start_watch(wiring, target(3)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(60_001)).await;
    let report = tokio::time::timeout(Duration::from_secs(30), errors.recv())
        .await
        .expect("failure reported in time")
        .expect("error channel open");

    assert_eq!(report.key, target(3).key);
    assert_eq!(handle.state(), HandleState::Failed);
    assert_eq!(
        upstream.calls(),
        vec![Call::Subscribed(0), Call::Unsubscribed(0)]
    );
    handle.stop(true).await;
    assert_eq!(upstream.unsubscribe_count(), 1);
    assert_eq!(upstream.active(), 0);
    report
}

#[tokio::test(start_paused = true)]
async fn refused_resubscribe_fails_the_handle() {
    let report = failed_resubscribe(Behaviour::Fail).await;

    assert!(
        matches!(report.error, Error::Subscribe { ref reason, .. } if reason == "upstream refused"),
        "unexpected error: {}",
        report.error
    );
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn hung_resubscribe_fails_the_handle() {
    let report = failed_resubscribe(Behaviour::Hang).await;

    assert!(
        matches!(report.error, Error::Subscribe { ref reason, .. } if reason.contains("timed out")),
        "unexpected error: {}",
        report.error
    );
}

#[tokio::test(start_paused = true)]
async fn logs_left_on_the_old_subscription_come_first() {
    let upstream =
        MockUpstream::with_plan([Behaviour::Succeed, Behaviour::Slow(1_000)]);
    let (wiring, mut claims, _errors) = wiring(&upstream, 8);
    let handle = start_watch(wiring, target(1)).await.unwrap();

    upstream.push(0, lock_log(1, 10));
    assert_eq!(next_nonce(&mut claims).await, 1);

    // the timer has fired and the new subscription is still attaching.
    tokio::time::sleep(Duration::from_millis(60_500)).await;
    assert_eq!(upstream.calls(), vec![Call::Subscribed(0)]);
    upstream.push(0, lock_log(2, 11));

    upstream
        .wait_for(|u| u.calls.contains(&Call::Subscribed(1)))
        .await;
    upstream.push(1, lock_log(3, 12));

    assert_eq!(next_nonce(&mut claims).await, 2);
    assert_eq!(next_nonce(&mut claims).await, 3);
    assert_eq!(
        upstream.calls(),
        vec![
            Call::Subscribed(0),
            Call::Subscribed(1),
            Call::Unsubscribed(0)
        ]
    );
    assert_eq!(handle.last_block(), Some(12));

    handle.stop(true).await;
    assert_eq!(upstream.active(), 0);
}

#[tokio::test]
async fn stop_can_leave_the_upstream_attached() {
    let upstream = MockUpstream::default();

    let (wiring, _claims, _errors) = wiring(&upstream, 4);
    let detached = start_watch(wiring, target(1)).await.unwrap();
    let mut states = detached.state_changes();
    detached.stop(false).await;
    assert_eq!(*states.borrow_and_update(), HandleState::Stopped);
    assert_eq!(upstream.unsubscribe_count(), 0);
    assert_eq!(upstream.active(), 1);

    let (wiring, _claims, _errors) = self::wiring(&upstream, 4);
    let unsubscribed = start_watch(wiring, target(2)).await.unwrap();
    unsubscribed.stop(true).await;
    assert_eq!(
        upstream.calls(),
        vec![
            Call::Subscribed(0),
            Call::Subscribed(1),
            Call::Unsubscribed(1)
        ]
    );
}

#[tokio::test]
async fn dropping_the_handle_unsubscribes() {
    let upstream = MockUpstream::default();
    let (wiring, _claims, _errors) = wiring(&upstream, 4);
    let handle = start_watch(wiring, target(1)).await.unwrap();

    drop(handle);

    upstream
        .wait_for(|u| u.calls.contains(&Call::Unsubscribed(0)))
        .await;
}

#[tokio::test]
async fn stop_aborts_a_blocked_send() {
    let upstream = MockUpstream::default();
    let (wiring, _claims, _errors) = wiring(&upstream, 1);
    let handle = start_watch(wiring, target(1)).await.unwrap();

    // nobody reads the claims: the first fills the channel, the second blocks.
    upstream.push(0, lock_log(1, 10));
    upstream.push(0, lock_log(2, 11));
    tokio::task::yield_now().await;

    tokio::time::timeout(Duration::from_secs(5), handle.stop(true))
        .await
        .expect("stop is not held up by the claim sink");
    assert_eq!(upstream.unsubscribe_count(), 1);
}

fn supervisor(
    upstream: &MockUpstream,
) -> (WatcherSupervisor<MockUpstream>, mpsc::Receiver<WitnessClaim>) {
    let (claims, claims_rx) = mpsc::channel(16);
    let supervisor = WatcherSupervisor::new(
        Arc::new(upstream.clone()),
        Arc::new(NonceNormalizer),
        claims,
        config(),
    );
    (supervisor, claims_rx)
}

#[tokio::test]
async fn supervisor_needs_watchers() {
    let upstream = MockUpstream::default();
    let (mut supervisor, _claims) = supervisor(&upstream);

    assert!(matches!(
        supervisor.start().await,
        Err(Error::NoWatchersStarted)
    ));
    assert!(matches!(
        supervisor.remove(target(1).key).await,
        Err(Error::WatcherNotFound { .. })
    ));
    assert!(matches!(
        supervisor.restart(target(1).key).await,
        Err(Error::WatcherNotFound { .. })
    ));
}

#[tokio::test]
async fn supervisor_start_is_all_or_nothing() {
    let upstream =
        MockUpstream::with_plan([Behaviour::Succeed, Behaviour::Fail]);
    let (mut supervisor, _claims) = supervisor(&upstream);
    supervisor.register(target(1));
    supervisor.register(target(2));

    let err = supervisor.start().await.unwrap_err();

    assert!(matches!(err, Error::Subscribe { .. }));
    assert_eq!(upstream.active(), 0);
    assert!(supervisor.handle(&target(1).key).is_none());
    assert!(supervisor.handle(&target(2).key).is_none());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn supervisor_restart_backfills_from_last_block() {
    let upstream = MockUpstream::default();
    let (mut supervisor, mut claims) = supervisor(&upstream);
    let key = target(1).key;
    supervisor.add(target(1)).await.unwrap();

    upstream.push(0, lock_log(1, 10));
    assert_eq!(next_nonce(&mut claims).await, 1);

    upstream.break_subscription(
        0,
        Error::UpstreamDisconnect {
            key: key.to_string(),
            reason: String::from("gone"),
        },
    );
    let report = supervisor.next_error().await.unwrap();
    assert_eq!(report.key, key);

    upstream.inner.lock().backfill = vec![lock_log(1, 10), lock_log(2, 11)];
    supervisor.restart(key).await.unwrap();

    assert_eq!(next_nonce(&mut claims).await, 1);
    assert_eq!(next_nonce(&mut claims).await, 2);
    assert_eq!(upstream.inner.lock().fetched_from, vec![10]);
    assert_eq!(
        supervisor.handle(&key).map(|h| h.state()),
        Some(HandleState::Active)
    );

    supervisor.stop(true).await;
    assert_eq!(upstream.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn restart_with_backoff_retries_until_attached() {
    let upstream = MockUpstream::default();
    let (mut supervisor, _claims) = supervisor(&upstream);
    supervisor.register(target(1));
    upstream.inner.lock().plan =
        [Behaviour::Fail, Behaviour::Hang, Behaviour::Succeed].into();

    let backoff =
        ConstantWithMaxRetryCount::new(Duration::from_millis(500), 5);
    supervisor
        .restart_with_backoff(target(1).key, backoff)
        .await
        .unwrap();

    assert_eq!(upstream.calls(), vec![Call::Subscribed(0)]);
    assert!(supervisor.handle(&target(1).key).is_some());
}

#[tokio::test]
async fn restart_with_backoff_gives_up() {
    let upstream = MockUpstream::with_plan([Behaviour::Fail; 3]);
    let (mut supervisor, _claims) = supervisor(&upstream);
    supervisor.register(target(1));

    let backoff = ConstantWithMaxRetryCount::new(Duration::from_millis(1), 2);
    let err = supervisor
        .restart_with_backoff(target(1).key, backoff)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Subscribe { .. }));
    assert!(upstream.inner.lock().plan.is_empty());
}
