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
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ebrelayer_utils::metric::Metrics;
use serde::Serialize;

/// Process wide relay counters, shared by every validator task.
#[derive(Debug, Default)]
pub struct RelayStats {
    successes: AtomicU64,
    errors: AtomicU64,
    resequences: AtomicU64,
    last_report: AtomicU64,
    metrics: Option<Arc<Metrics>>,
}

/// A point in time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Claims accepted by the destination chain.
    pub successes: u64,
    /// Failed submissions.
    pub errors: u64,
    /// Sequence refreshes.
    pub resequences: u64,
    /// Unix seconds of the last report, if any.
    pub last_report: Option<u64>,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "successes: {}, errors: {}, resequences: {}",
            self.successes, self.errors, self.resequences
        )
    }
}

impl RelayStats {
    /// Counters starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also counts into the prometheus `metrics`.
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Default::default()
        }
    }

    /// A claim was accepted.
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
        if let Some(metrics) = &self.metrics {
            metrics.claims_relayed.inc();
        }
    }

    /// A submission failed.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        if let Some(metrics) = &self.metrics {
            metrics.relay_errors.inc();
        }
    }

    /// A validator refreshed its sequence.
    pub fn record_resequence(&self) {
        self.resequences.fetch_add(1, Ordering::SeqCst);
        if let Some(metrics) = &self.metrics {
            metrics.resequences.inc();
        }
    }

    /// Stamps the last report time with now.
    pub fn mark_reported(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.last_report.store(now, Ordering::SeqCst);
    }

    /// Copies the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let last_report = match self.last_report.load(Ordering::SeqCst) {
            0 => None,
            at => Some(at),
        };
        StatsSnapshot {
            successes: self.successes.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            resequences: self.resequences.load(Ordering::SeqCst),
            last_report,
        }
    }
}

/// Logs the relay counters every `interval`, forever.
///
/// Returns right away when `interval` is zero.
#[tracing::instrument(skip_all)]
pub async fn report_stats(stats: Arc<RelayStats>, interval: Duration) {
    if interval.is_zero() {
        tracing::debug!("stats reporting is disabled");
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    // the first tick is immediate, nothing to report yet.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let snapshot = stats.snapshot();
        tracing::info!(
            successes = snapshot.successes,
            errors = snapshot.errors,
            resequences = snapshot.resequences,
            "relay stats"
        );
        stats.mark_reported();
    }
}
