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

use prometheus::core::{AtomicF64, GenericCounter};
use prometheus::{opts, Encoder, Registry, TextEncoder};

/// A struct definition for collecting metrics in the relayer.
///
/// Every instance owns its own [`Registry`], so more than one relayer (or test)
/// can live in the same process.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Source chain logs that matched the watched event signature.
    pub events_observed: GenericCounter<AtomicF64>,
    /// Events dropped because they could not be normalized.
    pub events_dropped: GenericCounter<AtomicF64>,
    /// Preemptive resubscriptions performed by the watchers.
    pub watcher_resubscriptions: GenericCounter<AtomicF64>,
    /// Subscription handles that ended in the failed state.
    pub watcher_failures: GenericCounter<AtomicF64>,
    /// Claims accepted by the destination chain.
    pub claims_relayed: GenericCounter<AtomicF64>,
    /// Claim submissions that failed or were rejected.
    pub relay_errors: GenericCounter<AtomicF64>,
    /// Sequence refreshes performed by the validator identities.
    pub resequences: GenericCounter<AtomicF64>,
}

impl Metrics {
    /// Creates a registry and registers all relayer counters in it.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry =
            Registry::new_custom(Some(String::from("ebrelayer")), None)?;

        let events_observed = register(
            &registry,
            "events_observed",
            "The total number of lock events seen on the source chain",
        )?;
        let events_dropped = register(
            &registry,
            "events_dropped",
            "The total number of events that failed normalization",
        )?;
        let watcher_resubscriptions = register(
            &registry,
            "watcher_resubscriptions",
            "How many times a watcher preemptively resubscribed",
        )?;
        let watcher_failures = register(
            &registry,
            "watcher_failures",
            "How many subscription handles failed",
        )?;
        let claims_relayed = register(
            &registry,
            "claims_relayed",
            "The total number of claims accepted by the destination chain",
        )?;
        let relay_errors = register(
            &registry,
            "relay_errors",
            "The total number of failed claim submissions",
        )?;
        let resequences = register(
            &registry,
            "resequences",
            "How many times a validator refreshed its sequence number",
        )?;

        Ok(Self {
            registry,
            events_observed,
            events_dropped,
            watcher_resubscriptions,
            watcher_failures,
            claims_relayed,
            relay_errors,
            resequences,
        })
    }

    /// Gathers the whole relayer metrics in the prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn register(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<GenericCounter<AtomicF64>, prometheus::Error> {
    let counter = GenericCounter::with_opts(opts!(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}
