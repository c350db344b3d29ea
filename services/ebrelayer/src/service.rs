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

//! # Relayer Service Module 🕸️
//!
//! A module for starting long-running tasks.
//!
//! ## Overview
//!
//! Services are tasks which the relayer constantly runs throughout its lifetime:
//! the events watcher, the relay pool, the stats reporter and the HTTP api.
//! They all stop on the shutdown signal of the [`RelayerContext`]. Any other
//! reason for a service to return is abnormal.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use backoff::ExponentialBackoff;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use ebrelayer_config::EventsWatcherConfig;
use ebrelayer_context::RelayerContext;
use ebrelayer_event_watcher_traits::{
    WatchError, WatchKey, WatchTarget, WatcherSupervisor,
};
use ebrelayer_ew_evm::{LockEventNormalizer, WsLogSubscriber};
use ebrelayer_handlers::routes::{info, metric, stats};
use ebrelayer_lcd_client::LcdClient;
use ebrelayer_tx_relay::{
    report_stats, spawn_validators, RelayOrchestrator, SpawnOptions,
};
use ebrelayer_types::WitnessClaim;

/// The running services. Each one returns only on shutdown or failure.
pub type Services = JoinSet<crate::Result<()>>;

/// Serves the HTTP api of the relayer until shutdown.
pub async fn build_axum_services(ctx: RelayerContext) -> crate::Result<()> {
    let api = Router::new()
        .route("/info", get(info::handle_relayer_info))
        .route("/metrics", get(metric::handle_metric_info))
        .route("/stats", get(stats::handle_relay_stats))
        .with_state(Arc::new(ctx.clone()));

    let app = Router::new().nest("/api/v1", api).into_make_service();
    let socket_addr = SocketAddr::from(([0, 0, 0, 0], ctx.config.port));
    tracing::info!("Starting the server on {}", socket_addr);
    let mut shutdown_signal = ctx.shutdown_signal();
    axum::Server::try_bind(&socket_addr)?
        .serve(app)
        .with_graceful_shutdown(async move { shutdown_signal.recv().await })
        .await?;
    Ok(())
}

/// Starts all background services.
///
/// The relay pool is built first, so a relayer without usable validator
/// accounts never subscribes to the source chain.
pub async fn ignite(ctx: &RelayerContext) -> crate::Result<Services> {
    tracing::debug!(
        "Relayer configuration: {}",
        serde_json::to_string_pretty(&ctx.config)?
    );
    let (claims_tx, claims_rx) =
        mpsc::channel(ctx.config.relay.claim_channel_capacity.max(1));

    let orchestrator = start_relay_pool(ctx).await?;
    let supervisor = start_events_watcher(ctx, claims_tx).await?;

    let mut services = Services::new();
    services.spawn(run_relay_pool(ctx.clone(), orchestrator, claims_rx));
    services.spawn(supervise_watchers(ctx.clone(), supervisor));
    if !ctx.config.relay.stats_report_interval().is_zero() {
        services.spawn(run_stats_reporter(ctx.clone()));
    }
    services.spawn(build_axum_services(ctx.clone()));
    Ok(services)
}

async fn start_relay_pool(
    ctx: &RelayerContext,
) -> crate::Result<RelayOrchestrator> {
    let cosmos = &ctx.config.cosmos;
    let relay = &ctx.config.relay;
    let lcd = Arc::new(LcdClient::from_config(cosmos)?);
    let options = SpawnOptions::from_config(cosmos, relay);
    let validators = spawn_validators(lcd.as_ref(), lcd.clone(), &options).await?;
    tracing::info!(
        chain_id = %cosmos.chain_id,
        "Relaying through #{} validators",
        validators.len()
    );
    RelayOrchestrator::new(validators, ctx.stats.clone(), relay.rate_limit())
}

async fn start_events_watcher(
    ctx: &RelayerContext,
    claims: mpsc::Sender<WitnessClaim>,
) -> crate::Result<WatcherSupervisor<WsLogSubscriber>> {
    let ethereum = &ctx.config.ethereum;
    let config = ctx.config.events_watcher;
    let subscriber =
        WsLogSubscriber::connect(&ethereum.ws_endpoint, config.log_buffer)
            .await?;
    let normalizer = Arc::new(LockEventNormalizer::from_config(ethereum));
    let mut supervisor =
        WatcherSupervisor::new(Arc::new(subscriber), normalizer, claims, config)
            .with_metrics(ctx.metrics.clone());
    supervisor.register(WatchTarget {
        key: WatchKey::new(ethereum.contract_address, ethereum.event),
        signature_hash: ethereum.event_signature_hash(),
        resume_from: ethereum.resume_from_block,
    });
    supervisor.start().await?;
    tracing::debug!(
        chain_id = %ethereum.chain_id,
        contract = %ethereum.contract_address,
        "Events watcher started",
    );
    Ok(supervisor)
}

async fn run_relay_pool(
    ctx: RelayerContext,
    orchestrator: RelayOrchestrator,
    claims: mpsc::Receiver<WitnessClaim>,
) -> crate::Result<()> {
    let mut shutdown_signal = ctx.shutdown_signal();
    tokio::select! {
        result = orchestrator.run(claims) => {
            tracing::warn!("Relay orchestrator stopped");
            result
        },
        _ = shutdown_signal.recv() => {
            tracing::trace!("Stopping the relay orchestrator");
            Ok(())
        },
    }
}

fn restart_policy(config: &EventsWatcherConfig) -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: None,
        max_interval: config.max_restart_interval(),
        ..Default::default()
    }
}

/// Restarts failed watchers, resuming from the last block they delivered.
#[tracing::instrument(skip_all)]
async fn supervise_watchers(
    ctx: RelayerContext,
    mut supervisor: WatcherSupervisor<WsLogSubscriber>,
) -> crate::Result<()> {
    let mut shutdown_signal = ctx.shutdown_signal();
    let config = ctx.config.events_watcher;
    let result = loop {
        let failure = tokio::select! {
            failure = supervisor.next_error() => failure,
            _ = shutdown_signal.recv() => None,
        };
        let Some(WatchError { key, error }) = failure else {
            break Ok(());
        };
        tracing::error!(%key, %error, "Events watcher failed, restarting");
        let restarted = tokio::select! {
            result = supervisor.restart_with_backoff(key, restart_policy(&config)) => Some(result),
            _ = shutdown_signal.recv() => None,
        };
        match restarted {
            Some(Ok(())) => continue,
            Some(Err(e)) => break Err(e),
            None => break Ok(()),
        }
    };
    tracing::trace!("Stopping the events watchers");
    supervisor.stop(true).await;
    result
}

async fn run_stats_reporter(ctx: RelayerContext) -> crate::Result<()> {
    let mut shutdown_signal = ctx.shutdown_signal();
    let interval = ctx.config.relay.stats_report_interval();
    tokio::select! {
        _ = report_stats(ctx.stats.clone(), interval) => {
            tracing::warn!("Stats reporter stopped");
        },
        _ = shutdown_signal.recv() => {},
    }
    Ok(())
}
