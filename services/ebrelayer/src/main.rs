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

//! Ethereum Bridge Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use tokio::signal::unix;

use ebrelayer::service::{self, Services};
use ebrelayer_config::cli::{load_config, setup_logger, Opts};
use ebrelayer_context::RelayerContext;
use ebrelayer_utils::probe;

/// How long the services get to stop after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// The main entry point for the relayer.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose, "ebrelayer")?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;

    // The RelayerContext takes a configuration, and holds what is shared
    // throughout the lifetime of the relayer.
    let ctx = RelayerContext::new(config)?;

    // start all background services.
    let mut services = service::ignite(&ctx).await?;
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        started = true
    );
    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    let outcome = tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
            Ok(())
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
            Ok(())
        },
        _ = quit_signal.recv() => {
            tracing::warn!("Quitting ...");
            Ok(())
        },
        Some(stopped) = services.join_next() => {
            match stopped {
                Ok(Ok(())) => tracing::error!("A service stopped on its own"),
                Ok(Err(e)) => tracing::error!(%e, "A service failed"),
                Err(e) => tracing::error!(%e, "A service panicked"),
            }
            Err(ebrelayer_utils::Error::TaskStoppedAbnormally)
        },
    };
    shutdown(&ctx, services).await;
    Ok(outcome?)
}

async fn shutdown(ctx: &RelayerContext, mut services: Services) {
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        shutdown = true
    );
    tracing::warn!("Shutting down...");
    // send shutdown signal to all of the application.
    ctx.shutdown();
    let drain = async { while services.join_next().await.is_some() {} };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("Services did not stop in time, aborting them");
        services.abort_all();
    }
    tracing::info!("Clean Exit ..");
}
