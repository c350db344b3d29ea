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

use std::sync::Arc;

use ebrelayer_event_watcher_traits::{LogSubscriber, LogSubscription};
use ebrelayer_types::rpc_url::RpcUrl;
use ebrelayer_types::RawLog;
use ebrelayer_utils::Error;
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Address, Filter, H256};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

/// Subscribes to contract logs over a websocket provider.
#[derive(Debug, Clone)]
pub struct WsLogSubscriber {
    provider: Arc<Provider<Ws>>,
    log_buffer: usize,
}

impl WsLogSubscriber {
    /// Connects to the websocket endpoint. Each subscription buffers up to
    /// `log_buffer` logs.
    #[tracing::instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn connect(
        endpoint: &RpcUrl,
        log_buffer: usize,
    ) -> ebrelayer_utils::Result<Self> {
        tracing::debug!("Connecting to {}", endpoint);
        let provider = Provider::<Ws>::connect(endpoint.as_str()).await?;
        Ok(Self::new(Arc::new(provider), log_buffer))
    }

    /// Uses an already connected provider.
    pub fn new(provider: Arc<Provider<Ws>>, log_buffer: usize) -> Self {
        Self {
            provider,
            log_buffer: log_buffer.max(1),
        }
    }
}

#[async_trait::async_trait]
impl LogSubscriber for WsLogSubscriber {
    const TAG: &'static str = "Ethereum Websocket";

    async fn subscribe(
        &self,
        contract: Address,
        signature: H256,
    ) -> ebrelayer_utils::Result<LogSubscription> {
        let (attached_tx, attached_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let (logs_tx, logs_rx) = mpsc::channel(self.log_buffer);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        tokio::spawn(forward_logs(
            self.provider.clone(),
            contract,
            signature,
            attached_tx,
            cancel_rx,
            logs_tx,
            errors_tx,
        ));
        attached_rx
            .await
            .map_err(|_| Error::Generic("log subscription task ended"))??;
        Ok(LogSubscription::new(logs_rx, errors_rx, move || {
            // the task may already be gone if the stream ended.
            let _ = cancel_tx.send(());
        }))
    }

    async fn fetch_logs(
        &self,
        contract: Address,
        signature: H256,
        from_block: u64,
    ) -> ebrelayer_utils::Result<Vec<RawLog>> {
        let filter = Filter::new()
            .address(contract)
            .topic0(signature)
            .from_block(from_block);
        let logs = self.provider.get_logs(&filter).await?;
        tracing::trace!("Got #{} past logs since block {}", logs.len(), from_block);
        Ok(logs.into_iter().map(RawLog::from).collect())
    }
}

/// Owns one upstream subscription until it is cancelled or the stream ends.
///
/// A cancel signal unsubscribes upstream, a dropped cancel sender only stops
/// forwarding.
async fn forward_logs(
    provider: Arc<Provider<Ws>>,
    contract: Address,
    signature: H256,
    attached: oneshot::Sender<ebrelayer_utils::Result<()>>,
    mut cancel: oneshot::Receiver<()>,
    logs: mpsc::Sender<RawLog>,
    errors: mpsc::Sender<Error>,
) {
    let filter = Filter::new().address(contract).topic0(signature);
    let mut stream = match provider.subscribe_logs(&filter).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = attached.send(Err(e.into()));
            return;
        }
    };
    let id = stream.id;
    if attached.send(Ok(())).is_err() {
        tracing::debug!(%id, "attach abandoned, unsubscribing");
        if let Err(e) = stream.unsubscribe().await {
            tracing::warn!(%id, %e, "failed to unsubscribe");
        }
        return;
    }
    loop {
        tokio::select! {
            cancelled = &mut cancel => {
                if cancelled.is_ok() {
                    if let Err(e) = stream.unsubscribe().await {
                        tracing::warn!(%id, %e, "failed to unsubscribe");
                    }
                    tracing::trace!(%id, "unsubscribed");
                }
                return;
            }
            next = stream.next() => {
                let Some(log) = next else {
                    let _ = errors
                        .send(Error::UpstreamDisconnect {
                            key: format!("{contract:#x}"),
                            reason: String::from("log stream ended"),
                        })
                        .await;
                    return;
                };
                tokio::select! {
                    cancelled = &mut cancel => {
                        if cancelled.is_ok() {
                            if let Err(e) = stream.unsubscribe().await {
                                tracing::warn!(%id, %e, "failed to unsubscribe");
                            }
                        }
                        return;
                    }
                    // a closed receiver means the cancel signal is on its way.
                    _ = logs.send(RawLog::from(log)) => {}
                }
            }
        }
    }
}
