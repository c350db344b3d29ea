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

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use derive_more::Display;
use ethers::providers::ProviderError;

/// Metrics functionality
pub mod metric;
/// A module used for debugging relayer lifecycle, watcher state, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the execution of the
/// bridge relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in the underlying Http server.
    #[error(transparent)]
    Axum(#[from] axum::Error),
    /// HTTP Error
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    /// Error in the Ws Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ProviderError),
    /// Reqwest error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Prometheus registry error.
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// The configuration was parsed but is not usable.
    #[error("Invalid config: {}", _0)]
    InvalidConfig(String),
    /// The upstream client failed to attach a subscription, or did not
    /// attach in time.
    #[error("Failed to subscribe to {key}: {reason}")]
    Subscribe {
        /// The watch this subscription was for.
        key: String,
        /// What went wrong.
        reason: String,
    },
    /// A subscription died after it was active.
    #[error("Subscription to {key} disconnected: {reason}")]
    UpstreamDisconnect {
        /// The watch this subscription was for.
        key: String,
        /// What went wrong.
        reason: String,
    },
    /// The event name does not map to any supported event kind.
    #[error("Unsupported event: {name}")]
    UnsupportedEvent {
        /// The name of the event as reported by the watcher.
        name: String,
    },
    /// A field of the event could not be extracted.
    #[error("Malformed event, field `{field}`: {reason}")]
    MalformedEvent {
        /// The name of the field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The token of a lock event is not in the token registry.
    #[error("Token {token} is not registered")]
    UnknownToken {
        /// The token address.
        token: String,
    },
    /// The destination chain rejected a submitted transaction.
    #[error("Submission rejected: {}", _0)]
    SubmissionRejected(Rejection),
    /// No validator accounts matched the configured prefix.
    #[error("No validators are online with prefix `{prefix}`")]
    NoValidators {
        /// The configured account name prefix.
        prefix: String,
    },
    /// The watcher supervisor has nothing to start.
    #[error("No watchers have been started")]
    NoWatchersStarted,
    /// The watcher supervisor does not know about this watch.
    #[error("Watcher not found: {key}")]
    WatcherNotFound {
        /// The watch key.
        key: String,
    },
    /// The destination chain does not know this account.
    #[error("Account not found: {address}")]
    AccountNotFound {
        /// The account address.
        address: String,
    },
    /// The LCD server answered with an error body.
    #[error("LCD error ({status}): {message}")]
    Lcd {
        /// HTTP status code of the response.
        status: u16,
        /// Error message from the response body.
        message: String,
    },
    /// A background service returned while the relayer was still running.
    #[error("Task stopped abnormally")]
    TaskStoppedAbnormally,
}

/// The reason the destination chain gave for rejecting a transaction.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The transaction was signed at the wrong sequence number.
    #[display(fmt = "bad sequence (expected {:?})", expected)]
    BadSequence {
        /// The sequence the chain expected, if it told us.
        expected: Option<u64>,
    },
    /// The fee did not cover the transaction.
    #[display(fmt = "insufficient fee")]
    InsufficientFee,
    /// The account cannot pay for the transaction.
    #[display(fmt = "insufficient funds")]
    InsufficientFunds,
    /// The signature did not verify.
    #[display(fmt = "invalid signature")]
    InvalidSignature,
    /// Anything else the chain refused, with its result code.
    #[display(fmt = "code {}: {}", code, log)]
    Other {
        /// The ABCI result code.
        code: u32,
        /// The raw log of the rejection.
        log: String,
    },
}

/// A type alias for the result for the bridge relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for HandlerError {
    fn from(value: Error) -> Self {
        HandlerError(StatusCode::INTERNAL_SERVER_ERROR, value.to_string())
    }
}

/// Error type for HTTP handlers
pub struct HandlerError(
    /// HTTP status code for response
    pub StatusCode,
    /// Response message
    pub String,
);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}
