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

//! Watches the `LogLock` events of the Ethereum bridge contract.
//!
//! The [`WsLogSubscriber`] keeps a websocket subscription to the contract
//! logs, and the [`LockEventNormalizer`] turns each lock into a
//! [`WitnessClaim`](ebrelayer_types::WitnessClaim).

mod lock_event;
mod normalizer;
mod tokens;
mod ws_subscriber;

pub use lock_event::{LogLockFields, SupportedEvent};
pub use normalizer::LockEventNormalizer;
pub use tokens::{StaticTokenRegistry, TokenMetadata, TokenRegistry};
pub use ws_subscriber::WsLogSubscriber;
