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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Ethereum Bridge Relayer Crate 🕸️
//!
//! Relays lock events of an Ethereum bridge contract to the oracle module of
//! a Cosmos chain.
//!
//! ## Overview
//!
//! Every validator run by the operator attests to every lock it sees on the
//! source chain. The relayer does this on their behalf:
//!
//!   1. It keeps a websocket subscription to the `LogLock` event of the
//!      bridge contract, renewing it before the provider drops it.
//!   2. It turns each log into a claim: who locked, who receives, what
//!      amount of which denomination, under which nonce.
//!   3. It submits each claim through one of the validator accounts held by
//!      the LCD server, round robin and rate limited, keeping the sequence
//!      number of every account in step with the chain.
//!
//! Nothing is stored on disk. Sequence numbers are always re-read from the
//! chain when in doubt.

/// Starts the long running services.
pub mod service;

pub use ebrelayer_utils::{Error, Result};
