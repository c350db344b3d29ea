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

/// The default port the relayer will listen on. Defaults to 9955.
pub const fn port() -> u16 {
    9955
}
/// The signature of the watched lock event.
pub fn event_signature() -> String {
    String::from("LogLock(address,address,uint256,uint256)")
}
/// The denomination used for claims of the native asset.
pub fn native_denom() -> String {
    String::from("ethereum")
}
/// Decimals of the native asset on the source chain.
pub const fn native_decimals() -> u8 {
    18
}
/// The LCD route that accepts bridge claims.
pub fn claim_route() -> String {
    String::from("ethbridge/prophecies")
}
/// Validator accounts are key store entries whose name starts with this.
pub fn validator_prefix() -> String {
    String::from("validator")
}
/// LCD request timeout is `30s` by default.
pub const fn request_timeout() -> u64 {
    30_000
}
/// Minimum milliseconds between two claim dispatches.
pub const fn rate_limit() -> u64 {
    500
}
/// The destination chain block time estimate in milliseconds.
pub const fn block_time() -> u64 {
    1_000
}
/// A resequence is forced after this many successful submissions.
pub const fn resequence_threshold() -> u32 {
    200
}
/// Capacity of the channel between the watchers and the relay pool.
pub const fn claim_channel_capacity() -> usize {
    64
}
/// The print stats interval is set to `7_000` by default.
pub const fn stats_report_interval() -> u64 {
    7_000
}
/// At most this many validator accounts are initialized at once.
pub const fn spawn_concurrency() -> usize {
    50
}
/// A subscription must attach within `10s` by default.
pub const fn attach_timeout() -> u64 {
    10_000
}
/// Subscriptions are renewed every `30min` by default.
pub const fn resubscribe_interval() -> u64 {
    30 * 60 * 1_000
}
/// Buffered logs per subscription.
pub const fn log_buffer() -> usize {
    32
}
/// Upper bound of the delay between two restarts of a failed watcher.
pub const fn max_restart_interval() -> u64 {
    60_000
}
