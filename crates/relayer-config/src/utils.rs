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

use std::path::{Path, PathBuf};

use config::{Config, File};
use ebrelayer_utils::Error;
use ethers::types::Address;

use crate::RelayerConfig;

/// The highest token decimals whose scale factor still fits in 256 bits.
const MAX_TOKEN_DECIMALS: u8 = 77;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> ebrelayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(Error::from))
        .collect()
}

/// Try to parse the [`RelayerConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> ebrelayer_utils::Result<RelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of EBRELAYER).
    let builder = builder.add_source(
        config::Environment::with_prefix("EBRELAYER").separator("_"),
    );
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        RelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and
///
/// Returns `Ok(RelayerConfig)` on success, or `Err(Error)` on failure.
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(path: P) -> ebrelayer_utils::Result<RelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: RelayerConfig,
) -> ebrelayer_utils::Result<RelayerConfig> {
    tracing::trace!("Checking configration sanity ...");

    if config.cosmos.chain_id.trim().is_empty() {
        return Err(invalid("cosmos.chain-id is required"));
    }
    if config.cosmos.validator_prefix.is_empty() {
        return Err(invalid("cosmos.validator-prefix must not be empty"));
    }
    if config.relay.rate_limit == 0 {
        return Err(invalid("relay.rate-limit must be at least 1ms"));
    }
    if config.relay.resequence_threshold == 0 {
        return Err(invalid("relay.resequence-threshold must be positive"));
    }
    if config.relay.claim_channel_capacity == 0 {
        return Err(invalid("relay.claim-channel-capacity must be positive"));
    }
    if config.relay.spawn_concurrency == 0 {
        return Err(invalid("relay.spawn-concurrency must be positive"));
    }
    if config.events_watcher.attach_timeout == 0 {
        return Err(invalid("events-watcher.attach-timeout must be positive"));
    }
    if config.events_watcher.resubscribe_interval
        <= config.events_watcher.attach_timeout
    {
        return Err(invalid(
            "events-watcher.resubscribe-interval must be longer than the attach-timeout",
        ));
    }
    if config.events_watcher.log_buffer == 0 {
        return Err(invalid("events-watcher.log-buffer must be positive"));
    }

    let event_name = config.ethereum.event.name();
    if !config
        .ethereum
        .event_signature
        .starts_with(&format!("{event_name}("))
    {
        return Err(Error::InvalidConfig(format!(
            "ethereum.event-signature `{}` does not match the {} event",
            config.ethereum.event_signature, event_name
        )));
    }
    // the zero address is the native asset, it is configured by native-denom.
    if config.ethereum.tokens.remove(&Address::zero()).is_some() {
        tracing::warn!(
            "!!WARNING!!: ignoring the token entry for the zero address, use `native-denom` instead"
        );
    }
    for (token, meta) in &config.ethereum.tokens {
        if meta.symbol.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "token {token:#x} has an empty symbol"
            )));
        }
        if meta.decimals > MAX_TOKEN_DECIMALS {
            return Err(Error::InvalidConfig(format!(
                "token {token:#x} has {} decimals, at most {MAX_TOKEN_DECIMALS} are supported",
                meta.decimals
            )));
        }
    }

    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );

    Ok(config)
}

fn invalid(reason: &str) -> Error {
    Error::InvalidConfig(reason.to_owned())
}
