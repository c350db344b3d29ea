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

use serde::Deserialize;

/// The passphrase that unlocks the validator keys in the key store.
///
/// It is never printed and never serialized. In the config files it is
/// usually given as `$ENV_VAR` so the value stays out of the files too.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    /// Wraps a passphrase. Returns `None` for an empty one.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        (!value.is_empty()).then_some(Self(value))
    }

    /// The secret value, for handing over to the key store.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

impl<'de> Deserialize<'de> for Passphrase {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PassphraseVisitor;
        impl<'de> serde::de::Visitor<'de> for PassphraseVisitor {
            type Value = Passphrase;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "a non-empty passphrase or an env var containing it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !value.starts_with('$') {
                    tracing::warn!(
                        "validator passphrase is stored in plain text, consider using an env var"
                    );
                }
                let raw = crate::read_env_indirection(value)
                    .map_err(serde::de::Error::custom)?;
                Passphrase::new(raw).ok_or_else(|| {
                    serde::de::Error::custom("passphrase must not be empty")
                })
            }
        }

        deserializer.deserialize_str(PassphraseVisitor)
    }
}
