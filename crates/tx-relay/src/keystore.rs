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

use ebrelayer_types::passphrase::Passphrase;

/// An account of the key store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// The local name of the key.
    pub name: String,
    /// The bech32 account address.
    pub address: String,
    /// The bech32 public key.
    pub public_key: String,
}

/// What a validator signs with.
///
/// Signing is delegated to the key store, so this only names the key and
/// carries the passphrase that unlocks it.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningCredential {
    name: String,
    passphrase: Passphrase,
}

impl SigningCredential {
    /// Creates a credential for the key `name`.
    pub fn new(name: impl Into<String>, passphrase: Passphrase) -> Self {
        Self {
            name: name.into(),
            passphrase,
        }
    }

    /// The name of the key in the key store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The passphrase unlocking the key.
    pub fn passphrase(&self) -> &Passphrase {
        &self.passphrase
    }
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("name", &self.name)
            .field("passphrase", &self.passphrase)
            .finish()
    }
}

/// Holds the validator keys.
#[async_trait::async_trait]
pub trait KeyStore: Send + Sync {
    /// Every account the key store knows about.
    async fn list_accounts(&self) -> ebrelayer_utils::Result<Vec<KeyInfo>>;

    /// Unlocks the key `name` for signing.
    async fn export_signing_key(
        &self,
        name: &str,
        passphrase: &Passphrase,
    ) -> ebrelayer_utils::Result<SigningCredential>;
}
