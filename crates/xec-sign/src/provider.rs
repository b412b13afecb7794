//! Signing providers: read-only views over known scripts, keys and origins.
//!
//! A provider answers four lookups. "Not found" is always `None`, never an
//! error, and every method defaults to "not found" so implementations only
//! override what they know.

use std::collections::BTreeMap;

use xec_primitives::ec::{PrivateKey, PublicKey};
use xec_primitives::{KeyId, ScriptId};
use xec_script::Script;

use crate::KeyOriginInfo;

/// Capability interface over a keystore.
pub trait SigningProvider {
    /// Look up a script by its id (redeem scripts for P2SH).
    fn get_script(&self, _script_id: &ScriptId) -> Option<Script> {
        None
    }

    /// Look up a public key by its id.
    fn get_pub_key(&self, _key_id: &KeyId) -> Option<PublicKey> {
        None
    }

    /// Look up a private key by the id of its public key.
    ///
    /// This is the only query that exposes secret material.
    fn get_key(&self, _key_id: &KeyId) -> Option<PrivateKey> {
        None
    }

    /// Look up where a key was derived from.
    fn get_key_origin(&self, _key_id: &KeyId) -> Option<KeyOriginInfo> {
        None
    }
}

/// Provider that knows nothing. Used to finalize already signed data.
#[derive(Clone, Copy, Debug, Default)]
pub struct DummySigningProvider;

impl SigningProvider for DummySigningProvider {}

/// Decorator that can hide private keys and/or key origins of another
/// provider. Scripts and public keys always pass through.
pub struct HidingSigningProvider<'a> {
    provider: &'a dyn SigningProvider,
    hide_secret: bool,
    hide_origin: bool,
}

impl<'a> HidingSigningProvider<'a> {
    /// Wrap `provider`.
    ///
    /// # Arguments
    /// * `provider` - The provider to filter.
    /// * `hide_secret` - Answer `get_key` with `None`.
    /// * `hide_origin` - Answer `get_key_origin` with `None`.
    pub fn new(provider: &'a dyn SigningProvider, hide_secret: bool, hide_origin: bool) -> Self {
        HidingSigningProvider {
            provider,
            hide_secret,
            hide_origin,
        }
    }
}

impl SigningProvider for HidingSigningProvider<'_> {
    fn get_script(&self, script_id: &ScriptId) -> Option<Script> {
        self.provider.get_script(script_id)
    }

    fn get_pub_key(&self, key_id: &KeyId) -> Option<PublicKey> {
        self.provider.get_pub_key(key_id)
    }

    fn get_key(&self, key_id: &KeyId) -> Option<PrivateKey> {
        if self.hide_secret {
            return None;
        }
        self.provider.get_key(key_id)
    }

    fn get_key_origin(&self, key_id: &KeyId) -> Option<KeyOriginInfo> {
        if self.hide_origin {
            return None;
        }
        self.provider.get_key_origin(key_id)
    }
}

/// In-memory provider backed by plain maps.
#[derive(Clone, Debug, Default)]
pub struct FlatSigningProvider {
    /// Known scripts by id.
    pub scripts: BTreeMap<ScriptId, Script>,
    /// Known public keys by id.
    pub pubkeys: BTreeMap<KeyId, PublicKey>,
    /// Known private keys by the id of their public key.
    pub keys: BTreeMap<KeyId, PrivateKey>,
    /// Known key origins by key id.
    pub origins: BTreeMap<KeyId, KeyOriginInfo>,
}

impl FlatSigningProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a private key and its public key.
    ///
    /// # Returns
    /// The key id under which both were stored.
    pub fn add_key(&mut self, key: PrivateKey) -> KeyId {
        let pub_key = key.pub_key();
        let key_id = pub_key.key_id();
        self.pubkeys.insert(key_id, pub_key);
        self.keys.insert(key_id, key);
        key_id
    }

    /// Add a public key.
    pub fn add_pub_key(&mut self, pub_key: PublicKey) -> KeyId {
        let key_id = pub_key.key_id();
        self.pubkeys.insert(key_id, pub_key);
        key_id
    }

    /// Add a script, keyed by its Hash160.
    pub fn add_script(&mut self, script: Script) -> ScriptId {
        let script_id = script.script_id();
        self.scripts.insert(script_id, script);
        script_id
    }

    /// Record where the key with id `key_id` was derived from.
    pub fn add_key_origin(&mut self, key_id: KeyId, origin: KeyOriginInfo) {
        self.origins.insert(key_id, origin);
    }
}

impl SigningProvider for FlatSigningProvider {
    fn get_script(&self, script_id: &ScriptId) -> Option<Script> {
        self.scripts.get(script_id).cloned()
    }

    fn get_pub_key(&self, key_id: &KeyId) -> Option<PublicKey> {
        self.pubkeys.get(key_id).cloned()
    }

    fn get_key(&self, key_id: &KeyId) -> Option<PrivateKey> {
        self.keys.get(key_id).cloned()
    }

    fn get_key_origin(&self, key_id: &KeyId) -> Option<KeyOriginInfo> {
        self.origins.get(key_id).cloned()
    }
}

/// Union of two providers.
///
/// Entries of `a` win on collision. Colliding entries describe the same
/// key or script, so either value is acceptable.
pub fn merge_providers(a: &FlatSigningProvider, b: &FlatSigningProvider) -> FlatSigningProvider {
    fn union<K: Ord + Clone, V: Clone>(a: &BTreeMap<K, V>, b: &BTreeMap<K, V>) -> BTreeMap<K, V> {
        let mut out = b.clone();
        out.extend(a.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    FlatSigningProvider {
        scripts: union(&a.scripts, &b.scripts),
        pubkeys: union(&a.pubkeys, &b.pubkeys),
        keys: union(&a.keys, &b.keys),
        origins: union(&a.origins, &b.origins),
    }
}
