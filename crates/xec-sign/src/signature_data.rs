//! Accumulated signing state for one input.

use std::collections::BTreeMap;

use xec_primitives::ec::PublicKey;
use xec_primitives::KeyId;
use xec_script::Script;

use crate::KeyOriginInfo;

/// A public key together with a signature made by it. The signature bytes
/// include the trailing sighash byte.
pub type SigPair = (PublicKey, Vec<u8>);

/// Everything known so far about satisfying one locking script.
///
/// Once `complete` is set, `script_sig` fully satisfies the locking script
/// and merging never changes it again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureData {
    /// Whether `script_sig` fully satisfies the locking script.
    pub complete: bool,
    /// The unlocking script assembled so far.
    pub script_sig: Script,
    /// Redeem script for P2SH outputs, empty if unknown.
    pub redeem_script: Script,
    /// Signatures collected so far, by signing key id.
    pub signatures: BTreeMap<KeyId, SigPair>,
    /// Public keys (and their origins) met while signing, by key id.
    pub misc_pubkeys: BTreeMap<KeyId, (PublicKey, KeyOriginInfo)>,
}

impl SignatureData {
    /// Create an empty, incomplete signature data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `other` into `self`.
    ///
    /// A complete `self` is left alone; a complete `other` replaces `self`.
    /// Otherwise signatures and public keys are unioned (entries already in
    /// `self` win) and empty scripts are filled from `other`.
    pub fn merge(&mut self, other: SignatureData) {
        if self.complete {
            return;
        }
        if other.complete {
            *self = other;
            return;
        }
        if self.redeem_script.is_empty() && !other.redeem_script.is_empty() {
            self.redeem_script = other.redeem_script;
        }
        if self.script_sig.is_empty() && !other.script_sig.is_empty() {
            self.script_sig = other.script_sig;
        }
        for (key_id, pair) in other.signatures {
            self.signatures.entry(key_id).or_insert(pair);
        }
        for (key_id, entry) in other.misc_pubkeys {
            self.misc_pubkeys.entry(key_id).or_insert(entry);
        }
    }

    /// Pure variant of [`merge`](Self::merge).
    pub fn merged(a: &SignatureData, b: &SignatureData) -> SignatureData {
        let mut out = a.clone();
        out.merge(b.clone());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xec_primitives::ec::PrivateKey;

    fn pair(byte: u8) -> (KeyId, SigPair) {
        let pub_key = PrivateKey::from_bytes(&[byte; 32]).unwrap().pub_key();
        (pub_key.key_id(), (pub_key, vec![byte, 0x41]))
    }

    #[test]
    fn test_merge_unions_partial_data() {
        let (id1, p1) = pair(1);
        let (id2, p2) = pair(2);
        let mut a = SignatureData::new();
        a.signatures.insert(id1, p1.clone());
        let mut b = SignatureData::new();
        b.signatures.insert(id2, p2.clone());
        b.redeem_script = Script::from_bytes(&[0x51]);

        let merged = SignatureData::merged(&a, &b);
        assert_eq!(merged.signatures.len(), 2);
        assert_eq!(merged.redeem_script, b.redeem_script);
        assert!(!merged.complete);
        assert_eq!(merged, SignatureData::merged(&b, &a));
    }

    #[test]
    fn test_merge_existing_entries_win() {
        let (id1, p1) = pair(1);
        let mut a = SignatureData::new();
        a.signatures.insert(id1, p1.clone());
        a.redeem_script = Script::from_bytes(&[0x52]);
        let mut b = SignatureData::new();
        b.signatures.insert(id1, (p1.0.clone(), vec![0xff]));
        b.redeem_script = Script::from_bytes(&[0x53]);

        a.merge(b);
        assert_eq!(a.signatures[&id1].1, p1.1);
        assert_eq!(a.redeem_script.to_bytes(), &[0x52]);
    }

    #[test]
    fn test_merge_complete_rules() {
        let (id1, p1) = pair(1);
        let mut complete = SignatureData::new();
        complete.complete = true;
        complete.script_sig = Script::from_bytes(&[0x51]);

        let mut partial = SignatureData::new();
        partial.signatures.insert(id1, p1);

        // A complete side replaces an incomplete one.
        assert_eq!(SignatureData::merged(&partial, &complete), complete);
        // A complete self never changes.
        assert_eq!(SignatureData::merged(&complete, &partial), complete);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (id1, p1) = pair(1);
        let mut a = SignatureData::new();
        a.signatures.insert(id1, p1);
        assert_eq!(SignatureData::merged(&a, &a), a);
    }
}
