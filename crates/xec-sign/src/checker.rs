//! Signature checkers: decide whether a signature is valid for a key.

use std::cell::RefCell;
use std::collections::BTreeMap;

use xec_primitives::ec::{PublicKey, Signature};
use xec_primitives::KeyId;
use xec_script::Script;
use xec_transaction::sighash::{signature_hash, SigHashType};
use xec_transaction::Transaction;

use crate::SigPair;

/// Validates `<signature><sighash byte>` against a public key.
pub trait SignatureChecker {
    /// Check `sig` (DER signature plus trailing sighash byte) against the
    /// serialized `pub_key` for the given script code.
    fn check_sig(&self, sig: &[u8], pub_key: &[u8], script_code: &Script) -> bool;
}

/// Checker bound to one input of a transaction and the amount it spends.
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    amount: u64,
}

impl<'a> TransactionSignatureChecker<'a> {
    /// Bind a checker to input `input_index` of `tx`, spending `amount`.
    pub fn new(tx: &'a Transaction, input_index: usize, amount: u64) -> Self {
        TransactionSignatureChecker {
            tx,
            input_index,
            amount,
        }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    /// Rejects empty signatures, signatures without FORKID, high-S
    /// signatures and anything that does not parse.
    fn check_sig(&self, sig: &[u8], pub_key: &[u8], script_code: &Script) -> bool {
        let Some((&hash_byte, der)) = sig.split_last() else {
            return false;
        };
        let sighash = SigHashType::new(u32::from(hash_byte));
        if !sighash.has_forkid() {
            return false;
        }
        let Ok(pub_key) = PublicKey::from_bytes(pub_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_der(der) else {
            return false;
        };
        if !signature.is_low_s() {
            return false;
        }
        match signature_hash(
            self.tx,
            self.input_index,
            script_code.to_bytes(),
            sighash,
            self.amount,
        ) {
            Ok(hash) => signature.verify(&hash, &pub_key),
            Err(_) => false,
        }
    }
}

/// Checker that accepts every signature.
#[derive(Clone, Copy, Debug, Default)]
pub struct DummySignatureChecker;

impl SignatureChecker for DummySignatureChecker {
    fn check_sig(&self, _sig: &[u8], _pub_key: &[u8], _script_code: &Script) -> bool {
        true
    }
}

/// Wraps another checker and records every signature that passes it.
pub(crate) struct SignatureExtractorChecker<'a> {
    checker: &'a dyn SignatureChecker,
    found: RefCell<BTreeMap<KeyId, SigPair>>,
}

impl<'a> SignatureExtractorChecker<'a> {
    pub(crate) fn new(checker: &'a dyn SignatureChecker) -> Self {
        SignatureExtractorChecker {
            checker,
            found: RefCell::new(BTreeMap::new()),
        }
    }

    pub(crate) fn has_signature(&self, key_id: &KeyId) -> bool {
        self.found.borrow().contains_key(key_id)
    }

    pub(crate) fn into_signatures(self) -> BTreeMap<KeyId, SigPair> {
        self.found.into_inner()
    }
}

impl SignatureChecker for SignatureExtractorChecker<'_> {
    fn check_sig(&self, sig: &[u8], pub_key: &[u8], script_code: &Script) -> bool {
        if !self.checker.check_sig(sig, pub_key, script_code) {
            return false;
        }
        if let Ok(key) = PublicKey::from_bytes(pub_key) {
            self.found
                .borrow_mut()
                .entry(key.key_id())
                .or_insert_with(|| (key, sig.to_vec()));
        }
        true
    }
}
