//! Signature creators: turn a key id and script code into a signature.

use log::trace;
use xec_primitives::KeyId;
use xec_script::Script;
use xec_transaction::sighash::{signature_hash, SigHashType, SIGHASH_ALL_FORKID};
use xec_transaction::Transaction;

use crate::checker::{DummySignatureChecker, SignatureChecker, TransactionSignatureChecker};
use crate::SigningProvider;

/// Produces raw signatures for the signing pipeline.
pub trait SignatureCreator {
    /// The checker that validates what this creator produces.
    fn checker(&self) -> &dyn SignatureChecker;

    /// Create a signature (with trailing sighash byte) by the key `key_id`
    /// over `script_code`.
    ///
    /// # Returns
    /// `None` when the key is unavailable or signing fails. This is never a
    /// hard error; the pipeline simply leaves the slot unsigned.
    fn create_sig(
        &self,
        provider: &dyn SigningProvider,
        key_id: &KeyId,
        script_code: &Script,
    ) -> Option<Vec<u8>>;
}

/// Creator that signs input `input_index` of a transaction with
/// RFC6979-deterministic, low-S ECDSA.
pub struct MutableTransactionSignatureCreator<'a> {
    tx: &'a Transaction,
    input_index: usize,
    amount: u64,
    sighash: SigHashType,
    checker: TransactionSignatureChecker<'a>,
}

impl<'a> MutableTransactionSignatureCreator<'a> {
    /// Bind a creator to (tx, input, spent amount, sighash type).
    pub fn new(tx: &'a Transaction, input_index: usize, amount: u64, sighash: SigHashType) -> Self {
        MutableTransactionSignatureCreator {
            tx,
            input_index,
            amount,
            sighash,
            checker: TransactionSignatureChecker::new(tx, input_index, amount),
        }
    }
}

impl SignatureCreator for MutableTransactionSignatureCreator<'_> {
    fn checker(&self) -> &dyn SignatureChecker {
        &self.checker
    }

    fn create_sig(
        &self,
        provider: &dyn SigningProvider,
        key_id: &KeyId,
        script_code: &Script,
    ) -> Option<Vec<u8>> {
        let key = provider.get_key(key_id)?;
        let hash = match signature_hash(
            self.tx,
            self.input_index,
            script_code.to_bytes(),
            self.sighash,
            self.amount,
        ) {
            Ok(hash) => hash,
            Err(e) => {
                trace!("cannot hash input {} for {}: {}", self.input_index, key_id, e);
                return None;
            }
        };
        let signature = key.sign(&hash).ok()?;
        let mut sig = signature.to_der();
        sig.push(self.sighash.to_byte());
        trace!("signed input {} with key {}", self.input_index, key_id);
        Some(sig)
    }
}

/// Creator producing well-formed placeholder signatures of a fixed size,
/// for size estimation and solvability checks. Never touches keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DummySignatureCreator {
    r_len: u8,
    s_len: u8,
}

/// Placeholder of the usual size: 71 bytes.
pub const DUMMY_SIGNATURE_CREATOR: DummySignatureCreator = DummySignatureCreator::new(32, 32);

/// Placeholder of the largest possible size: 72 bytes.
pub const DUMMY_MAXIMUM_SIGNATURE_CREATOR: DummySignatureCreator =
    DummySignatureCreator::new(33, 32);

impl DummySignatureCreator {
    /// Creator whose signatures have `r_len`-byte R and `s_len`-byte S.
    pub const fn new(r_len: u8, s_len: u8) -> Self {
        DummySignatureCreator { r_len, s_len }
    }

    /// Length of each produced signature, sighash byte included.
    pub const fn signature_len(&self) -> usize {
        self.r_len as usize + self.s_len as usize + 7
    }
}

impl SignatureCreator for DummySignatureCreator {
    fn checker(&self) -> &dyn SignatureChecker {
        &DummySignatureChecker
    }

    fn create_sig(
        &self,
        _provider: &dyn SigningProvider,
        _key_id: &KeyId,
        _script_code: &Script,
    ) -> Option<Vec<u8>> {
        let r = self.r_len as usize;
        let s = self.s_len as usize;
        let mut sig = vec![0u8; self.signature_len()];
        sig[0] = 0x30;
        sig[1] = self.r_len + self.s_len + 4;
        sig[2] = 0x02;
        sig[3] = self.r_len;
        sig[4] = 0x01;
        sig[4 + r] = 0x02;
        sig[5 + r] = self.s_len;
        sig[6 + r] = 0x01;
        sig[6 + r + s] = SIGHASH_ALL_FORKID as u8;
        Some(sig)
    }
}
