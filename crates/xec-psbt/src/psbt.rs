//! The partially signed transaction container.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, trace, warn};
use xec_primitives::util::{ByteReader, ByteWriter};
use xec_script::{solve, ScriptTemplate};
use xec_sign::{
    produce_signature, HidingSigningProvider, SignError, SignatureData, SigningProvider,
    DUMMY_SIGNATURE_CREATOR,
};
use xec_transaction::{SigHashType, Transaction};

use crate::raw::{
    expect_type_only, write_record, write_separator, write_unknown, MapReader, PSBT_MAGIC_BYTES,
};
use crate::sign::sign_psbt_input;
use crate::{DecodeConfig, PsbtError, PsbtInput, PsbtOutput};

/// The unsigned transaction, as a framed serialized transaction.
pub const PSBT_GLOBAL_UNSIGNED_TX: u8 = 0x00;

/// An unsigned transaction plus the per-input and per-output metadata
/// signers need, exchanged between co-signers until every input is final.
///
/// Two PSBTs compare equal when they describe the same unsigned
/// transaction, whatever signing progress each carries.
#[derive(Clone, Debug, Default)]
pub struct PartiallySignedTransaction {
    /// Always `Some` once constructed or parsed.
    pub tx: Option<Transaction>,
    pub inputs: Vec<PsbtInput>,
    pub outputs: Vec<PsbtOutput>,
    /// Unrecognized global records, keyed by their full raw key.
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl PartialEq for PartiallySignedTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.tx == other.tx
    }
}

impl Eq for PartiallySignedTransaction {}

fn check_script_sigs_empty(tx: &Transaction) -> Result<(), PsbtError> {
    match tx.inputs.iter().position(|input| !input.unlocking_script.is_empty()) {
        Some(index) => Err(PsbtError::UnsignedTxHasScriptSigs(index)),
        None => Ok(()),
    }
}

impl PartiallySignedTransaction {
    /// Wrap an unsigned transaction with one empty map per input and output.
    ///
    /// # Arguments
    /// * `tx` - The transaction to sign. Every unlocking script must be empty.
    ///
    /// # Returns
    /// The new PSBT, or `UnsignedTxHasScriptSigs`.
    pub fn new(tx: Transaction) -> Result<Self, PsbtError> {
        check_script_sigs_empty(&tx)?;
        Ok(PartiallySignedTransaction {
            inputs: vec![PsbtInput::new(); tx.inputs.len()],
            outputs: vec![PsbtOutput::new(); tx.outputs.len()],
            tx: Some(tx),
            unknown: BTreeMap::new(),
        })
    }

    /// The unsigned transaction.
    pub fn unsigned_tx(&self) -> Option<&Transaction> {
        self.tx.as_ref()
    }

    /// Whether the PSBT carries nothing at all.
    pub fn is_null(&self) -> bool {
        self.tx.is_none() && self.inputs.is_empty() && self.outputs.is_empty() && self.unknown.is_empty()
    }

    /// Whether the PSBT is structurally consistent.
    ///
    /// Checks the map counts against the transaction, that the transaction
    /// is unsigned, that every input and output map is sane, and that
    /// output redeem scripts match P2SH outputs.
    pub fn is_sane(&self) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        if self.inputs.len() != tx.inputs.len() || self.outputs.len() != tx.outputs.len() {
            return false;
        }
        if check_script_sigs_empty(tx).is_err() {
            return false;
        }
        if !self.inputs.iter().all(PsbtInput::is_sane) {
            return false;
        }
        self.outputs.iter().zip(&tx.outputs).all(|(output, txout)| {
            if !output.is_sane() {
                return false;
            }
            match solve(&txout.locking_script) {
                ScriptTemplate::ScriptHash(script_id) if !output.redeem_script.is_empty() => {
                    output.redeem_script.script_id() == script_id
                }
                _ => true,
            }
        })
    }

    /// Merge another party's view of the same transaction into this one.
    ///
    /// Records already present here win. On error `self` is left untouched.
    ///
    /// # Returns
    /// `UnexpectedUnsignedTx` if `other` describes a different transaction,
    /// or a count mismatch if either side's maps are malformed.
    pub fn merge(&mut self, other: &PartiallySignedTransaction) -> Result<(), PsbtError> {
        if self.tx != other.tx {
            warn!("refusing to merge PSBTs of different unsigned transactions");
            return Err(PsbtError::UnexpectedUnsignedTx);
        }
        if self.inputs.len() != other.inputs.len() {
            return Err(PsbtError::InputCountMismatch {
                expected: self.inputs.len(),
                found: other.inputs.len(),
            });
        }
        if self.outputs.len() != other.outputs.len() {
            return Err(PsbtError::OutputCountMismatch {
                expected: self.outputs.len(),
                found: other.outputs.len(),
            });
        }

        for (input, theirs) in self.inputs.iter_mut().zip(&other.inputs) {
            input.merge(theirs);
        }
        for (output, theirs) in self.outputs.iter_mut().zip(&other.outputs) {
            output.merge(theirs);
        }
        for (key, value) in &other.unknown {
            self.unknown.entry(key.clone()).or_insert_with(|| value.clone());
        }
        debug!("merged PSBT with {} inputs", self.inputs.len());
        Ok(())
    }

    /// Pure variant of [`merge`](Self::merge).
    pub fn merged(a: &PartiallySignedTransaction, b: &PartiallySignedTransaction) -> Result<Self, PsbtError> {
        let mut out = a.clone();
        out.merge(b)?;
        Ok(out)
    }

    /// Merge any number of PSBTs, earlier ones winning on conflict.
    ///
    /// # Returns
    /// The combined PSBT, `MissingUnsignedTx` when given none, or the first
    /// merge error.
    pub fn combine<I>(psbts: I) -> Result<Self, PsbtError>
    where
        I: IntoIterator<Item = PartiallySignedTransaction>,
    {
        let mut iter = psbts.into_iter();
        let mut out = iter.next().ok_or(PsbtError::MissingUnsignedTx)?;
        for psbt in iter {
            out.merge(&psbt)?;
        }
        Ok(out)
    }

    /// Sign input `index` with whatever `provider` knows.
    ///
    /// # Returns
    /// Whether the input is now complete.
    pub fn sign_input(
        &mut self,
        provider: &dyn SigningProvider,
        index: usize,
        sighash: SigHashType,
    ) -> Result<bool, PsbtError> {
        let tx = self.tx.as_ref().ok_or(PsbtError::MissingUnsignedTx)?;
        let count = self.inputs.len();
        let input = self
            .inputs
            .get_mut(index)
            .ok_or(SignError::InputIndexOutOfRange { index, count })?;
        sign_psbt_input(provider, tx, input, index, sighash)
    }

    /// Record the redeem script and key origins `provider` knows for
    /// output `index`. Private keys are never consulted.
    pub fn update_output(&mut self, provider: &dyn SigningProvider, index: usize) -> Result<(), PsbtError> {
        let tx = self.tx.as_ref().ok_or(PsbtError::MissingUnsignedTx)?;
        let count = self.outputs.len().min(tx.outputs.len());
        let (Some(txout), Some(output)) = (tx.outputs.get(index), self.outputs.get_mut(index)) else {
            return Err(PsbtError::OutputIndexOutOfRange { index, count });
        };

        let public_only = HidingSigningProvider::new(provider, true, false);
        let mut sigdata = SignatureData::new();
        output.fill_signature_data(&mut sigdata);
        produce_signature(&public_only, &DUMMY_SIGNATURE_CREATOR, &txout.locking_script, &mut sigdata);
        output.from_signature_data(&sigdata);
        trace!("updated output {}: {} key origins", index, output.hd_keypaths.len());
        Ok(())
    }

    /// Decode a PSBT with the default limits.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PsbtError> {
        Self::from_bytes_with_config(bytes, &DecodeConfig::default())
    }

    /// Decode a PSBT.
    ///
    /// # Arguments
    /// * `bytes` - The complete encoding; trailing bytes are an error.
    /// * `config` - Limits on record sizes and counts.
    ///
    /// # Returns
    /// The decoded, sane PSBT or the first format error met.
    pub fn from_bytes_with_config(bytes: &[u8], config: &DecodeConfig) -> Result<Self, PsbtError> {
        if bytes.len() > config.max_psbt_size {
            return Err(PsbtError::LimitExceeded(format!(
                "PSBT of {} bytes exceeds {}",
                bytes.len(),
                config.max_psbt_size
            )));
        }

        let mut reader = ByteReader::new(bytes);
        let magic = reader.read_bytes(PSBT_MAGIC_BYTES.len()).map_err(|_| PsbtError::InvalidMagic)?;
        if magic != PSBT_MAGIC_BYTES {
            return Err(PsbtError::InvalidMagic);
        }

        let mut tx: Option<Transaction> = None;
        let mut unknown = BTreeMap::new();
        let mut map = MapReader::new(config);
        while let Some(key) = map.next_key(&mut reader)? {
            match key[0] {
                PSBT_GLOBAL_UNSIGNED_TX => {
                    expect_type_only(key)?;
                    let unsigned = map.read_framed(&mut reader, |r| Ok(Transaction::read_from(r)?))?;
                    check_script_sigs_empty(&unsigned)?;
                    tx = Some(unsigned);
                }
                _ => {
                    let value = map.read_value(&mut reader)?;
                    unknown.insert(key.to_vec(), value.to_vec());
                }
            }
        }
        let tx = tx.ok_or(PsbtError::MissingUnsignedTx)?;

        let mut inputs = Vec::new();
        while !reader.is_empty() && inputs.len() < tx.inputs.len() {
            inputs.push(PsbtInput::read_from(&mut reader, config)?);
        }
        if inputs.len() != tx.inputs.len() {
            return Err(PsbtError::InputCountMismatch {
                expected: tx.inputs.len(),
                found: inputs.len(),
            });
        }

        let mut outputs = Vec::new();
        while !reader.is_empty() && outputs.len() < tx.outputs.len() {
            outputs.push(PsbtOutput::read_from(&mut reader, config)?);
        }
        if outputs.len() != tx.outputs.len() {
            return Err(PsbtError::OutputCountMismatch {
                expected: tx.outputs.len(),
                found: outputs.len(),
            });
        }

        if !reader.is_empty() {
            return Err(PsbtError::TrailingData(reader.remaining()));
        }

        let psbt = PartiallySignedTransaction {
            tx: Some(tx),
            inputs,
            outputs,
            unknown,
        };
        if !psbt.is_sane() {
            return Err(PsbtError::NotSane);
        }
        trace!(
            "decoded PSBT: {} inputs, {} outputs, {} unknown globals",
            psbt.inputs.len(),
            psbt.outputs.len(),
            psbt.unknown.len()
        );
        Ok(psbt)
    }

    /// Encode the PSBT.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_bytes(&PSBT_MAGIC_BYTES);
        if let Some(tx) = &self.tx {
            write_record(&mut writer, &[PSBT_GLOBAL_UNSIGNED_TX], &tx.to_bytes());
        }
        write_unknown(&mut writer, &self.unknown);
        write_separator(&mut writer);

        for input in &self.inputs {
            input.write_to(&mut writer);
        }
        for output in &self.outputs {
            output.write_to(&mut writer);
        }
        writer.into_bytes()
    }

    /// Decode from a hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, PsbtError> {
        let bytes = hex::decode(hex_str.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Encode as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decode from standard base64, the usual transport between signers.
    pub fn from_base64(encoded: &str) -> Result<Self, PsbtError> {
        let bytes = BASE64.decode(encoded.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Encode as standard padded base64.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }
}

impl fmt::Display for PartiallySignedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl FromStr for PartiallySignedTransaction {
    type Err = PsbtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xec_script::Script;
    use xec_transaction::{TransactionInput, TransactionOutput};

    fn unsigned_tx() -> Transaction {
        let mut tx = Transaction::new();
        tx.add_input(TransactionInput::from_outpoint([0x42; 32], 1));
        tx.add_input(TransactionInput::from_outpoint([0x43; 32], 0));
        tx.add_output(TransactionOutput::with_script(5000, Script::from_bytes(&[0x51])));
        tx
    }

    #[test]
    fn test_new_layout() {
        let psbt = PartiallySignedTransaction::new(unsigned_tx()).unwrap();
        assert_eq!(psbt.inputs.len(), 2);
        assert_eq!(psbt.outputs.len(), 1);
        assert!(psbt.is_sane());
        assert!(!psbt.is_null());
        assert!(PartiallySignedTransaction::default().is_null());

        let bytes = psbt.to_bytes();
        assert_eq!(&bytes[..5], b"psbt\xff");
        let tx_len = unsigned_tx().to_bytes().len();
        // magic, key, framed tx, separator, three empty maps.
        assert_eq!(bytes.len(), 5 + 2 + 1 + tx_len + 1 + 3);
    }

    #[test]
    fn test_new_rejects_signed_tx() {
        let mut tx = unsigned_tx();
        tx.inputs[1].unlocking_script = Script::from_bytes(&[0x51]);
        assert!(matches!(
            PartiallySignedTransaction::new(tx),
            Err(PsbtError::UnsignedTxHasScriptSigs(1))
        ));
    }

    #[test]
    fn test_decode_encodings() {
        let mut psbt = PartiallySignedTransaction::new(unsigned_tx()).unwrap();
        psbt.unknown.insert(vec![0x70, 0x01], vec![0x02, 0x03]);

        let decoded = PartiallySignedTransaction::from_bytes(&psbt.to_bytes()).unwrap();
        assert_eq!(decoded.to_bytes(), psbt.to_bytes());
        assert_eq!(decoded.unknown, psbt.unknown);

        let from_hex = PartiallySignedTransaction::from_hex(&psbt.to_hex()).unwrap();
        assert_eq!(from_hex.to_bytes(), psbt.to_bytes());

        let text = psbt.to_string();
        assert!(text.starts_with("cHNidP8"));
        let parsed: PartiallySignedTransaction = text.parse().unwrap();
        assert_eq!(parsed.to_bytes(), psbt.to_bytes());

        assert!(matches!(
            PartiallySignedTransaction::from_base64("!!!"),
            Err(PsbtError::InvalidBase64(_))
        ));
        assert!(matches!(
            PartiallySignedTransaction::from_hex("zz"),
            Err(PsbtError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_decode_errors() {
        let good = PartiallySignedTransaction::new(unsigned_tx()).unwrap().to_bytes();

        let mut bad_magic = good.clone();
        bad_magic[4] = 0x00;
        assert!(matches!(
            PartiallySignedTransaction::from_bytes(&bad_magic),
            Err(PsbtError::InvalidMagic)
        ));
        assert!(matches!(
            PartiallySignedTransaction::from_bytes(b"psb"),
            Err(PsbtError::InvalidMagic)
        ));

        let mut trailing = good.clone();
        trailing.push(0x00);
        assert!(matches!(
            PartiallySignedTransaction::from_bytes(&trailing),
            Err(PsbtError::TrailingData(1))
        ));

        // Drop the output map and one input map.
        let short = &good[..good.len() - 2];
        assert!(matches!(
            PartiallySignedTransaction::from_bytes(short),
            Err(PsbtError::InputCountMismatch { expected: 2, found: 1 })
        ));
        let no_outputs = &good[..good.len() - 1];
        assert!(matches!(
            PartiallySignedTransaction::from_bytes(no_outputs),
            Err(PsbtError::OutputCountMismatch { expected: 1, found: 0 })
        ));

        let no_tx = [0x70, 0x73, 0x62, 0x74, 0xff, 0x00];
        assert!(matches!(
            PartiallySignedTransaction::from_bytes(&no_tx),
            Err(PsbtError::MissingUnsignedTx)
        ));

        let limits = DecodeConfig {
            max_psbt_size: 10,
            ..DecodeConfig::default()
        };
        assert!(matches!(
            PartiallySignedTransaction::from_bytes_with_config(&good, &limits),
            Err(PsbtError::LimitExceeded(_))
        ));
        assert!(PartiallySignedTransaction::from_bytes_with_config(&good, &DecodeConfig::unbounded()).is_ok());
    }

    #[test]
    fn test_decode_rejects_signed_unsigned_tx() {
        let mut tx = unsigned_tx();
        tx.inputs[0].unlocking_script = Script::from_bytes(&[0x51]);
        let tx_bytes = tx.to_bytes();
        let mut bytes = PSBT_MAGIC_BYTES.to_vec();
        let mut writer = ByteWriter::new();
        write_record(&mut writer, &[PSBT_GLOBAL_UNSIGNED_TX], &tx_bytes);
        bytes.extend_from_slice(writer.as_bytes());
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        assert!(matches!(
            PartiallySignedTransaction::from_bytes(&bytes),
            Err(PsbtError::UnsignedTxHasScriptSigs(0))
        ));
    }

    #[test]
    fn test_framed_tx_length_must_match() {
        let tx_bytes = unsigned_tx().to_bytes();
        let mut bytes = PSBT_MAGIC_BYTES.to_vec();
        bytes.extend_from_slice(&[0x01, PSBT_GLOBAL_UNSIGNED_TX, (tx_bytes.len() + 1) as u8]);
        bytes.extend_from_slice(&tx_bytes);
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(matches!(
            PartiallySignedTransaction::from_bytes(&bytes),
            Err(PsbtError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_insane_input() {
        let mut psbt = PartiallySignedTransaction::new(unsigned_tx()).unwrap();
        let redeem = Script::from_bytes(&[0x51]);
        psbt.inputs[0].utxo = Some(TransactionOutput::with_script(
            1,
            Script::p2sh(&Script::from_bytes(&[0x52]).script_id()),
        ));
        psbt.inputs[0].redeem_script = redeem;
        assert!(!psbt.is_sane());
        assert!(matches!(
            PartiallySignedTransaction::from_bytes(&psbt.to_bytes()),
            Err(PsbtError::NotSane)
        ));
    }

    #[test]
    fn test_merge() {
        let base = PartiallySignedTransaction::new(unsigned_tx()).unwrap();
        let mut a = base.clone();
        a.unknown.insert(vec![0x70], vec![1]);
        a.inputs[0].redeem_script = Script::from_bytes(&[0x51]);
        let mut b = base.clone();
        b.unknown.insert(vec![0x70], vec![2]);
        b.unknown.insert(vec![0x71], vec![3]);
        b.inputs[1].redeem_script = Script::from_bytes(&[0x52]);

        let ab = PartiallySignedTransaction::merged(&a, &b).unwrap();
        assert_eq!(ab.unknown[&vec![0x70u8]], vec![1]);
        assert_eq!(ab.unknown.len(), 2);
        assert_eq!(ab.inputs[0].redeem_script.to_bytes(), &[0x51]);
        assert_eq!(ab.inputs[1].redeem_script.to_bytes(), &[0x52]);

        let combined = PartiallySignedTransaction::combine(vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(combined.to_bytes(), ab.to_bytes());
        assert!(matches!(
            PartiallySignedTransaction::combine(Vec::new()),
            Err(PsbtError::MissingUnsignedTx)
        ));

        let mut other_tx = unsigned_tx();
        other_tx.lock_time = 7;
        let other = PartiallySignedTransaction::new(other_tx).unwrap();
        let before = a.to_bytes();
        assert!(matches!(a.merge(&other), Err(PsbtError::UnexpectedUnsignedTx)));
        assert_eq!(a.to_bytes(), before);
    }

    #[test]
    fn test_equality_ignores_signing_progress() {
        let a = PartiallySignedTransaction::new(unsigned_tx()).unwrap();
        let mut b = a.clone();
        b.unknown.insert(vec![0x70], vec![]);
        assert_eq!(a, b);
    }
}
