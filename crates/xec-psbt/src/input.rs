//! Per-input PSBT map.

use std::collections::BTreeMap;

use xec_primitives::ec::PublicKey;
use xec_primitives::util::{ByteReader, ByteWriter};
use xec_primitives::KeyId;
use xec_script::{solve, Script, ScriptTemplate};
use xec_sign::{KeyOriginInfo, SigPair, SignatureData};
use xec_transaction::{SigHashType, TransactionOutput};

use crate::raw::{
    expect_type_only, key_pub_key, write_keypaths, write_pub_key_record, write_record,
    write_separator, write_unknown, MapReader,
};
use crate::{DecodeConfig, PsbtError};

/// The output being spent, as a framed serialized output.
pub const PSBT_IN_UTXO: u8 = 0x00;
/// A signature keyed by the signing public key.
pub const PSBT_IN_PARTIAL_SIG: u8 = 0x02;
/// The sighash type signers must use, as a framed u32.
pub const PSBT_IN_SIGHASH: u8 = 0x03;
/// The P2SH redeem script.
pub const PSBT_IN_REDEEMSCRIPT: u8 = 0x04;
/// BIP32 derivation of a public key involved in the input.
pub const PSBT_IN_BIP32_DERIVATION: u8 = 0x06;
/// The complete unlocking script.
pub const PSBT_IN_SCRIPTSIG: u8 = 0x07;

/// Signing metadata for one transaction input.
///
/// Once `final_script_sig` is set it supersedes the partial fields, which
/// are then neither used nor serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PsbtInput {
    /// The output this input spends.
    pub utxo: Option<TransactionOutput>,
    pub redeem_script: Script,
    pub final_script_sig: Script,
    pub hd_keypaths: BTreeMap<PublicKey, KeyOriginInfo>,
    pub partial_sigs: BTreeMap<KeyId, SigPair>,
    /// Raw value 0 means no constraint.
    pub sighash_type: SigHashType,
    /// Unrecognized records, keyed by their full raw key.
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Default for PsbtInput {
    fn default() -> Self {
        PsbtInput {
            utxo: None,
            redeem_script: Script::new(),
            final_script_sig: Script::new(),
            hd_keypaths: BTreeMap::new(),
            partial_sigs: BTreeMap::new(),
            sighash_type: SigHashType::UNSET,
            unknown: BTreeMap::new(),
        }
    }
}

impl PsbtInput {
    /// Create an empty input map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the map carries no information at all.
    pub fn is_null(&self) -> bool {
        self.utxo.is_none()
            && self.redeem_script.is_empty()
            && self.final_script_sig.is_empty()
            && self.hd_keypaths.is_empty()
            && self.partial_sigs.is_empty()
            && self.sighash_type.is_unset()
            && self.unknown.is_empty()
    }

    /// Load this input's state into `sigdata` for the signing pipeline.
    ///
    /// A final scriptSig makes `sigdata` complete and nothing else is
    /// copied.
    pub fn fill_signature_data(&self, sigdata: &mut SignatureData) {
        if !self.final_script_sig.is_empty() {
            sigdata.script_sig = self.final_script_sig.clone();
            sigdata.complete = true;
        }
        if sigdata.complete {
            return;
        }

        for (key_id, pair) in &self.partial_sigs {
            sigdata.signatures.entry(*key_id).or_insert_with(|| pair.clone());
        }
        if !self.redeem_script.is_empty() {
            sigdata.redeem_script = self.redeem_script.clone();
        }
        for (pub_key, origin) in &self.hd_keypaths {
            sigdata
                .misc_pubkeys
                .entry(pub_key.key_id())
                .or_insert_with(|| (pub_key.clone(), origin.clone()));
        }
    }

    /// Absorb the pipeline's results.
    ///
    /// Complete data collapses the input to its final scriptSig; partial
    /// data adds signatures, the redeem script and key origins.
    pub fn from_signature_data(&mut self, sigdata: &SignatureData) {
        if sigdata.complete {
            self.partial_sigs.clear();
            self.hd_keypaths.clear();
            self.redeem_script = Script::new();

            if !sigdata.script_sig.is_empty() {
                self.final_script_sig = sigdata.script_sig.clone();
            }
            return;
        }

        for (key_id, pair) in &sigdata.signatures {
            self.partial_sigs.entry(*key_id).or_insert_with(|| pair.clone());
        }
        if self.redeem_script.is_empty() && !sigdata.redeem_script.is_empty() {
            self.redeem_script = sigdata.redeem_script.clone();
        }
        for (pub_key, origin) in sigdata.misc_pubkeys.values() {
            self.hd_keypaths
                .entry(pub_key.clone())
                .or_insert_with(|| origin.clone());
        }
    }

    /// Union `other` into this input. Existing entries win.
    pub fn merge(&mut self, other: &PsbtInput) {
        if self.utxo.is_none() {
            self.utxo = other.utxo.clone();
        }
        for (key_id, pair) in &other.partial_sigs {
            self.partial_sigs.entry(*key_id).or_insert_with(|| pair.clone());
        }
        for (pub_key, origin) in &other.hd_keypaths {
            self.hd_keypaths
                .entry(pub_key.clone())
                .or_insert_with(|| origin.clone());
        }
        for (key, value) in &other.unknown {
            self.unknown.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if self.redeem_script.is_empty() && !other.redeem_script.is_empty() {
            self.redeem_script = other.redeem_script.clone();
        }
        if self.final_script_sig.is_empty() && !other.final_script_sig.is_empty() {
            self.final_script_sig = other.final_script_sig.clone();
        }
        if self.sighash_type.is_unset() {
            self.sighash_type = other.sighash_type;
        }
    }

    /// Whether the input is internally consistent.
    ///
    /// Fails when a partial signature is filed under another key's id, when
    /// the redeem script does not hash to a P2SH UTXO, or when a final
    /// scriptSig ends with a different redeem script than the recorded one.
    pub fn is_sane(&self) -> bool {
        if self
            .partial_sigs
            .iter()
            .any(|(key_id, (pub_key, _))| pub_key.key_id() != *key_id)
        {
            return false;
        }

        if self.redeem_script.is_empty() {
            return true;
        }
        if let Some(utxo) = &self.utxo {
            if let ScriptTemplate::ScriptHash(script_id) = solve(&utxo.locking_script) {
                if self.redeem_script.script_id() != script_id {
                    return false;
                }
            }
        }
        if !self.final_script_sig.is_empty() {
            let last = self
                .final_script_sig
                .push_only_stack()
                .ok()
                .and_then(|mut stack| stack.pop());
            if last.as_deref() != Some(self.redeem_script.to_bytes()) {
                return false;
            }
        }
        true
    }

    /// Decode one input map, up to and including its separator.
    pub(crate) fn read_from(
        reader: &mut ByteReader,
        config: &DecodeConfig,
    ) -> Result<Self, PsbtError> {
        let mut input = PsbtInput::new();
        let mut map = MapReader::new(config);

        while let Some(key) = map.next_key(reader)? {
            match key[0] {
                PSBT_IN_UTXO => {
                    expect_type_only(key)?;
                    let utxo = map.read_framed(reader, |r| Ok(TransactionOutput::read_from(r)?))?;
                    input.utxo = Some(utxo);
                }
                PSBT_IN_PARTIAL_SIG => {
                    let pub_key = key_pub_key(key)?;
                    let key_id = pub_key.key_id();
                    if input.partial_sigs.contains_key(&key_id) {
                        return Err(PsbtError::DuplicateKey(hex::encode(key)));
                    }
                    let sig = map.read_value(reader)?.to_vec();
                    input.partial_sigs.insert(key_id, (pub_key, sig));
                }
                PSBT_IN_SIGHASH => {
                    expect_type_only(key)?;
                    let raw = map.read_framed(reader, |r| Ok(r.read_u32_le()?))?;
                    input.sighash_type = SigHashType::new(raw);
                }
                PSBT_IN_REDEEMSCRIPT => {
                    expect_type_only(key)?;
                    input.redeem_script = Script::from_bytes(map.read_value(reader)?);
                }
                PSBT_IN_BIP32_DERIVATION => {
                    map.read_keypath(reader, key, &mut input.hd_keypaths)?;
                }
                PSBT_IN_SCRIPTSIG => {
                    expect_type_only(key)?;
                    input.final_script_sig = Script::from_bytes(map.read_value(reader)?);
                }
                _ => {
                    let value = map.read_value(reader)?;
                    input.unknown.insert(key.to_vec(), value.to_vec());
                }
            }
        }
        Ok(input)
    }

    /// Encode this input map followed by its separator.
    pub(crate) fn write_to(&self, writer: &mut ByteWriter) {
        if let Some(utxo) = &self.utxo {
            write_record(writer, &[PSBT_IN_UTXO], &utxo.to_bytes());
        }

        if self.final_script_sig.is_empty() {
            for (pub_key, sig) in self.partial_sigs.values() {
                write_pub_key_record(writer, PSBT_IN_PARTIAL_SIG, pub_key, sig);
            }
            if !self.sighash_type.is_unset() {
                write_record(
                    writer,
                    &[PSBT_IN_SIGHASH],
                    &self.sighash_type.raw().to_le_bytes(),
                );
            }
            if !self.redeem_script.is_empty() {
                write_record(writer, &[PSBT_IN_REDEEMSCRIPT], self.redeem_script.to_bytes());
            }
            write_keypaths(writer, PSBT_IN_BIP32_DERIVATION, &self.hd_keypaths);
        } else {
            write_record(writer, &[PSBT_IN_SCRIPTSIG], self.final_script_sig.to_bytes());
        }

        write_unknown(writer, &self.unknown);
        write_separator(writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xec_primitives::ec::PrivateKey;

    fn pub_key(byte: u8) -> PublicKey {
        PrivateKey::from_bytes(&[byte; 32]).unwrap().pub_key()
    }

    fn decode(bytes: &[u8]) -> Result<PsbtInput, PsbtError> {
        let mut reader = ByteReader::new(bytes);
        let input = PsbtInput::read_from(&mut reader, &DecodeConfig::default())?;
        assert!(reader.is_empty());
        Ok(input)
    }

    fn encode(input: &PsbtInput) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        input.write_to(&mut writer);
        writer.into_bytes()
    }

    fn sample() -> PsbtInput {
        let key = pub_key(1);
        let redeem = Script::p2pkh(&key.key_id());
        let mut input = PsbtInput::new();
        input.utxo = Some(TransactionOutput::with_script(
            1234,
            Script::p2sh(&redeem.script_id()),
        ));
        input.redeem_script = redeem;
        input.partial_sigs.insert(key.key_id(), (key.clone(), vec![0x30, 0x01, 0x41]));
        input.hd_keypaths.insert(key, KeyOriginInfo::new([1, 2, 3, 4], vec![0, 1]));
        input.sighash_type = SigHashType::ALL_FORKID;
        input.unknown.insert(vec![0x0f, 0xaa], vec![0xbb]);
        input
    }

    #[test]
    fn test_empty_input_is_separator_only() {
        let input = PsbtInput::new();
        assert!(input.is_null());
        assert_eq!(encode(&input), vec![0x00]);
        assert_eq!(decode(&[0x00]).unwrap(), input);
    }

    #[test]
    fn test_record_order_and_decode() {
        let input = sample();
        let bytes = encode(&input);
        // UTXO record comes first: key 01 00, framed 8 + 1 + 23 bytes.
        assert_eq!(&bytes[..3], &[0x01, 0x00, 0x20]);
        assert_eq!(*bytes.last().unwrap(), 0x00);
        assert_eq!(decode(&bytes).unwrap(), input);
        assert!(input.is_sane());
    }

    #[test]
    fn test_final_script_sig_hides_partial_state() {
        let mut input = sample();
        let mut stack_redeem = Script::new();
        stack_redeem.append_push_data(&[0x30, 0x01, 0x41]).unwrap();
        stack_redeem.append_push_data(input.redeem_script.to_bytes()).unwrap();
        input.final_script_sig = stack_redeem;

        let decoded = decode(&encode(&input)).unwrap();
        assert_eq!(decoded.final_script_sig, input.final_script_sig);
        assert!(decoded.partial_sigs.is_empty());
        assert!(decoded.hd_keypaths.is_empty());
        assert!(decoded.redeem_script.is_empty());
        assert!(decoded.sighash_type.is_unset());
        assert_eq!(decoded.unknown, input.unknown);
    }

    #[test]
    fn test_duplicate_singular_record() {
        // Two sighash records.
        let bytes = [
            0x01, 0x03, 0x04, 0x41, 0x00, 0x00, 0x00, //
            0x01, 0x03, 0x04, 0x41, 0x00, 0x00, 0x00, //
            0x00,
        ];
        assert!(matches!(decode(&bytes), Err(PsbtError::DuplicateKey(_))));
    }

    #[test]
    fn test_singular_key_must_be_one_byte() {
        let bytes = [0x02, 0x04, 0x00, 0x01, 0x51, 0x00];
        assert!(matches!(
            decode(&bytes),
            Err(PsbtError::InvalidKeyLength { key_type: 0x04, len: 2 })
        ));
    }

    #[test]
    fn test_partial_sig_key_must_hold_pubkey() {
        let bytes = [0x03, 0x02, 0x02, 0x03, 0x01, 0x30, 0x00];
        assert!(matches!(
            decode(&bytes),
            Err(PsbtError::InvalidKeyLength { key_type: 0x02, len: 3 })
        ));
    }

    #[test]
    fn test_unterminated_map_is_truncated() {
        assert!(matches!(decode(&[0x01, 0x04, 0x01]), Err(PsbtError::Truncated)));
        let mut reader = ByteReader::new(&[0x01, 0x04, 0x01, 0x51]);
        assert!(matches!(
            PsbtInput::read_from(&mut reader, &DecodeConfig::default()),
            Err(PsbtError::Truncated)
        ));
    }

    #[test]
    fn test_signature_data_round_trip() {
        let input = sample();
        let mut sigdata = SignatureData::new();
        input.fill_signature_data(&mut sigdata);
        assert_eq!(sigdata.signatures, input.partial_sigs);
        assert_eq!(sigdata.redeem_script, input.redeem_script);
        assert_eq!(sigdata.misc_pubkeys.len(), 1);

        let mut fresh = PsbtInput::new();
        fresh.from_signature_data(&sigdata);
        assert_eq!(fresh.partial_sigs, input.partial_sigs);
        assert_eq!(fresh.redeem_script, input.redeem_script);
        assert_eq!(fresh.hd_keypaths, input.hd_keypaths);

        sigdata.complete = true;
        sigdata.script_sig = Script::from_bytes(&[0x51]);
        fresh.from_signature_data(&sigdata);
        assert_eq!(fresh.final_script_sig.to_bytes(), &[0x51]);
        assert!(fresh.partial_sigs.is_empty() && fresh.hd_keypaths.is_empty());
        assert!(fresh.redeem_script.is_empty());
    }

    #[test]
    fn test_final_script_sig_fills_complete_data() {
        let mut input = sample();
        input.final_script_sig = Script::from_bytes(&[0x51]);
        let mut sigdata = SignatureData::new();
        input.fill_signature_data(&mut sigdata);
        assert!(sigdata.complete);
        assert!(sigdata.signatures.is_empty());
    }

    #[test]
    fn test_merge_existing_wins_and_fills_gaps() {
        let full = sample();
        let mut other = PsbtInput::new();
        let key = pub_key(2);
        other.partial_sigs.insert(key.key_id(), (key.clone(), vec![0x01]));
        other.unknown.insert(vec![0x0f, 0xaa], vec![0xcc]);

        let mut merged = full.clone();
        merged.merge(&other);
        assert_eq!(merged.partial_sigs.len(), 2);
        assert_eq!(merged.unknown[&vec![0x0fu8, 0xaa]], vec![0xbb]);

        let mut from_empty = PsbtInput::new();
        from_empty.merge(&full);
        assert_eq!(from_empty, full);

        let mut again = full.clone();
        again.merge(&full);
        assert_eq!(again, full);
    }

    #[test]
    fn test_sanity() {
        let mut input = sample();
        assert!(input.is_sane());

        let mut misfiled = input.clone();
        let other = pub_key(9);
        misfiled.partial_sigs.insert(pub_key(8).key_id(), (other, vec![0x01]));
        assert!(!misfiled.is_sane());

        let mut wrong_redeem = input.clone();
        wrong_redeem.redeem_script = Script::from_bytes(&[0x51]);
        assert!(!wrong_redeem.is_sane());

        input.final_script_sig = Script::push_all(&[vec![0x01u8], vec![0x52u8]]).unwrap();
        assert!(!input.is_sane());
    }
}
