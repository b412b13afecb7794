//! Per-output PSBT map.

use std::collections::BTreeMap;

use xec_primitives::ec::PublicKey;
use xec_primitives::util::{ByteReader, ByteWriter};
use xec_script::Script;
use xec_sign::{KeyOriginInfo, SignatureData};

use crate::raw::{expect_type_only, write_keypaths, write_record, write_separator, write_unknown, MapReader};
use crate::{DecodeConfig, PsbtError};

/// The P2SH redeem script of the output.
pub const PSBT_OUT_REDEEMSCRIPT: u8 = 0x00;
/// BIP32 derivation of a public key involved in the output.
pub const PSBT_OUT_BIP32_DERIVATION: u8 = 0x02;

/// Metadata describing one transaction output, typically so a signer can
/// recognize its own change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PsbtOutput {
    pub redeem_script: Script,
    pub hd_keypaths: BTreeMap<PublicKey, KeyOriginInfo>,
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl PsbtOutput {
    /// Create an empty output map.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self.redeem_script.is_empty() && self.hd_keypaths.is_empty() && self.unknown.is_empty()
    }

    /// Load the redeem script and key origins into `sigdata`.
    pub fn fill_signature_data(&self, sigdata: &mut SignatureData) {
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

    /// Take the redeem script and key origins the pipeline discovered.
    pub fn from_signature_data(&mut self, sigdata: &SignatureData) {
        if self.redeem_script.is_empty() && !sigdata.redeem_script.is_empty() {
            self.redeem_script = sigdata.redeem_script.clone();
        }
        for (pub_key, origin) in sigdata.misc_pubkeys.values() {
            self.hd_keypaths
                .entry(pub_key.clone())
                .or_insert_with(|| origin.clone());
        }
    }

    /// Union `other` into this output. Existing entries win.
    pub fn merge(&mut self, other: &PsbtOutput) {
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
    }

    /// Whether the recorded redeem script is at least decodable.
    pub fn is_sane(&self) -> bool {
        self.redeem_script.chunks().is_ok()
    }

    pub(crate) fn read_from(
        reader: &mut ByteReader,
        config: &DecodeConfig,
    ) -> Result<Self, PsbtError> {
        let mut output = PsbtOutput::new();
        let mut map = MapReader::new(config);

        while let Some(key) = map.next_key(reader)? {
            match key[0] {
                PSBT_OUT_REDEEMSCRIPT => {
                    expect_type_only(key)?;
                    output.redeem_script = Script::from_bytes(map.read_value(reader)?);
                }
                PSBT_OUT_BIP32_DERIVATION => {
                    map.read_keypath(reader, key, &mut output.hd_keypaths)?;
                }
                _ => {
                    let value = map.read_value(reader)?;
                    output.unknown.insert(key.to_vec(), value.to_vec());
                }
            }
        }
        Ok(output)
    }

    pub(crate) fn write_to(&self, writer: &mut ByteWriter) {
        if !self.redeem_script.is_empty() {
            write_record(writer, &[PSBT_OUT_REDEEMSCRIPT], self.redeem_script.to_bytes());
        }
        write_keypaths(writer, PSBT_OUT_BIP32_DERIVATION, &self.hd_keypaths);
        write_unknown(writer, &self.unknown);
        write_separator(writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xec_primitives::ec::PrivateKey;

    fn sample() -> PsbtOutput {
        let key = PrivateKey::from_bytes(&[5; 32]).unwrap().pub_key();
        let mut output = PsbtOutput::new();
        output.redeem_script = Script::p2pkh(&key.key_id());
        output.hd_keypaths.insert(key, KeyOriginInfo::new([9, 9, 9, 9], vec![0x8000_002c, 1]));
        output.unknown.insert(vec![0xf0], vec![]);
        output
    }

    #[test]
    fn test_encode_decode() {
        let output = sample();
        let mut writer = ByteWriter::new();
        output.write_to(&mut writer);
        let bytes = writer.into_bytes();
        assert_eq!(&bytes[..3], &[0x01, PSBT_OUT_REDEEMSCRIPT, 25]);

        let mut reader = ByteReader::new(&bytes);
        let decoded = PsbtOutput::read_from(&mut reader, &DecodeConfig::default()).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded, output);
        assert!(!decoded.is_null());
        assert!(PsbtOutput::new().is_null());
    }

    #[test]
    fn test_duplicate_keypath_rejected() {
        let output = sample();
        let mut writer = ByteWriter::new();
        write_keypaths(&mut writer, PSBT_OUT_BIP32_DERIVATION, &output.hd_keypaths);
        write_keypaths(&mut writer, PSBT_OUT_BIP32_DERIVATION, &output.hd_keypaths);
        write_separator(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(
            PsbtOutput::read_from(&mut reader, &DecodeConfig::default()),
            Err(PsbtError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_signature_data_and_merge() {
        let output = sample();
        let mut sigdata = SignatureData::new();
        output.fill_signature_data(&mut sigdata);
        assert_eq!(sigdata.redeem_script, output.redeem_script);

        let mut fresh = PsbtOutput::new();
        fresh.from_signature_data(&sigdata);
        assert_eq!(fresh.redeem_script, output.redeem_script);
        assert_eq!(fresh.hd_keypaths, output.hd_keypaths);

        let mut merged = PsbtOutput::new();
        merged.merge(&output);
        merged.merge(&output);
        assert_eq!(merged, output);
    }
}
