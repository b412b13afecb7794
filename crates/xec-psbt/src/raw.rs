//! Record-level framing shared by the global, input and output maps.
//!
//! A map is a run of `<key> <value>` records, each a VarInt-prefixed byte
//! string, closed by a zero-length key. The first key byte is the record
//! type. Composite values (transactions, outputs, sighash) are additionally
//! framed: the value's length prefix must match exactly what decoding the
//! payload consumed.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;
use xec_primitives::ec::PublicKey;
use xec_primitives::util::{ByteReader, ByteWriter, VarInt};
use xec_sign::KeyOriginInfo;

use crate::{DecodeConfig, PsbtError};

/// Magic bytes at the start of every PSBT: `psbt` followed by 0xff.
pub const PSBT_MAGIC_BYTES: [u8; 5] = [0x70, 0x73, 0x62, 0x74, 0xff];

/// The zero-length key closing each map.
pub const PSBT_SEPARATOR: u8 = 0x00;

fn to_len(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn read_bounded<'a>(
    reader: &mut ByteReader<'a>,
    max: usize,
    what: &str,
) -> Result<&'a [u8], PsbtError> {
    let len = to_len(reader.read_varint()?.value());
    if len > max {
        return Err(PsbtError::LimitExceeded(format!(
            "{} of {} bytes exceeds {}",
            what, len, max
        )));
    }
    Ok(reader.read_bytes(len)?)
}

/// Reads the keys of one map, enforcing uniqueness and decode limits.
pub(crate) struct MapReader<'c> {
    config: &'c DecodeConfig,
    seen: BTreeSet<Vec<u8>>,
}

impl<'c> MapReader<'c> {
    pub(crate) fn new(config: &'c DecodeConfig) -> Self {
        MapReader {
            config,
            seen: BTreeSet::new(),
        }
    }

    /// Read the next record key.
    ///
    /// # Returns
    /// `None` at the separator, otherwise the raw key (never empty).
    pub(crate) fn next_key<'a>(
        &mut self,
        reader: &mut ByteReader<'a>,
    ) -> Result<Option<&'a [u8]>, PsbtError> {
        let key = read_bounded(reader, self.config.max_key_size, "key")?;
        if key.is_empty() {
            return Ok(None);
        }
        if self.seen.len() >= self.config.max_entries_per_map {
            return Err(PsbtError::LimitExceeded(format!(
                "more than {} records in one map",
                self.config.max_entries_per_map
            )));
        }
        if !self.seen.insert(key.to_vec()) {
            return Err(PsbtError::DuplicateKey(hex::encode(key)));
        }
        trace!("psbt record type {:#04x}, key {} bytes", key[0], key.len());
        Ok(Some(key))
    }

    /// Read a plain length-prefixed value.
    pub(crate) fn read_value<'a>(&self, reader: &mut ByteReader<'a>) -> Result<&'a [u8], PsbtError> {
        read_bounded(reader, self.config.max_value_size, "value")
    }

    /// Read a framed value, decoding its payload in place.
    pub(crate) fn read_framed<'a, T>(
        &self,
        reader: &mut ByteReader<'a>,
        decode: impl FnOnce(&mut ByteReader<'a>) -> Result<T, PsbtError>,
    ) -> Result<T, PsbtError> {
        let declared = to_len(reader.read_varint()?.value());
        if declared > self.config.max_value_size {
            return Err(PsbtError::LimitExceeded(format!(
                "value of {} bytes exceeds {}",
                declared, self.config.max_value_size
            )));
        }
        let start = reader.position();
        let value = decode(reader)?;
        let consumed = reader.position() - start;
        if consumed != declared {
            return Err(PsbtError::LengthMismatch { declared, consumed });
        }
        Ok(value)
    }

    /// Read the value of a BIP32 derivation record keyed by `key`
    /// into `keypaths`.
    pub(crate) fn read_keypath(
        &self,
        reader: &mut ByteReader,
        key: &[u8],
        keypaths: &mut BTreeMap<PublicKey, KeyOriginInfo>,
    ) -> Result<(), PsbtError> {
        let pub_key = key_pub_key(key)?;
        if keypaths.contains_key(&pub_key) {
            return Err(PsbtError::DuplicateKey(hex::encode(key)));
        }

        let value = self.read_value(reader)?;
        if value.is_empty() || value.len() % 4 != 0 {
            return Err(PsbtError::InvalidKeyPath(value.len()));
        }
        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(&value[..4]);
        let path = value[4..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        keypaths.insert(pub_key, KeyOriginInfo::new(fingerprint, path));
        Ok(())
    }
}

/// Require a singular record key to be the bare type byte.
pub(crate) fn expect_type_only(key: &[u8]) -> Result<(), PsbtError> {
    if key.len() != 1 {
        return Err(PsbtError::InvalidKeyLength {
            key_type: key[0],
            len: key.len(),
        });
    }
    Ok(())
}

/// Parse the public key carried after the type byte of `key`.
pub(crate) fn key_pub_key(key: &[u8]) -> Result<PublicKey, PsbtError> {
    if key.len() != 34 && key.len() != 66 {
        return Err(PsbtError::InvalidKeyLength {
            key_type: key[0],
            len: key.len(),
        });
    }
    PublicKey::from_bytes(&key[1..]).map_err(|e| PsbtError::InvalidPublicKey(e.to_string()))
}

/// Write one `<key> <value>` record.
pub(crate) fn write_record(writer: &mut ByteWriter, key: &[u8], value: &[u8]) {
    writer.write_var_bytes(key);
    writer.write_var_bytes(value);
}

/// Write a record whose key is `key_type` followed by `pub_key`.
pub(crate) fn write_pub_key_record(
    writer: &mut ByteWriter,
    key_type: u8,
    pub_key: &PublicKey,
    value: &[u8],
) {
    let mut key = Vec::with_capacity(66);
    key.push(key_type);
    key.extend_from_slice(&pub_key.to_bytes());
    write_record(writer, &key, value);
}

/// Write BIP32 derivation records in public-key order.
pub(crate) fn write_keypaths(
    writer: &mut ByteWriter,
    key_type: u8,
    keypaths: &BTreeMap<PublicKey, KeyOriginInfo>,
) {
    for (pub_key, origin) in keypaths {
        let mut value = Vec::with_capacity(4 * (origin.path.len() + 1));
        value.extend_from_slice(&origin.fingerprint);
        for index in &origin.path {
            value.extend_from_slice(&index.to_le_bytes());
        }
        write_pub_key_record(writer, key_type, pub_key, &value);
    }
}

/// Write preserved unknown records verbatim.
pub(crate) fn write_unknown(writer: &mut ByteWriter, unknown: &BTreeMap<Vec<u8>, Vec<u8>>) {
    for (key, value) in unknown {
        write_record(writer, key, value);
    }
}

/// Close a map.
pub(crate) fn write_separator(writer: &mut ByteWriter) {
    writer.write_varint(VarInt(0));
}
