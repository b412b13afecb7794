//! Signature hash computation for transaction signing.
//!
//! Computes the digest that is signed by ECDSA to authorize spending a
//! transaction input. Only the replay-protected (FORKID) digest is supported:
//! it is the BIP-143 layout, committing to the amount being spent.
//!
//! See <https://github.com/Bitcoin-ABC/bitcoin-abc/blob/master/doc/abc/replay-protected-sighash.md>

use std::fmt;

use xec_primitives::hash::sha256d;
use xec_primitives::util::{ByteWriter, VarInt};

use crate::transaction::Transaction;
use crate::TransactionError;

// -----------------------------------------------------------------------
// Sighash flag constants
// -----------------------------------------------------------------------

/// Sign all inputs and all outputs (the default).
pub const SIGHASH_ALL: u32 = 0x01;

/// Sign all inputs but no outputs, allowing outputs to be modified.
pub const SIGHASH_NONE: u32 = 0x02;

/// Sign all inputs and only the output with the same index as the signed input.
pub const SIGHASH_SINGLE: u32 = 0x03;

/// Combined with another flag: only sign the current input, allowing other
/// inputs to be added later.
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Replay-protection flag required on every signature.
pub const SIGHASH_FORKID: u32 = 0x40;

/// The standard sighash type: ALL | FORKID.
pub const SIGHASH_ALL_FORKID: u32 = SIGHASH_ALL | SIGHASH_FORKID;

/// Mask applied to extract the base sighash type (ALL, NONE, SINGLE).
pub const SIGHASH_MASK: u32 = 0x1f;

// -----------------------------------------------------------------------
// SigHashType
// -----------------------------------------------------------------------

/// A sighash type as carried in signatures and PSBT records.
///
/// Wraps the raw 32-bit value. A raw value of zero means "unset", which is
/// how PSBT inputs without a sighash record are represented. `Default` is
/// `ALL | FORKID`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigHashType(u32);

impl SigHashType {
    /// `ALL | FORKID`.
    pub const ALL_FORKID: SigHashType = SigHashType(SIGHASH_ALL_FORKID);

    /// The unset marker (raw zero).
    pub const UNSET: SigHashType = SigHashType(0);

    /// Wrap a raw sighash value.
    pub const fn new(raw: u32) -> Self {
        SigHashType(raw)
    }

    /// The raw 32-bit value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The trailing byte appended to signatures.
    pub const fn to_byte(self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// Whether the value is the unset marker.
    pub const fn is_unset(self) -> bool {
        self.0 == 0
    }

    /// Base type (ALL, NONE or SINGLE) with flags masked off.
    pub const fn base_type(self) -> u32 {
        self.0 & SIGHASH_MASK
    }

    /// Whether the FORKID flag is present.
    pub const fn has_forkid(self) -> bool {
        self.0 & SIGHASH_FORKID != 0
    }

    /// Whether the ANYONECANPAY flag is present.
    pub const fn has_anyone_can_pay(self) -> bool {
        self.0 & SIGHASH_ANYONECANPAY != 0
    }

    /// Copy of this type with the FORKID flag set.
    pub const fn with_forkid(self) -> Self {
        SigHashType(self.0 | SIGHASH_FORKID)
    }

    /// Copy of this type with the ANYONECANPAY flag set.
    pub const fn with_anyone_can_pay(self) -> Self {
        SigHashType(self.0 | SIGHASH_ANYONECANPAY)
    }

    /// Whether the base type is one of ALL, NONE or SINGLE and no unknown
    /// flag bits are set in the low byte.
    pub fn is_defined(self) -> bool {
        let base = self.base_type();
        let flags = self.0 & !(SIGHASH_MASK | SIGHASH_FORKID | SIGHASH_ANYONECANPAY);
        (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base) && flags & 0xff == 0
    }
}

impl Default for SigHashType {
    fn default() -> Self {
        SigHashType::ALL_FORKID
    }
}

impl From<u32> for SigHashType {
    fn from(raw: u32) -> Self {
        SigHashType(raw)
    }
}

impl fmt::Display for SigHashType {
    /// Renders e.g. `ALL|FORKID` or `SINGLE|FORKID|ANYONECANPAY`; unknown
    /// values print as hex.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_defined() {
            return write!(f, "{:#x}", self.0);
        }
        let base = match self.base_type() {
            SIGHASH_ALL => "ALL",
            SIGHASH_NONE => "NONE",
            _ => "SINGLE",
        };
        f.write_str(base)?;
        if self.has_forkid() {
            f.write_str("|FORKID")?;
        }
        if self.has_anyone_can_pay() {
            f.write_str("|ANYONECANPAY")?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------
// FORKID (BIP-143 layout) signature hash
// -----------------------------------------------------------------------

/// Compute the FORKID signature hash for a given input.
///
/// # Arguments
/// * `tx`           - The transaction being signed.
/// * `input_index`  - Index of the input being signed.
/// * `script_code`  - The script being satisfied (locking or redeem script).
/// * `sighash_type` - The sighash type; must carry FORKID.
/// * `satoshis`     - The satoshi value of the output being spent.
///
/// # Returns
/// A 32-byte double-SHA256 hash to be signed by ECDSA.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: SigHashType,
    satoshis: u64,
) -> Result<[u8; 32], TransactionError> {
    let preimage = calc_preimage(tx, input_index, script_code, sighash_type, satoshis)?;
    Ok(sha256d(&preimage))
}

/// Compute the pre-image bytes of the FORKID sighash before double-hashing.
///
/// The preimage consists of:
/// 1. nVersion (4 bytes LE)
/// 2. hashPrevouts (32 bytes) - sha256d of all outpoints unless ANYONECANPAY
/// 3. hashSequence (32 bytes) - sha256d of all sequences unless ANYONECANPAY/SINGLE/NONE
/// 4. outpoint (32+4 bytes) - txid + vout of the input being signed
/// 5. scriptCode (varint + script)
/// 6. value (8 bytes LE) - satoshis of the output being spent
/// 7. nSequence (4 bytes LE) - sequence of the input being signed
/// 8. hashOutputs (32 bytes) - sha256d of all outputs or one output
/// 9. nLocktime (4 bytes LE)
/// 10. sighashType (4 bytes LE)
///
/// # Returns
/// The raw preimage bytes, `InvalidTransaction` for an out-of-range input,
/// or `UnsupportedSighash` when FORKID is missing.
pub fn calc_preimage(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: SigHashType,
    satoshis: u64,
) -> Result<Vec<u8>, TransactionError> {
    let input = tx.inputs.get(input_index).ok_or_else(|| {
        TransactionError::InvalidTransaction(format!(
            "input index {} out of range (tx has {} inputs)",
            input_index,
            tx.inputs.len()
        ))
    })?;
    if !sighash_type.has_forkid() {
        return Err(TransactionError::UnsupportedSighash(sighash_type.raw()));
    }

    let base_type = sighash_type.base_type();
    let anyone_can_pay = sighash_type.has_anyone_can_pay();

    let hash_prevouts = if !anyone_can_pay {
        source_out_hash(tx)
    } else {
        [0u8; 32]
    };

    let hash_sequence =
        if !anyone_can_pay && base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
            sequence_hash(tx)
        } else {
            [0u8; 32]
        };

    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        outputs_hash(tx, None)
    } else if base_type == SIGHASH_SINGLE && input_index < tx.outputs.len() {
        outputs_hash(tx, Some(input_index))
    } else {
        [0u8; 32]
    };

    let mut writer = ByteWriter::with_capacity(156 + script_code.len());
    writer.write_u32_le(tx.version);
    writer.write_bytes(&hash_prevouts);
    writer.write_bytes(&hash_sequence);
    writer.write_bytes(&input.source_txid);
    writer.write_u32_le(input.source_tx_out_index);
    writer.write_varint(VarInt::from(script_code.len()));
    writer.write_bytes(script_code);
    writer.write_u64_le(satoshis);
    writer.write_u32_le(input.sequence_number);
    writer.write_bytes(&hash_outputs);
    writer.write_u32_le(tx.lock_time);
    writer.write_u32_le(sighash_type.raw());

    Ok(writer.into_bytes())
}

// -----------------------------------------------------------------------
// Internal helper functions
// -----------------------------------------------------------------------

/// Double-SHA256 of all input outpoints (txid + vout) concatenated.
fn source_out_hash(tx: &Transaction) -> [u8; 32] {
    let mut writer = ByteWriter::with_capacity(tx.inputs.len() * 36);
    for input in &tx.inputs {
        writer.write_bytes(&input.source_txid);
        writer.write_u32_le(input.source_tx_out_index);
    }
    sha256d(writer.as_bytes())
}

/// Double-SHA256 of all input sequence numbers concatenated.
fn sequence_hash(tx: &Transaction) -> [u8; 32] {
    let mut writer = ByteWriter::with_capacity(tx.inputs.len() * 4);
    for input in &tx.inputs {
        writer.write_u32_le(input.sequence_number);
    }
    sha256d(writer.as_bytes())
}

/// Double-SHA256 of the serialized outputs, or only of output `single`.
fn outputs_hash(tx: &Transaction, single: Option<usize>) -> [u8; 32] {
    let mut writer = ByteWriter::new();
    match single {
        Some(index) => tx.outputs[index].write_to(&mut writer),
        None => {
            for output in &tx.outputs {
                output.write_to(&mut writer);
            }
        }
    }
    sha256d(writer.as_bytes())
}
