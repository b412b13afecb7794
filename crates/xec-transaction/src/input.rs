//! Transaction input referencing a previous output.
//!
//! Contains the source transaction ID, output index, unlocking script,
//! sequence number, and an optional copy of the output being spent.
//! Provides binary serialization/deserialization following the wire format.

use xec_primitives::util::{ByteReader, ByteWriter, VarInt};
use xec_script::Script;

use crate::output::TransactionOutput;
use crate::TransactionError;

/// Default sequence number indicating a finalized input (no relative lock-time).
pub const DEFAULT_SEQUENCE_NUMBER: u32 = 0xFFFF_FFFF;

/// A single input in a transaction.
///
/// Each input references an output from a previous transaction by its
/// transaction ID (`source_txid`) and output index (`source_tx_out_index`).
/// The `unlocking_script` (scriptSig) supplies the data required to satisfy
/// the referenced output's locking script; it is empty while unsigned.
///
/// The spent output itself can be attached with `set_source_output`. It is
/// local metadata only: it is not serialized and does not take part in
/// equality.
///
/// # Wire format
///
/// | Field              | Size             |
/// |--------------------|------------------|
/// | source_txid        | 32 bytes (LE)    |
/// | source_tx_out_index| 4 bytes (LE)     |
/// | script length      | VarInt           |
/// | unlocking_script   | variable         |
/// | sequence_number    | 4 bytes (LE)     |
#[derive(Clone, Debug)]
pub struct TransactionInput {
    /// The 32-byte transaction ID of the output being spent, in internal
    /// (little-endian) byte order.
    pub source_txid: [u8; 32],

    /// Index of the output within the source transaction.
    pub source_tx_out_index: u32,

    /// Sequence number. Defaults to `0xFFFFFFFF` (finalized).
    pub sequence_number: u32,

    /// The unlocking script (scriptSig). Empty when the input is unsigned.
    pub unlocking_script: Script,

    source_output: Option<TransactionOutput>,
}

impl TransactionInput {
    /// Create a new `TransactionInput` with default values.
    ///
    /// The source txid is zeroed, output index is 0, sequence is finalized,
    /// and the unlocking script is empty.
    pub fn new() -> Self {
        TransactionInput {
            source_txid: [0u8; 32],
            source_tx_out_index: 0,
            sequence_number: DEFAULT_SEQUENCE_NUMBER,
            unlocking_script: Script::new(),
            source_output: None,
        }
    }

    /// Create an unsigned input spending output `vout` of `txid`.
    ///
    /// # Arguments
    /// * `txid` - Source transaction id in internal byte order.
    /// * `vout` - Output index being spent.
    pub fn from_outpoint(txid: [u8; 32], vout: u32) -> Self {
        TransactionInput {
            source_txid: txid,
            source_tx_out_index: vout,
            ..Self::new()
        }
    }

    /// Deserialize a `TransactionInput` from a `ByteReader`.
    ///
    /// Reads the wire format: 32-byte txid, 4-byte output index,
    /// varint-prefixed unlocking script, and 4-byte sequence number.
    ///
    /// # Arguments
    /// * `reader` - The reader positioned at the start of an encoded input.
    ///
    /// # Returns
    /// `Ok(TransactionInput)` on success, or a `TransactionError` if the
    /// data is truncated or malformed.
    pub fn read_from(reader: &mut ByteReader) -> Result<Self, TransactionError> {
        let source_txid = reader
            .read_array::<32>()
            .map_err(TransactionError::reading("source txid"))?;

        let source_tx_out_index = reader
            .read_u32_le()
            .map_err(TransactionError::reading("output index"))?;

        let script_bytes = reader
            .read_var_bytes()
            .map_err(TransactionError::reading("unlocking script"))?;

        let sequence_number = reader
            .read_u32_le()
            .map_err(TransactionError::reading("sequence number"))?;

        Ok(TransactionInput {
            source_txid,
            source_tx_out_index,
            sequence_number,
            unlocking_script: Script::from_bytes(script_bytes),
            source_output: None,
        })
    }

    /// Serialize this `TransactionInput` into a `ByteWriter`.
    ///
    /// # Arguments
    /// * `writer` - The writer to append serialized bytes to.
    pub fn write_to(&self, writer: &mut ByteWriter) {
        writer.write_bytes(&self.source_txid);
        writer.write_u32_le(self.source_tx_out_index);
        let script_bytes = self.unlocking_script.to_bytes();
        writer.write_varint(VarInt::from(script_bytes.len()));
        writer.write_bytes(script_bytes);
        writer.write_u32_le(self.sequence_number);
    }

    /// Whether the input carries no unlocking script yet.
    pub fn is_unsigned(&self) -> bool {
        self.unlocking_script.is_empty()
    }

    /// Set a direct source output on this input.
    ///
    /// This provides the satoshi value and locking script of the output
    /// being spent, without needing the full source transaction.
    ///
    /// # Arguments
    /// * `output` - The source output, or `None` to clear.
    pub fn set_source_output(&mut self, output: Option<TransactionOutput>) {
        self.source_output = output;
    }

    /// Look up the source transaction output, if attached.
    pub fn source_tx_output(&self) -> Option<&TransactionOutput> {
        self.source_output.as_ref()
    }
}

impl Default for TransactionInput {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TransactionInput {
    fn eq(&self, other: &Self) -> bool {
        self.source_txid == other.source_txid
            && self.source_tx_out_index == other.source_tx_out_index
            && self.sequence_number == other.sequence_number
            && self.unlocking_script == other.unlocking_script
    }
}

impl Eq for TransactionInput {}
