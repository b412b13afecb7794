use xec_primitives::PrimitivesError;
use xec_sign::SignError;
use xec_transaction::{SigHashType, TransactionError};

/// Error types for PSBT decoding and the co-signing workflow.
///
/// Decoding never hands back a partially built PSBT: any of the format
/// variants aborts the whole parse.
#[derive(Debug, thiserror::Error)]
pub enum PsbtError {
    /// The data does not start with `psbt\xff`.
    #[error("invalid PSBT magic bytes")]
    InvalidMagic,

    /// A raw key, or a second instance of a singular record, was repeated.
    #[error("duplicate key {0}")]
    DuplicateKey(String),

    /// A typed key has the wrong length for its record type.
    #[error("invalid key length {len} for record type {key_type:#04x}")]
    InvalidKeyLength {
        /// Record type (first key byte).
        key_type: u8,
        /// Total key length including the type byte.
        len: usize,
    },

    /// A key embeds bytes that are not a valid secp256k1 point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A BIP32 derivation value is empty or not a multiple of four bytes.
    #[error("invalid length {0} for HD key path")]
    InvalidKeyPath(usize),

    /// A framed value's declared size disagrees with what its payload used.
    #[error("value declared {declared} bytes but {consumed} were used")]
    LengthMismatch {
        /// Size given by the frame's length prefix.
        declared: usize,
        /// Bytes consumed decoding the payload.
        consumed: usize,
    },

    /// The global map carries no unsigned transaction.
    #[error("no unsigned transaction was provided")]
    MissingUnsignedTx,

    /// The unsigned transaction has a non-empty unlocking script.
    #[error("unsigned transaction input {0} has a non-empty scriptSig")]
    UnsignedTxHasScriptSigs(usize),

    /// Per-input maps do not line up with the transaction's inputs.
    #[error("expected {expected} input maps, found {found}")]
    InputCountMismatch {
        /// Inputs in the unsigned transaction.
        expected: usize,
        /// Input maps present.
        found: usize,
    },

    /// Per-output maps do not line up with the transaction's outputs.
    #[error("expected {expected} output maps, found {found}")]
    OutputCountMismatch {
        /// Outputs in the unsigned transaction.
        expected: usize,
        /// Output maps present.
        found: usize,
    },

    /// The decoded PSBT contradicts itself.
    #[error("PSBT is not sane")]
    NotSane,

    /// Bytes remain after the last output map.
    #[error("{0} trailing bytes after PSBT")]
    TrailingData(usize),

    /// A decode limit from `DecodeConfig` was hit.
    #[error("decode limit exceeded: {0}")]
    LimitExceeded(String),

    /// The data ended in the middle of a record.
    #[error("unexpected end of PSBT data")]
    Truncated,

    /// The base64 transport encoding is malformed.
    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    /// The hex transport encoding is malformed.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The spending transaction records a different spent output than the
    /// PSBT input's UTXO.
    #[error("input {0} UTXO does not match the transaction's source output")]
    UtxoMismatch(usize),

    /// The input asks for a different sighash type than the one requested.
    #[error("input requires sighash {required}, signing requested {requested}")]
    SighashMismatch {
        /// Sighash type recorded on the input.
        required: SigHashType,
        /// Sighash type passed by the caller.
        requested: SigHashType,
    },

    /// The output index does not exist in the PSBT.
    #[error("output index {index} out of range (PSBT has {count} outputs)")]
    OutputIndexOutOfRange {
        /// The requested output index.
        index: usize,
        /// Number of outputs.
        count: usize,
    },

    /// Two PSBTs describe different unsigned transactions.
    #[error("PSBTs do not share the same unsigned transaction")]
    UnexpectedUnsignedTx,

    /// An input has no final scriptSig yet.
    #[error("input {0} is not finalized")]
    NotFinalized(usize),

    /// An underlying signing error (forwarded from `xec-sign`).
    #[error("signing error: {0}")]
    Sign(#[from] SignError),

    /// An underlying transaction error (forwarded from `xec-transaction`).
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// An underlying primitives error (forwarded from `xec-primitives`).
    #[error("primitives error: {0}")]
    Primitives(PrimitivesError),
}

impl From<PrimitivesError> for PsbtError {
    fn from(e: PrimitivesError) -> Self {
        match e {
            PrimitivesError::UnexpectedEof => PsbtError::Truncated,
            other => PsbtError::Primitives(other),
        }
    }
}

impl From<base64::DecodeError> for PsbtError {
    fn from(e: base64::DecodeError) -> Self {
        PsbtError::InvalidBase64(e.to_string())
    }
}

impl From<hex::FromHexError> for PsbtError {
    fn from(e: hex::FromHexError) -> Self {
        PsbtError::InvalidHex(e.to_string())
    }
}
