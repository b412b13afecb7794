use xec_primitives::PrimitivesError;

/// Error types for transaction operations.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// The transaction structure is invalid (e.g. an input index out of range).
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    /// An error occurred during binary/hex serialization or deserialization.
    #[error("serialization error: {0}")]
    SerializationError(String),
    /// The sighash type cannot be used to compute a digest.
    #[error("unsupported sighash type {0:#x}")]
    UnsupportedSighash(u32),
    /// An underlying script error (forwarded from `xec-script`).
    #[error("script error: {0}")]
    Script(#[from] xec_script::ScriptError),
    /// An underlying primitives error (forwarded from `xec-primitives`).
    #[error("primitives error: {0}")]
    Primitives(#[from] PrimitivesError),
}

impl TransactionError {
    /// Adapter for `map_err` that names the field a decode failed on.
    pub(crate) fn reading(field: &'static str) -> impl FnOnce(PrimitivesError) -> TransactionError {
        move |e| TransactionError::SerializationError(format!("reading {}: {}", field, e))
    }
}
