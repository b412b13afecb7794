/// Error types for script operations.
///
/// Covers hex and ASM parsing, push encoding and decoding, and template
/// construction problems.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Invalid hex string.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Invalid opcode data encountered during ASM parsing.
    #[error("invalid opcode data: {0}")]
    InvalidOpcodeData(String),

    /// Attempted to append a push opcode without its data.
    #[error("use append_push_data for push data opcodes: {0}")]
    InvalidOpcodeType(String),

    /// Not enough data in script to complete a push operation.
    #[error("not enough data")]
    DataTooSmall,

    /// Push data exceeds the largest encodable size.
    #[error("data too big")]
    DataTooBig,

    /// One of several pushed parts exceeds the largest encodable size.
    #[error("part too big '{0}'")]
    PartTooBig(usize),

    /// The script contains a non-push operation where only pushes are allowed.
    #[error("script is not push-only")]
    NotPushOnly,

    /// A multisig template was requested with inconsistent parameters.
    #[error("invalid multisig: {0}")]
    InvalidMultisig(String),

    /// Error from primitives crate.
    #[error("primitives error: {0}")]
    Primitives(#[from] xec_primitives::PrimitivesError),
}
