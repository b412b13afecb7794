/// Error types for signing operations.
///
/// Failing to find a key or to solve a script is not an error: the
/// pipeline reports it through its boolean result. These variants cover
/// caller misuse only.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The input index does not exist in the transaction.
    #[error("input index {index} out of range (tx has {count} inputs)")]
    InputIndexOutOfRange {
        /// The requested input index.
        index: usize,
        /// Number of inputs in the transaction.
        count: usize,
    },
    /// The spent output index does not exist in the funding transaction.
    #[error("prevout index {index} out of range (funding tx has {count} outputs)")]
    PrevoutIndexOutOfRange {
        /// The prevout index named by the input.
        index: u32,
        /// Number of outputs in the funding transaction.
        count: usize,
    },
    /// The funding transaction is not the one the input spends.
    #[error("input spends {expected}, funding transaction is {found}")]
    PrevoutMismatch {
        /// Txid named by the input.
        expected: String,
        /// Txid of the transaction supplied.
        found: String,
    },
    /// An underlying transaction error (forwarded from `xec-transaction`).
    #[error("transaction error: {0}")]
    Transaction(#[from] xec_transaction::TransactionError),
}
