/// XEC SDK - Transaction value types, serialization, and signature hashing.
///
/// Provides the Transaction type with inputs and outputs, binary/hex
/// serialization, transaction ids, and the replay-protected (FORKID)
/// signature hash used to authorize spends.

pub mod transaction;
pub mod input;
pub mod output;
pub mod sighash;

mod error;
pub use error::TransactionError;
pub use transaction::Transaction;
pub use input::TransactionInput;
pub use output::TransactionOutput;
pub use sighash::SigHashType;
