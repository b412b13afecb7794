/// XEC SDK - Partially signed transactions.
///
/// A self-describing container for an unsigned transaction plus the
/// per-input and per-output metadata co-signers exchange: spent outputs,
/// partial signatures, redeem scripts and key origins. Supports decoding
/// with hard limits, merging contributions from several signers, and
/// finalizing into a broadcastable transaction.

pub mod config;
pub mod input;
pub mod output;
pub mod psbt;
pub mod raw;
pub mod sign;

mod error;
pub use config::DecodeConfig;
pub use error::PsbtError;
pub use input::PsbtInput;
pub use output::PsbtOutput;
pub use psbt::PartiallySignedTransaction;
pub use raw::{PSBT_MAGIC_BYTES, PSBT_SEPARATOR};
pub use sign::{extract_transaction, fill_psbt, finalize, sign_psbt_input};
