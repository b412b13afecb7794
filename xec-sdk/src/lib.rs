#![deny(missing_docs)]

//! XEC SDK - Complete SDK.
//!
//! Re-exports all XEC SDK components for convenient single-crate usage.

pub use xec_primitives as primitives;
pub use xec_script as script;
pub use xec_transaction as transaction;
pub use xec_sign as sign;
pub use xec_psbt as psbt;

pub use xec_psbt::{PartiallySignedTransaction, PsbtError};
pub use xec_sign::{FlatSigningProvider, SignatureData, SigningProvider};
