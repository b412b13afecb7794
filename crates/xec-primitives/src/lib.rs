/// XEC SDK - Cryptographic primitives, hashing, and utilities.
///
/// This crate provides the foundational building blocks for the XEC SDK:
/// - Hash functions (SHA-256, SHA-256d, RIPEMD-160, Hash160)
/// - Chain hash type for transaction identification
/// - 20-byte key and script identities
/// - Variable-length integer encoding and byte readers/writers
/// - Elliptic curve cryptography (secp256k1 keys, DER signatures)
/// - Process-wide randomness service

pub mod hash;
pub mod chainhash;
pub mod ids;
pub mod util;
pub mod ec;
pub mod random;

mod error;
pub use error::PrimitivesError;
pub use ids::{KeyId, ScriptId};
