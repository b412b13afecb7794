//! 20-byte identities for public keys and scripts.
//!
//! A `KeyId` is the Hash160 of a serialized public key (in whatever encoding
//! the key was presented, compressed or uncompressed), and a `ScriptId` is
//! the Hash160 of a serialized script. Both are plain ordered values used as
//! map keys throughout the signing layer.

use std::fmt;

use crate::hash::hash160;
use crate::PrimitivesError;

macro_rules! hash160_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; 20]);

        impl $name {
            /// Wrap an existing 20-byte digest.
            pub fn new(bytes: [u8; 20]) -> Self {
                $name(bytes)
            }

            /// Hash arbitrary serialized data into an identity.
            pub fn hash_of(data: &[u8]) -> Self {
                $name(hash160(data))
            }

            /// Build an identity from a slice that must be exactly 20 bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, PrimitivesError> {
                let arr: [u8; 20] = bytes.try_into().map_err(|_| {
                    PrimitivesError::InvalidKeyLength { expected: 20, got: bytes.len() }
                })?;
                Ok($name(arr))
            }

            /// Access the raw digest bytes.
            pub fn as_bytes(&self) -> &[u8; 20] {
                &self.0
            }
        }

        impl From<[u8; 20]> for $name {
            fn from(bytes: [u8; 20]) -> Self {
                $name(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }
    };
}

hash160_id! {
    /// Hash160 of a serialized public key.
    KeyId
}

hash160_id! {
    /// Hash160 of a serialized script.
    ScriptId
}
