//! ECDSA signature with strict DER serialization.
//!
//! Signatures are produced with RFC6979 deterministic nonces and always
//! serialized with a low S value, so the same key and hash give the same
//! bytes on every run.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa;

use crate::ec::private_key::PrivateKey;
use crate::ec::public_key::PublicKey;
use crate::PrimitivesError;

/// Length of the message hash a signature commits to.
const HASH_LEN: usize = 32;

/// An ECDSA signature over secp256k1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    inner: ecdsa::Signature,
}

impl Signature {
    /// Build a signature from raw big-endian R and S values.
    ///
    /// # Returns
    /// An error if either value is zero or not below the curve order.
    pub fn new(r: [u8; 32], s: [u8; 32]) -> Result<Self, PrimitivesError> {
        let inner = ecdsa::Signature::from_scalars(k256::FieldBytes::from(r), k256::FieldBytes::from(s))
            .map_err(|e| PrimitivesError::InvalidSignature(e.to_string()))?;
        Ok(Signature { inner })
    }

    /// Parse a strict DER-encoded signature (without a sighash byte).
    ///
    /// Expected format: `30 <len> 02 <r_len> <r> 02 <s_len> <s>`.
    pub fn from_der(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        let inner = ecdsa::Signature::from_der(bytes)
            .map_err(|e| PrimitivesError::InvalidSignature(format!("malformed DER: {}", e)))?;
        Ok(Signature { inner })
    }

    /// Serialize in DER format, normalizing S to the lower half of the order.
    pub fn to_der(&self) -> Vec<u8> {
        self.normalized().to_der().as_bytes().to_vec()
    }

    /// R component as 32 big-endian bytes.
    pub fn r(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.inner.split_bytes().0);
        out
    }

    /// S component as 32 big-endian bytes.
    pub fn s(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.inner.split_bytes().1);
        out
    }

    /// Whether S is already in the lower half of the curve order.
    pub fn is_low_s(&self) -> bool {
        self.inner.normalize_s().is_none()
    }

    /// Sign a 32-byte hash with RFC6979 nonces.
    ///
    /// # Arguments
    /// * `hash` - The message hash to sign; must be 32 bytes.
    /// * `priv_key` - The private key to sign with.
    ///
    /// # Returns
    /// A low-S `Signature`, or an error if the hash has the wrong length.
    pub fn sign(hash: &[u8], priv_key: &PrivateKey) -> Result<Self, PrimitivesError> {
        if hash.len() != HASH_LEN {
            return Err(PrimitivesError::InvalidSignature(format!(
                "message hash must be {} bytes, got {}",
                HASH_LEN,
                hash.len()
            )));
        }
        let sig: ecdsa::Signature = priv_key
            .signing_key()
            .sign_prehash(hash)
            .map_err(|e| PrimitivesError::InvalidSignature(e.to_string()))?;
        Ok(Signature { inner: sig }.normalized_sig())
    }

    /// Verify this signature against a 32-byte hash and public key.
    ///
    /// High-S signatures are verified as their low-S equivalent.
    pub fn verify(&self, hash: &[u8], pub_key: &PublicKey) -> bool {
        if hash.len() != HASH_LEN {
            return false;
        }
        pub_key
            .verifying_key()
            .verify_prehash(hash, &self.normalized())
            .is_ok()
    }

    fn normalized(&self) -> ecdsa::Signature {
        self.inner.normalize_s().unwrap_or_else(|| self.inner.clone())
    }

    fn normalized_sig(self) -> Self {
        Signature { inner: self.normalized() }
    }
}
