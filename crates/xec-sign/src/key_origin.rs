//! Key origin metadata: master key fingerprint plus derivation path.

use std::fmt;
use std::str::FromStr;

/// Bit marking a hardened derivation index.
pub const HARDENED: u32 = 0x8000_0000;

/// Where a public key was derived from.
///
/// `fingerprint` is the first four bytes of the Hash160 of the master
/// public key; `path` holds the child indices, hardened ones with
/// [`HARDENED`] set.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyOriginInfo {
    /// Master key fingerprint.
    pub fingerprint: [u8; 4],
    /// Derivation path from the master key.
    pub path: Vec<u32>,
}

impl KeyOriginInfo {
    /// Create a key origin from a fingerprint and path.
    pub fn new(fingerprint: [u8; 4], path: Vec<u32>) -> Self {
        KeyOriginInfo { fingerprint, path }
    }
}

impl fmt::Display for KeyOriginInfo {
    /// Renders as `aabbccdd/44'/0'/0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.fingerprint))?;
        for index in &self.path {
            if index & HARDENED != 0 {
                write!(f, "/{}'", index & !HARDENED)?;
            } else {
                write!(f, "/{}", index)?;
            }
        }
        Ok(())
    }
}

impl FromStr for KeyOriginInfo {
    type Err = String;

    /// Parses the `Display` form; `h` is accepted as a hardened marker too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let fp = parts.next().unwrap_or_default();
        let bytes = hex::decode(fp).map_err(|e| format!("invalid fingerprint {}: {}", fp, e))?;
        let fingerprint: [u8; 4] = bytes
            .try_into()
            .map_err(|_| format!("fingerprint {} is not 4 bytes", fp))?;

        let path = parts
            .map(|part| {
                let (digits, hardened) = match part.strip_suffix(['\'', 'h']) {
                    Some(d) => (d, true),
                    None => (part, false),
                };
                let index: u32 = digits
                    .parse()
                    .map_err(|_| format!("invalid path element {}", part))?;
                if index & HARDENED != 0 {
                    return Err(format!("path element {} out of range", part));
                }
                Ok(if hardened { index | HARDENED } else { index })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(KeyOriginInfo { fingerprint, path })
    }
}
