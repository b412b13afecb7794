//! Classification of locking scripts into standard templates.
//!
//! `solve` recognises the script shapes the signer knows how to satisfy and
//! extracts their parameters (keys, key hashes, script hashes, thresholds).

use std::fmt;

use xec_primitives::{KeyId, ScriptId};

use crate::chunk::ScriptOps;
use crate::opcodes::*;
use crate::Script;

/// Standard template of a locking script, with its extracted parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptTemplate {
    /// Anything not otherwise recognised.
    NonStandard,
    /// `OP_RETURN` followed only by pushes. Never spendable.
    NullData,
    /// `<pubkey> OP_CHECKSIG`.
    PubKey(Vec<u8>),
    /// `OP_DUP OP_HASH160 <key id> OP_EQUALVERIFY OP_CHECKSIG`.
    PubKeyHash(KeyId),
    /// `OP_HASH160 <script id> OP_EQUAL`.
    ScriptHash(ScriptId),
    /// `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`.
    Multisig {
        /// Number of signatures needed.
        required: usize,
        /// Public keys in script order.
        pub_keys: Vec<Vec<u8>>,
    },
}

impl ScriptTemplate {
    /// Short lowercase name of the template.
    pub fn name(&self) -> &'static str {
        match self {
            ScriptTemplate::NonStandard => "nonstandard",
            ScriptTemplate::NullData => "nulldata",
            ScriptTemplate::PubKey(_) => "pubkey",
            ScriptTemplate::PubKeyHash(_) => "pubkeyhash",
            ScriptTemplate::ScriptHash(_) => "scripthash",
            ScriptTemplate::Multisig { .. } => "multisig",
        }
    }
}

impl fmt::Display for ScriptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `key` has the length implied by its SEC1 header byte.
///
/// 33 bytes for `02`/`03`, 65 bytes for `04`/`06`/`07`. The point itself
/// is not validated.
pub fn is_valid_pubkey_size(key: &[u8]) -> bool {
    match key.first() {
        Some(0x02) | Some(0x03) => key.len() == 33,
        Some(0x04) | Some(0x06) | Some(0x07) => key.len() == 65,
        _ => false,
    }
}

/// Classify a locking script.
///
/// # Arguments
/// * `script` - The locking script to inspect.
///
/// # Returns
/// The matching `ScriptTemplate`, or `NonStandard`.
pub fn solve(script: &Script) -> ScriptTemplate {
    let bytes = script.to_bytes();

    if script.is_p2sh() {
        let mut id = [0u8; 20];
        id.copy_from_slice(&bytes[2..22]);
        return ScriptTemplate::ScriptHash(ScriptId::new(id));
    }

    if bytes.first() == Some(&OP_RETURN) && Script::from_bytes(&bytes[1..]).is_push_only() {
        return ScriptTemplate::NullData;
    }

    if let Some(key) = match_pay_to_pubkey(bytes) {
        return ScriptTemplate::PubKey(key.to_vec());
    }

    if script.is_p2pkh() {
        let mut id = [0u8; 20];
        id.copy_from_slice(&bytes[3..23]);
        return ScriptTemplate::PubKeyHash(KeyId::new(id));
    }

    if let Some((required, pub_keys)) = match_multisig(bytes) {
        return ScriptTemplate::Multisig { required, pub_keys };
    }

    ScriptTemplate::NonStandard
}

fn match_pay_to_pubkey(bytes: &[u8]) -> Option<&[u8]> {
    let (&last, body) = bytes.split_last()?;
    let (&len, key) = body.split_first()?;
    if last != OP_CHECKSIG || len as usize != key.len() || !is_valid_pubkey_size(key) {
        return None;
    }
    Some(key)
}

fn match_multisig(bytes: &[u8]) -> Option<(usize, Vec<Vec<u8>>)> {
    if bytes.last() != Some(&OP_CHECKMULTISIG) {
        return None;
    }
    let body = &bytes[..bytes.len() - 1];
    let mut ops = ScriptOps::new(body);

    let first = ops.next()?.ok()?;
    let required = match first.op {
        OP_1..=OP_16 => decode_op_n(first.op)? as usize,
        _ => return None,
    };

    let mut pub_keys = Vec::new();
    let count_op = loop {
        let chunk = ops.next()?.ok()?;
        match chunk.data {
            Some(data) if is_valid_pubkey_size(&data) => pub_keys.push(data),
            Some(_) => return None,
            None => break chunk.op,
        }
    };
    let count = match count_op {
        OP_1..=OP_16 => decode_op_n(count_op)? as usize,
        _ => return None,
    };

    if ops.next().is_some() || pub_keys.len() != count || count < required {
        return None;
    }
    Some((required, pub_keys))
}
