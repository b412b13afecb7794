/// Script type - a sequence of opcodes and data pushes.
///
/// Scripts appear in transaction outputs (locking) and inputs (unlocking).
/// The Script wraps a `Vec<u8>` and provides construction, classification,
/// push-only evaluation, and ASM/hex rendering.

use std::fmt;

use xec_primitives::{KeyId, ScriptId};

use crate::chunk::{decode_script, push_data_prefix, ScriptChunk, ScriptOps};
use crate::opcodes::*;
use crate::standard::{is_valid_pubkey_size, solve, ScriptTemplate};
use crate::ScriptError;

/// Largest number of keys a bare multisig template may list.
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// A script, represented as a byte vector newtype.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Script(Vec<u8>);

impl Script {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// Create a new empty script.
    pub fn new() -> Self {
        Script(Vec::new())
    }

    /// Create a script from a hex-encoded string.
    ///
    /// # Arguments
    /// * `hex_str` - A hex string (e.g. "76a914...88ac").
    ///
    /// # Returns
    /// A `Script` wrapping the decoded bytes, or an error if the hex is invalid.
    pub fn from_hex(hex_str: &str) -> Result<Self, ScriptError> {
        let bytes = hex::decode(hex_str).map_err(|e| ScriptError::InvalidHex(e.to_string()))?;
        Ok(Script(bytes))
    }

    /// Create a script from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Script(bytes.to_vec())
    }

    /// Create a script from an ASM string.
    ///
    /// Known opcode names (e.g. "OP_DUP") are emitted directly and any other
    /// token is treated as hex push data.
    ///
    /// # Returns
    /// A `Script`, or an error if any token is invalid.
    pub fn from_asm(asm: &str) -> Result<Self, ScriptError> {
        let mut script = Script::new();
        for section in asm.split_whitespace() {
            if let Some(opcode) = string_to_opcode(section) {
                script.0.push(opcode);
            } else {
                let data = hex::decode(section)
                    .map_err(|_| ScriptError::InvalidOpcodeData(section.to_string()))?;
                script.append_push_data(&data)?;
            }
        }
        Ok(script)
    }

    /// Build a script that pushes each value with the minimal encoding.
    ///
    /// Empty values become `OP_0`, single bytes 1..=16 become `OP_1`..`OP_16`
    /// and everything else is a data push.
    ///
    /// # Arguments
    /// * `values` - The stack items to push, bottom first.
    ///
    /// # Returns
    /// The push-only script, or an error if a value is too large to push.
    pub fn push_all<V: AsRef<[u8]>>(values: &[V]) -> Result<Self, ScriptError> {
        let mut script = Script::new();
        for value in values {
            let value = value.as_ref();
            match value {
                [] => script.0.push(OP_0),
                [n @ 1..=16] => script.0.push(OP_1 + *n - 1),
                _ => script.append_push_data(value)?,
            }
        }
        Ok(script)
    }

    /// Pay-to-public-key-hash locking script for `key_id`.
    ///
    /// `OP_DUP OP_HASH160 <key_id> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn p2pkh(key_id: &KeyId) -> Self {
        let mut bytes = Vec::with_capacity(25);
        bytes.extend_from_slice(&[OP_DUP, OP_HASH160, OP_DATA_20]);
        bytes.extend_from_slice(key_id.as_bytes());
        bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(bytes)
    }

    /// Pay-to-script-hash locking script for `script_id`.
    ///
    /// `OP_HASH160 <script_id> OP_EQUAL`
    pub fn p2sh(script_id: &ScriptId) -> Self {
        let mut bytes = Vec::with_capacity(23);
        bytes.extend_from_slice(&[OP_HASH160, OP_DATA_20]);
        bytes.extend_from_slice(script_id.as_bytes());
        bytes.push(OP_EQUAL);
        Script(bytes)
    }

    /// Pay-to-public-key locking script: `<pub_key> OP_CHECKSIG`.
    pub fn p2pk(pub_key: &[u8]) -> Result<Self, ScriptError> {
        let mut script = Script::new();
        script.append_push_data(pub_key)?;
        script.0.push(OP_CHECKSIG);
        Ok(script)
    }

    /// Bare multisig locking script requiring `required` of `pub_keys`.
    ///
    /// `OP_m <key_1> .. <key_n> OP_n OP_CHECKMULTISIG`
    ///
    /// # Returns
    /// An error unless `1 <= required <= n <= 16` and every key has a valid size.
    pub fn multisig<K: AsRef<[u8]>>(required: usize, pub_keys: &[K]) -> Result<Self, ScriptError> {
        let n = pub_keys.len();
        if required == 0 || required > n || n > 16 {
            return Err(ScriptError::InvalidMultisig(format!(
                "cannot require {} of {} keys",
                required, n
            )));
        }
        let mut script = Script::new();
        script.0.push(encode_op_n(required as u8).ok_or(ScriptError::DataTooBig)?);
        for key in pub_keys {
            let key = key.as_ref();
            if !is_valid_pubkey_size(key) {
                return Err(ScriptError::InvalidMultisig(format!(
                    "invalid public key {}",
                    hex::encode(key)
                )));
            }
            script.append_push_data(key)?;
        }
        script.0.push(encode_op_n(n as u8).ok_or(ScriptError::DataTooBig)?);
        script.0.push(OP_CHECKMULTISIG);
        Ok(script)
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Encode the script as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Render the script as space-separated ASM.
    ///
    /// # Returns
    /// The ASM string, or an empty string if the script is malformed.
    pub fn to_asm(&self) -> String {
        match self.chunks() {
            Ok(chunks) => chunks
                .iter()
                .map(ScriptChunk::to_asm_string)
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => String::new(),
        }
    }

    /// Return a reference to the underlying bytes.
    pub fn to_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the script and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Return the length of the script in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the script is empty (zero bytes).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Identity of the script: Hash160 of its bytes.
    pub fn script_id(&self) -> ScriptId {
        ScriptId::hash_of(&self.0)
    }

    // -----------------------------------------------------------------------
    // Script classification
    // -----------------------------------------------------------------------

    /// Check for `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`.
    pub fn is_p2pkh(&self) -> bool {
        let b = &self.0;
        b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == OP_DATA_20
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
    }

    /// Check for `OP_HASH160 <20 bytes> OP_EQUAL`.
    pub fn is_p2sh(&self) -> bool {
        let b = &self.0;
        b.len() == 23 && b[0] == OP_HASH160 && b[1] == OP_DATA_20 && b[22] == OP_EQUAL
    }

    /// Check for `<pubkey> OP_CHECKSIG`.
    pub fn is_p2pk(&self) -> bool {
        matches!(solve(self), ScriptTemplate::PubKey(_))
    }

    /// Check for a bare `OP_m <keys> OP_n OP_CHECKMULTISIG` script.
    pub fn is_multisig(&self) -> bool {
        matches!(solve(self), ScriptTemplate::Multisig { .. })
    }

    /// Check whether the script starts with `OP_RETURN`.
    pub fn is_data(&self) -> bool {
        self.0.first() == Some(&OP_RETURN)
    }

    /// Check whether every operation is a push.
    ///
    /// Malformed scripts are not push-only.
    pub fn is_push_only(&self) -> bool {
        ScriptOps::new(&self.0).all(|op| matches!(op, Ok(chunk) if chunk.is_push()))
    }

    /// Evaluate a push-only script into the stack it produces.
    ///
    /// # Returns
    /// The stack items bottom first, `NotPushOnly` if any operation is not a
    /// push, or `DataTooSmall` if a push is truncated.
    pub fn push_only_stack(&self) -> Result<Vec<Vec<u8>>, ScriptError> {
        let mut stack = Vec::new();
        for op in ScriptOps::new(&self.0) {
            let chunk = op?;
            if !chunk.is_push() {
                return Err(ScriptError::NotPushOnly);
            }
            stack.push(chunk.pushed_value().ok_or(ScriptError::NotPushOnly)?);
        }
        Ok(stack)
    }

    /// Parse the script into a vector of decoded chunks.
    pub fn chunks(&self) -> Result<Vec<ScriptChunk>, ScriptError> {
        decode_script(&self.0)
    }

    /// Iterate over the script's operations.
    pub fn ops(&self) -> ScriptOps<'_> {
        ScriptOps::new(&self.0)
    }

    // -----------------------------------------------------------------------
    // Mutation / building
    // -----------------------------------------------------------------------

    /// Append data bytes with the minimal PUSHDATA prefix.
    pub fn append_push_data(&mut self, data: &[u8]) -> Result<(), ScriptError> {
        let prefix = push_data_prefix(data.len())?;
        self.0.extend_from_slice(&prefix);
        self.0.extend_from_slice(data);
        Ok(())
    }

    /// Append raw opcodes to the script.
    ///
    /// Rejects push opcodes (`OP_DATA_1`..`OP_PUSHDATA4`), which need data;
    /// use `append_push_data` for those.
    pub fn append_opcodes(&mut self, opcodes: &[u8]) -> Result<(), ScriptError> {
        if let Some(&op) = opcodes.iter().find(|&&op| (OP_DATA_1..=OP_PUSHDATA4).contains(&op)) {
            return Err(ScriptError::InvalidOpcodeType(opcode_to_string(op).to_string()));
        }
        self.0.extend_from_slice(opcodes);
        Ok(())
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }
}

impl AsRef<[u8]> for Script {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Script {
    /// Display the script as a lowercase hex string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.to_hex())
    }
}

impl serde::Serialize for Script {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Script {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Script::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
