//! Script chunk parsing and encoding.
//!
//! A script chunk is either an opcode or a data push with its associated
//! bytes. `ScriptOps` walks raw script bytes one operation at a time;
//! `decode_script` collects the whole script; `push_data_prefix` computes the
//! minimal push encoding for a payload.

use crate::opcodes::*;
use crate::ScriptError;

/// A single parsed element of a script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptChunk {
    /// The opcode byte. For direct pushes (1-75 bytes), this is the length.
    pub op: u8,
    /// The data payload, if this chunk is a push operation.
    pub data: Option<Vec<u8>>,
}

impl ScriptChunk {
    /// Whether this chunk only pushes data (including `OP_0`,
    /// `OP_1NEGATE` and `OP_1`..`OP_16`).
    pub fn is_push(&self) -> bool {
        self.op <= OP_16 && self.op != OP_RESERVED
    }

    /// The value this chunk leaves on the stack, if it is a push.
    ///
    /// `OP_0` pushes an empty vector, `OP_1NEGATE` pushes `0x81` and
    /// `OP_N` pushes the single byte `N`.
    pub fn pushed_value(&self) -> Option<Vec<u8>> {
        match self.op {
            OP_0 => Some(Vec::new()),
            OP_1NEGATE => Some(vec![0x81]),
            OP_1..=OP_16 => decode_op_n(self.op).map(|n| vec![n]),
            _ => self.data.clone(),
        }
    }

    /// Convert this chunk to its ASM string representation.
    pub fn to_asm_string(&self) -> String {
        match &self.data {
            Some(data) if self.op > OP_0 && self.op <= OP_PUSHDATA4 => hex::encode(data),
            _ => opcode_to_string(self.op).to_string(),
        }
    }
}

/// Iterator over the operations of a script.
///
/// Yields an error (and then stops) when a push runs past the end of the
/// script.
#[derive(Debug, Clone)]
pub struct ScriptOps<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> ScriptOps<'a> {
    /// Start iterating over `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        ScriptOps { bytes, pos: 0, failed: false }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ScriptError> {
        if self.bytes.len() - self.pos < n {
            return Err(ScriptError::DataTooSmall);
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_op(&mut self) -> Result<ScriptChunk, ScriptError> {
        let op = self.take(1)?[0];
        let length = match op {
            OP_DATA_1..=OP_DATA_75 => op as usize,
            OP_PUSHDATA1 => self.take(1)?[0] as usize,
            OP_PUSHDATA2 => {
                let b = self.take(2)?;
                u16::from_le_bytes([b[0], b[1]]) as usize
            }
            OP_PUSHDATA4 => {
                let b = self.take(4)?;
                u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
            }
            _ => return Ok(ScriptChunk { op, data: None }),
        };
        let data = self.take(length)?.to_vec();
        Ok(ScriptChunk { op, data: Some(data) })
    }
}

impl Iterator for ScriptOps<'_> {
    type Item = Result<ScriptChunk, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.bytes.len() {
            return None;
        }
        let result = self.read_op();
        self.failed = result.is_err();
        Some(result)
    }
}

/// Decode raw script bytes into a vector of `ScriptChunk` values.
///
/// # Arguments
/// * `bytes` - The raw script bytes to decode.
///
/// # Returns
/// A vector of parsed chunks, or `DataTooSmall` if a push is truncated.
pub fn decode_script(bytes: &[u8]) -> Result<Vec<ScriptChunk>, ScriptError> {
    ScriptOps::new(bytes).collect()
}

/// Compute the minimal push prefix for a payload of the given length.
///
/// # Arguments
/// * `data_len` - The length of the data to be pushed.
///
/// # Returns
/// The prefix bytes, or `DataTooBig` beyond 4 GiB.
pub fn push_data_prefix(data_len: usize) -> Result<Vec<u8>, ScriptError> {
    if data_len < OP_PUSHDATA1 as usize {
        Ok(vec![data_len as u8])
    } else if data_len <= 0xff {
        Ok(vec![OP_PUSHDATA1, data_len as u8])
    } else if data_len <= 0xffff {
        let mut buf = vec![OP_PUSHDATA2];
        buf.extend_from_slice(&(data_len as u16).to_le_bytes());
        Ok(buf)
    } else if data_len as u64 <= 0xffff_ffff {
        let mut buf = vec![OP_PUSHDATA4];
        buf.extend_from_slice(&(data_len as u32).to_le_bytes());
        Ok(buf)
    } else {
        Err(ScriptError::DataTooBig)
    }
}

/// Encode multiple payloads as consecutive pushes.
///
/// # Returns
/// The concatenated pushes, or `PartTooBig(i)` naming the first oversized part.
pub fn encode_push_datas(parts: &[&[u8]]) -> Result<Vec<u8>, ScriptError> {
    let mut result = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        let prefix = push_data_prefix(part.len()).map_err(|_| ScriptError::PartTooBig(i))?;
        result.extend_from_slice(&prefix);
        result.extend_from_slice(part);
    }
    Ok(result)
}
