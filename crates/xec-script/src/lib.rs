/// XEC SDK - Script type, opcodes, and standard templates.
///
/// Provides the `Script` byte-string type, opcode definitions, operation
/// decoding, and classification of locking scripts into the standard
/// spending templates the signer understands.

pub mod script;
pub mod opcodes;
pub mod chunk;
pub mod standard;

mod error;
pub use error::ScriptError;
pub use script::Script;
pub use chunk::ScriptChunk;
pub use standard::{solve, ScriptTemplate};
