//! Error types for the IR crate

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    /// A name that does not map to any opcode.
    #[error("unknown opcode name: {0}")]
    UnknownOpcode(String),

    /// A raw tag byte outside the opcode range.
    #[error("invalid opcode tag: {0:#04x}")]
    InvalidTag(u8),
}

pub type Result<T> = std::result::Result<T, IrError>;
