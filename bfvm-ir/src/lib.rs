//! # bfvm IR
//!
//! Bytecode representation shared by the whole toolchain.
//!
//! ## Key Features
//! - Twelve-opcode instruction set subsuming multi-character source runs
//! - Fixed four-field instruction record (tag, value, offset, extra)
//! - Columnar program storage (one vector per field)
//! - SHA-256 content hash used by the optimizer's fixed-point driver

pub mod error;
pub mod opcode;
pub mod program;

pub use error::IrError;
pub use opcode::Opcode;
pub use program::{Inst, Program};

/// Cell values are single wrapping bytes.
pub type Cell = u8;

/// Tape displacements are 32-bit with wrapping arithmetic everywhere.
pub type TapeOffset = u32;
