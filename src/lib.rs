//! # bfvm
//!
//! Optimizing Brainfuck toolchain: parse source (or a bytecode-text
//! dump) into a compact bytecode, condense it through data-flow and
//! loop-pattern passes, then run it in the interpreter or, on x86-64
//! unix hosts, as native code.
//!
//! ## Example
//!
//! ```rust
//! let output = bfvm::eval(b",>,<[->+<]>.", b"\x03\x04").unwrap();
//! assert_eq!(output, b"\x07");
//! ```

use thiserror::Error;

pub use bfvm_dump::{dump, dump_with, DumpOptions};
pub use bfvm_ir::{Inst, Opcode, Program};
pub use bfvm_opt::{optimize, OptConfig, OptLevel};
pub use bfvm_parser::{parse_brainfuck, parse_brainfuck_split, parse_text, ParseError, ParserConfig};
pub use bfvm_runtime::{
    jit_supported, EofPolicy, Machine, MachineConfig, PagedTape, RuntimeError, Status, Tape,
};

#[cfg(all(target_arch = "x86_64", unix, target_pointer_width = "64"))]
pub use bfvm_runtime::{compile, run_jit, JitCode};

/// Any failure along the parse -> optimize -> execute path.
#[derive(Debug, Error)]
pub enum BfvmError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Parse, optimize at the default level, and interpret over in-memory
/// input, returning the collected output.
pub fn eval(source: &[u8], input: &[u8]) -> Result<Vec<u8>, BfvmError> {
    let program = parse_brainfuck(source)?;
    let program = optimize(&program, &OptConfig::default());
    Ok(bfvm_runtime::run(program, input)?)
}
