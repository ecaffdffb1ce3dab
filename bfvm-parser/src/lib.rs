//! # bfvm frontends
//!
//! Two parsers producing the shared bytecode:
//!
//! - [`brainfuck`]: the eight canonical characters plus `#` (breakpoint),
//!   with run-length fusion of `+`/`-` and `<`/`>` runs, and an optional
//!   `!` split between program text and static input.
//! - [`text`]: the line-oriented bytecode syntax emitted by `bfvm-dump`,
//!   used for diagnostics and round-trip testing.
//!
//! ## Example
//!
//! ```rust
//! use bfvm_parser::parse_brainfuck;
//!
//! let program = parse_brainfuck(b"+++[->+<]>.").unwrap();
//! assert!(program.len() > 0);
//! ```

pub mod brainfuck;
pub mod error;
pub mod text;

pub use brainfuck::{parse_brainfuck, parse_brainfuck_split, ParserConfig};
pub use error::{ParseError, Result};
pub use text::parse_text;
