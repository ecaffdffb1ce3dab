//! # bfvm optimizer
//!
//! Two passes over the bytecode plus a fixed-point driver:
//!
//! - [`condense`]: a data-flow walk tracking pending adds/sets/moves and
//!   statically known cell values, folding and deleting work before it is
//!   re-emitted.
//! - [`recognize_loops`]: rewrites zero-loops, multiplication loops, and
//!   seek loops into single instructions.
//! - [`optimize`]: iterates both passes until the program's content hash
//!   stops changing.
//!
//! Every pass consumes its input by reference and produces a fresh
//! program; I/O is never reordered, duplicated, or dropped (the only
//! I/O rewrite is a provably-constant `out` into `out_value`).

pub mod condense;
pub mod driver;
pub mod loops;

pub use condense::condense;
pub use driver::{optimize, OptConfig, OptLevel};
pub use loops::recognize_loops;
