//! # bfvm dump
//!
//! Render a program in the bytecode-text syntax understood by
//! `bfvm-parser::text`. One instruction per line, indented by loop
//! nesting; loop-arm distances are internal-only and appear as trailing
//! comments when requested.
//!
//! ## Example
//!
//! ```rust
//! use bfvm_ir::{Inst, Opcode, Program};
//! use bfvm_dump::dump;
//!
//! let mut program = Program::new();
//! program.push(Inst::new(Opcode::Set, 65, 0, 0));
//! program.push(Inst::bare(Opcode::Halt));
//!
//! assert_eq!(dump(&program), "set 65\nhalt\n");
//! ```

use bfvm_ir::{Inst, Opcode, Program};
use std::fmt::Write;

/// Rendering options.
#[derive(Debug, Clone, Copy)]
pub struct DumpOptions {
    /// Spaces per loop-nesting level.
    pub indent: usize,
    /// Emit internal-only fields (loop distances) as `#` comments.
    pub show_internal: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            indent: 2,
            show_internal: false,
        }
    }
}

/// Dump with default options.
pub fn dump(program: &Program) -> String {
    dump_with(program, &DumpOptions::default())
}

/// Dump with explicit options.
pub fn dump_with(program: &Program, options: &DumpOptions) -> String {
    let mut out = String::new();
    let mut depth = 0usize;

    for inst in program.iter() {
        if inst.tag == Opcode::LoopEnd {
            depth = depth.saturating_sub(1);
        }
        for _ in 0..depth * options.indent {
            out.push(' ');
        }
        write_inst(&mut out, inst, options);
        out.push('\n');
        if inst.tag == Opcode::LoopStart {
            depth += 1;
        }
    }
    out
}

fn write_inst(out: &mut String, inst: Inst, options: &DumpOptions) {
    let _ = write!(out, "{}", inst.tag);

    if inst.tag.uses_value() {
        let _ = write!(out, " {}", inst.value);
    }
    if inst.tag.uses_extra() {
        // Displacements read better signed.
        let _ = write!(out, ", {}", inst.extra as i32);
    }
    if inst.tag.uses_offset() && inst.offset != 0 {
        let _ = write!(out, " @ {}", inst.offset as i32);
    }
    if options.show_internal && inst.tag.is_loop() {
        let _ = write!(out, "  # extra={}", inst.extra as i32);
    }
}
