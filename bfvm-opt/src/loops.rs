//! Loop-pattern recognizer
//!
//! Rewrites three loop shapes into straight-line instructions:
//!
//! - Multiplication loops (`[->+++<]` and friends): body is nothing but
//!   adds, and the head cell steps by +1 or -1 per iteration, so the
//!   iteration count is the head value (or its negation) and every other
//!   touched cell receives a constant multiple of it.
//! - Wrapping zero-loops (`[+++]` with an odd step): the head cell
//!   always reaches 0, nothing else is touched.
//! - Seek loops (`[<]`, `[>>]`): body is nothing but moves.
//!
//! Anything else is copied through with its arms relinked; inner loops
//! of an unrecognized outer loop are still visited.

use crate::condense::link_arms;
use bfvm_ir::{Inst, Opcode, Program};

/// Run the pass, producing a fresh program.
pub fn recognize_loops(input: &Program) -> Program {
    let mut out = Program::with_capacity(input.len());
    let mut loop_stack: Vec<usize> = Vec::new();

    let mut i = 0;
    while i < input.len() {
        let inst = input.get(i);
        match inst.tag {
            Opcode::LoopStart => {
                let end = input.matching_loop_end(i);
                if let Some(rewrite) = classify_body(input, i + 1, end) {
                    emit_rewrite(&mut out, &rewrite);
                    i = end + 1;
                    continue;
                }
                let index = out.push(Inst::bare(Opcode::LoopStart));
                loop_stack.push(index);
            }
            Opcode::LoopEnd => {
                let start = loop_stack
                    .pop()
                    .expect("loop arms are paired in well-formed input");
                let end = out.push(Inst::bare(Opcode::LoopEnd));
                link_arms(&mut out, start, end);
            }
            _ => {
                out.push(inst);
            }
        }
        i += 1;
    }
    out
}

/// Replacement for one recognized loop.
enum Rewrite {
    /// `add_mul` per touched offset, then zero the head cell.
    Multiply(Vec<(u32, u8)>),
    /// Zero the head cell.
    ZeroHead,
    /// Scan for a zero cell in steps of the given delta.
    Scan(u32),
}

fn classify_body(program: &Program, from: usize, to: usize) -> Option<Rewrite> {
    if from == to {
        return None;
    }

    if program.tags[from..to].iter().all(|&t| t == Opcode::Add) {
        // Net wrapping add per offset, in first-touch order.
        let mut sums: Vec<(u32, u8)> = Vec::new();
        for i in from..to {
            let inst = program.get(i);
            match sums.iter_mut().find(|(o, _)| *o == inst.offset) {
                Some(entry) => entry.1 = entry.1.wrapping_add(inst.value),
                None => sums.push((inst.offset, inst.value)),
            }
        }
        let base = sums
            .iter()
            .find(|(o, _)| *o == 0)
            .map(|(_, a)| *a)
            .unwrap_or(0);

        if base == 1 || base == 0xFF {
            let factors: Vec<(u32, u8)> = sums
                .iter()
                .filter(|(o, a)| *o != 0 && *a != 0)
                .map(|(o, a)| (*o, base.wrapping_neg().wrapping_mul(*a)))
                .collect();
            return Some(Rewrite::Multiply(factors));
        }
        if base % 2 == 1 && sums.iter().all(|(o, _)| *o == 0) {
            // An odd step walks the whole residue ring and always hits 0.
            return Some(Rewrite::ZeroHead);
        }
        return None;
    }

    if program.tags[from..to].iter().all(|&t| t == Opcode::Move) {
        let step = program.extras[from..to]
            .iter()
            .fold(0u32, |acc, &d| acc.wrapping_add(d));
        return Some(Rewrite::Scan(step));
    }

    None
}

fn emit_rewrite(out: &mut Program, rewrite: &Rewrite) {
    match rewrite {
        Rewrite::Multiply(factors) => {
            for &(offset, factor) in factors {
                out.push(Inst::new(
                    Opcode::AddMul,
                    factor,
                    offset,
                    offset.wrapping_neg(),
                ));
            }
            out.push(Inst::new(Opcode::Set, 0, 0, 0));
        }
        Rewrite::ZeroHead => {
            out.push(Inst::new(Opcode::Set, 0, 0, 0));
        }
        Rewrite::Scan(step) => {
            out.push(Inst::new(Opcode::Seek, 0, 0, *step));
        }
    }
}
