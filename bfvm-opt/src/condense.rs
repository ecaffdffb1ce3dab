//! Condense pass
//!
//! A single forward walk that keeps cell writes and head movement
//! symbolic for as long as possible:
//!
//! - `pending_move` accumulates head displacement not yet emitted.
//! - `ops` maps cell offsets (relative to the head before the pending
//!   move) to one pending operation each: a statically known value, a
//!   pending store, or a pending wrapping add. Flush order is insertion
//!   order, so output programs are deterministic.
//! - `clobbers`, while present, is the set of offsets disturbed since
//!   program start; every other offset still holds the initial 0. It is
//!   forfeited at the first emitted flush and at every loop boundary,
//!   seek, or breakpoint.
//!
//! Emitted I/O keeps program order; the only I/O rewrite is `out` of a
//! cell that already holds a known value into `out_value`.

use bfvm_ir::{Inst, Opcode, Program};
use std::collections::HashSet;

/// Run the pass, producing a fresh program.
pub fn condense(input: &Program) -> Program {
    Condenser::new(input).run()
}

/// One pending operation on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellOp {
    /// The cell already holds this value; flushing emits nothing.
    Known(u8),
    /// A store that still has to be emitted.
    Set(u8),
    /// A wrapping add that still has to be emitted.
    Add(u8),
}

/// Insertion-ordered offset -> CellOp table. Updates keep the original
/// position so flushes replay in first-touch order.
#[derive(Debug, Default)]
struct OpTable {
    entries: Vec<(u32, CellOp)>,
}

impl OpTable {
    fn get(&self, offset: u32) -> Option<CellOp> {
        self.entries
            .iter()
            .find(|(o, _)| *o == offset)
            .map(|(_, op)| *op)
    }

    fn put(&mut self, offset: u32, op: CellOp) {
        if let Some(entry) = self.entries.iter_mut().find(|(o, _)| *o == offset) {
            entry.1 = op;
        } else {
            self.entries.push((offset, op));
        }
    }

    fn remove(&mut self, offset: u32) -> Option<CellOp> {
        let index = self.entries.iter().position(|(o, _)| *o == offset)?;
        Some(self.entries.remove(index).1)
    }

    fn drain(&mut self) -> Vec<(u32, CellOp)> {
        std::mem::take(&mut self.entries)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

struct Condenser<'a> {
    src: &'a Program,
    out: Program,
    pending_move: u32,
    ops: OpTable,
    clobbers: Option<HashSet<u32>>,
    loop_stack: Vec<usize>,
}

impl<'a> Condenser<'a> {
    fn new(src: &'a Program) -> Self {
        Condenser {
            src,
            out: Program::with_capacity(src.len()),
            pending_move: 0,
            ops: OpTable::default(),
            clobbers: Some(HashSet::new()),
            loop_stack: Vec::new(),
        }
    }

    fn run(mut self) -> Program {
        let mut i = 0;
        while i < self.src.len() {
            let inst = self.src.get(i);
            let eff = self.pending_move.wrapping_add(inst.offset);

            match inst.tag {
                Opcode::Halt => {
                    // Pending state has no side effects once execution stops.
                    self.ops.clear();
                    self.pending_move = 0;
                    self.out.push(Inst::bare(Opcode::Halt));
                }
                Opcode::Breakpoint => {
                    self.flush_ops();
                    self.flush_move();
                    self.clobbers = None;
                    self.out.push(Inst::bare(Opcode::Breakpoint));
                }
                Opcode::Set => {
                    if self.known_result(eff) != Some(inst.value) {
                        self.ops.put(eff, CellOp::Set(inst.value));
                    }
                }
                Opcode::Add => {
                    self.apply_add(eff, inst.value);
                }
                Opcode::AddMul => {
                    let src_off = eff.wrapping_add(inst.extra);
                    if let Some(k) = self.known_result(src_off) {
                        self.apply_add(eff, inst.value.wrapping_mul(k));
                    } else {
                        self.flush_at(eff);
                        self.flush_at(src_off);
                        if let Some(set) = self.clobbers.as_mut() {
                            set.insert(eff);
                        }
                        self.out.push(Inst::new(
                            Opcode::AddMul,
                            inst.value,
                            eff,
                            inst.extra,
                        ));
                    }
                }
                Opcode::Move => {
                    self.pending_move = self.pending_move.wrapping_add(inst.extra);
                }
                Opcode::Seek => {
                    if self.known_result(eff) == Some(inst.value) {
                        // The scan exits at the displaced cell; fold the
                        // displacement into the pending move.
                        self.pending_move = eff;
                    } else {
                        self.flush_ops();
                        self.out
                            .push(Inst::new(Opcode::Seek, inst.value, eff, inst.extra));
                        self.pending_move = 0;
                        self.clobbers = None;
                    }
                }
                Opcode::In => {
                    // An unread prior write to the cell is dead; drop it
                    // without flushing.
                    self.ops.remove(eff);
                    if let Some(set) = self.clobbers.as_mut() {
                        set.insert(eff);
                    }
                    self.out.push(Inst::new(Opcode::In, 0, eff, 0));
                }
                Opcode::Out => {
                    if let Some(k) = self.known_cell(eff) {
                        self.out.push(Inst::new(Opcode::OutValue, k, 0, 0));
                    } else {
                        let op = self.ops.remove(eff);
                        if let Some(op) = op {
                            self.flush_entry(eff, op);
                            if let CellOp::Set(v) = op {
                                self.ops.put(eff, CellOp::Known(v));
                            }
                        }
                        self.out.push(Inst::new(Opcode::Out, 0, eff, 0));
                    }
                }
                Opcode::OutValue => {
                    self.out.push(Inst::new(Opcode::OutValue, inst.value, 0, 0));
                }
                Opcode::LoopStart => {
                    if self.known_result(self.pending_move) == Some(0) {
                        // The body can never run; drop the whole loop and
                        // keep all pending state.
                        i = self.src.matching_loop_end(i) + 1;
                        continue;
                    }
                    self.flush_ops();
                    self.flush_move();
                    self.clobbers = None;
                    let index = self.out.push(Inst::bare(Opcode::LoopStart));
                    self.loop_stack.push(index);
                }
                Opcode::LoopEnd => {
                    self.flush_ops();
                    self.flush_move();
                    self.clobbers = None;
                    let start = self
                        .loop_stack
                        .pop()
                        .expect("loop arms are paired in well-formed input");
                    let end = self.out.push(Inst::bare(Opcode::LoopEnd));
                    link_arms(&mut self.out, start, end);
                    // A loop only exits with the head cell at zero.
                    self.ops.put(0, CellOp::Known(0));
                }
            }
            i += 1;
        }
        self.out
    }

    /// Value the cell will hold once pending operations apply.
    fn known_result(&self, offset: u32) -> Option<u8> {
        match self.ops.get(offset) {
            Some(CellOp::Known(v)) | Some(CellOp::Set(v)) => Some(v),
            Some(CellOp::Add(_)) => None,
            None => self.untouched_zero(offset),
        }
    }

    /// Value the cell already holds, with nothing pending to emit.
    fn known_cell(&self, offset: u32) -> Option<u8> {
        match self.ops.get(offset) {
            Some(CellOp::Known(v)) => Some(v),
            Some(_) => None,
            None => self.untouched_zero(offset),
        }
    }

    fn untouched_zero(&self, offset: u32) -> Option<u8> {
        match &self.clobbers {
            Some(set) if !set.contains(&offset) => Some(0),
            _ => None,
        }
    }

    fn apply_add(&mut self, eff: u32, value: u8) {
        if value == 0 {
            return;
        }
        match self.ops.get(eff) {
            Some(CellOp::Known(k)) => self.ops.put(eff, CellOp::Set(k.wrapping_add(value))),
            Some(CellOp::Set(s)) => self.ops.put(eff, CellOp::Set(s.wrapping_add(value))),
            Some(CellOp::Add(a)) => self.ops.put(eff, CellOp::Add(a.wrapping_add(value))),
            None => {
                if self.untouched_zero(eff).is_some() {
                    self.ops.put(eff, CellOp::Set(value));
                } else {
                    self.ops.put(eff, CellOp::Add(value));
                }
            }
        }
    }

    fn flush_entry(&mut self, offset: u32, op: CellOp) {
        match op {
            CellOp::Known(_) | CellOp::Add(0) => {}
            CellOp::Set(v) => {
                self.out.push(Inst::new(Opcode::Set, v, offset, 0));
                self.clobbers = None;
            }
            CellOp::Add(v) => {
                self.out.push(Inst::new(Opcode::Add, v, offset, 0));
                self.clobbers = None;
            }
        }
    }

    fn flush_at(&mut self, offset: u32) {
        if let Some(op) = self.ops.remove(offset) {
            self.flush_entry(offset, op);
        }
    }

    fn flush_ops(&mut self) {
        for (offset, op) in self.ops.drain() {
            self.flush_entry(offset, op);
        }
    }

    fn flush_move(&mut self) {
        if self.pending_move != 0 {
            self.out
                .push(Inst::new(Opcode::Move, 0, 0, self.pending_move));
            self.pending_move = 0;
        }
    }
}

/// Patch a matched pair of loop arms: forward distance in the start,
/// its negation in the end.
pub(crate) fn link_arms(program: &mut Program, start: usize, end: usize) {
    let distance = (end - start) as u32;
    program.set_extra(start, distance);
    program.set_extra(end, distance.wrapping_neg());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfvm_parser::{parse_brainfuck, parse_text};
    use pretty_assertions::assert_eq;

    fn tags(p: &Program) -> Vec<Opcode> {
        p.tags.clone()
    }

    #[test]
    fn test_halt_discards_pending_state() {
        let p = parse_brainfuck(b"+++>>").unwrap();
        let c = condense(&p);
        assert_eq!(tags(&c), vec![Opcode::Halt]);
    }

    #[test]
    fn test_adds_at_start_become_sets() {
        let p = parse_text("add 3\nout\nhalt").unwrap();
        let c = condense(&p);
        // add-to-zero is a store; the store flushes ahead of the out.
        assert_eq!(c.get(0), Inst::new(Opcode::Set, 3, 0, 0));
        assert_eq!(c.get(1).tag, Opcode::Out);
        assert_eq!(c.get(2).tag, Opcode::Halt);
    }

    #[test]
    fn test_set_add_folding() {
        let p = parse_text("set 5\nadd 3\nout\nhalt").unwrap();
        let c = condense(&p);
        assert_eq!(c.get(0), Inst::new(Opcode::Set, 8, 0, 0));
        assert_eq!(c.get(1).tag, Opcode::Out);
    }

    #[test]
    fn test_untouched_cell_prints_constant_zero() {
        let p = parse_brainfuck(b".").unwrap();
        let c = condense(&p);
        assert_eq!(c.get(0), Inst::new(Opcode::OutValue, 0, 0, 0));
        assert_eq!(c.get(1).tag, Opcode::Halt);
    }

    #[test]
    fn test_known_value_after_out_elides_reflush() {
        // The first out flushes the store and pins the value; the second
        // out sees a cell that already holds it.
        let p = parse_text("set 7\nout\nout\nhalt").unwrap();
        let c = condense(&p);
        assert_eq!(
            tags(&c),
            vec![Opcode::Set, Opcode::Out, Opcode::OutValue, Opcode::Halt]
        );
        assert_eq!(c.get(2).value, 7);
    }

    #[test]
    fn test_moves_fold_into_offsets() {
        let p = parse_brainfuck(b">+>+").unwrap();
        let c = condense(&p);
        // Both adds land at their effective offsets; the trailing move
        // dies with the halt.
        assert_eq!(tags(&c), vec![Opcode::Halt]);

        let p = parse_brainfuck(b">+>+<.").unwrap();
        let c = condense(&p);
        assert_eq!(c.get(0), Inst::new(Opcode::Set, 1, 1, 0));
        assert_eq!(c.get(1).tag, Opcode::Out);
        assert_eq!(c.get(1).offset, 1);
    }

    #[test]
    fn test_dead_loop_at_start_dropped() {
        let p = parse_brainfuck(b"[.><]").unwrap();
        let c = condense(&p);
        assert_eq!(tags(&c), vec![Opcode::Halt]);
    }

    #[test]
    fn test_loop_after_zeroing_dropped() {
        // After a loop exits the head cell is known zero, so an
        // immediately following loop is dead.
        let p = parse_brainfuck(b",[-][+].").unwrap();
        let c = condense(&p);
        assert_eq!(
            tags(&c),
            vec![
                Opcode::In,
                Opcode::LoopStart,
                Opcode::Add,
                Opcode::LoopEnd,
                Opcode::OutValue,
                Opcode::Halt
            ]
        );
        assert_eq!(c.get(4).value, 0);
    }

    #[test]
    fn test_loop_arms_relinked() {
        let p = parse_brainfuck(b",[->+<]").unwrap();
        let c = condense(&p);
        let start = c.tags.iter().position(|&t| t == Opcode::LoopStart).unwrap();
        let end = c.tags.iter().position(|&t| t == Opcode::LoopEnd).unwrap();
        assert_eq!(c.get(start).extra, (end - start) as u32);
        assert_eq!(c.get(end).extra, ((end - start) as u32).wrapping_neg());
    }

    #[test]
    fn test_in_clobbers_dead_store() {
        let p = parse_text("set 9\nin\nout\nhalt").unwrap();
        let c = condense(&p);
        assert_eq!(tags(&c), vec![Opcode::In, Opcode::Out, Opcode::Halt]);
    }

    #[test]
    fn test_in_forfeits_zero_knowledge_for_that_cell() {
        let p = parse_text("in\nout\nhalt").unwrap();
        let c = condense(&p);
        // The read cell is no longer zero; the out must stay dynamic.
        assert_eq!(tags(&c), vec![Opcode::In, Opcode::Out, Opcode::Halt]);
    }

    #[test]
    fn test_other_cells_stay_zero_after_in() {
        let p = parse_text("in\nout @ 1\nhalt").unwrap();
        let c = condense(&p);
        assert_eq!(
            tags(&c),
            vec![Opcode::In, Opcode::OutValue, Opcode::Halt]
        );
        assert_eq!(c.get(1).value, 0);
    }

    #[test]
    fn test_add_mul_constant_folds_through_known_source() {
        let p = parse_text("set 8\nadd_mul 8, -1 @ 1\nout @ 1\nhalt").unwrap();
        let c = condense(&p);
        // 8 * 8 lands in the destination as a store; the source store is
        // never read again and dies with the halt.
        assert_eq!(c.get(0), Inst::new(Opcode::Set, 64, 1, 0));
        assert_eq!(c.get(1).tag, Opcode::Out);
        assert_eq!(tags(&c), vec![Opcode::Set, Opcode::Out, Opcode::Halt]);
    }

    #[test]
    fn test_add_mul_unknown_source_flushes_and_emits() {
        let p = parse_text("in\nadd 1 @ 1\nadd_mul 2, -1 @ 1\nout @ 1\nhalt").unwrap();
        let c = condense(&p);
        // The pending store at the destination flushes first (the add to
        // a pristine cell became a store); the source is the read cell.
        assert_eq!(
            tags(&c),
            vec![
                Opcode::In,
                Opcode::Set,
                Opcode::AddMul,
                Opcode::Out,
                Opcode::Halt
            ]
        );
        assert_eq!(c.get(1), Inst::new(Opcode::Set, 1, 1, 0));
        assert_eq!(c.get(2), Inst::new(Opcode::AddMul, 2, 1, 1u32.wrapping_neg()));
    }

    #[test]
    fn test_seek_on_known_sentinel_folds_to_move() {
        let p = parse_text("in\nmove , 3\nseek 0, -1\nout\nhalt").unwrap();
        let c = condense(&p);
        // Cell 3 still holds zero, so the scan exits immediately at the
        // displaced head; only the out at offset 3 remains.
        assert_eq!(tags(&c), vec![Opcode::In, Opcode::OutValue, Opcode::Halt]);
        assert_eq!(c.get(1).value, 0);
    }

    #[test]
    fn test_seek_emitted_when_sentinel_unknown() {
        let p = parse_text("in\nseek 0, 1\nout\nhalt").unwrap();
        let c = condense(&p);
        assert_eq!(
            tags(&c),
            vec![Opcode::In, Opcode::Seek, Opcode::Out, Opcode::Halt]
        );
        assert_eq!(c.get(1), Inst::new(Opcode::Seek, 0, 0, 1));
        // After a seek the head is dynamic; the out offset is plain.
        assert_eq!(c.get(2).offset, 0);
    }

    #[test]
    fn test_seek_carries_pending_displacement() {
        // Sentinel 1 cannot match the pristine cell, so the seek is
        // emitted and absorbs the pending move into its offset.
        let p = parse_text("in\nmove , 2\nseek 1, 1\nhalt").unwrap();
        let c = condense(&p);
        let seek = c.iter().find(|i| i.tag == Opcode::Seek).unwrap();
        assert_eq!(seek.value, 1);
        assert_eq!(seek.offset, 2);
        assert_eq!(seek.extra, 1);
    }

    #[test]
    fn test_breakpoint_flushes_everything() {
        let p = parse_brainfuck(b"++>#").unwrap();
        let c = condense(&p);
        assert_eq!(
            tags(&c),
            vec![Opcode::Set, Opcode::Move, Opcode::Breakpoint, Opcode::Halt]
        );
        assert_eq!(c.get(0).value, 2);
        assert_eq!(c.get(1).extra, 1);
    }

    #[test]
    fn test_flush_order_is_first_touch_order() {
        let source = "in\nloop_start\nadd 2 @ 5\nadd 3 @ 1\nadd 1 @ 5\nloop_end\nhalt";
        let c = condense(&parse_text(source).unwrap());
        assert_eq!(
            tags(&c),
            vec![
                Opcode::In,
                Opcode::LoopStart,
                Opcode::Add,
                Opcode::Add,
                Opcode::LoopEnd,
                Opcode::Halt
            ]
        );
        // Offset 5 was touched first and flushes first, with both of its
        // adds folded.
        assert_eq!(c.get(2), Inst::new(Opcode::Add, 3, 5, 0));
        assert_eq!(c.get(3), Inst::new(Opcode::Add, 3, 1, 0));
    }

    #[test]
    fn test_loop_body_condensed() {
        let p = parse_brainfuck(b",[->+<]").unwrap();
        let c = condense(&p);
        assert_eq!(
            tags(&c),
            vec![
                Opcode::In,
                Opcode::LoopStart,
                Opcode::Add,
                Opcode::Add,
                Opcode::LoopEnd,
                Opcode::Halt
            ]
        );
        // Net adds at offsets 0 and 1, in first-touch order.
        assert_eq!(c.get(2), Inst::new(Opcode::Add, 255, 0, 0));
        assert_eq!(c.get(3), Inst::new(Opcode::Add, 1, 1, 0));
    }

    #[test]
    fn test_idempotent_on_own_output() {
        for source in [
            &b",[->+<]>."[..],
            &b"++++[>++++<-]>."[..],
            &b",>,<[->+<]>."[..],
        ] {
            let once = condense(&parse_brainfuck(source).unwrap());
            let twice = condense(&once);
            assert_eq!(once, twice);
        }
    }
}
