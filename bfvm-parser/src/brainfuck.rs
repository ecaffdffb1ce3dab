//! Brainfuck source frontend
//!
//! Only the eight canonical characters plus `#` (breakpoint) are
//! significant; every other byte is commentary. Runs of `+`/`-` and of
//! `<`/`>` are fused on the fly into single `add` / `move` instructions,
//! independently of the optimizer: the parser keeps at most one pending
//! operation and flushes it whenever a different significant character
//! arrives.

use crate::error::{ParseError, Result};
use bfvm_ir::{Inst, Opcode, Program};

/// Frontend configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserConfig {
    /// Treat the first `!` as a separator between program text and a
    /// static input stream trailing it.
    pub split_input: bool,
}

impl ParserConfig {
    /// Parse `source`; the second element is the static input after the
    /// first `!`, present only when `split_input` is set and a `!` was
    /// found.
    pub fn parse(&self, source: &[u8]) -> Result<(Program, Option<Vec<u8>>)> {
        let mut parser = SourceParser::new(source.len());
        let mut static_input = None;

        for (position, &byte) in source.iter().enumerate() {
            if self.split_input && byte == b'!' {
                static_input = Some(source[position + 1..].to_vec());
                break;
            }
            parser.feed(byte, position)?;
        }

        Ok((parser.finish()?, static_input))
    }
}

/// Parse Brainfuck source into bytecode.
pub fn parse_brainfuck(source: &[u8]) -> Result<Program> {
    let (program, _) = ParserConfig::default().parse(source)?;
    Ok(program)
}

/// Parse Brainfuck source with `!`-splitting enabled; the returned input
/// is empty when the source contains no `!`.
pub fn parse_brainfuck_split(source: &[u8]) -> Result<(Program, Vec<u8>)> {
    let config = ParserConfig { split_input: true };
    let (program, input) = config.parse(source)?;
    Ok((program, input.unwrap_or_default()))
}

/// The single pending fused operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Add(u8),
    Move(u32),
}

struct SourceParser {
    program: Program,
    pending: Pending,
    /// Emitted `loop_start` indices with their source byte positions.
    loop_stack: Vec<(usize, usize)>,
}

impl SourceParser {
    fn new(source_len: usize) -> Self {
        SourceParser {
            program: Program::with_capacity(source_len + 1),
            pending: Pending::None,
            loop_stack: Vec::new(),
        }
    }

    fn feed(&mut self, byte: u8, position: usize) -> Result<()> {
        match byte {
            b'+' => self.bump_add(1),
            b'-' => self.bump_add(0xFF),
            b'>' => self.bump_move(1),
            b'<' => self.bump_move(u32::MAX),
            b',' => {
                self.flush();
                self.program.push(Inst::bare(Opcode::In));
            }
            b'.' => {
                self.flush();
                self.program.push(Inst::bare(Opcode::Out));
            }
            b'#' => {
                self.flush();
                self.program.push(Inst::bare(Opcode::Breakpoint));
            }
            b'[' => {
                self.flush();
                let index = self.program.push(Inst::bare(Opcode::LoopStart));
                self.loop_stack.push((index, position));
            }
            b']' => {
                self.flush();
                let (start, _) = self
                    .loop_stack
                    .pop()
                    .ok_or(ParseError::UnexpectedLoopEnd { position })?;
                let end = self.program.push(Inst::bare(Opcode::LoopEnd));
                link_loop(&mut self.program, start, end);
            }
            _ => {}
        }
        Ok(())
    }

    fn bump_add(&mut self, delta: u8) {
        self.pending = match self.pending {
            Pending::Add(v) => Pending::Add(v.wrapping_add(delta)),
            Pending::None => Pending::Add(delta),
            Pending::Move(_) => {
                self.flush();
                Pending::Add(delta)
            }
        };
    }

    fn bump_move(&mut self, delta: u32) {
        self.pending = match self.pending {
            Pending::Move(d) => Pending::Move(d.wrapping_add(delta)),
            Pending::None => Pending::Move(delta),
            Pending::Add(_) => {
                self.flush();
                Pending::Move(delta)
            }
        };
    }

    fn flush(&mut self) {
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::None | Pending::Add(0) | Pending::Move(0) => {}
            Pending::Add(v) => {
                self.program.push(Inst::new(Opcode::Add, v, 0, 0));
            }
            Pending::Move(d) => {
                self.program.push(Inst::new(Opcode::Move, 0, 0, d));
            }
        }
    }

    fn finish(mut self) -> Result<Program> {
        self.flush();
        if let Some(&(_, position)) = self.loop_stack.last() {
            return Err(ParseError::UnclosedLoop { position });
        }
        self.program.push(Inst::bare(Opcode::Halt));
        Ok(self.program)
    }
}

/// Patch both arms of a loop: forward distance in the start, its
/// negation in the end, so `pc += extra + 1` works for both.
pub(crate) fn link_loop(program: &mut Program, start: usize, end: usize) {
    let distance = (end - start) as u32;
    program.set_extra(start, distance);
    program.set_extra(end, distance.wrapping_neg());
}
