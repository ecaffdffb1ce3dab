//! Bytecode interpreter
//!
//! Straight dispatch over the instruction columns, generic over the
//! input reader, output writer, and tape backend. The back-edge test at
//! `loop_end` doubles as the loop condition: jumping back lands just
//! after the `loop_start`, so the head cell is only re-checked on first
//! entry.

use crate::error::{Result, RuntimeError};
use crate::tape::Tape;
use bfvm_ir::{Opcode, Program};
use std::io::{Read, Write};

/// What to store when input runs dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofPolicy {
    /// Leave the target cell as it was.
    Unchanged,
    /// Store a fixed byte.
    Substitute(u8),
}

impl Default for EofPolicy {
    fn default() -> Self {
        EofPolicy::Substitute(0)
    }
}

/// Interpreter configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineConfig {
    pub eof: EofPolicy,
    /// Abort with [`RuntimeError::CycleLimit`] past this many steps.
    pub max_cycles: Option<u64>,
}

/// Why `step` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Breakpoint,
    Halted,
}

/// An executing program.
pub struct Machine<R, W, T> {
    program: Program,
    pc: u32,
    cycles: u64,
    tape: T,
    reader: R,
    writer: W,
    config: MachineConfig,
}

impl<R: Read, W: Write, T: Tape> Machine<R, W, T> {
    pub fn new(program: Program, reader: R, writer: W, tape: T, config: MachineConfig) -> Self {
        Machine {
            program,
            pc: 0,
            cycles: 0,
            tape,
            reader,
            writer,
            config,
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn tape(&self) -> &T {
        &self.tape
    }

    /// Advance past a breakpoint so `run` can continue.
    pub fn resume(&mut self) {
        self.pc = self.pc.wrapping_add(1);
    }

    /// Execute one instruction.
    pub fn step(&mut self) -> Result<Status> {
        if let Some(limit) = self.config.max_cycles {
            if self.cycles >= limit {
                return Err(RuntimeError::CycleLimit(limit));
            }
        }
        self.cycles += 1;

        let index = self.pc as usize;
        let tag = self.program.tags[index];
        match tag {
            Opcode::Halt => return Ok(Status::Halted),
            Opcode::Breakpoint => return Ok(Status::Breakpoint),
            Opcode::Set => {
                self.tape
                    .set(self.program.offsets[index], self.program.values[index]);
            }
            Opcode::Add => {
                self.tape
                    .add(self.program.offsets[index], self.program.values[index]);
            }
            Opcode::AddMul => {
                let offset = self.program.offsets[index];
                let source = offset.wrapping_add(self.program.extras[index]);
                let factor = self.program.values[index].wrapping_mul(self.tape.get(source));
                self.tape.add(offset, factor);
            }
            Opcode::Move => {
                self.tape.move_head(self.program.extras[index]);
            }
            Opcode::Seek => {
                self.tape.seek(
                    self.program.offsets[index],
                    self.program.values[index],
                    self.program.extras[index],
                );
            }
            Opcode::In => {
                let offset = self.program.offsets[index];
                let mut buf = [0u8; 1];
                let n = self.reader.read(&mut buf)?;
                if n == 1 {
                    self.tape.set(offset, buf[0]);
                } else if let EofPolicy::Substitute(byte) = self.config.eof {
                    self.tape.set(offset, byte);
                }
            }
            Opcode::Out => {
                let byte = self.tape.get(self.program.offsets[index]);
                self.writer.write_all(&[byte])?;
            }
            Opcode::OutValue => {
                self.writer.write_all(&[self.program.values[index]])?;
            }
            Opcode::LoopStart => {
                if self.tape.get(0) == 0 {
                    self.pc = self
                        .pc
                        .wrapping_add(self.program.extras[index])
                        .wrapping_add(1);
                    return Ok(Status::Running);
                }
            }
            Opcode::LoopEnd => {
                if self.tape.get(0) != 0 {
                    // extra is the negated distance: this lands just
                    // after the matching loop_start.
                    self.pc = self
                        .pc
                        .wrapping_add(self.program.extras[index])
                        .wrapping_add(1);
                    return Ok(Status::Running);
                }
            }
        }
        self.pc = self.pc.wrapping_add(1);
        Ok(Status::Running)
    }

    /// Run until the program halts or yields at a breakpoint.
    pub fn run(&mut self) -> Result<Status> {
        loop {
            match self.step()? {
                Status::Running => {}
                status => return Ok(status),
            }
        }
    }

    /// Run to completion, stepping over breakpoints.
    pub fn run_to_halt(&mut self) -> Result<()> {
        loop {
            match self.run()? {
                Status::Breakpoint => self.resume(),
                _ => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tape::PagedTape;
    use bfvm_parser::parse_brainfuck;
    use pretty_assertions::assert_eq;

    fn interpret(source: &[u8], input: &[u8]) -> Vec<u8> {
        let program = parse_brainfuck(source).unwrap();
        let mut output = Vec::new();
        let mut machine = Machine::new(
            program,
            input,
            &mut output,
            PagedTape::new(),
            MachineConfig::default(),
        );
        machine.run_to_halt().unwrap();
        drop(machine);
        output
    }

    #[test]
    fn test_echo() {
        assert_eq!(interpret(b",.", b"A"), b"A");
    }

    #[test]
    fn test_constant_letter() {
        assert_eq!(interpret(b"++++++++[>++++++++<-]>+.", b""), b"A");
    }

    #[test]
    fn test_addition_via_loop() {
        assert_eq!(interpret(b",>,<[->+<]>.", b"\x03\x04"), b"\x07");
    }

    #[test]
    fn test_cell_zeroed() {
        assert_eq!(interpret(b"+++[>+++<-]>[-].", b""), b"\x00");
    }

    #[test]
    fn test_wrapping_cell_arithmetic() {
        // 255 + 2 wraps to 1
        let mut source = vec![b'-'; 1];
        source.extend_from_slice(b"++.");
        assert_eq!(interpret(&source, b""), b"\x01");
    }

    #[test]
    fn test_eof_substitute_zero() {
        assert_eq!(interpret(b"+++,.", b""), b"\x00");
    }

    #[test]
    fn test_eof_unchanged_policy() {
        let program = parse_brainfuck(b"+++,.").unwrap();
        let mut output = Vec::new();
        let config = MachineConfig {
            eof: EofPolicy::Unchanged,
            max_cycles: None,
        };
        let mut machine = Machine::new(
            program,
            &b""[..],
            &mut output,
            PagedTape::new(),
            config,
        );
        machine.run_to_halt().unwrap();
        drop(machine);
        assert_eq!(output, b"\x03");
    }

    #[test]
    fn test_eof_substitute_byte() {
        let program = parse_brainfuck(b",.").unwrap();
        let mut output = Vec::new();
        let config = MachineConfig {
            eof: EofPolicy::Substitute(b'X'),
            max_cycles: None,
        };
        let mut machine = Machine::new(
            program,
            &b""[..],
            &mut output,
            PagedTape::new(),
            config,
        );
        machine.run_to_halt().unwrap();
        drop(machine);
        assert_eq!(output, b"X");
    }

    #[test]
    fn test_breakpoint_yields_then_resumes() {
        let program = parse_brainfuck(b"+#+.").unwrap();
        let mut output = Vec::new();
        let mut machine = Machine::new(
            program,
            &b""[..],
            &mut output,
            PagedTape::new(),
            MachineConfig::default(),
        );
        assert_eq!(machine.run().unwrap(), Status::Breakpoint);
        machine.resume();
        assert_eq!(machine.run().unwrap(), Status::Halted);
        drop(machine);
        assert_eq!(output, b"\x02");
    }

    #[test]
    fn test_seek_loop_head_position() {
        let program = parse_brainfuck(b"+>+>+>[<]").unwrap();
        let mut machine = Machine::new(
            program,
            &b""[..],
            Vec::new(),
            PagedTape::new(),
            MachineConfig::default(),
        );
        machine.run_to_halt().unwrap();
        // Cells 0..=2 hold 1, head started the scan at 3; tape[3] is 0,
        // so the scan exits where it began.
        assert_eq!(machine.tape().head(), 3);
    }

    #[test]
    fn test_cycle_limit() {
        let program = parse_brainfuck(b"+[]").unwrap();
        let config = MachineConfig {
            eof: EofPolicy::default(),
            max_cycles: Some(10_000),
        };
        let mut machine = Machine::new(
            program,
            &b""[..],
            Vec::new(),
            PagedTape::new(),
            config,
        );
        assert!(matches!(
            machine.run(),
            Err(RuntimeError::CycleLimit(10_000))
        ));
    }

    #[test]
    fn test_writer_error_aborts() {
        struct FailingWriter;
        impl Write for FailingWriter {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "down"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let program = parse_brainfuck(b"+.").unwrap();
        let mut machine = Machine::new(
            program,
            &b""[..],
            FailingWriter,
            PagedTape::new(),
            MachineConfig::default(),
        );
        assert!(matches!(machine.run(), Err(RuntimeError::Io(_))));
    }

    #[test]
    fn test_nested_loops() {
        // 3 * 2 = 6 via nested counting
        assert_eq!(interpret(b"+++[>++[>+<-]<-]>>.", b""), b"\x06");
    }

    #[test]
    fn test_hello_world() {
        let source = b"++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]\
                       >>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
        assert_eq!(interpret(source, b""), b"Hello World!\n");
    }
}
