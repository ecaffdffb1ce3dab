//! Bytecode-text frontend
//!
//! Reads the line-oriented syntax produced by `bfvm-dump`:
//!
//! ```text
//! <name> [value] [, extra] [@ offset]   # comment
//! ```
//!
//! Blank and comment-only lines are skipped. Loop-arm distances are
//! never read from the source; they are relinked with the same bracket
//! stack the Brainfuck frontend uses, so a dump annotated with distance
//! comments round-trips exactly.

use crate::brainfuck::link_loop;
use crate::error::{ParseError, Result};
use bfvm_ir::{Inst, Opcode, Program};

/// Parse bytecode text into a program. A trailing `halt` is appended if
/// the source does not end with one.
pub fn parse_text(source: &str) -> Result<Program> {
    let mut program = Program::new();
    // Emitted loop_start indices with their line numbers.
    let mut loop_stack: Vec<(usize, usize)> = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let code = raw.split('#').next().unwrap_or("").trim();
        if code.is_empty() {
            continue;
        }
        parse_line(code, line, &mut program, &mut loop_stack)?;
    }

    if let Some(&(_, line)) = loop_stack.last() {
        return Err(ParseError::UnclosedLoopStart { line });
    }
    if program.tags.last() != Some(&Opcode::Halt) {
        program.push(Inst::bare(Opcode::Halt));
    }
    Ok(program)
}

fn parse_line(
    code: &str,
    line: usize,
    program: &mut Program,
    loop_stack: &mut Vec<(usize, usize)>,
) -> Result<()> {
    let name_end = code
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(code.len());
    let name = &code[..name_end];
    let tag: Opcode = name.parse().map_err(|_| ParseError::UnknownInstruction {
        line,
        name: name.to_string(),
    })?;

    let mut rest = code[name_end..].trim_start();
    let mut value = None;
    let mut extra = None;
    let mut offset = None;

    if !rest.is_empty() && !rest.starts_with(',') && !rest.starts_with('@') {
        let (v, tail) = take_int(rest, line)?;
        value = Some(v);
        rest = tail.trim_start();
    }
    if let Some(tail) = rest.strip_prefix(',') {
        let (v, tail) = take_int(tail.trim_start(), line)?;
        extra = Some(v);
        rest = tail.trim_start();
    }
    if let Some(tail) = rest.strip_prefix('@') {
        let (v, tail) = take_int(tail.trim_start(), line)?;
        offset = Some(v);
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        return Err(ParseError::BadOperands {
            line,
            message: format!("trailing input '{}'", rest),
        });
    }

    let inst = build_inst(tag, value, extra, offset, line)?;
    let index = program.push(inst);

    match tag {
        Opcode::LoopStart => loop_stack.push((index, line)),
        Opcode::LoopEnd => {
            let (start, _) = loop_stack
                .pop()
                .ok_or(ParseError::UnmatchedLoopEnd { line })?;
            link_loop(program, start, index);
        }
        _ => {}
    }
    Ok(())
}

fn build_inst(
    tag: Opcode,
    value: Option<i64>,
    extra: Option<i64>,
    offset: Option<i64>,
    line: usize,
) -> Result<Inst> {
    let value = match (tag.uses_value(), value) {
        (true, Some(v)) => to_u8(v, line)?,
        (true, None) => {
            return Err(ParseError::BadOperands {
                line,
                message: format!("'{}' requires a value", tag),
            })
        }
        (false, Some(_)) => {
            return Err(ParseError::BadOperands {
                line,
                message: format!("'{}' takes no value", tag),
            })
        }
        (false, None) => 0,
    };

    // Loop arms ignore any extra in the source; it is relinked.
    let extra = if tag.is_loop() {
        0
    } else {
        match (tag.uses_extra(), extra) {
            (true, Some(v)) => to_u32(v, line)?,
            (true, None) => {
                return Err(ParseError::BadOperands {
                    line,
                    message: format!("'{}' requires an extra argument", tag),
                })
            }
            (false, Some(_)) => {
                return Err(ParseError::BadOperands {
                    line,
                    message: format!("'{}' takes no extra argument", tag),
                })
            }
            (false, None) => 0,
        }
    };

    let offset = match (tag.uses_offset(), offset) {
        (true, Some(v)) => to_u32(v, line)?,
        (true, None) => 0,
        (false, Some(_)) => {
            return Err(ParseError::BadOperands {
                line,
                message: format!("'{}' takes no offset", tag),
            })
        }
        (false, None) => 0,
    };

    Ok(Inst::new(tag, value, offset, extra))
}

/// Consume one integer token (decimal, optionally negative, or `0x`
/// hex) from the front of `text`.
fn take_int(text: &str, line: usize) -> Result<(i64, &str)> {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(text.len());
    let token = &text[..end];
    let malformed = || ParseError::MalformedInteger {
        line,
        text: token.to_string(),
    };

    if token.is_empty() {
        return Err(malformed());
    }
    let parsed = if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).map_err(|_| malformed())?
    } else {
        token.parse::<i64>().map_err(|_| malformed())?
    };
    Ok((parsed, &text[end..]))
}

fn to_u8(v: i64, line: usize) -> Result<u8> {
    if !(-255..=255).contains(&v) {
        return Err(ParseError::MalformedInteger {
            line,
            text: v.to_string(),
        });
    }
    Ok(v.rem_euclid(256) as u8)
}

fn to_u32(v: i64, line: usize) -> Result<u32> {
    if v > u32::MAX as i64 || v < i32::MIN as i64 {
        return Err(ParseError::MalformedInteger {
            line,
            text: v.to_string(),
        });
    }
    Ok(v as u32)
}
