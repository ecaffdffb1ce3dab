//! Opcode definitions
//!
//! Each instruction is a fixed record of four fields: a tag from this
//! enum, an immediate byte `value`, a tape displacement `offset`, and a
//! secondary displacement `extra`. Which fields an opcode consumes is
//! captured by the predicate methods below; unused fields are
//! unspecified and must not be read back.

use crate::error::IrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Instruction tag.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// Terminate successfully.
    Halt = 0x00,
    /// Yield control to the host; the host advances past it.
    Breakpoint = 0x01,
    /// `tape[mp + offset] = value`
    Set = 0x02,
    /// `tape[mp + offset] += value` (wrapping)
    Add = 0x03,
    /// `tape[mp + offset] += value * tape[mp + offset + extra]` (wrapping)
    AddMul = 0x04,
    /// `mp += extra` (wrapping)
    Move = 0x05,
    /// `mp += offset`; then while `tape[mp] != value`: `mp += extra`
    Seek = 0x06,
    /// Read one byte into `tape[mp + offset]`; EOF handling is host policy.
    In = 0x07,
    /// Emit `tape[mp + offset]`.
    Out = 0x08,
    /// Emit the immediate `value`.
    OutValue = 0x09,
    /// If `tape[mp] == 0`, `pc += extra + 1`; else fall through.
    LoopStart = 0x0A,
    /// If `tape[mp] != 0`, `pc += extra + 1` (extra is the negated
    /// distance back to the matching start); else fall through.
    LoopEnd = 0x0B,
}

impl Opcode {
    /// Try to convert from a raw tag byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Opcode::Halt),
            0x01 => Some(Opcode::Breakpoint),
            0x02 => Some(Opcode::Set),
            0x03 => Some(Opcode::Add),
            0x04 => Some(Opcode::AddMul),
            0x05 => Some(Opcode::Move),
            0x06 => Some(Opcode::Seek),
            0x07 => Some(Opcode::In),
            0x08 => Some(Opcode::Out),
            0x09 => Some(Opcode::OutValue),
            0x0A => Some(Opcode::LoopStart),
            0x0B => Some(Opcode::LoopEnd),
            _ => None,
        }
    }

    /// Convert to the raw tag byte.
    #[inline]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Does this opcode consume the `value` field?
    #[inline]
    pub const fn uses_value(self) -> bool {
        matches!(
            self,
            Opcode::Set | Opcode::Add | Opcode::AddMul | Opcode::Seek | Opcode::OutValue
        )
    }

    /// Does this opcode consume the `offset` field?
    #[inline]
    pub const fn uses_offset(self) -> bool {
        matches!(
            self,
            Opcode::Set
                | Opcode::Add
                | Opcode::AddMul
                | Opcode::Seek
                | Opcode::In
                | Opcode::Out
        )
    }

    /// Does this opcode consume the `extra` field as a real argument?
    ///
    /// Loop arms also store a distance in `extra`, but that one is
    /// recomputable from the program layout and is excluded here.
    #[inline]
    pub const fn uses_extra(self) -> bool {
        matches!(self, Opcode::AddMul | Opcode::Move | Opcode::Seek)
    }

    /// Is this a loop arm (`loop_start` or `loop_end`)?
    #[inline]
    pub const fn is_loop(self) -> bool {
        matches!(self, Opcode::LoopStart | Opcode::LoopEnd)
    }

    /// Does this opcode perform observable I/O?
    #[inline]
    pub const fn is_io(self) -> bool {
        matches!(self, Opcode::In | Opcode::Out | Opcode::OutValue)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Halt => "halt",
            Opcode::Breakpoint => "breakpoint",
            Opcode::Set => "set",
            Opcode::Add => "add",
            Opcode::AddMul => "add_mul",
            Opcode::Move => "move",
            Opcode::Seek => "seek",
            Opcode::In => "in",
            Opcode::Out => "out",
            Opcode::OutValue => "out_value",
            Opcode::LoopStart => "loop_start",
            Opcode::LoopEnd => "loop_end",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Opcode {
    type Err = IrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halt" => Ok(Opcode::Halt),
            "breakpoint" => Ok(Opcode::Breakpoint),
            "set" => Ok(Opcode::Set),
            "add" => Ok(Opcode::Add),
            "add_mul" => Ok(Opcode::AddMul),
            "move" => Ok(Opcode::Move),
            "seek" => Ok(Opcode::Seek),
            "in" => Ok(Opcode::In),
            "out" => Ok(Opcode::Out),
            "out_value" => Ok(Opcode::OutValue),
            "loop_start" => Ok(Opcode::LoopStart),
            "loop_end" => Ok(Opcode::LoopEnd),
            _ => Err(IrError::UnknownOpcode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values() {
        assert_eq!(Opcode::Halt.to_u8(), 0x00);
        assert_eq!(Opcode::Set.to_u8(), 0x02);
        assert_eq!(Opcode::Seek.to_u8(), 0x06);
        assert_eq!(Opcode::LoopEnd.to_u8(), 0x0B);
    }

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::from_u8(0x00), Some(Opcode::Halt));
        assert_eq!(Opcode::from_u8(0x04), Some(Opcode::AddMul));
        assert_eq!(Opcode::from_u8(0x0C), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_round_trip_all_tags() {
        for raw in 0x00..=0x0B {
            let op = Opcode::from_u8(raw).unwrap();
            assert_eq!(op.to_u8(), raw);
        }
    }

    #[test]
    fn test_display_from_str_round_trip() {
        for raw in 0x00..=0x0B {
            let op = Opcode::from_u8(raw).unwrap();
            assert_eq!(op.to_string().parse::<Opcode>().unwrap(), op);
        }
    }

    #[test]
    fn test_from_str_unknown() {
        assert!("nop".parse::<Opcode>().is_err());
        assert!("SET".parse::<Opcode>().is_err());
        assert!("".parse::<Opcode>().is_err());
    }

    #[test]
    fn test_field_usage() {
        assert!(Opcode::Set.uses_value());
        assert!(Opcode::Set.uses_offset());
        assert!(!Opcode::Set.uses_extra());

        assert!(Opcode::Move.uses_extra());
        assert!(!Opcode::Move.uses_value());
        assert!(!Opcode::Move.uses_offset());

        assert!(Opcode::Seek.uses_value());
        assert!(Opcode::Seek.uses_offset());
        assert!(Opcode::Seek.uses_extra());

        assert!(!Opcode::LoopStart.uses_extra());
        assert!(Opcode::LoopStart.is_loop());
        assert!(Opcode::OutValue.is_io());
    }
}
