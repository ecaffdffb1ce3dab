//! Columnar program storage
//!
//! Instructions are stored as four parallel vectors (tag, value, offset,
//! extra) rather than one vector of records. Optimization passes that
//! touch only one or two fields stay within one or two cache streams.
//! The contract is field-level: `Inst` is the record-shaped view used at
//! API boundaries.

use crate::opcode::Opcode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record-shaped view of a single instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inst {
    pub tag: Opcode,
    pub value: u8,
    pub offset: u32,
    pub extra: u32,
}

impl Inst {
    pub const fn new(tag: Opcode, value: u8, offset: u32, extra: u32) -> Self {
        Inst {
            tag,
            value,
            offset,
            extra,
        }
    }

    /// An instruction with every argument field zeroed.
    pub const fn bare(tag: Opcode) -> Self {
        Inst::new(tag, 0, 0, 0)
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} value={} offset={} extra={}",
            self.tag, self.value, self.offset, self.extra
        )
    }
}

/// A complete program: columns of instruction fields, ending in `halt`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub tags: Vec<Opcode>,
    pub values: Vec<u8>,
    pub offsets: Vec<u32>,
    pub extras: Vec<u32>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Program {
            tags: Vec::with_capacity(cap),
            values: Vec::with_capacity(cap),
            offsets: Vec::with_capacity(cap),
            extras: Vec::with_capacity(cap),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Append one instruction; returns its index.
    pub fn push(&mut self, inst: Inst) -> usize {
        let index = self.tags.len();
        self.tags.push(inst.tag);
        self.values.push(inst.value);
        self.offsets.push(inst.offset);
        self.extras.push(inst.extra);
        index
    }

    #[inline]
    pub fn get(&self, index: usize) -> Inst {
        Inst {
            tag: self.tags[index],
            value: self.values[index],
            offset: self.offsets[index],
            extra: self.extras[index],
        }
    }

    /// Patch the `extra` field in place (loop-arm linking).
    #[inline]
    pub fn set_extra(&mut self, index: usize, extra: u32) {
        self.extras[index] = extra;
    }

    pub fn iter(&self) -> impl Iterator<Item = Inst> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// SHA-256 over the four fields of every instruction, in order,
    /// little-endian. Two programs with equal field sequences hash
    /// equal; any differing field changes the digest.
    pub fn hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();

        for i in 0..self.len() {
            hasher.update([self.tags[i].to_u8()]);
            hasher.update([self.values[i]]);
            hasher.update(self.offsets[i].to_le_bytes());
            hasher.update(self.extras[i].to_le_bytes());
        }

        hasher.finalize().into()
    }

    /// Index of the `loop_end` matching the `loop_start` at `start`,
    /// by nesting count. Callers guarantee well-formed pairing.
    pub fn matching_loop_end(&self, start: usize) -> usize {
        debug_assert_eq!(self.tags[start], Opcode::LoopStart);
        let mut depth = 0usize;
        for i in start..self.len() {
            match self.tags[i] {
                Opcode::LoopStart => depth += 1,
                Opcode::LoopEnd => {
                    depth -= 1;
                    if depth == 0 {
                        return i;
                    }
                }
                _ => {}
            }
        }
        unreachable!("unpaired loop_start at {}", start)
    }
}
