//! Tape memory
//!
//! A logical array of 2^32 zero-initialized bytes with a persistent
//! 32-bit head. All offset arithmetic wraps. Two interchangeable
//! backings:
//!
//! - [`PagedTape`]: 1 MiB pages allocated on first write and retained
//!   until the tape is dropped; reads of absent pages return 0 without
//!   allocating.
//! - [`MappedTape`]: one anonymous, private, non-reserving mapping of
//!   the full 2^32 bytes, demand-paged by the kernel. Only built on
//!   unix hosts with 64-bit pointers; it also backs the JIT, which
//!   needs the whole tape contiguous.

use std::collections::HashMap;

/// Cell access relative to the persistent head.
pub trait Tape {
    fn head(&self) -> u32;

    fn get(&self, offset: u32) -> u8;

    fn set(&mut self, offset: u32, value: u8);

    fn add(&mut self, offset: u32, value: u8) {
        let old = self.get(offset);
        self.set(offset, old.wrapping_add(value));
    }

    fn move_head(&mut self, delta: u32);

    /// `head += offset`; then step by `step` until the cell under the
    /// head equals `value`. The post-displacement cell is checked before
    /// the first step.
    fn seek(&mut self, offset: u32, value: u8, step: u32) {
        self.move_head(offset);
        while self.get(0) != value {
            self.move_head(step);
        }
    }
}

const PAGE_SHIFT: u32 = 20;
const PAGE_SIZE: usize = 1 << PAGE_SHIFT; // 1 MiB
const PAGE_MASK: u32 = (PAGE_SIZE as u32) - 1;

/// Sparse page-backed tape.
#[derive(Debug, Default)]
pub struct PagedTape {
    pages: HashMap<u32, Box<[u8]>>,
    head: u32,
}

impl PagedTape {
    pub fn new() -> Self {
        PagedTape::default()
    }

    /// Pages currently materialized (test hook).
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl Tape for PagedTape {
    #[inline]
    fn head(&self) -> u32 {
        self.head
    }

    fn get(&self, offset: u32) -> u8 {
        let address = self.head.wrapping_add(offset);
        match self.pages.get(&(address >> PAGE_SHIFT)) {
            Some(page) => page[(address & PAGE_MASK) as usize],
            None => 0,
        }
    }

    fn set(&mut self, offset: u32, value: u8) {
        let address = self.head.wrapping_add(offset);
        let page = self
            .pages
            .entry(address >> PAGE_SHIFT)
            .or_insert_with(|| vec![0u8; PAGE_SIZE].into_boxed_slice());
        page[(address & PAGE_MASK) as usize] = value;
    }

    #[inline]
    fn move_head(&mut self, delta: u32) {
        self.head = self.head.wrapping_add(delta);
    }
}

#[cfg(all(unix, target_pointer_width = "64"))]
pub use mapped::MappedTape;

#[cfg(all(unix, target_pointer_width = "64"))]
mod mapped {
    use super::Tape;
    use crate::error::{Result, RuntimeError};

    const TAPE_LEN: usize = 1 << 32;

    /// Kernel-backed tape: one 4 GiB non-reserving anonymous mapping.
    #[derive(Debug)]
    pub struct MappedTape {
        base: *mut u8,
        head: u32,
    }

    impl MappedTape {
        pub fn new() -> Result<Self> {
            let base = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    TAPE_LEN,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                    -1,
                    0,
                )
            };
            if base == libc::MAP_FAILED {
                return Err(RuntimeError::OutOfMemory(
                    std::io::Error::last_os_error().to_string(),
                ));
            }
            Ok(MappedTape {
                base: base as *mut u8,
                head: 0,
            })
        }

        /// Base of the full 2^32-byte tape, for the generated code.
        pub fn base_ptr(&mut self) -> *mut u8 {
            self.base
        }

        /// Reposition the head (the generated code moves it natively).
        pub fn set_head(&mut self, head: u32) {
            self.head = head;
        }
    }

    impl Tape for MappedTape {
        #[inline]
        fn head(&self) -> u32 {
            self.head
        }

        #[inline]
        fn get(&self, offset: u32) -> u8 {
            let address = self.head.wrapping_add(offset);
            unsafe { *self.base.add(address as usize) }
        }

        #[inline]
        fn set(&mut self, offset: u32, value: u8) {
            let address = self.head.wrapping_add(offset);
            unsafe { *self.base.add(address as usize) = value }
        }

        #[inline]
        fn move_head(&mut self, delta: u32) {
            self.head = self.head.wrapping_add(delta);
        }
    }

    impl Drop for MappedTape {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.base as *mut libc::c_void, TAPE_LEN);
            }
        }
    }
}
