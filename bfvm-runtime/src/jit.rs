//! x86-64 code generator
//!
//! Translates a program into one System V AMD64 function:
//!
//! ```text
//! fn(memory: *mut u8,
//!    input:  extern "C" fn(*mut c_void) -> i32, in_ctx:  *mut c_void,
//!    output: extern "C" fn(*mut c_void, u8) -> i32, out_ctx: *mut c_void) -> i32
//! ```
//!
//! returning 0 on success or a negative host error code. `memory` must
//! point at exactly 2^32 writable bytes ([`crate::MappedTape`]).
//!
//! Register use, all caller-saved:
//! - `eax`: tape cursor, holding `head + lazy_offset`; every 32-bit
//!   write zero-extends, which is what keeps cursor arithmetic wrapping.
//! - `rdi`: tape base; cell accesses are `[rdi + rax]`.
//! - `rsi`/`rdx`: input callback and context.
//! - `rcx`/`r8`: output callback and context.
//! - `r10`/`r11`: scratch.
//!
//! Instruction offsets are folded into `eax` lazily: the emitter tracks
//! the offset currently baked into the cursor and adjusts by the
//! wrapping difference only when it changes. The lazy offset is flushed
//! before each loop arm (they have multiple predecessors) and before a
//! seek (which moves the cursor natively).
//!
//! Callback returns: negative aborts through the unified epilogue with
//! the code in `eax`; for input, a value with bit 8 set means "end of
//! input, leave the cell alone" and skips the store.

use crate::error::{Result, RuntimeError};
use crate::machine::EofPolicy;
use crate::tape::MappedTape;
use bfvm_ir::{Opcode, Program};
use std::io::{Read, Write};
use std::os::raw::c_void;

/// Input callback: byte in the low 8 bits of a non-negative return,
/// bit 8 set for "leave the cell unchanged", negative for a fatal error.
pub type InputFn = extern "C" fn(*mut c_void) -> i32;

/// Output callback: 0 on success, negative for a fatal error.
pub type OutputFn = extern "C" fn(*mut c_void, u8) -> i32;

/// Input-callback return signalling EOF under [`EofPolicy::Unchanged`].
pub const INPUT_KEEP_CELL: i32 = 0x100;

type Entry = unsafe extern "sysv64" fn(
    *mut u8,
    InputFn,
    *mut c_void,
    OutputFn,
    *mut c_void,
) -> i32;

/// An executable translation of one program.
pub struct JitCode {
    code: *mut u8,
    map_len: usize,
    len: usize,
}

impl JitCode {
    /// Call the generated function.
    ///
    /// # Safety
    ///
    /// `memory` must point at 2^32 writable bytes, and both callbacks
    /// must tolerate being called with their respective context.
    pub unsafe fn invoke(
        &self,
        memory: *mut u8,
        input: InputFn,
        in_ctx: *mut c_void,
        output: OutputFn,
        out_ctx: *mut c_void,
    ) -> i32 {
        let entry: Entry = std::mem::transmute(self.code);
        entry(memory, input, in_ctx, output, out_ctx)
    }

    /// Size of the generated code in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for JitCode {
    fn drop(&mut self) {
        unsafe {
            // Back to RW before releasing, so the mapping is never
            // simultaneously writable and executable.
            libc::mprotect(
                self.code as *mut c_void,
                self.map_len,
                libc::PROT_READ | libc::PROT_WRITE,
            );
            libc::munmap(self.code as *mut c_void, self.map_len);
        }
    }
}

/// Translate a program into executable memory.
pub fn compile(program: &Program) -> Result<JitCode> {
    let buf = Emitter::new().translate(program);
    log::debug!(
        "generated {} bytes of native code for {} instructions",
        buf.len(),
        program.len()
    );

    let page = 4096usize;
    let map_len = (buf.len() + page - 1) / page * page;
    let code = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            map_len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if code == libc::MAP_FAILED {
        return Err(RuntimeError::OutOfMemory(
            std::io::Error::last_os_error().to_string(),
        ));
    }

    unsafe {
        std::ptr::copy_nonoverlapping(buf.as_ptr(), code as *mut u8, buf.len());
        if libc::mprotect(code, map_len, libc::PROT_READ | libc::PROT_EXEC) != 0 {
            let err = std::io::Error::last_os_error().to_string();
            libc::munmap(code, map_len);
            return Err(RuntimeError::OutOfMemory(err));
        }
    }

    Ok(JitCode {
        code: code as *mut u8,
        map_len,
        len: buf.len(),
    })
}

struct Emitter {
    buf: Vec<u8>,
    /// Offset currently folded into the cursor.
    current_offset: u32,
    /// Patch sites of each open loop's forward `je`.
    loop_stack: Vec<usize>,
    /// Patch sites of every jump to the unified epilogue.
    exit_patches: Vec<usize>,
}

impl Emitter {
    fn new() -> Self {
        Emitter {
            buf: Vec::new(),
            current_offset: 0,
            loop_stack: Vec::new(),
            exit_patches: Vec::new(),
        }
    }

    fn translate(mut self, program: &Program) -> Vec<u8> {
        // push rbp; mov rbp, rsp; xor eax, eax
        self.emit(&[0x55, 0x48, 0x89, 0xE5, 0x31, 0xC0]);

        for inst in program.iter() {
            match inst.tag {
                Opcode::Halt => self.emit_halt(),
                // A native translation has no host to yield to.
                Opcode::Breakpoint => {}
                Opcode::Set => {
                    self.align_cursor(inst.offset);
                    // mov byte [rdi+rax], imm8
                    self.emit(&[0xC6, 0x04, 0x07, inst.value]);
                }
                Opcode::Add => {
                    self.align_cursor(inst.offset);
                    // add byte [rdi+rax], imm8
                    self.emit(&[0x80, 0x04, 0x07, inst.value]);
                }
                Opcode::AddMul => self.emit_add_mul(inst.value, inst.offset, inst.extra),
                Opcode::Move => {
                    // Fold the pending offset and the delta in one shot,
                    // re-basing the cursor at offset zero.
                    let correction = inst.extra.wrapping_sub(self.current_offset);
                    self.add_eax(correction);
                    self.current_offset = 0;
                }
                Opcode::Seek => self.emit_seek(inst.value, inst.offset, inst.extra),
                Opcode::In => self.emit_in(inst.offset),
                Opcode::Out => {
                    self.align_cursor(inst.offset);
                    // mov r11b, byte [rdi+rax]
                    self.emit(&[0x44, 0x8A, 0x1C, 0x07]);
                    self.emit_out_call();
                }
                Opcode::OutValue => {
                    // mov r11b, imm8
                    self.emit(&[0x41, 0xB3, inst.value]);
                    self.emit_out_call();
                }
                Opcode::LoopStart => {
                    self.flush_cursor();
                    // cmp byte [rdi+rax], 0 ; je -> past the matching end
                    self.emit(&[0x80, 0x3C, 0x07, 0x00, 0x0F, 0x84]);
                    let patch = self.reserve_rel32();
                    self.loop_stack.push(patch);
                }
                Opcode::LoopEnd => {
                    self.flush_cursor();
                    let start_patch = self
                        .loop_stack
                        .pop()
                        .expect("loop arms are paired in well-formed input");
                    // cmp byte [rdi+rax], 0 ; jne -> body start
                    self.emit(&[0x80, 0x3C, 0x07, 0x00, 0x0F, 0x85]);
                    let body_start = start_patch + 4;
                    let rel = body_start as i64 - (self.buf.len() + 4) as i64;
                    self.emit(&(rel as i32).to_le_bytes());
                    // Forward edge of the start lands right here.
                    self.patch_rel32(start_patch, self.buf.len());
                }
            }
        }

        // Unified epilogue: mov rsp, rbp; pop rbp; ret
        let exit = self.buf.len();
        for patch in std::mem::take(&mut self.exit_patches) {
            self.patch_rel32(patch, exit);
        }
        self.emit(&[0x48, 0x89, 0xEC, 0x5D, 0xC3]);
        self.buf
    }

    fn emit(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// `add eax, imm32` (wrapping, and zero-extending into rax).
    fn add_eax(&mut self, delta: u32) {
        if delta != 0 {
            self.emit(&[0x05]);
            self.emit(&delta.to_le_bytes());
        }
    }

    /// `sub eax, imm32`.
    fn sub_eax(&mut self, delta: u32) {
        if delta != 0 {
            self.emit(&[0x2D]);
            self.emit(&delta.to_le_bytes());
        }
    }

    /// Fold `offset` into the cursor.
    fn align_cursor(&mut self, offset: u32) {
        let delta = offset.wrapping_sub(self.current_offset);
        self.add_eax(delta);
        self.current_offset = offset;
    }

    /// Re-base the cursor at offset zero (loop arms are join points).
    fn flush_cursor(&mut self) {
        let current = self.current_offset;
        self.sub_eax(current);
        self.current_offset = 0;
    }

    /// Reserve a rel32 field and return its position.
    fn reserve_rel32(&mut self) -> usize {
        let patch = self.buf.len();
        self.emit(&[0, 0, 0, 0]);
        patch
    }

    fn patch_rel32(&mut self, patch: usize, target: usize) {
        let rel = target as i64 - (patch + 4) as i64;
        self.buf[patch..patch + 4].copy_from_slice(&(rel as i32).to_le_bytes());
    }

    fn emit_halt(&mut self) {
        // xor eax, eax ; jmp exit
        self.emit(&[0x31, 0xC0, 0xE9]);
        let patch = self.reserve_rel32();
        self.exit_patches.push(patch);
    }

    fn emit_add_mul(&mut self, value: u8, offset: u32, extra: u32) {
        self.align_cursor(offset);
        // Shift the cursor to the source cell and back; the product of
        // two bytes in a 16-bit multiply keeps the low byte exact.
        self.add_eax(extra);
        // movzx r10d, byte [rdi+rax]
        self.emit(&[0x44, 0x0F, 0xB6, 0x14, 0x07]);
        self.sub_eax(extra);
        // imul r10w, r10w, imm16
        self.emit(&[0x66, 0x45, 0x69, 0xD2]);
        self.emit(&(value as u16).to_le_bytes());
        // add byte [rdi+rax], r10b
        self.emit(&[0x44, 0x00, 0x14, 0x07]);
    }

    fn emit_seek(&mut self, value: u8, offset: u32, step: u32) {
        // The pre-scan displacement folds into the cursor; afterwards
        // the cursor is the real head again.
        let correction = offset.wrapping_sub(self.current_offset);
        self.add_eax(correction);
        self.current_offset = 0;
        // Keeping the scan on the 32-bit cursor (rather than a 64-bit
        // pointer) is what preserves wraparound at the tape ends.
        //
        //   cmp byte [rdi+rax], value
        //   je  done
        //   add eax, step
        //   jmp back
        self.emit(&[0x80, 0x3C, 0x07, value]);
        self.emit(&[0x74, 0x07]);
        self.emit(&[0x05]);
        self.emit(&step.to_le_bytes());
        self.emit(&[0xEB, 0xF3]);
    }

    /// Save the working registers, call the input callback, and store
    /// the returned byte unless told to keep the cell.
    fn emit_in(&mut self, offset: u32) {
        self.align_cursor(offset);
        self.emit_call_prologue();
        // mov r10, rsi ; mov rdi, rdx ; call r10
        self.emit(&[0x49, 0x89, 0xF2, 0x48, 0x89, 0xD7, 0x41, 0xFF, 0xD2]);
        self.emit_call_epilogue();
        // cmp r11d, INPUT_KEEP_CELL ; jae skip-store
        self.emit(&[0x41, 0x81, 0xFB]);
        self.emit(&INPUT_KEEP_CELL.to_le_bytes());
        self.emit(&[0x73, 0x04]);
        // mov byte [rdi+rax], r11b
        self.emit(&[0x44, 0x88, 0x1C, 0x07]);
    }

    /// Call the output callback with the byte staged in `r11b`.
    fn emit_out_call(&mut self) {
        self.emit_call_prologue();
        // mov r10, rcx ; mov rdi, r8 ; movzx esi, r11b ; call r10
        self.emit(&[
            0x49, 0x89, 0xCA, 0x4C, 0x89, 0xC7, 0x41, 0x0F, 0xB6, 0xF3, 0x41, 0xFF, 0xD2,
        ]);
        self.emit_call_epilogue();
    }

    /// Six pushes keep the stack 16-byte aligned at the call site.
    fn emit_call_prologue(&mut self) {
        // push rcx, rdx, rsi, rdi, r8, rax
        self.emit(&[0x51, 0x52, 0x56, 0x57, 0x41, 0x50, 0x50]);
    }

    /// Restore registers, then route a negative result to the epilogue.
    fn emit_call_epilogue(&mut self) {
        // mov r11d, eax ; pop rax, r8, rdi, rsi, rdx, rcx
        self.emit(&[0x41, 0x89, 0xC3, 0x58, 0x41, 0x58, 0x5F, 0x5E, 0x5A, 0x59]);
        // test r11d, r11d ; jns +8 ; mov eax, r11d ; jmp exit
        self.emit(&[0x45, 0x85, 0xDB, 0x79, 0x08, 0x44, 0x89, 0xD8, 0xE9]);
        let patch = self.reserve_rel32();
        self.exit_patches.push(patch);
    }
}

// ---------------------------------------------------------------------------
// Host-side driver
// ---------------------------------------------------------------------------

struct HostIo<R, W> {
    reader: R,
    writer: W,
    eof: EofPolicy,
    error: Option<std::io::Error>,
}

extern "C" fn input_thunk<R: Read, W: Write>(ctx: *mut c_void) -> i32 {
    let io = unsafe { &mut *(ctx as *mut HostIo<R, W>) };
    let mut buf = [0u8; 1];
    match io.reader.read(&mut buf) {
        Ok(0) => match io.eof {
            EofPolicy::Substitute(byte) => byte as i32,
            EofPolicy::Unchanged => INPUT_KEEP_CELL,
        },
        Ok(_) => buf[0] as i32,
        Err(err) => {
            io.error = Some(err);
            -1
        }
    }
}

extern "C" fn output_thunk<R: Read, W: Write>(ctx: *mut c_void, byte: u8) -> i32 {
    let io = unsafe { &mut *(ctx as *mut HostIo<R, W>) };
    match io.writer.write_all(&[byte]) {
        Ok(()) => 0,
        Err(err) => {
            io.error = Some(err);
            -1
        }
    }
}

/// Compile and run a program natively over the given reader/writer.
pub fn run_jit<R: Read, W: Write>(
    program: &Program,
    reader: R,
    writer: W,
    eof: EofPolicy,
) -> Result<()> {
    let code = compile(program)?;
    let mut tape = MappedTape::new()?;
    let mut io = HostIo {
        reader,
        writer,
        eof,
        error: None,
    };

    let ctx = &mut io as *mut HostIo<R, W> as *mut c_void;
    let rc = unsafe {
        code.invoke(
            tape.base_ptr(),
            input_thunk::<R, W>,
            ctx,
            output_thunk::<R, W>,
            ctx,
        )
    };

    if rc < 0 {
        return Err(match io.error.take() {
            Some(err) => RuntimeError::Io(err),
            None => RuntimeError::HostCallback(rc),
        });
    }
    Ok(())
}
