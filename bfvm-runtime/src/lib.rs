//! # bfvm runtime
//!
//! Execution layer: the 2^32-byte tape (paged or kernel-mapped), the
//! bytecode interpreter, and, on x86-64 unix hosts, a JIT translating
//! bytecode to native code that calls back into host I/O.

pub mod error;
pub mod machine;
pub mod tape;

#[cfg(all(target_arch = "x86_64", unix, target_pointer_width = "64"))]
pub mod jit;

pub use error::RuntimeError;
pub use machine::{EofPolicy, Machine, MachineConfig, Status};
pub use tape::{PagedTape, Tape};

#[cfg(all(unix, target_pointer_width = "64"))]
pub use tape::MappedTape;

#[cfg(all(target_arch = "x86_64", unix, target_pointer_width = "64"))]
pub use jit::{compile, run_jit, JitCode};

/// Is native code generation available on this host?
pub const fn jit_supported() -> bool {
    cfg!(all(target_arch = "x86_64", unix, target_pointer_width = "64"))
}

/// Interpret a program over in-memory input, collecting its output.
pub fn run(
    program: bfvm_ir::Program,
    input: &[u8],
) -> Result<Vec<u8>, RuntimeError> {
    let mut output = Vec::new();
    let mut machine = Machine::new(
        program,
        input,
        &mut output,
        PagedTape::new(),
        MachineConfig::default(),
    );
    machine.run_to_halt()?;
    drop(machine);
    Ok(output)
}
