//! Runtime error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("host callback failed with code {0}")]
    HostCallback(i32),

    #[error("cycle limit exceeded: {0}")]
    CycleLimit(u64),

    #[error("native code generation is not supported on this host")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
