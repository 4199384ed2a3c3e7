use std::io;

use thiserror::Error;

use crate::cpu::ExecError;

pub type Result<T, E = RunnerError> = std::result::Result<T, E>;

/// Failures of the memory region a payload is installed into.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("address {addr:#010x} is not writable")]
    Unwritable { addr: u32 },
    #[error("{len} bytes at {addr:#010x} run past the end of the region")]
    Wraps { addr: u32, len: usize },
    #[error(transparent)]
    Exec(#[from] ExecError),
}

#[derive(Debug, Error)]
pub enum KeypadError {
    #[error("input closed")]
    Closed,
    #[error("keypad read failed: {0}")]
    Io(#[from] io::Error),
}

/// Anything that stops the runner. Case-level target faults never do.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("console write failed: {0}")]
    Console(#[from] io::Error),
    #[error(transparent)]
    Keypad(#[from] KeypadError),
}
