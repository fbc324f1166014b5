// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the ITS core and its guest-memory collaborator.

use thiserror::Error;

/// Failure reported by a [`crate::memory::GuestMemory`] implementation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GuestMemoryError {
    #[error("address {addr:#x} (len {len}) is outside the mapped guest address space")]
    OutOfBounds { addr: u64, len: usize },
}

/// Error kinds raised while servicing an MMIO access or running the command
/// queue. None of these ever reach the guest as a data abort: the register
/// dispatcher downgrades every variant to a logged RAZ/WI, and the command
/// interpreter either skips the offending command (queue still advances) or
/// stalls on it (queue does not advance), per variant.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ItsError {
    #[error("invalid MMIO access at offset {offset:#x} width {width}")]
    InvalidAccess { offset: u64, width: u8 },

    #[error("invalid register write to {register}")]
    InvalidRegisterWrite { register: &'static str },

    #[error("malformed descriptor written to {register}")]
    MalformedDescriptor { register: &'static str },

    #[error("invalid command operand in {command}: {detail}")]
    InvalidCommandOperand {
        command: &'static str,
        detail: &'static str,
    },

    #[error("guest memory fault at {addr:#x}: {source}")]
    GuestMemoryFault {
        addr: u64,
        #[source]
        source: GuestMemoryError,
    },
}

impl From<GuestMemoryError> for ItsError {
    fn from(source: GuestMemoryError) -> Self {
        let addr = match source {
            GuestMemoryError::OutOfBounds { addr, .. } => addr,
        };
        ItsError::GuestMemoryFault { addr, source }
    }
}
