//! Result and errors.
use std::fmt::{self, Display, Formatter};

use crate::constants::Address;

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

/// Faults raised by the virtual machine.
///
/// None of these are recoverable by the VM itself. The instruction that
/// raised the error leaves no trace in the machine state, so the host can
/// inspect the machine as of the last successful instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chip8Error {
    /// Attempt to load a bytecode program that can't fit in memory.
    RomTooLarge { size: usize, capacity: usize },
    /// Memory access outside of the 4KiB address space.
    MemoryOutOfBounds { address: usize },
    /// Subroutine call nested deeper than the call stack allows.
    StackOverflow,
    /// Return from a subroutine while the call stack is empty.
    StackUnderflow,
    /// Instruction word that does not encode a Chip-8 instruction.
    InvalidOpcode { opcode: u16, address: Address },
    /// Key identifier outside of the range `0x0..=0xF`.
    InvalidKeyIndex(u8),
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RomTooLarge { size, capacity } => write!(
                f,
                "program too large for VM memory: {size} bytes, capacity is {capacity} bytes"
            ),
            Self::MemoryOutOfBounds { address } => {
                write!(f, "memory access out of bounds: 0x{address:04X}")
            }
            Self::StackOverflow => write!(f, "call stack overflow"),
            Self::StackUnderflow => write!(f, "call stack underflow"),
            Self::InvalidOpcode { opcode, address } => {
                write!(f, "invalid opcode 0x{opcode:04X} at 0x{address:03X}")
            }
            Self::InvalidKeyIndex(key_id) => {
                write!(f, "keycode must be in range 0 <= keycode < 16, got {key_id}")
            }
        }
    }
}

impl std::error::Error for Chip8Error {}
