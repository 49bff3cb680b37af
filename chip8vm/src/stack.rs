//! Subroutine call stack.
use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
};

/// Stack of return pointers used for jumping when a routine call finishes.
///
/// Overflow and underflow are reported as errors instead of wrapping the
/// stack pointer.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    slots: [Address; STACK_SIZE],
    /// Number of occupied slots, pointing one past the top of the stack.
    sp: usize,
}

impl CallStack {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, address: Address) -> Chip8Result<()> {
        let slot = self.slots.get_mut(self.sp).ok_or(Chip8Error::StackOverflow)?;
        *slot = address;
        self.sp += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Chip8Result<Address> {
        let sp = self.sp.checked_sub(1).ok_or(Chip8Error::StackUnderflow)?;
        self.sp = sp;
        Ok(self.slots[sp])
    }

    /// Return address at the top of the stack, if any.
    pub fn peek(&self) -> Option<Address> {
        self.sp.checked_sub(1).map(|sp| self.slots[sp])
    }

    /// Current levels of nesting.
    pub fn depth(&self) -> usize {
        self.sp
    }

    pub fn is_empty(&self) -> bool {
        self.sp == 0
    }

    pub fn clear(&mut self) {
        self.slots.fill(0);
        self.sp = 0;
    }
}
