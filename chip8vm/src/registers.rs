//! Register file.
use crate::{constants::*, error::Chip8Result, memory::check_pc};

/// General purpose registers, the address register and the program counter.
///
/// Register indices come straight from 4-bit instruction operands, so
/// they are masked rather than checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    v: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address. Since addresses are 12 bits, only the
    /// lowest (rightmost) bits are significant.
    i: Address,
    /// Program counter pointing to the current position in the bytecode.
    pc: Address,
}

impl Registers {
    pub fn new() -> Self {
        Default::default()
    }

    #[inline(always)]
    pub fn get(&self, vx: u8) -> u8 {
        self.v[(vx & 0xF) as usize]
    }

    #[inline(always)]
    pub fn set(&mut self, vx: u8, value: u8) {
        self.v[(vx & 0xF) as usize] = value;
    }

    /// Value of the flag register VF.
    #[inline(always)]
    pub fn flag(&self) -> u8 {
        self.v[FLAG_REGISTER as usize]
    }

    #[inline(always)]
    pub fn set_flag(&mut self, value: u8) {
        self.v[FLAG_REGISTER as usize] = value;
    }

    /// Registers V0 through Vx, inclusive.
    pub fn range(&self, vx: u8) -> &[u8] {
        &self.v[..=(vx & 0xF) as usize]
    }

    pub fn range_mut(&mut self, vx: u8) -> &mut [u8] {
        &mut self.v[..=(vx & 0xF) as usize]
    }

    #[inline(always)]
    pub fn index(&self) -> Address {
        self.i
    }

    #[inline(always)]
    pub fn set_index(&mut self, address: Address) {
        self.i = address;
    }

    #[inline(always)]
    pub fn pc(&self) -> Address {
        self.pc
    }

    #[inline(always)]
    pub fn set_pc(&mut self, address: Address) {
        self.pc = address;
    }

    /// Move the program counter past one instruction.
    ///
    /// Unchecked, the caller ensures the next instruction is in memory.
    #[inline(always)]
    pub(crate) fn advance_pc(&mut self) {
        self.pc = self.pc.wrapping_add(2);
    }

    /// Point the program counter at a new instruction.
    ///
    /// Fails without changing the program counter when the address
    /// has no room for an instruction.
    pub fn jump(&mut self, address: Address) -> Chip8Result<()> {
        check_pc(address)?;
        self.pc = address;
        Ok(())
    }

    /// Skip over the next instruction.
    pub fn skip(&mut self) -> Chip8Result<()> {
        self.jump(self.pc.wrapping_add(2))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
