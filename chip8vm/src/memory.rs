//! Main memory.
use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
};

/// Flat 4KiB address space.
///
/// The lower 512 bytes hold the builtin font. Programs are loaded
/// at [`MEM_START`]. Every access is bounds checked, so a misbehaving
/// program results in [`Chip8Error::MemoryOutOfBounds`] rather than
/// silently wrapping around.
pub struct Memory {
    ram: Box<[u8; MEM_SIZE]>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            ram: Box::new([0; MEM_SIZE]),
        }
    }
}

impl Memory {
    pub fn new() -> Self {
        Default::default()
    }

    /// Erase the entire address space, including the font.
    pub fn clear(&mut self) {
        self.ram.fill(0);
    }

    /// Copy the given fontset into the reserved font area.
    pub fn load_font(&mut self, fontset: &[u8; FONTSET_DATA_LENGTH]) {
        let start = FONTSET_START as usize;
        self.ram[start..start + FONTSET_DATA_LENGTH].copy_from_slice(fontset);
    }

    /// Copy a program into memory at [`MEM_START`].
    ///
    /// Memory outside of the program area is left untouched.
    pub fn load(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if !check_program_size(bytecode) {
            return Err(Chip8Error::RomTooLarge {
                size: bytecode.len(),
                capacity: MAX_PROGRAM_SIZE,
            });
        }

        self.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);

        Ok(())
    }

    #[inline]
    pub fn read_byte(&self, address: usize) -> Chip8Result<u8> {
        self.ram
            .get(address)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfBounds { address })
    }

    #[inline]
    pub fn write_byte(&mut self, address: usize, value: u8) -> Chip8Result<()> {
        match self.ram.get_mut(address) {
            Some(byte) => {
                *byte = value;
                Ok(())
            }
            None => Err(Chip8Error::MemoryOutOfBounds { address }),
        }
    }

    /// Fetch a big-endian instruction word.
    ///
    /// Both bytes must be inside memory. An instruction straddling
    /// the end of the address space is an error.
    #[inline]
    pub fn read_word(&self, address: usize) -> Chip8Result<u16> {
        let [a, b] = self.read_array::<2>(address)?;
        Ok(((a as u16) << 8) | b as u16)
    }

    /// Borrow `len` bytes starting at `address`.
    pub fn read_slice(&self, address: usize, len: usize) -> Chip8Result<&[u8]> {
        check_range(address, len)?;
        Ok(&self.ram[address..address + len])
    }

    /// Write all the given bytes starting at `address`.
    ///
    /// The whole range is checked before anything is written.
    pub fn write_slice(&mut self, address: usize, bytes: &[u8]) -> Chip8Result<()> {
        check_range(address, bytes.len())?;
        self.ram[address..address + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_array<const N: usize>(&self, address: usize) -> Chip8Result<[u8; N]> {
        let mut buf = [0; N];
        buf.copy_from_slice(self.read_slice(address, N)?);
        Ok(buf)
    }
}

/// Check that the given program can fit in VM memory.
pub fn check_program_size(bytecode: &[u8]) -> bool {
    bytecode.len() <= MAX_PROGRAM_SIZE
}

/// Check that the program counter may point at the given address.
///
/// The address must hold a whole instruction, so the last valid
/// program counter is `MEM_SIZE - 2`.
pub(crate) fn check_pc(address: Address) -> Chip8Result<()> {
    if address as usize + 2 <= MEM_SIZE {
        Ok(())
    } else {
        Err(Chip8Error::MemoryOutOfBounds {
            address: address as usize,
        })
    }
}

/// Ensure the range `address..address + len` is within memory.
///
/// Reports the first offending address.
fn check_range(address: usize, len: usize) -> Chip8Result<()> {
    match address.checked_add(len) {
        Some(end) if end <= MEM_SIZE => Ok(()),
        _ => Err(Chip8Error::MemoryOutOfBounds {
            address: address.max(MEM_SIZE),
        }),
    }
}
