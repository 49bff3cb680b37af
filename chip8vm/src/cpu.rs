//! CPU and memory state.
use crate::{
    constants::*, display::Display, keypad::Keypad, memory::Memory, registers::Registers,
    stack::CallStack, timer::Timers,
};

/// Core state for a chip8 interpreter.
///
/// Owns every component of the machine. The interpreter borrows the
/// components it needs for each instruction, so none of them keep
/// references to each other.
#[derive(Default)]
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    pub(crate) registers: Registers,
    pub(crate) timers: Timers,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Memory,
    pub(crate) stack: CallStack,
    /// Screen buffer that is drawn to.
    pub(crate) display: Display,

    // ------------------------------------------------------------------------
    // Devices
    pub(crate) keypad: Keypad,
}

impl Chip8Cpu {
    pub fn new() -> Self {
        let mut cpu = Self::default();
        cpu.reset();
        cpu
    }

    /// Put every component back into its power-on state.
    ///
    /// Memory is erased and the builtin font reloaded. The program counter
    /// points at [`MEM_START`].
    pub(crate) fn reset(&mut self) {
        self.clear_memory();
        self.ram.load_font(&FONTSET);
        self.registers.clear();
        self.registers.set_pc(MEM_START as Address);
        self.timers.clear();
        self.keypad.clear();
    }

    /// Erase the contents of the memory buffers `ram`, `stack` and `display`.
    pub(crate) fn clear_memory(&mut self) {
        self.ram.clear();
        self.stack.clear();
        self.display.clear();
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn memory(&self) -> &Memory {
        &self.ram
    }

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn keypad(&self) -> &Keypad {
        &self.keypad
    }

    /// Indicates that the machine is waiting for a keypress.
    ///
    /// The keypad is only armed while `Fx0A` stalls the machine.
    pub fn is_key_waiting(&self) -> bool {
        self.keypad.is_armed()
    }
}
