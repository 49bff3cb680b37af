//! Chip-8 virtual machine.
//!
//! The machine is driven by a host: it calls [`Chip8Vm::step`] at its chosen
//! instruction rate, [`Chip8Vm::tick_timers`] at 60Hz, and in between renders
//! the framebuffer, feeds keyboard input and plays sound while the sound
//! timer is running. [`Chip8Vm::advance`] does the pacing for hosts that
//! would rather hand over elapsed time.
mod clock;
pub mod constants;
mod cpu;
mod display;
mod error;
mod instr;
mod interp;
mod keypad;
mod memory;
mod quirks;
mod registers;
mod stack;
mod timer;
mod vm;

pub use self::{
    clock::{Clock, Hz},
    cpu::Chip8Cpu,
    display::{Chip8DisplayBuffer, Display},
    error::{Chip8Error, Chip8Result},
    instr::{Decoder, Instr, Op},
    keypad::{KeyCode, Keypad},
    memory::Memory,
    quirks::Quirks,
    registers::Registers,
    stack::CallStack,
    timer::Timers,
    vm::{Chip8Conf, Chip8Vm, Flow},
};

pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        cpu::Chip8Cpu,
        error::{Chip8Error, Chip8Result},
        instr::{Decoder, Op},
        keypad::KeyCode,
        quirks::Quirks,
        vm::{Chip8Conf, Chip8Vm, Flow},
        Hz,
    };
}
