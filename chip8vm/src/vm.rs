//! Virtual machine.
use std::{
    fmt::{self, Write},
    time::Duration,
};

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    clock::{Clock, Hz},
    constants::*,
    cpu::Chip8Cpu,
    display::Chip8DisplayBuffer,
    error::{Chip8Error, Chip8Result},
    memory::{check_program_size, Memory},
    quirks::Quirks,
    registers::Registers,
};

pub struct Chip8Vm {
    pub(crate) cpu: Chip8Cpu,
    /// Instruction clock.
    clock: Clock,
    /// 60Hz delay and sound timer clock.
    timer: Clock,
    pub(crate) rng: StdRng,
    /// Copy of the last loaded program, for restarting.
    program: Vec<u8>,
    conf: Chip8Conf,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        let freq = conf.clock_frequency.unwrap_or_default();
        let clock = Clock::from_hz(freq);
        if clock.interval().is_zero() {
            log::warn!("clock frequency {} Hz out of range, CPU will not advance", freq.0);
        }

        Chip8Vm {
            cpu: Chip8Cpu::new(),
            clock,
            timer: Clock::from_hz(Hz(DELAY_FREQUENCY)),
            rng: seed_rng(conf.rng_seed),
            program: Vec::new(),
            conf,
        }
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    /// Load a program into memory and prepare it for execution.
    ///
    /// The whole machine is reset first, so nothing of a previously
    /// loaded program leaks into the new one. When the program is too
    /// large the machine is left untouched.
    pub fn load(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if !check_program_size(bytecode) {
            return Err(Chip8Error::RomTooLarge {
                size: bytecode.len(),
                capacity: MAX_PROGRAM_SIZE,
            });
        }

        // Start with clean memory to avoid leaking previous program.
        self.reset();

        // Load program into virtual RAM
        self.cpu.ram.load(bytecode)?;
        self.program = bytecode.to_vec();

        log::debug!("loaded program of {} bytes", bytecode.len());

        Ok(())
    }

    /// Put the machine back into its power-on state.
    ///
    /// Memory is zeroed except for the builtin font, so the loaded program
    /// is gone. Use [`Chip8Vm::restart`] to run the same program again.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.clock.reset();
        self.timer.reset();
        self.rng = seed_rng(self.conf.rng_seed);
    }

    /// Reset the machine and reload the last loaded program.
    pub fn restart(&mut self) -> Chip8Result<()> {
        let program = std::mem::take(&mut self.program);
        self.load(&program)
    }

    pub fn framebuffer(&self) -> Chip8DisplayBuffer {
        self.cpu.display.snapshot()
    }

    pub fn cpu(&self) -> &Chip8Cpu {
        &self.cpu
    }

    pub fn registers(&self) -> &Registers {
        &self.cpu.registers
    }

    pub fn memory(&self) -> &Memory {
        &self.cpu.ram
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.timers.delay()
    }

    pub fn sound_timer(&self) -> u8 {
        self.cpu.timers.sound()
    }

    /// Buzzer should be on while sound timer counts down,
    /// then turned off when the timer reaches zero.
    pub fn is_buzzing(&self) -> bool {
        self.cpu.timers.is_buzzing()
    }

    /// Indicates that the machine is stalled on `Fx0A`, waiting for a keypress.
    pub fn is_key_waiting(&self) -> bool {
        self.cpu.is_key_waiting()
    }
}

fn seed_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Control flow outcome of a successful instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is useful for the caller to avoid being
    /// blocked on infinite or long running loops.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    /// Display buffer changed and should be presented.
    Draw,
    /// Sound timer was set.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Chip8Conf {
    /// Instructions executed per second by [`Chip8Vm::advance`].
    ///
    /// Defaults to [`CPU_FREQUENCY`].
    pub clock_frequency: Option<Hz>,
    pub quirks: Quirks,
    /// Fixed seed for `RND`, for reproducible runs.
    pub rng_seed: Option<u64>,
}

/// Interpreter
impl Chip8Vm {
    /// Sets the keyboard key input state.
    ///
    /// If the VM is waiting for keyboard input, a fresh key press
    /// allows it to be resumed on the next step.
    pub fn set_key(&mut self, key_id: u8, pressed: bool) -> Chip8Result<()> {
        self.cpu.keypad.set_key(key_id, pressed)
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.keypad.clear()
    }

    /// Count down the delay and sound timers.
    ///
    /// Must be called at 60Hz regardless of how fast instructions
    /// are executed, including while stalled on a key wait.
    pub fn tick_timers(&mut self) {
        self.cpu.timers.tick();
    }

    /// Execute a single instruction.
    ///
    /// On error the program counter is left pointing at the faulting
    /// instruction, and the machine state is as it was after the last
    /// successful instruction.
    pub fn step(&mut self) -> Chip8Result<Flow> {
        let pc = self.cpu.registers.pc();

        self.cycle().map_err(|err| {
            self.cpu.registers.set_pc(pc);
            log::warn!("vm fault at 0x{pc:03X}: {err}");
            err
        })
    }

    /// Execute up to `step_count` instructions.
    ///
    /// Stops early when the machine stalls on a key wait.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<Flow> {
        let mut flow = Flow::Ok;

        for _ in 0..step_count {
            flow = self.step()?;
            if flow == Flow::KeyWait {
                break;
            }
        }

        Ok(flow)
    }

    /// Advance the machine by an amount of wall-clock time.
    ///
    /// Runs as many timer ticks and instructions as fit in the elapsed time,
    /// at 60Hz and the configured clock frequency respectively. Time that
    /// doesn't add up to a whole cycle is carried over to the next call.
    ///
    /// Returns [`Flow::KeyWait`] when the machine is stalled, [`Flow::Draw`]
    /// if any instruction changed the display, otherwise [`Flow::Ok`].
    pub fn advance(&mut self, elapsed: Duration) -> Chip8Result<Flow> {
        for _ in 0..self.timer.advance(elapsed) {
            self.tick_timers();
        }

        let mut drawn = false;

        for _ in 0..self.clock.advance(elapsed) {
            match self.step()? {
                Flow::KeyWait => return Ok(Flow::KeyWait),
                Flow::Draw => drawn = true,
                _ => {}
            }
        }

        if self.is_key_waiting() {
            Ok(Flow::KeyWait)
        } else if drawn {
            Ok(Flow::Draw)
        } else {
            Ok(Flow::Ok)
        }
    }
}

/// Troubleshooting
#[doc(hidden)]
impl Chip8Vm {
    /// Returns the contents of the program memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        let mut buf = String::new();
        let end = MEM_START.saturating_add(count).min(MEM_SIZE);

        for address in (MEM_START..end).step_by(2) {
            match self.cpu.ram.read_word(address) {
                Ok(word) => writeln!(buf, "{address:04X}: {word:04X}")?,
                Err(_) => break,
            }
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        self.cpu.display.dump()
    }

    pub fn dump_keys(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        if self.cpu.keypad.any_key() {
            write!(buf, "keys: ")?;
            for key in self.cpu.keypad.pressed() {
                write!(buf, "{key}")?;
            }
        }

        Ok(buf)
    }
}
