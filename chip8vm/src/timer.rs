//! Delay and sound timers.

/// Two countdown timers that decrement at 60Hz.
///
/// The timers are driven by the host through [`Timers::tick`], independent
/// of how many instructions the CPU executes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timers {
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay: u8,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound: u8,
}

impl Timers {
    pub fn new() -> Self {
        Default::default()
    }

    /// Count down both timers by one, stopping at zero.
    #[inline]
    pub fn tick(&mut self) {
        self.delay = self.delay.saturating_sub(1);
        self.sound = self.sound.saturating_sub(1);
    }

    #[inline(always)]
    pub fn delay(&self) -> u8 {
        self.delay
    }

    #[inline(always)]
    pub fn sound(&self) -> u8 {
        self.sound
    }

    pub fn set_delay(&mut self, value: u8) {
        self.delay = value;
    }

    pub fn set_sound(&mut self, value: u8) {
        self.sound = value;
    }

    /// Buzzer should be on while the sound timer counts down.
    #[inline(always)]
    pub fn is_buzzing(&self) -> bool {
        self.sound > 0
    }

    pub fn clear(&mut self) {
        self.delay = 0;
        self.sound = 0;
    }
}
