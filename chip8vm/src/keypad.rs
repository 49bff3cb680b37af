//! Keyboard input state.
use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
};

/// One of the 16 keys of the COSMAC VIP hexadecimal keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyCode {
    Key0 = 0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF = 0xF,
}

impl KeyCode {
    const ALL: [KeyCode; KEY_COUNT as usize] = [
        Self::Key0,
        Self::Key1,
        Self::Key2,
        Self::Key3,
        Self::Key4,
        Self::Key5,
        Self::Key6,
        Self::Key7,
        Self::Key8,
        Self::Key9,
        Self::KeyA,
        Self::KeyB,
        Self::KeyC,
        Self::KeyD,
        Self::KeyE,
        Self::KeyF,
    ];

    #[inline(always)]
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Key identified by the lower nibble of the given value.
    #[inline(always)]
    pub fn from_nibble(value: u8) -> Self {
        Self::ALL[(value & 0xF) as usize]
    }

    pub fn iter() -> impl Iterator<Item = KeyCode> {
        Self::ALL.into_iter()
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let key_id = self.as_u8();
        write!(f, "k{key_id:x}")
    }
}

impl From<KeyCode> for u8 {
    fn from(keycode: KeyCode) -> Self {
        keycode.as_u8()
    }
}

impl TryFrom<u8> for KeyCode {
    type Error = Chip8Error;

    fn try_from(key_id: u8) -> Result<Self, Self::Error> {
        if key_id < KEY_COUNT {
            Ok(Self::from_nibble(key_id))
        } else {
            Err(Chip8Error::InvalidKeyIndex(key_id))
        }
    }
}

/// Pressed state of the 16 keys.
///
/// Besides the current state, the keypad can be armed to latch the next
/// key press. This backs the `Fx0A` instruction, which must only resume
/// on a fresh press rather than a key that was already held down.
#[derive(Debug, Clone, Default)]
pub struct Keypad {
    /// Pressed is a 1 bit, released is a 0 bit.
    state: u16,
    /// Waiting for a key press.
    armed: bool,
    /// Key press observed while armed.
    latched: Option<KeyCode>,
}

impl Keypad {
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the state of the key identified by `key_id`.
    pub fn set_key(&mut self, key_id: u8, pressed: bool) -> Chip8Result<()> {
        let key = KeyCode::try_from(key_id)?;
        self.set(key, pressed);
        Ok(())
    }

    pub fn set(&mut self, key: KeyCode, pressed: bool) {
        let mask = 1 << key.as_u8();
        let was_pressed = self.state & mask != 0;

        if pressed {
            self.state |= mask;
        } else {
            self.state &= !mask;
        }

        if self.armed && pressed && !was_pressed && self.latched.is_none() {
            self.latched = Some(key);
        }
    }

    #[inline]
    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.state & (1 << key.as_u8()) != 0
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.state != 0
    }

    /// Iterate over the keys currently pressed down.
    pub fn pressed(&self) -> impl Iterator<Item = KeyCode> + '_ {
        KeyCode::iter().filter(|key| self.is_pressed(*key))
    }

    /// Start listening for the next key press.
    ///
    /// Arming an already armed keypad keeps any latched key.
    pub(crate) fn arm(&mut self) {
        if !self.armed {
            self.armed = true;
            self.latched = None;
        }
    }

    /// Take the key pressed since the keypad was armed, disarming it.
    ///
    /// Returns `None` while still waiting.
    pub(crate) fn await_any_pressed(&mut self) -> Option<KeyCode> {
        let key = self.latched.take()?;
        self.armed = false;
        Some(key)
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear(&mut self) {
        self.state = 0;
        self.armed = false;
        self.latched = None;
    }
}
