//! Behavioural differences between historical interpreters.
//!
//! The original COSMAC VIP interpreter and the later CHIP-48 and SUPER-CHIP
//! interpreters disagree on a handful of instructions. Programs written for
//! one often misbehave on the other, so the choice is left to configuration.

/// Toggles for instructions whose semantics differ between interpreters.
///
/// The default is the original COSMAC VIP behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Quirks {
    /// `8xy6` and `8xyE` shift `Vy` and store the result in `Vx`.
    ///
    /// When off, `Vx` is shifted in place and `Vy` is ignored.
    pub shift_reads_vy: bool,
    /// `Fx55` and `Fx65` leave `I` pointing past the last register.
    ///
    /// When off, `I` is unchanged.
    pub load_store_increments_i: bool,
    /// `8xy1`, `8xy2` and `8xy3` reset `VF` to zero.
    pub logic_resets_vf: bool,
    /// `Bxnn` jumps to `xnn + Vx` instead of `nnn + V0`.
    pub jump_uses_vx: bool,
    /// Sprites drawn over the edge of the screen wrap around to the other side.
    ///
    /// When off, they are clipped.
    pub wrap_sprites: bool,
}

impl Quirks {
    /// RCA COSMAC VIP interpreter, 1977.
    pub const fn cosmac_vip() -> Self {
        Self {
            shift_reads_vy: true,
            load_store_increments_i: true,
            logic_resets_vf: true,
            jump_uses_vx: false,
            wrap_sprites: false,
        }
    }

    /// CHIP-48 for the HP-48 calculators, later inherited by SUPER-CHIP.
    pub const fn chip48() -> Self {
        Self {
            shift_reads_vy: false,
            load_store_increments_i: false,
            logic_resets_vf: false,
            jump_uses_vx: true,
            wrap_sprites: false,
        }
    }
}

impl Default for Quirks {
    fn default() -> Self {
        Self::cosmac_vip()
    }
}
