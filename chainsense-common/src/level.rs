//! Digital signal level

/// Digital input or output level.
///
/// Used both for driving the attention line and for the status bit carried by a transition event.
/// Sensor status bits are active low: [`Level::Low`] means the channel is detecting.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Low
    Low,
    /// High
    #[default]
    High,
}

impl Level {
    /// Get the level of bit `bit` in `byte`
    pub const fn of_bit(byte: u8, bit: u8) -> Self {
        if byte & (1 << (bit & 0x07)) != 0 {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Return true if the level is high
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    /// Return true if the level is low
    pub const fn is_low(self) -> bool {
        matches!(self, Level::Low)
    }
}

impl From<bool> for Level {
    fn from(val: bool) -> Self {
        match val {
            true => Self::High,
            false => Self::Low,
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> bool {
        match level {
            Level::Low => false,
            Level::High => true,
        }
    }
}

impl core::fmt::Display for Level {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Level::Low => write!(f, "Low"),
            Level::High => write!(f, "High"),
        }
    }
}
