//! Encoding of sensor transition events
//!
//! Each event is a single byte laid out as `SNNNNCCC`:
//!
//! - `S`: the new level of the status bit (0 = the channel started detecting, 1 = it stopped)
//! - `NNNN`: the node index within the chain, 0 to 15
//! - `CCC`: the sensor channel within the node, 0 to 7

use snafu::Snafu;

use crate::level::Level;

const LEVEL_SHIFT: u8 = 7;
const NODE_SHIFT: u8 = 3;
const NODE_MASK: u8 = 0x0F;
const CHANNEL_MASK: u8 = 0x07;

/// Error returned when building a [`TransitionEvent`] from out of range fields
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum EventError {
    /// The node index does not fit in the 4-bit node field
    #[snafu(display("Node index {node} does not fit in an event"))]
    NodeOutOfRange {
        /// The rejected node index
        node: u8,
    },
    /// The channel index does not fit in the 3-bit channel field
    #[snafu(display("Channel index {channel} does not fit in an event"))]
    ChannelOutOfRange {
        /// The rejected channel index
        channel: u8,
    },
}

/// A packed sensor transition event
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionEvent(u8);

impl TransitionEvent {
    /// Create a new event, checking that `node` and `channel` fit their fields
    pub fn new(level: Level, node: u8, channel: u8) -> Result<Self, EventError> {
        if node > NODE_MASK {
            return NodeOutOfRangeSnafu { node }.fail();
        }
        if channel > CHANNEL_MASK {
            return ChannelOutOfRangeSnafu { channel }.fail();
        }
        Ok(Self::pack(level, node, channel))
    }

    /// Pack an event without range checks
    ///
    /// Out of range `node` and `channel` values are truncated to their field widths.
    pub const fn pack(level: Level, node: u8, channel: u8) -> Self {
        let s = match level {
            Level::Low => 0,
            Level::High => 1,
        };
        Self((s << LEVEL_SHIFT) | ((node & NODE_MASK) << NODE_SHIFT) | (channel & CHANNEL_MASK))
    }

    /// Create an event from its wire byte
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Get the wire byte
    pub const fn raw(&self) -> u8 {
        self.0
    }

    /// The level the channel's status bit changed to
    pub const fn level(&self) -> Level {
        if self.0 >> LEVEL_SHIFT != 0 {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Return true if this event records the channel starting to detect
    ///
    /// Status bits are active low, so this is a high to low transition.
    pub const fn is_detection(&self) -> bool {
        self.level().is_low()
    }

    /// The index of the node which reported the transition
    pub const fn node(&self) -> u8 {
        (self.0 >> NODE_SHIFT) & NODE_MASK
    }

    /// The channel within the node which changed
    pub const fn channel(&self) -> u8 {
        self.0 & CHANNEL_MASK
    }

    /// Split the event into `(level, node, channel)`
    pub const fn into_parts(self) -> (Level, u8, u8) {
        (self.level(), self.node(), self.channel())
    }
}

impl From<u8> for TransitionEvent {
    fn from(value: u8) -> Self {
        Self::from_raw(value)
    }
}

impl From<TransitionEvent> for u8 {
    fn from(value: TransitionEvent) -> Self {
        value.raw()
    }
}

impl core::fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "node {} channel {} -> {}",
            self.node(),
            self.channel(),
            self.level()
        )
    }
}
