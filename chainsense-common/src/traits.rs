//! Hardware interfaces required by the controller
//!
//! The state machines never touch registers directly. The application provides implementations of
//! these traits, either its own or the embedded-hal adapters in `chainsense-node`.

use crate::level::Level;

/// The synchronous serial bus connecting the controller to the daisy chain
///
/// The chain shares one clock and one select line. Each [`transfer`](ChainBus::transfer) shifts
/// one byte out towards the far end of the chain while shifting one byte in from node 0.
pub trait ChainBus {
    /// The error type returned by bus operations
    type Error: core::fmt::Debug;

    /// Assert the chain select line (active low)
    fn select(&mut self) -> Result<(), Self::Error>;

    /// Deassert the chain select line
    fn deselect(&mut self) -> Result<(), Self::Error>;

    /// Simultaneously send `byte` and receive one byte
    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error>;
}

impl<T: ChainBus + ?Sized> ChainBus for &mut T {
    type Error = T::Error;

    fn select(&mut self) -> Result<(), Self::Error> {
        (**self).select()
    }

    fn deselect(&mut self) -> Result<(), Self::Error> {
        (**self).deselect()
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        (**self).transfer(byte)
    }
}

/// The output pin used to tell the host that data is ready
///
/// It is driven both from the main loop and from the host bus interrupt, so it is accessed through
/// a shared reference and implementations must be interrupt safe.
pub trait AttentionLine: Sync {
    /// Drive the line to `level`
    ///
    /// Low means a reply byte is ready for the host, high means idle.
    fn set_level(&self, level: Level);
}
