//! Adapters from embedded-hal peripherals to the controller's hardware traits
//!
//! Most applications will build a [`SpiChain`] from their HAL's SPI bus and a GPIO for the chain
//! select, and a [`PinAttention`] from the GPIO wired to the host's interrupt input.
use core::cell::RefCell;

use chainsense_common::{
    traits::{AttentionLine, ChainBus},
    Level,
};
use critical_section::Mutex;
use defmt_or_log::warn;
use embedded_hal::{digital::OutputPin, spi::SpiBus};

/// Error returned by [`SpiChain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiChainError<S, P> {
    /// The SPI bus failed
    Spi(S),
    /// The select pin could not be driven
    Select(P),
}

/// A [`ChainBus`] built from an SPI bus and a separate select pin
///
/// The bus must be configured by the application for the nodes' SPI mode before it is passed in.
#[derive(Debug)]
pub struct SpiChain<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> SpiChain<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// Create a new chain bus, deasserting the select line
    pub fn new(spi: SPI, mut cs: CS) -> Result<Self, SpiChainError<SPI::Error, CS::Error>> {
        cs.set_high().map_err(SpiChainError::Select)?;
        Ok(Self { spi, cs })
    }

    /// Return the SPI bus and select pin
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI, CS> ChainBus for SpiChain<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    type Error = SpiChainError<SPI::Error, CS::Error>;

    fn select(&mut self) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(SpiChainError::Select)
    }

    fn deselect(&mut self) -> Result<(), Self::Error> {
        // The last byte must be fully clocked out before the nodes latch
        self.spi.flush().map_err(SpiChainError::Spi)?;
        self.cs.set_high().map_err(SpiChainError::Select)
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        let mut buf = [byte];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(SpiChainError::Spi)?;
        Ok(buf[0])
    }
}

/// An [`AttentionLine`] driving an output pin
///
/// The pin is kept behind a critical section mutex, so the line can be driven from the host bus
/// interrupt as well as the main loop.
#[derive(Debug)]
pub struct PinAttention<P> {
    pin: Mutex<RefCell<P>>,
}

impl<P: OutputPin + Send> PinAttention<P> {
    /// Create a new attention line, releasing it (high)
    pub fn new(mut pin: P) -> Result<Self, P::Error> {
        pin.set_high()?;
        Ok(Self {
            pin: Mutex::new(RefCell::new(pin)),
        })
    }

    /// Return the pin
    pub fn release(self) -> P {
        self.pin.into_inner().into_inner()
    }
}

impl<P: OutputPin + Send> AttentionLine for PinAttention<P> {
    fn set_level(&self, level: Level) {
        let result = critical_section::with(|cs| {
            let mut pin = self.pin.borrow_ref_mut(cs);
            match level {
                Level::Low => pin.set_low(),
                Level::High => pin.set_high(),
            }
        });
        if result.is_err() {
            warn!("Failed to drive attention line {:?}", level);
        }
    }
}
