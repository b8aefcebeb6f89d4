//! A library to implement a daisy-chain sensor controller in Rust
//!
//! Chainsense-node runs on the microcontroller sitting between a host and a chain of sensor nodes.
//! It is primarily intended to be run on microcontrollers, and so it is no_std compatible and
//! performs no heap allocation. It is also possible to run it on std environments, for example
//! against a simulated chain. It provides the following features:
//!
//! * Discovers how many nodes are connected in the daisy chain, by shifting zero bytes around the
//!   loop until they come back.
//! * Samples every node at a fixed pace, sending each its channel mask and receiving its channel
//!   status, and queues a *transition event* for every channel that changed.
//! * Answers host requests for the node count and individual node statuses, and accepts new
//!   channel masks.
//! * In *active mode*, streams queued transition events to the host one byte at a time, signalling
//!   each one on an attention line.
//!
//! # Getting Started
//!
//! ## Role Configuration
//!
//! The controller is configured with a [`RoleConfig`](common::RoleConfig), which selects the mask
//! applied to every node after discovery, the host bus address, and the largest chain accepted.
//! Presets exist for each supported peripheral board; with the `std` feature a config can also be
//! loaded from TOML, see the [common::role] module docs.
//!
//! ## Static objects
//!
//! The host bus callbacks run in interrupt context, so the objects they share with the main loop
//! are usually statics: the event queue, the attention line and the [`HostMbox`].
//!
//! ```ignore
//! static EVENTS: EventQueue<EVENT_QUEUE_SIZE> = EventQueue::new();
//! static ATTENTION: StaticCell<PinAttention<Output>> = StaticCell::new();
//! static MBOX: StaticCell<HostMbox<'static>> = StaticCell::new();
//!
//! let attention = ATTENTION.init(PinAttention::new(look_at_me_pin).unwrap());
//! let mbox = MBOX.init(HostMbox::new(&EVENTS, attention));
//! ```
//!
//! ## Instantiating the [`Controller`] object
//!
//! The controller owns the chain bus. The [`hal`] module provides [`SpiChain`], which builds one
//! from any embedded-hal SPI bus and select pin.
//!
//! ```ignore
//! let bus = SpiChain::new(spi, select_pin).unwrap();
//! let config = RoleConfig::for_peripheral(PeripheralKind::ArduinoUno);
//! let mut controller = Controller::new(config, mbox, bus);
//! ```
//!
//! ## Handling the host bus
//!
//! The application has to pass host bus traffic to the mailbox. Bytes written by the host are
//! decoded by [`HostMbox::handle_command`], and every host read is answered with the byte returned
//! by [`HostMbox::supply_reply`]. Both are safe to call directly from the bus interrupt.
//!
//! ```ignore
//! fn on_receive(frame: &[u8]) {
//!     // Malformed frames are logged and counted by the mailbox
//!     MBOX.handle_command(frame).ok();
//! }
//!
//! fn on_request() -> u8 {
//!     MBOX.supply_reply()
//! }
//! ```
//!
//! ## Calling periodic process method
//!
//! To execute the controller logic, [`Controller::process`] must be called periodically with a
//! monotonic millisecond time. It never blocks, and does nothing when called more than once in the
//! same millisecond, so it can be called from a busy loop or from a timer.
//!
//! ```ignore
//! loop {
//!     controller.process(millis());
//! }
//! ```
//!
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod acquisition;
mod bridge;
mod controller;
pub mod event_queue;
pub mod hal;
mod host_mbox;
mod tick_gate;

pub use critical_section;
pub use chainsense_common as common;

pub use acquisition::{AcquisitionEngine, EngineState, MaskError};
pub use bridge::{Bridge, BridgeState};
pub use controller::Controller;
pub use event_queue::{EventQueue, EventStore};
pub use hal::{PinAttention, SpiChain, SpiChainError};
pub use host_mbox::{HostMbox, ReplySlot};
pub use tick_gate::TickGate;
