//! Implements the core Controller object
//!
use chainsense_common::{traits::ChainBus, RoleConfig};
use defmt_or_log::{info, warn};

use crate::{
    acquisition::{AcquisitionEngine, EngineState},
    bridge::{Bridge, BridgeState},
    host_mbox::HostMbox,
};

/// The main object representing the sensor chain controller
///
/// # Operation
///
/// The controller is run by polling the [`Controller::process`] method in your application's main
/// loop. It is safe to call this method as frequently as you like; both state machines limit
/// themselves to one step per millisecond. All waits are deadlines checked on later calls, so
/// `process` never blocks.
///
/// Host bus callbacks talk to the [`HostMbox`] directly, and may run at any time.
#[derive(Debug)]
pub struct Controller<'a, B: ChainBus> {
    engine: AcquisitionEngine<'a>,
    bridge: Bridge<'a>,
    mbox: &'a HostMbox<'a>,
    bus: B,
}

impl<'a, B: ChainBus> Controller<'a, B> {
    /// Create a new [`Controller`]
    ///
    /// # Arguments
    ///
    /// * `config` - Role constants for this controller
    /// * `mbox` - The mailbox shared with the host bus interrupt
    /// * `bus` - The daisy chain bus
    pub fn new(config: RoleConfig, mbox: &'a HostMbox<'a>, bus: B) -> Self {
        info!(
            "Starting controller at host address {:#x}: default mask {:#x}, up to {} nodes",
            config.bus_address,
            config.default_mask,
            config.node_limit()
        );
        Self {
            engine: AcquisitionEngine::new(config, mbox.events()),
            bridge: Bridge::new(mbox),
            mbox,
            bus,
        }
    }

    /// Run periodic processing
    ///
    /// Pending mask updates from the host are applied, then the acquisition engine and the bridge
    /// each get one chance to step.
    ///
    /// # Arguments
    /// - `now_ms`: A monotonic time in milliseconds. This is used for all settle delays, the
    ///   acquisition pace and the reply timeout.
    ///
    /// # Returns
    ///
    /// True if either state machine stepped.
    pub fn process(&mut self, now_ms: u64) -> bool {
        self.apply_mask_updates();

        let engine_ticked = self.engine.update(now_ms, &mut self.bus);
        if engine_ticked {
            self.mbox
                .publish_snapshot(self.engine.node_count(), self.engine.statuses());
        }

        let bridge_ticked = self.bridge.update(now_ms);
        engine_ticked || bridge_ticked
    }

    fn apply_mask_updates(&mut self) {
        let updates = self.mbox.take_mask_updates();
        for (node, mask) in updates.iter().enumerate() {
            if let Some(mask) = *mask {
                if self.engine.set_node_mask(node as u8, mask).is_err() {
                    warn!("Dropping mask {:#x} for node {}", mask, node);
                }
            }
        }
    }

    /// Restart discovery
    ///
    /// Queued events and the bridge state are kept.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.mbox.publish_snapshot(0, &[]);
    }

    /// The acquisition engine
    pub fn engine(&self) -> &AcquisitionEngine<'a> {
        &self.engine
    }

    /// The current acquisition engine state
    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    /// The current bridge state
    pub fn bridge_state(&self) -> BridgeState {
        self.bridge.state()
    }

    /// The mailbox shared with the host bus interrupt
    pub fn mbox(&self) -> &'a HostMbox<'a> {
        self.mbox
    }

    /// Access the chain bus
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Consume the controller, returning the chain bus
    pub fn release(self) -> B {
        self.bus
    }
}
