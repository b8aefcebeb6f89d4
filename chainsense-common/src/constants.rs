//! Constants defining chain limits, timing, and default addresses
//!
//!

/// The largest number of nodes which may be connected to the chain
///
/// This is limited by the 4-bit node field of a transition event.
pub const MAX_NODES: usize = 16;

/// Default capacity of the transition event queue
pub const EVENT_QUEUE_SIZE: usize = 64;

/// Default address of the controller on the host bus
pub const HOST_BUS_ADDR: u8 = 8;

/// Timing of the chain acquisition cycle, in milliseconds
pub mod timing {
    /// Settle time after asserting chain select, before the transfer
    pub const PRE_TRANSFER_MS: u64 = 10;
    /// Settle time after the transfer, before deasserting chain select
    pub const POST_TRANSFER_MS: u64 = 20;
    /// Settle time after deasserting chain select
    pub const POST_DESELECT_MS: u64 = 20;
    /// Period of the steady state acquisition cycle
    pub const PACE_MS: u64 = 50;
    /// Re-arm delay while the engine is parked in the fault state
    pub const FAULT_DELAY_MS: u64 = 1000;
    /// Time an armed reply is held for the host before it is discarded
    pub const REPLY_TIMEOUT_MS: u64 = 50;
    /// Minimum interval between state machine ticks
    pub const TICK_INTERVAL_MS: u64 = 1;
}

/// Special status and mask values
pub mod values {
    /// Mask sent to every node during discovery. All channels masked off, so every node reports
    /// [`STATUS_IDLE`].
    pub const DISCOVERY_MASK: u8 = 0x00;

    /// Status byte reported by a node with no detections (or all channels masked off)
    pub const STATUS_IDLE: u8 = 0xFF;

    /// Value of the last received discovery byte once the injected mask has travelled the whole
    /// loop
    pub const DISCOVERY_RETURN: u8 = 0x00;

    /// Reply value left behind when an armed reply is cleared
    pub const REPLY_CLEARED: u8 = 0x00;
}
