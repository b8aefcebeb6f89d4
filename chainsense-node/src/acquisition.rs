//! Implements the daisy chain acquisition engine
//!
//! # Chain topology
//!
//! Clock and select are bussed to every node. The controller's data output goes to the input of
//! the *last* node, each node's output feeds the input of the node before it, and the first node's
//! output returns to the controller. Bytes therefore circulate from the controller, through the
//! last node towards the first node, and back to the controller. On every transfer the controller
//! receives node 0's status first, while the mask it sends first ends up in node 0.
//!
//! # Discovery
//!
//! Nodes boot with their masks set to 0x00, and a zero mask bit forces the corresponding status bit
//! to 1. The engine sends 1, then 2, then 3... zero mask bytes. As long as the number of bytes sent
//! does not exceed the number of nodes, every received byte is 0xFF. Once one more byte is sent
//! than there are nodes, the first zero byte sent has passed through every node and lands in the
//! last position of the receive buffer, so the node count is one less than the number of bytes
//! sent.
//!
//! # Acquisition
//!
//! Every [`PACE_MS`](chainsense_common::constants::timing::PACE_MS) the engine shifts out one mask
//! byte per node while receiving each node's status byte. A 1 bit in the mask enables that channel,
//! a 0 bit in the status reports a detection. Every status bit that differs from the previous cycle
//! is queued as a [`TransitionEvent`].

use chainsense_common::{
    constants::{
        timing::{
            FAULT_DELAY_MS, PACE_MS, POST_DESELECT_MS, POST_TRANSFER_MS, PRE_TRANSFER_MS,
            TICK_INTERVAL_MS,
        },
        values::{DISCOVERY_MASK, DISCOVERY_RETURN, STATUS_IDLE},
        MAX_NODES,
    },
    traits::ChainBus,
    Level, RoleConfig, TransitionEvent,
};
use defmt_or_log::{debug, error, info, warn};
use snafu::Snafu;

use crate::{event_queue::EventStore, tick_gate::TickGate};

/// States of the [`AcquisitionEngine`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineState {
    /// About to start a discovery cycle
    EnumReady,
    /// Select asserted for a discovery cycle, waiting to transfer
    EnumPre,
    /// Discovery bytes transferred, waiting to deassert select
    EnumPost,
    /// Discovery cycle complete, waiting to evaluate the result
    EnumUpdate,
    /// Waiting for the next acquisition cycle
    Pace,
    /// About to start an acquisition cycle
    Ready,
    /// Select asserted, waiting to transfer
    Pre,
    /// Masks and statuses transferred, waiting to deassert select
    Post,
    /// Acquisition cycle complete, waiting to compare statuses
    Update,
    /// Discovery failed. Only a reset leaves this state.
    Fault,
}

impl EngineState {
    /// Return true while the node count is still being discovered
    pub const fn is_discovering(self) -> bool {
        matches!(
            self,
            EngineState::EnumReady
                | EngineState::EnumPre
                | EngineState::EnumPost
                | EngineState::EnumUpdate
        )
    }
}

/// Error returned by [`AcquisitionEngine::set_node_mask`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum MaskError {
    /// Masks cannot be changed until discovery completes
    NotRunning,
    /// The node does not exist on the chain
    #[snafu(display("Node {node} does not exist, chain has {node_count} nodes"))]
    NoSuchNode {
        /// The requested node
        node: u8,
        /// The discovered node count
        node_count: u8,
    },
}

/// The state machine which discovers and samples the daisy chain
///
/// The engine is run by polling [`AcquisitionEngine::update`]. It never blocks: every settle time
/// is implemented as a deadline which is checked on later polls.
#[derive(Debug)]
pub struct AcquisitionEngine<'a> {
    config: RoleConfig,
    state: EngineState,
    gate: TickGate,
    delay_until_ms: u64,
    pacer_ms: u64,
    /// Trial count during discovery, the node count afterwards
    nodes: usize,
    masks: [u8; MAX_NODES + 1],
    rx_buf: [u8; MAX_NODES + 1],
    sensors: [u8; MAX_NODES],
    discovery_cycles: u32,
    events: &'a dyn EventStore,
}

impl<'a> AcquisitionEngine<'a> {
    /// Create a new engine which will push transition events into `events`
    pub fn new(config: RoleConfig, events: &'a dyn EventStore) -> Self {
        Self {
            config,
            state: EngineState::EnumReady,
            gate: TickGate::new(TICK_INTERVAL_MS),
            delay_until_ms: 0,
            pacer_ms: 0,
            nodes: 1,
            masks: [DISCOVERY_MASK; MAX_NODES + 1],
            rx_buf: [0; MAX_NODES + 1],
            sensors: [STATUS_IDLE; MAX_NODES],
            discovery_cycles: 0,
            events,
        }
    }

    /// Return the engine to its power-on state, restarting discovery on the next update
    ///
    /// Queued events are left in place.
    pub fn reset(&mut self) {
        info!("Resetting acquisition engine");
        self.state = EngineState::EnumReady;
        self.gate.reset();
        self.delay_until_ms = 0;
        self.pacer_ms = 0;
        self.nodes = 1;
        self.masks = [DISCOVERY_MASK; MAX_NODES + 1];
        self.rx_buf = [0; MAX_NODES + 1];
        self.sensors = [STATUS_IDLE; MAX_NODES];
        self.discovery_cycles = 0;
    }

    /// The current state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The role configuration in use
    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    /// Return true if discovery failed
    pub fn is_faulted(&self) -> bool {
        self.state == EngineState::Fault
    }

    /// Return true once discovery has completed and the chain is being sampled
    pub fn is_running(&self) -> bool {
        !self.state.is_discovering() && !self.is_faulted()
    }

    /// The number of discovery cycles evaluated since the last reset
    pub fn discovery_cycles(&self) -> u32 {
        self.discovery_cycles
    }

    /// The number of nodes found by discovery
    ///
    /// Returns 0 until discovery has completed, and after a discovery fault.
    pub fn node_count(&self) -> u8 {
        if self.is_running() {
            self.nodes as u8
        } else {
            0
        }
    }

    /// The last status byte received from `node`
    ///
    /// Nodes which do not exist read as idle (0xFF).
    pub fn node_sensors(&self, node: u8) -> u8 {
        self.statuses()
            .get(node as usize)
            .copied()
            .unwrap_or(STATUS_IDLE)
    }

    /// The last status bytes of every discovered node, in chain order
    pub fn statuses(&self) -> &[u8] {
        &self.sensors[..self.node_count() as usize]
    }

    /// The mask which will be sent to `node` on the next cycle
    pub fn node_mask(&self, node: u8) -> Option<u8> {
        if (node as usize) < self.node_count() as usize {
            Some(self.masks[node as usize])
        } else {
            None
        }
    }

    /// Replace the sampling mask of `node`
    ///
    /// The new mask is sent on the next acquisition cycle; no transfer is triggered.
    pub fn set_node_mask(&mut self, node: u8, mask: u8) -> Result<(), MaskError> {
        if !self.is_running() {
            return NotRunningSnafu.fail();
        }
        if node as usize >= self.nodes {
            return NoSuchNodeSnafu {
                node,
                node_count: self.nodes as u8,
            }
            .fail();
        }
        debug!("Node {} mask set to {:#x}", node, mask);
        self.masks[node as usize] = mask;
        Ok(())
    }

    /// Run the state machine
    ///
    /// # Arguments
    /// - `now_ms`: A monotonic time in milliseconds
    /// - `bus`: The chain bus
    ///
    /// # Returns
    ///
    /// False if the tick gate was closed and nothing was done.
    pub fn update<B: ChainBus + ?Sized>(&mut self, now_ms: u64, bus: &mut B) -> bool {
        if !self.gate.poll(now_ms) {
            return false;
        }
        if now_ms < self.delay_until_ms {
            return true;
        }

        match self.state {
            EngineState::EnumReady => {
                if self.pre_transaction(now_ms, bus) {
                    self.state = EngineState::EnumPre;
                }
            }
            EngineState::EnumPre => {
                if self.transaction(now_ms, bus) {
                    self.state = EngineState::EnumPost;
                }
            }
            EngineState::EnumPost => {
                if self.post_transaction(now_ms, bus) {
                    self.state = EngineState::EnumUpdate;
                }
            }
            EngineState::EnumUpdate => self.evaluate_discovery(now_ms),
            EngineState::Pace => {
                if now_ms >= self.pacer_ms {
                    self.pacer_ms += PACE_MS;
                    self.state = EngineState::Ready;
                }
            }
            EngineState::Ready => {
                if self.pre_transaction(now_ms, bus) {
                    self.state = EngineState::Pre;
                }
            }
            EngineState::Pre => {
                if self.transaction(now_ms, bus) {
                    self.state = EngineState::Post;
                }
            }
            EngineState::Post => {
                if self.post_transaction(now_ms, bus) {
                    self.state = EngineState::Update;
                }
            }
            EngineState::Update => {
                self.detect_changes();
                self.state = EngineState::Pace;
            }
            EngineState::Fault => {
                self.delay_until_ms = now_ms + FAULT_DELAY_MS;
            }
        }
        true
    }

    fn evaluate_discovery(&mut self, now_ms: u64) {
        self.discovery_cycles += 1;
        let trial = self.nodes;
        if self.rx_buf[trial - 1] == DISCOVERY_RETURN {
            // The trial count is one higher than the number of nodes
            self.nodes = trial - 1;
            if self.nodes == 0 {
                // Nothing but a wire between output and input
                error!("No nodes found on the chain");
                self.state = EngineState::Fault;
                return;
            }
            info!(
                "Discovered {} nodes after {} cycles",
                self.nodes, self.discovery_cycles
            );
            for mask in &mut self.masks[..self.nodes] {
                *mask = self.config.default_mask;
            }
            // Seed change detection so the first sample only reports real changes
            self.sensors[..self.nodes].copy_from_slice(&self.rx_buf[..self.nodes]);
            self.pacer_ms = now_ms + PACE_MS;
            self.state = EngineState::Pace;
        } else if trial <= self.config.node_limit() {
            debug!("No loopback with {} bytes, trying {}", trial, trial + 1);
            self.nodes = trial + 1;
            self.state = EngineState::EnumReady;
        } else {
            error!(
                "More than {} nodes on the chain, entering fault state",
                self.config.node_limit()
            );
            self.state = EngineState::Fault;
        }
    }

    /// Compare the received statuses with the previous cycle, queueing an event for every changed
    /// bit
    fn detect_changes(&mut self) {
        for node in 0..self.nodes {
            let status = self.rx_buf[node];
            let mut delta = self.sensors[node] ^ status;
            let mut channel = 0;
            while delta != 0 {
                if delta & 0x01 != 0 {
                    let event =
                        TransitionEvent::pack(Level::of_bit(status, channel), node as u8, channel);
                    debug!("Transition {:?}", event);
                    if self.events.push(event).is_err() {
                        warn!("Event queue full, dropped event {:#x}", event.raw());
                    }
                }
                delta >>= 1;
                channel += 1;
            }
            self.sensors[node] = status;
        }
    }

    /// Assert select and allow the nodes to prepare
    fn pre_transaction<B: ChainBus + ?Sized>(&mut self, now_ms: u64, bus: &mut B) -> bool {
        match bus.select() {
            Ok(()) => {
                self.delay_until_ms = now_ms + PRE_TRANSFER_MS;
                true
            }
            Err(_) => {
                warn!("Failed to assert chain select");
                self.abort_cycle(now_ms, bus);
                false
            }
        }
    }

    /// Shift the masks out while receiving statuses
    fn transaction<B: ChainBus + ?Sized>(&mut self, now_ms: u64, bus: &mut B) -> bool {
        for i in 0..self.nodes {
            match bus.transfer(self.masks[i]) {
                Ok(rx) => self.rx_buf[i] = rx,
                Err(_) => {
                    warn!("Chain transfer failed at byte {}", i);
                    self.abort_cycle(now_ms, bus);
                    return false;
                }
            }
        }
        self.delay_until_ms = now_ms + POST_TRANSFER_MS;
        true
    }

    /// Deassert select, letting the nodes latch their new masks
    fn post_transaction<B: ChainBus + ?Sized>(&mut self, now_ms: u64, bus: &mut B) -> bool {
        match bus.deselect() {
            Ok(()) => {
                self.delay_until_ms = now_ms + POST_DESELECT_MS;
                true
            }
            Err(_) => {
                warn!("Failed to deassert chain select");
                self.abort_cycle(now_ms, bus);
                false
            }
        }
    }

    /// Abandon the current cycle after a bus error
    ///
    /// Discovery retries the same trial count; acquisition waits for the next pacer slot. Received
    /// data from the failed cycle is never compared.
    fn abort_cycle<B: ChainBus + ?Sized>(&mut self, now_ms: u64, bus: &mut B) {
        if bus.deselect().is_err() {
            warn!("Failed to deassert chain select after bus error");
        }
        self.delay_until_ms = now_ms + POST_DESELECT_MS;
        self.state = if self.state.is_discovering() {
            EngineState::EnumReady
        } else {
            EngineState::Pace
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event_queue::EventQueue;

    /// A bus which replays scripted status bytes
    #[derive(Default)]
    struct ScriptedBus {
        rx: std::collections::VecDeque<u8>,
        sent: Vec<u8>,
        selected: bool,
        fail_deselects: usize,
    }

    impl ChainBus for ScriptedBus {
        type Error = ();

        fn select(&mut self) -> Result<(), ()> {
            self.selected = true;
            Ok(())
        }

        fn deselect(&mut self) -> Result<(), ()> {
            if self.fail_deselects > 0 {
                self.fail_deselects -= 1;
                return Err(());
            }
            self.selected = false;
            Ok(())
        }

        fn transfer(&mut self, byte: u8) -> Result<u8, ()> {
            assert!(self.selected, "transfer without select");
            self.sent.push(byte);
            Ok(self.rx.pop_front().unwrap_or(STATUS_IDLE))
        }
    }

    /// Run one full cycle (select, transfer, deselect, evaluate) starting at `now`, returning the
    /// time after the cycle
    fn run_cycle(engine: &mut AcquisitionEngine<'_>, bus: &mut ScriptedBus, mut now: u64) -> u64 {
        let start_cycles = engine.discovery_cycles();
        let discovering = engine.state().is_discovering();
        loop {
            engine.update(now, bus);
            now += 1;
            let done = if discovering {
                engine.discovery_cycles() != start_cycles
            } else {
                engine.state() == EngineState::Pace && !bus.selected && bus.rx.is_empty()
            };
            if done {
                return now;
            }
            assert!(now < 1_000_000, "cycle never completed");
        }
    }

    /// Drive discovery to completion with `n` nodes all reporting `status`
    fn discover(engine: &mut AcquisitionEngine<'_>, bus: &mut ScriptedBus, n: usize) -> u64 {
        let mut now = 0;
        for k in 1..=n + 1 {
            bus.rx.extend(core::iter::repeat(STATUS_IDLE).take(k - 1));
            bus.rx.push_back(if k == n + 1 { 0x00 } else { STATUS_IDLE });
            now = run_cycle(engine, bus, now);
        }
        now
    }

    #[test]
    fn test_change_detection_example() {
        let queue: EventQueue<16> = EventQueue::new();
        let mut engine = AcquisitionEngine::new(RoleConfig::default(), &queue);
        let mut bus = ScriptedBus::default();
        let now = discover(&mut engine, &mut bus, 3);
        assert_eq!(3, engine.node_count());

        // First steady cycle: node 2 goes to 0b1011_0000
        bus.rx.extend([STATUS_IDLE, STATUS_IDLE, 0b1011_0000]);
        let now = run_cycle(&mut engine, &mut bus, now);
        while queue.pop().is_some() {}

        // Second cycle: node 2 goes to 0b1010_0100. Bits 2 and 4 differ.
        bus.rx.extend([STATUS_IDLE, STATUS_IDLE, 0b1010_0100]);
        run_cycle(&mut engine, &mut bus, now);
        assert_eq!(Some(TransitionEvent::pack(Level::High, 2, 2)), queue.pop());
        assert_eq!(Some(TransitionEvent::pack(Level::Low, 2, 4)), queue.pop());
        assert_eq!(None, queue.pop());
        assert_eq!(0b1010_0100, engine.node_sensors(2));
    }

    #[test]
    fn test_masks_sent_after_discovery() {
        let queue: EventQueue<16> = EventQueue::new();
        let mut engine = AcquisitionEngine::new(RoleConfig::default(), &queue);
        let mut bus = ScriptedBus::default();
        let now = discover(&mut engine, &mut bus, 2);
        // Discovery only ever sends zero masks
        assert!(bus.sent.iter().all(|&b| b == 0));
        bus.sent.clear();

        engine.set_node_mask(1, 0x81).unwrap();
        bus.rx.extend([STATUS_IDLE, STATUS_IDLE]);
        run_cycle(&mut engine, &mut bus, now);
        assert_eq!(vec![0x03, 0x81], bus.sent);
        assert_eq!(Some(0x81), engine.node_mask(1));
        assert_eq!(None, engine.node_mask(2));
    }

    #[test]
    fn test_set_node_mask_errors() {
        let queue: EventQueue<4> = EventQueue::new();
        let mut engine = AcquisitionEngine::new(RoleConfig::default(), &queue);
        assert_eq!(Err(MaskError::NotRunning), engine.set_node_mask(0, 0xFF));

        let mut bus = ScriptedBus::default();
        discover(&mut engine, &mut bus, 2);
        assert_eq!(
            Err(MaskError::NoSuchNode {
                node: 2,
                node_count: 2
            }),
            engine.set_node_mask(2, 0xFF)
        );
    }

    #[test]
    fn test_settle_delays() {
        let queue: EventQueue<4> = EventQueue::new();
        let mut engine = AcquisitionEngine::new(RoleConfig::default(), &queue);
        let mut bus = ScriptedBus::default();

        assert!(engine.update(0, &mut bus));
        assert_eq!(EngineState::EnumPre, engine.state());
        assert!(bus.selected);
        // Still settling
        engine.update(9, &mut bus);
        assert_eq!(EngineState::EnumPre, engine.state());
        engine.update(10, &mut bus);
        assert_eq!(EngineState::EnumPost, engine.state());
        engine.update(29, &mut bus);
        assert_eq!(EngineState::EnumPost, engine.state());
        engine.update(30, &mut bus);
        assert_eq!(EngineState::EnumUpdate, engine.state());
        assert!(!bus.selected);
        engine.update(49, &mut bus);
        assert_eq!(EngineState::EnumUpdate, engine.state());
        engine.update(50, &mut bus);
        assert_eq!(EngineState::EnumReady, engine.state());
        assert_eq!(1, engine.discovery_cycles());
    }

    #[test]
    fn test_tick_gate_limits_rate() {
        let queue: EventQueue<4> = EventQueue::new();
        let mut engine = AcquisitionEngine::new(RoleConfig::default(), &queue);
        let mut bus = ScriptedBus::default();
        assert!(engine.update(5, &mut bus));
        assert!(!engine.update(5, &mut bus));
        assert!(engine.update(6, &mut bus));
    }

    #[test]
    fn test_reset_restarts_discovery() {
        let queue: EventQueue<4> = EventQueue::new();
        let mut engine = AcquisitionEngine::new(RoleConfig::default(), &queue);
        let mut bus = ScriptedBus::default();
        discover(&mut engine, &mut bus, 2);
        assert!(engine.is_running());

        engine.reset();
        assert_eq!(EngineState::EnumReady, engine.state());
        assert_eq!(0, engine.node_count());
        assert_eq!(0, engine.discovery_cycles());
        discover(&mut engine, &mut bus, 4);
        assert_eq!(4, engine.node_count());
    }

    #[test]
    fn test_unclamped_node_ceiling_faults() {
        let queue: EventQueue<4> = EventQueue::new();
        let config = RoleConfig {
            max_nodes: 24,
            ..Default::default()
        };
        let mut engine = AcquisitionEngine::new(config, &queue);
        // No loopback ever arrives
        let mut bus = ScriptedBus::default();
        let mut now = 0;
        while !engine.is_faulted() {
            assert!(engine.discovery_cycles() <= MAX_NODES as u32 + 1);
            now = run_cycle(&mut engine, &mut bus, now);
        }
        assert_eq!(MAX_NODES as u32 + 1, engine.discovery_cycles());
        assert_eq!(0, engine.node_count());
    }

    #[test]
    fn test_failed_deselect_retries_trial() {
        let queue: EventQueue<4> = EventQueue::new();
        let mut engine = AcquisitionEngine::new(RoleConfig::default(), &queue);
        let mut bus = ScriptedBus {
            fail_deselects: 2,
            ..Default::default()
        };
        engine.update(0, &mut bus);
        engine.update(10, &mut bus);
        assert_eq!(EngineState::EnumPost, engine.state());
        // Both the deselect and the deselect while aborting fail
        engine.update(30, &mut bus);
        assert_eq!(EngineState::EnumReady, engine.state());
        assert_eq!(0, bus.fail_deselects);
        assert_eq!(0, engine.discovery_cycles());

        run_cycle(&mut engine, &mut bus, 31);
        assert_eq!(1, engine.discovery_cycles());
        assert_eq!(EngineState::EnumReady, engine.state());
        assert!(!bus.selected);
    }
}
