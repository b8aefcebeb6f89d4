use std::sync::{Arc, Mutex};

use chainsense_common::{constants::values::DISCOVERY_MASK, traits::ChainBus};

/// Error returned by a [`SimChain`] transfer when a fault was injected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InjectedFault;

#[derive(Clone, Copy, Debug)]
struct SimNode {
    /// Channels currently detecting, 1 = detected
    detected: u8,
    /// A raw status reported regardless of mask and detections
    forced_status: Option<u8>,
    /// Latched when select is released
    mask: u8,
    /// The byte currently held in the node's shift register
    shift_reg: u8,
}

impl SimNode {
    fn new() -> Self {
        Self {
            detected: 0,
            forced_status: None,
            mask: DISCOVERY_MASK,
            shift_reg: 0,
        }
    }

    /// Disabled channels read 1, detections on enabled channels read 0
    fn status(&self) -> u8 {
        self.forced_status
            .unwrap_or(!(self.detected & self.mask))
    }
}

#[derive(Debug, Default)]
struct ChainState {
    nodes: Vec<SimNode>,
    selected: bool,
    completed_cycles: usize,
    fail_transfers: usize,
    sent: Vec<u8>,
}

/// A simulated daisy chain of shift register nodes
///
/// The controller's output enters the last node, every node shifts towards node 0, and node 0's
/// register is returned to the controller. On select every node loads its status into its
/// register, and on deselect every node latches its register as its new mask.
///
/// The chain is cheaply cloneable; all clones share the same nodes, so a test can keep one clone
/// to change detections while the controller owns another.
#[derive(Clone, Debug, Default)]
pub struct SimChain {
    state: Arc<Mutex<ChainState>>,
}

impl SimChain {
    /// Create a chain of `n` freshly booted nodes
    pub fn new(n: usize) -> Self {
        let state = ChainState {
            nodes: vec![SimNode::new(); n],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// The number of simulated nodes
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set which channels of `node` are detecting
    pub fn set_detected(&self, node: usize, detected: u8) {
        self.state.lock().unwrap().nodes[node].detected = detected;
    }

    /// Make `node` report `status` regardless of its mask, or restore normal behavior with `None`
    pub fn force_status(&self, node: usize, status: Option<u8>) {
        self.state.lock().unwrap().nodes[node].forced_status = status;
    }

    /// The mask most recently latched by `node`
    pub fn node_mask(&self, node: usize) -> u8 {
        self.state.lock().unwrap().nodes[node].mask
    }

    /// The number of select/deselect cycles completed
    pub fn completed_cycles(&self) -> usize {
        self.state.lock().unwrap().completed_cycles
    }

    /// Return true while the select line is asserted
    pub fn is_selected(&self) -> bool {
        self.state.lock().unwrap().selected
    }

    /// Make the next `count` transfers fail
    pub fn fail_transfers(&self, count: usize) {
        self.state.lock().unwrap().fail_transfers = count;
    }

    /// Remove and return every byte the controller has sent
    pub fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().unwrap().sent)
    }
}

impl ChainBus for SimChain {
    type Error = InjectedFault;

    fn select(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.selected = true;
        for node in state.nodes.iter_mut() {
            node.shift_reg = node.status();
        }
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        if state.selected {
            state.completed_cycles += 1;
            for node in state.nodes.iter_mut() {
                node.mask = node.shift_reg;
            }
        }
        state.selected = false;
        Ok(())
    }

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        let mut state = self.state.lock().unwrap();
        assert!(state.selected, "transfer while chain is not selected");
        if state.fail_transfers > 0 {
            state.fail_transfers -= 1;
            return Err(InjectedFault);
        }
        state.sent.push(byte);

        let nodes = &mut state.nodes;
        if nodes.is_empty() {
            // A bare wire from output to input
            return Ok(byte);
        }
        let out = nodes[0].shift_reg;
        for i in 0..nodes.len() - 1 {
            nodes[i].shift_reg = nodes[i + 1].shift_reg;
        }
        let last = nodes.len() - 1;
        nodes[last].shift_reg = byte;
        Ok(out)
    }
}
