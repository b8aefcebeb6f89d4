//! Implements the mailbox shared between the host bus interrupt and the polling loop
//!
//! The host bus driver calls into a [`HostMbox`] from its receive and request callbacks. These may
//! preempt the main loop at any point, so everything they touch lives in critical section
//! protected cells. The [`Controller`](crate::Controller) reads and writes the same cells from
//! [`Controller::process`](crate::Controller::process).
use chainsense_common::{
    constants::{
        values::{REPLY_CLEARED, STATUS_IDLE},
        MAX_NODES,
    },
    traits::AttentionLine,
    AtomicCell, CommandError, HostRequest, Level,
};
use defmt_or_log::warn;

use crate::event_queue::EventStore;

/// The pending reply to the host
///
/// All four fields are read and written together, so the bridge state machine and the host bus
/// interrupt always see a consistent combination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReplySlot {
    /// The byte returned on the next host read
    pub value: u8,
    /// True when `value` holds a reply which has not been collected
    pub armed: bool,
    /// True while the host has requested event streaming
    pub active: bool,
    /// Time after which an uncollected reply is discarded
    pub deadline_ms: u64,
}

impl ReplySlot {
    const IDLE: ReplySlot = ReplySlot {
        value: REPLY_CLEARED,
        armed: false,
        active: false,
        deadline_ms: 0,
    };
}

/// Copy of the engine's chain state, readable from the interrupt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ChainSnapshot {
    node_count: u8,
    sensors: [u8; MAX_NODES],
}

impl ChainSnapshot {
    const EMPTY: ChainSnapshot = ChainSnapshot {
        node_count: 0,
        sensors: [STATUS_IDLE; MAX_NODES],
    };
}

/// A data structure to be shared between the host bus interrupt and the
/// [`Controller`](crate::Controller)
///
/// Frames written by the host should be passed to [`HostMbox::handle_command`], and the byte
/// returned by [`HostMbox::supply_reply`] should be sent back on every host read.
pub struct HostMbox<'a> {
    reply: AtomicCell<ReplySlot>,
    snapshot: AtomicCell<ChainSnapshot>,
    pending_masks: AtomicCell<[Option<u8>; MAX_NODES]>,
    rejected: AtomicCell<u32>,
    events: &'a dyn EventStore,
    attention: &'a dyn AttentionLine,
}

impl core::fmt::Debug for HostMbox<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostMbox")
            .field("reply", &self.reply.load())
            .field("node_count", &self.snapshot.load().node_count)
            .field("events", &self.events)
            .field("rejected", &self.rejected.load())
            .finish()
    }
}

impl<'a> HostMbox<'a> {
    /// Create a new HostMbox
    ///
    /// # Args
    ///
    /// - `events`: The queue filled by the acquisition engine and drained by the bridge
    /// - `attention`: The line used to tell the host a reply is ready
    pub const fn new(events: &'a dyn EventStore, attention: &'a dyn AttentionLine) -> Self {
        Self {
            reply: AtomicCell::new(ReplySlot::IDLE),
            snapshot: AtomicCell::new(ChainSnapshot::EMPTY),
            pending_masks: AtomicCell::new([None; MAX_NODES]),
            rejected: AtomicCell::new(0),
            events,
            attention,
        }
    }

    /// Decode and act on a frame written by the host
    ///
    /// This should be called from the host bus receive callback. On success the decoded request is
    /// returned; malformed frames are counted and otherwise ignored.
    pub fn handle_command(&self, frame: &[u8]) -> Result<HostRequest, CommandError> {
        let request = match HostRequest::parse(frame) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected host command: {:?}", e);
                self.rejected.update(|n| *n = n.saturating_add(1));
                return Err(e);
            }
        };
        match request {
            HostRequest::GetNodeCount => self.request_node_count(),
            HostRequest::GetNodeSensors { node } => self.request_node_sensors(node),
            HostRequest::SetNodeMask { node, mask } => self.queue_node_mask(node, mask),
            HostRequest::SetActive(active) => self.set_active_mode(active),
        }
        Ok(request)
    }

    /// Arm the node count as the next reply
    ///
    /// Ignored while active mode is set.
    pub fn request_node_count(&self) {
        let count = self.snapshot.load().node_count;
        self.arm_requested(count);
    }

    /// Arm the status byte of `node` as the next reply
    ///
    /// Nodes which were not discovered read as idle (0xFF). Ignored while active mode is set.
    pub fn request_node_sensors(&self, node: u8) {
        let snapshot = self.snapshot.load();
        let status = if node < snapshot.node_count {
            snapshot.sensors[node as usize]
        } else {
            STATUS_IDLE
        };
        self.arm_requested(status);
    }

    fn arm_requested(&self, value: u8) {
        self.reply.update(|reply| {
            if !reply.active {
                reply.value = value;
                reply.armed = true;
            }
        });
    }

    /// Enter or leave active mode
    ///
    /// In active mode the bridge streams queued transition events to the host.
    pub fn set_active_mode(&self, active: bool) {
        self.reply.update(|reply| reply.active = active);
    }

    /// Return true if active mode is set
    pub fn active_mode(&self) -> bool {
        self.reply.load().active
    }

    /// Queue a new sampling mask for `node`
    ///
    /// The mask is handed to the acquisition engine on the next
    /// [`Controller::process`](crate::Controller::process). A later mask for the same node
    /// replaces an earlier one which has not been applied yet.
    pub fn queue_node_mask(&self, node: u8, mask: u8) {
        let queued = self
            .pending_masks
            .update(|masks| match masks.get_mut(node as usize) {
                Some(slot) => {
                    *slot = Some(mask);
                    true
                }
                None => false,
            });
        if !queued {
            warn!("Ignoring mask for node {}", node);
        }
    }

    /// Collect the reply byte
    ///
    /// This should be called from the host bus request callback. The reply is disarmed and
    /// replaced with the cleared value, so each reply is delivered at most once. If no transition
    /// events remain queued, the attention line is released.
    pub fn supply_reply(&self) -> u8 {
        critical_section::with(|_| {
            let value = self.reply.update(|reply| {
                let value = reply.value;
                reply.value = REPLY_CLEARED;
                reply.armed = false;
                reply.deadline_ms = 0;
                value
            });
            if self.events.is_empty() {
                self.attention.set_level(Level::High);
            }
            value
        })
    }

    /// The current pending reply state
    pub fn reply(&self) -> ReplySlot {
        self.reply.load()
    }

    /// The number of host frames which could not be decoded
    pub fn rejected_commands(&self) -> u32 {
        self.rejected.load()
    }

    /// The transition event queue
    pub fn events(&self) -> &'a dyn EventStore {
        self.events
    }

    pub(crate) fn attention(&self) -> &'a dyn AttentionLine {
        self.attention
    }

    /// Read, modify and write the reply slot as one unit
    pub(crate) fn update_reply<R>(&self, f: impl FnOnce(&mut ReplySlot) -> R) -> R {
        self.reply.update(f)
    }

    /// Remove all pending mask updates
    pub(crate) fn take_mask_updates(&self) -> [Option<u8>; MAX_NODES] {
        self.pending_masks.replace([None; MAX_NODES])
    }

    /// Make the engine's node count and status bytes available to the interrupt
    pub(crate) fn publish_snapshot(&self, node_count: u8, statuses: &[u8]) {
        let mut snapshot = ChainSnapshot::EMPTY;
        snapshot.node_count = node_count;
        let len = statuses.len().min(MAX_NODES);
        snapshot.sensors[..len].copy_from_slice(&statuses[..len]);
        self.snapshot.store(snapshot);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event_queue::EventQueue;
    use chainsense_common::{CommandCode, TransitionEvent};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestLine {
        levels: Mutex<Vec<Level>>,
    }

    impl AttentionLine for TestLine {
        fn set_level(&self, level: Level) {
            self.levels.lock().unwrap().push(level);
        }
    }

    #[test]
    fn test_requests_armed_from_snapshot() {
        let queue: EventQueue<4> = EventQueue::new();
        let line = TestLine::default();
        let mbox = HostMbox::new(&queue, &line);

        mbox.request_node_count();
        assert_eq!(0, mbox.supply_reply());

        mbox.publish_snapshot(3, &[0xFF, 0x01, 0x7E]);
        mbox.handle_command(&[CommandCode::GetNodeCount.raw()]).unwrap();
        assert!(mbox.reply().armed);
        assert_eq!(3, mbox.supply_reply());
        assert!(!mbox.reply().armed);

        mbox.handle_command(&[CommandCode::GetNodeSensors.raw(), 2]).unwrap();
        assert_eq!(0x7E, mbox.supply_reply());

        // Absent nodes read as idle
        mbox.request_node_sensors(5);
        assert_eq!(STATUS_IDLE, mbox.supply_reply());
    }

    #[test]
    fn test_requests_ignored_in_active_mode() {
        let queue: EventQueue<4> = EventQueue::new();
        let line = TestLine::default();
        let mbox = HostMbox::new(&queue, &line);
        mbox.publish_snapshot(2, &[0xFF, 0xFF]);

        mbox.handle_command(&[CommandCode::EnableActive.raw()]).unwrap();
        assert!(mbox.active_mode());
        mbox.request_node_count();
        assert!(!mbox.reply().armed);

        mbox.handle_command(&[CommandCode::DisableActive.raw()]).unwrap();
        assert!(!mbox.active_mode());
        mbox.request_node_count();
        assert!(mbox.reply().armed);
    }

    #[test]
    fn test_reply_collected_at_most_once() {
        let queue: EventQueue<4> = EventQueue::new();
        let line = TestLine::default();
        let mbox = HostMbox::new(&queue, &line);
        mbox.publish_snapshot(4, &[0xFF; 4]);
        mbox.request_node_count();
        assert_eq!(4, mbox.supply_reply());
        assert_eq!(REPLY_CLEARED, mbox.supply_reply());
    }

    #[test]
    fn test_supply_releases_line_only_when_queue_empty() {
        let queue: EventQueue<4> = EventQueue::new();
        let line = TestLine::default();
        let mbox = HostMbox::new(&queue, &line);

        queue.push(TransitionEvent::pack(Level::Low, 1, 1)).unwrap();
        mbox.supply_reply();
        assert!(line.levels.lock().unwrap().is_empty());

        queue.pop();
        mbox.supply_reply();
        assert_eq!(vec![Level::High], *line.levels.lock().unwrap());
    }

    #[test]
    fn test_mask_updates() {
        let queue: EventQueue<4> = EventQueue::new();
        let line = TestLine::default();
        let mbox = HostMbox::new(&queue, &line);

        mbox.handle_command(&[CommandCode::SetNodeMask.raw(), 1, 0x0F]).unwrap();
        mbox.handle_command(&[CommandCode::SetNodeMask.raw(), 3, 0x01]).unwrap();
        mbox.handle_command(&[CommandCode::SetNodeMask.raw(), 3, 0x02]).unwrap();

        let masks = mbox.take_mask_updates();
        assert_eq!(Some(0x0F), masks[1]);
        assert_eq!(Some(0x02), masks[3]);
        assert_eq!(2, masks.iter().filter(|m| m.is_some()).count());
        assert!(mbox.take_mask_updates().iter().all(Option::is_none));
    }

    #[test]
    fn test_rejected_commands_counted() {
        let queue: EventQueue<4> = EventQueue::new();
        let line = TestLine::default();
        let mbox = HostMbox::new(&queue, &line);

        assert_eq!(Err(CommandError::EmptyCommand), mbox.handle_command(&[]));
        assert_eq!(
            Err(CommandError::UnknownCommand { code: 0x11 }),
            mbox.handle_command(&[0x11])
        );
        assert!(mbox
            .handle_command(&[CommandCode::GetNodeSensors.raw()])
            .is_err());
        assert_eq!(3, mbox.rejected_commands());
        assert!(!mbox.reply().armed);
    }
}
