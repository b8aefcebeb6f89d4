//! Implements the request/reply bridge towards the host
//!
//! The host is the bus controller, so it can only read one byte at a time when it chooses to. The
//! bridge decides which byte that is:
//!
//! - In request mode, the host writes a command and the reply is armed immediately by the
//!   [`HostMbox`]. The bridge only discards the reply if it is not collected in time.
//! - In active mode, the bridge pops transition events off the queue one at a time, arms each as
//!   the reply and pulls the attention line low to tell the host to come and read it.
//!
//! A reply which is not collected within
//! [`REPLY_TIMEOUT_MS`](chainsense_common::constants::timing::REPLY_TIMEOUT_MS) is replaced by the
//! cleared value and is lost.
use chainsense_common::{
    constants::{
        timing::{REPLY_TIMEOUT_MS, TICK_INTERVAL_MS},
        values::REPLY_CLEARED,
    },
    Level,
};
use defmt_or_log::debug;

use crate::{
    host_mbox::{HostMbox, ReplySlot},
    tick_gate::TickGate,
};

/// States of the [`Bridge`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeState {
    /// Request mode with no reply pending
    #[default]
    Idle,
    /// Active mode, waiting for a transition event
    Active,
    /// Request mode, a reply is waiting to be collected
    AwaitRequest,
    /// Active mode, an event is waiting to be collected
    Avail,
}

/// The state machine which serves replies and streams events to the host
#[derive(Debug)]
pub struct Bridge<'a> {
    state: BridgeState,
    gate: TickGate,
    mbox: &'a HostMbox<'a>,
}

impl<'a> Bridge<'a> {
    /// Create a new bridge serving the replies held in `mbox`
    pub fn new(mbox: &'a HostMbox<'a>) -> Self {
        Self {
            state: BridgeState::Idle,
            gate: TickGate::new(TICK_INTERVAL_MS),
            mbox,
        }
    }

    /// The current state
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Run the state machine
    ///
    /// # Arguments
    /// - `now_ms`: A monotonic time in milliseconds
    ///
    /// # Returns
    ///
    /// False if the tick gate was closed and nothing was done.
    pub fn update(&mut self, now_ms: u64) -> bool {
        if !self.gate.poll(now_ms) {
            return false;
        }

        let prev_state = self.state;
        self.state = match self.state {
            BridgeState::Idle => self.mbox.update_reply(|reply| {
                if reply.active {
                    BridgeState::Active
                } else if reply.armed {
                    reply.deadline_ms = now_ms + REPLY_TIMEOUT_MS;
                    BridgeState::AwaitRequest
                } else {
                    BridgeState::Idle
                }
            }),
            BridgeState::Active => {
                if !self.mbox.active_mode() {
                    BridgeState::Idle
                } else if self.offer_next_event(now_ms) {
                    BridgeState::Avail
                } else {
                    BridgeState::Active
                }
            }
            BridgeState::AwaitRequest => self.mbox.update_reply(|reply| {
                if now_ms >= reply.deadline_ms {
                    discard(reply);
                    if reply.active {
                        BridgeState::Active
                    } else {
                        BridgeState::Idle
                    }
                } else {
                    BridgeState::AwaitRequest
                }
            }),
            BridgeState::Avail => {
                let expired = self.mbox.update_reply(|reply| {
                    if now_ms >= reply.deadline_ms {
                        discard(reply);
                        true
                    } else {
                        false
                    }
                });
                if expired {
                    BridgeState::Active
                } else {
                    critical_section::with(|_| {
                        if !self.mbox.reply().armed {
                            self.offer_next_event(now_ms);
                        }
                    });
                    BridgeState::Avail
                }
            }
        };

        if self.state != prev_state {
            debug!("Bridge {:?} -> {:?}", prev_state, self.state);
        }
        true
    }

    /// Pop the next transition event into the reply slot and signal the host
    ///
    /// Returns false if the queue was empty.
    fn offer_next_event(&self, now_ms: u64) -> bool {
        critical_section::with(|_| {
            let Some(event) = self.mbox.events().pop() else {
                return false;
            };
            self.mbox.update_reply(|reply| {
                reply.value = event.raw();
                reply.armed = true;
                reply.deadline_ms = now_ms + REPLY_TIMEOUT_MS;
            });
            self.mbox.attention().set_level(Level::Low);
            true
        })
    }
}

/// Drop an uncollected reply
fn discard(reply: &mut ReplySlot) {
    if reply.armed {
        debug!("Discarding uncollected reply {:#x}", reply.value);
    }
    reply.value = REPLY_CLEARED;
    reply.armed = false;
}
