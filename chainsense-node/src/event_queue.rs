//! A bounded FIFO for transition events
//!
//! The queue is filled by the [`AcquisitionEngine`](crate::AcquisitionEngine) and drained by the
//! [`Bridge`](crate::Bridge). The host bus interrupt also inspects it, to decide whether the
//! attention line can be released, so every access is made inside a critical section.
//!
//! When the queue is full, new events are rejected and counted; events already queued are never
//! overwritten.
use core::cell::RefCell;

use chainsense_common::TransitionEvent;
use critical_section::Mutex;
use heapless::Deque;

/// Access to a transition event FIFO, independent of its capacity
pub trait EventStore: Sync {
    /// Append an event at the tail
    ///
    /// Returns the event back if the queue is full.
    fn push(&self, event: TransitionEvent) -> Result<(), TransitionEvent>;

    /// Remove the event at the head
    fn pop(&self) -> Option<TransitionEvent>;

    /// Return true if no events are queued
    fn is_empty(&self) -> bool;

    /// The number of queued events
    fn len(&self) -> usize;

    /// The number of events rejected because the queue was full
    fn dropped(&self) -> u32;

    /// Discard all queued events
    fn clear(&self);
}

impl core::fmt::Debug for dyn EventStore + '_ {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventStore")
            .field("len", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[derive(Debug)]
struct Inner<const N: usize> {
    events: Deque<TransitionEvent, N>,
    dropped: u32,
}

/// A fixed capacity FIFO of transition events
#[derive(Debug)]
pub struct EventQueue<const N: usize> {
    inner: Mutex<RefCell<Inner<N>>>,
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventQueue<N> {
    /// Create a new, empty EventQueue
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                events: Deque::new(),
                dropped: 0,
            })),
        }
    }

    /// The fixed capacity of the queue
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Return true if the next push will be rejected
    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).events.is_full())
    }
}

impl<const N: usize> EventStore for EventQueue<N> {
    fn push(&self, event: TransitionEvent) -> Result<(), TransitionEvent> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            match inner.events.push_back(event) {
                Ok(()) => Ok(()),
                Err(event) => {
                    inner.dropped = inner.dropped.saturating_add(1);
                    Err(event)
                }
            }
        })
    }

    fn pop(&self) -> Option<TransitionEvent> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).events.pop_front())
    }

    fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).events.is_empty())
    }

    fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).events.len())
    }

    fn dropped(&self) -> u32 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).dropped)
    }

    fn clear(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).events.clear())
    }
}
