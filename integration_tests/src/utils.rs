use std::sync::Mutex;

use chainsense_common::{traits::AttentionLine, traits::ChainBus, Level, TransitionEvent};
use chainsense_node::{Controller, HostMbox};

/// An attention line which records every level it is driven to
#[derive(Debug, Default)]
pub struct RecordingLine {
    levels: Mutex<Vec<Level>>,
}

impl RecordingLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every level driven so far, oldest first
    pub fn levels(&self) -> Vec<Level> {
        self.levels.lock().unwrap().clone()
    }

    /// The level currently driven. A line which was never driven is released (high).
    pub fn level(&self) -> Level {
        self.levels
            .lock()
            .unwrap()
            .last()
            .copied()
            .unwrap_or(Level::High)
    }

    pub fn clear(&self) {
        self.levels.lock().unwrap().clear();
    }
}

impl AttentionLine for RecordingLine {
    fn set_level(&self, level: Level) {
        self.levels.lock().unwrap().push(level);
    }
}

/// Call process once per millisecond until `cond` returns true, or `timeout_ms` elapses
///
/// `now` is advanced in place. Returns true if the condition was met.
pub fn run_until<B: ChainBus>(
    controller: &mut Controller<'_, B>,
    now: &mut u64,
    timeout_ms: u64,
    mut cond: impl FnMut(&Controller<'_, B>) -> bool,
) -> bool {
    let end = *now + timeout_ms;
    while *now < end {
        controller.process(*now);
        *now += 1;
        if cond(controller) {
            return true;
        }
    }
    false
}

/// Call process once per millisecond for `duration_ms`
pub fn run_for<B: ChainBus>(controller: &mut Controller<'_, B>, now: &mut u64, duration_ms: u64) {
    run_until(controller, now, duration_ms, |_| false);
}

/// A host which reads a transition event whenever the attention line is low
///
/// Reads are spaced at least `read_interval_ms` apart, the way a host polling its interrupt input
/// from a timer would.
#[derive(Debug)]
pub struct SimHost {
    read_interval_ms: u64,
    next_read_ms: u64,
    received: Vec<TransitionEvent>,
}

impl SimHost {
    pub fn new(read_interval_ms: u64) -> Self {
        Self {
            read_interval_ms,
            next_read_ms: 0,
            received: Vec::new(),
        }
    }

    /// Read one byte from `mbox` if the line is low and the read interval has elapsed
    ///
    /// Returns the event read, if any.
    pub fn service(
        &mut self,
        now_ms: u64,
        mbox: &HostMbox<'_>,
        line: &RecordingLine,
    ) -> Option<TransitionEvent> {
        if now_ms < self.next_read_ms || line.level() != Level::Low {
            return None;
        }
        self.next_read_ms = now_ms + self.read_interval_ms;
        let event = TransitionEvent::from_raw(mbox.supply_reply());
        self.received.push(event);
        Some(event)
    }

    /// Every event read so far
    pub fn received(&self) -> &[TransitionEvent] {
        &self.received
    }

    /// Remove and return every event read so far
    pub fn take_received(&mut self) -> Vec<TransitionEvent> {
        std::mem::take(&mut self.received)
    }
}

/// Poll the controller and a simulated host together for `duration_ms`
pub fn run_with_host<B: ChainBus>(
    controller: &mut Controller<'_, B>,
    host: &mut SimHost,
    line: &RecordingLine,
    now: &mut u64,
    duration_ms: u64,
) {
    let mbox = controller.mbox();
    let end = *now + duration_ms;
    while *now < end {
        controller.process(*now);
        host.service(*now, mbox, line);
        *now += 1;
    }
}
