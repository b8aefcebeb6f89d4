//! Rate limiting for cooperatively polled state machines

/// Decides whether a polled state machine should act on this call
///
/// Each state machine holds its own gate and consults it at the start of every `update`. Polling
/// faster than the gate's interval is a cheap no-op.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickGate {
    interval_ms: u64,
    enabled: bool,
    last_tick_ms: Option<u64>,
}

impl TickGate {
    /// Create an enabled gate which opens at most once every `interval_ms`
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            enabled: true,
            last_tick_ms: None,
        }
    }

    /// Enable or disable the gate. A disabled gate never opens.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Return true if the gate is enabled
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The minimum interval between ticks
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Check the gate at time `now_ms`, consuming a tick if it is open
    ///
    /// The first call on an enabled gate always opens it.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_tick_ms {
            Some(last) if now_ms.wrapping_sub(last) < self.interval_ms => false,
            _ => {
                self.last_tick_ms = Some(now_ms);
                true
            }
        }
    }

    /// Forget the last tick, so the next poll opens the gate
    pub fn reset(&mut self) {
        self.last_tick_ms = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gate_interval() {
        let mut gate = TickGate::new(5);
        assert!(gate.poll(100));
        assert!(!gate.poll(100));
        assert!(!gate.poll(104));
        assert!(gate.poll(105));
        assert!(!gate.poll(106));
        assert!(gate.poll(200));
    }

    #[test]
    fn test_disabled_gate_never_opens() {
        let mut gate = TickGate::new(1);
        gate.set_enabled(false);
        assert!(!gate.poll(0));
        assert!(!gate.poll(1000));
        gate.set_enabled(true);
        assert!(gate.poll(1000));
    }

    #[test]
    fn test_reset() {
        let mut gate = TickGate::new(10);
        assert!(gate.poll(0));
        assert!(!gate.poll(1));
        gate.reset();
        assert!(gate.poll(1));
    }
}
