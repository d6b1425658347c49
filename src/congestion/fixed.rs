use std::time::{Duration, Instant};

use super::CongestionAvoidance;

/// A window that never changes. Useful to pin concurrency, e.g. on a known-good local path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedWindow {
    cwnd: f64,
}

impl FixedWindow {
    pub fn new(cwnd: f64) -> Self {
        Self { cwnd }
    }
}

impl CongestionAvoidance for FixedWindow {
    fn cwnd(&self) -> f64 {
        self.cwnd
    }

    fn increase(&mut self, _now: Instant, _rtt: Duration) {}

    fn decrease(&mut self, _now: Instant) {}
}
