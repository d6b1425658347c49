use std::time::{Duration, Instant};

use crate::constants::CONGESTION_TRACING_LOG_LEVEL;

use super::CongestionAvoidance;

/// Logs every window change of the wrapped policy.
#[derive(Debug)]
pub struct TracingAvoidance<I> {
    inner: I,
}

impl<I> TracingAvoidance<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> CongestionAvoidance for TracingAvoidance<I>
where
    I: CongestionAvoidance,
{
    fn cwnd(&self) -> f64 {
        self.inner.cwnd()
    }

    fn increase(&mut self, now: Instant, rtt: Duration) {
        log_every_ms_if_changed!(
            500,
            CONGESTION_TRACING_LOG_LEVEL,
            "increase",
            self,
            |s| s.inner.cwnd(),
            |s| s.inner.increase(now, rtt)
        );
    }

    fn decrease(&mut self, now: Instant) {
        log_if_changed!(
            CONGESTION_TRACING_LOG_LEVEL,
            "decrease",
            self,
            |s| s.inner.cwnd(),
            |s| s.inner.decrease(now)
        );
    }
}
