#[cfg(feature = "export-metrics")]
use metrics::{Counter, Histogram, counter, histogram};

#[cfg(not(feature = "export-metrics"))]
use noop::{Counter, Histogram, counter, histogram};

pub struct Metrics {
    pub cancels_sent: Counter,
    pub congestion_marks: Counter,
    pub fetch_failures: Counter,
    pub requests_sent: Counter,
    pub retransmissions: Counter,
    pub rtt: Histogram,
    pub segments_received: Counter,
    pub verify_failures: Counter,
    pub window_decreases: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cancels_sent: counter!("segfetch_cancels_sent"),
            congestion_marks: counter!("segfetch_congestion_marks"),
            fetch_failures: counter!("segfetch_fetch_failures"),
            requests_sent: counter!("segfetch_requests_sent"),
            retransmissions: counter!("segfetch_retransmissions"),
            rtt: histogram!("segfetch_rtt"),
            segments_received: counter!("segfetch_segments_received"),
            verify_failures: counter!("segfetch_verify_failures"),
            window_decreases: counter!("segfetch_window_decreases"),
        }
    }
}

lazy_static::lazy_static! {
    pub static ref METRICS: Metrics = Metrics::new();
}

#[cfg(not(feature = "export-metrics"))]
mod noop {
    pub struct Counter;

    impl Counter {
        #[inline(always)]
        pub fn increment(&self, _value: u64) {}
    }

    pub struct Histogram;

    impl Histogram {
        #[inline(always)]
        pub fn record(&self, _value: f64) {}
    }

    macro_rules! counter {
        ($name:expr) => {
            crate::metrics::noop::Counter
        };
    }

    macro_rules! histogram {
        ($name:expr) => {
            crate::metrics::noop::Histogram
        };
    }

    pub(crate) use counter;
    pub(crate) use histogram;
}
