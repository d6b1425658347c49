use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::event;

use crate::constants::RTTE_TRACING_LOG_LEVEL;

/// External contract of a round-trip-time estimator as consumed by the fetcher.
pub trait RoundTripEstimator: Send + core::fmt::Debug {
    /// Record one RTT observation. `n_pending` is how many requests were outstanding
    /// when the sample was taken.
    ///
    /// Only feed samples from segments answered on their first transmission.
    fn push(&mut self, rtt: Duration, n_pending: usize);

    /// Current retransmission timeout.
    fn rto(&self) -> Duration;

    /// Inflate the RTO after a loss episode.
    fn backoff(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct RttEstimatorOpts {
    pub init_rto: Duration,
    pub min_rto: Duration,
    pub max_rto: Duration,
    pub alpha: f64,
    pub beta: f64,
    pub k: f64,
}

impl Default for RttEstimatorOpts {
    fn default() -> Self {
        Self {
            init_rto: Duration::from_millis(1000),
            min_rto: Duration::from_millis(200),
            max_rto: Duration::from_secs(60),
            alpha: 1. / 8.,
            beta: 1. / 4.,
            k: 4.,
        }
    }
}

/// RFC 6298 estimator. The gains are divided by the number of concurrently pending requests,
/// so that a window full of samples taken at once moves the estimate about as much as a
/// single sample per RTT would.
#[derive(Debug, Clone, Copy)]
pub struct RttEstimator {
    opts: RttEstimatorOpts,
    // Seconds. None until the first sample.
    srtt: Option<f64>,
    rttvar: f64,
    rto: Duration,

    #[cfg(test)]
    forced_timeout: Option<Duration>,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl RttEstimator {
    pub fn new(opts: RttEstimatorOpts) -> Self {
        Self {
            opts,
            srtt: None,
            rttvar: 0.,
            rto: opts.init_rto.max(opts.min_rto).min(opts.max_rto),

            #[cfg(test)]
            forced_timeout: None,
        }
    }

    #[cfg(test)]
    pub fn force_timeout(&mut self, duration: Duration) {
        self.forced_timeout = Some(duration);
    }

    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.srtt.map(Duration::from_secs_f64)
    }

    fn clamp(&self, rto: f64) -> Duration {
        Duration::try_from_secs_f64(rto)
            .unwrap_or(self.opts.max_rto)
            .max(self.opts.min_rto)
            .min(self.opts.max_rto)
    }
}

impl RoundTripEstimator for RttEstimator {
    fn push(&mut self, rtt: Duration, n_pending: usize) {
        let sample = rtt.as_secs_f64();
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = sample / 2.;
            }
            Some(srtt) => {
                let n = n_pending.max(1) as f64;
                let alpha = self.opts.alpha / n;
                let beta = self.opts.beta / n;
                self.rttvar = (1. - beta) * self.rttvar + beta * (srtt - sample).abs();
                self.srtt = Some((1. - alpha) * srtt + alpha * sample);
            }
        }

        let srtt = self.srtt.unwrap_or(sample);
        self.rto = self.clamp(srtt + self.opts.k * self.rttvar);
        event!(
            RTTE_TRACING_LOG_LEVEL,
            ?rtt,
            n_pending,
            srtt = ?Duration::from_secs_f64(srtt),
            rttvar = ?Duration::from_secs_f64(self.rttvar),
            rto = ?self.rto,
            "rtte: sample"
        );
    }

    fn rto(&self) -> Duration {
        #[cfg(test)]
        if let Some(t) = self.forced_timeout {
            return t;
        }
        self.rto
    }

    fn backoff(&mut self) {
        self.rto = self.clamp(self.rto.as_secs_f64() * 2.);
        event!(RTTE_TRACING_LOG_LEVEL, rto = ?self.rto, "rtte: backoff");
    }
}

/// A round-trip estimator that may be shared by several fetchers on one network path.
#[derive(Clone, Debug)]
pub struct SharedRttEstimator {
    inner: Arc<Mutex<Box<dyn RoundTripEstimator>>>,
}

impl Default for SharedRttEstimator {
    fn default() -> Self {
        Self::new(RttEstimator::default())
    }
}

impl SharedRttEstimator {
    pub fn new(rtte: impl RoundTripEstimator + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(rtte))),
        }
    }

    pub fn push(&self, rtt: Duration, n_pending: usize) {
        self.inner.lock().push(rtt, n_pending)
    }

    pub fn rto(&self) -> Duration {
        self.inner.lock().rto()
    }

    pub fn backoff(&self) {
        self.inner.lock().backoff()
    }
}
