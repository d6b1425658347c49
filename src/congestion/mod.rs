pub mod cubic;
pub mod fixed;
pub mod tracing;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{
    constants::{DEFAULT_CUBIC_BETA, DEFAULT_CUBIC_C, DEFAULT_CUBIC_IW},
    error::{Error, Result},
    utils::run_before_and_after_if_changed,
};

use self::{cubic::Cubic, fixed::FixedWindow, tracing::TracingAvoidance};

/// Congestion avoidance policy. Owns the congestion window, measured in segments.
///
/// The window is only ever changed through [`increase`](Self::increase) and
/// [`decrease`](Self::decrease).
pub trait CongestionAvoidance: Send + core::fmt::Debug {
    /// Maximum number of segments allowed to be outstanding.
    fn cwnd(&self) -> f64;

    /// Called once per successful, non-congestion-marked response.
    fn increase(&mut self, now: Instant, rtt: Duration);

    /// Called at most once per loss or congestion episode. Must leave the window finite
    /// and non-negative.
    fn decrease(&mut self, now: Instant);
}

impl<T: CongestionAvoidance + ?Sized> CongestionAvoidance for Box<T> {
    fn cwnd(&self) -> f64 {
        (**self).cwnd()
    }

    fn increase(&mut self, now: Instant, rtt: Duration) {
        (**self).increase(now, rtt)
    }

    fn decrease(&mut self, now: Instant) {
        (**self).decrease(now)
    }
}

/// A change of the congestion window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowUpdate {
    pub before: f64,
    pub after: f64,
}

struct SharedCongestionInner {
    ca: Mutex<Box<dyn CongestionAvoidance>>,
    cwnd_tx: watch::Sender<f64>,
}

/// Handle to a congestion avoidance policy.
///
/// Cloning it shares the same window, so several fetchers on one path can compete as a
/// single flow. Every change of the window is returned to the caller that caused it and
/// published to receivers obtained with [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct SharedCongestion {
    inner: Arc<SharedCongestionInner>,
}

impl core::fmt::Debug for SharedCongestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.inner.ca.lock())
    }
}

impl SharedCongestion {
    pub fn new(ca: impl CongestionAvoidance + 'static) -> Self {
        Self::from_boxed(Box::new(ca))
    }

    pub fn from_boxed(ca: Box<dyn CongestionAvoidance>) -> Self {
        let (cwnd_tx, _) = watch::channel(ca.cwnd());
        Self {
            inner: Arc::new(SharedCongestionInner {
                ca: Mutex::new(ca),
                cwnd_tx,
            }),
        }
    }

    pub fn cwnd(&self) -> f64 {
        self.inner.ca.lock().cwnd()
    }

    pub fn increase(&self, now: Instant, rtt: Duration) -> Option<WindowUpdate> {
        self.update(|ca| ca.increase(now, rtt))
    }

    pub fn decrease(&self, now: Instant) -> Option<WindowUpdate> {
        self.update(|ca| ca.decrease(now))
    }

    /// Receive the window value after every change.
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.inner.cwnd_tx.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut dyn CongestionAvoidance)) -> Option<WindowUpdate> {
        let mut update = None;
        {
            let mut ca = self.inner.ca.lock();
            run_before_and_after_if_changed(
                &mut *ca,
                |ca| ca.cwnd(),
                |ca| f(&mut **ca),
                |_, before, after| {
                    update = Some(WindowUpdate {
                        before: *before,
                        after: *after,
                    })
                },
            );
        }
        if let Some(u) = update {
            self.inner.cwnd_tx.send_replace(u.after);
        }
        update
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CongestionAvoidanceKind {
    Cubic { iw: f64, c: f64, beta: f64 },
    Fixed { cwnd: f64 },
}

impl Default for CongestionAvoidanceKind {
    fn default() -> Self {
        CongestionAvoidanceKind::Cubic {
            iw: DEFAULT_CUBIC_IW,
            c: DEFAULT_CUBIC_C,
            beta: DEFAULT_CUBIC_BETA,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CongestionConfig {
    pub kind: CongestionAvoidanceKind,
    pub tracing: bool,
}

impl CongestionConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        match self.kind {
            CongestionAvoidanceKind::Cubic { iw, c, beta } => {
                if !(iw > 0. && iw.is_finite()) {
                    return Err(Error::InvalidOptions("cubic iw must be positive"));
                }
                if !(c > 0. && c.is_finite()) {
                    return Err(Error::InvalidOptions("cubic c must be positive"));
                }
                if !(beta > 0. && beta < 1.) {
                    return Err(Error::InvalidOptions("cubic beta must be within (0, 1)"));
                }
            }
            CongestionAvoidanceKind::Fixed { cwnd } => {
                if !(cwnd >= 1. && cwnd.is_finite()) {
                    return Err(Error::InvalidOptions("fixed cwnd must be at least 1"));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn create(&self) -> SharedCongestion {
        let ca: Box<dyn CongestionAvoidance> = match self.kind {
            CongestionAvoidanceKind::Cubic { iw, c, beta } => Box::new(Cubic::new(iw, c, beta)),
            CongestionAvoidanceKind::Fixed { cwnd } => Box::new(FixedWindow::new(cwnd)),
        };
        if self.tracing {
            ::tracing::debug!("enabling congestion tracing");
            return SharedCongestion::from_boxed(Box::new(TracingAvoidance::new(ca)));
        }
        SharedCongestion::from_boxed(ca)
    }
}
