use std::time::{Duration, Instant};

use super::CongestionAvoidance;

/// TCP CUBIC window growth, RFC 8312. All window units are segments.
#[derive(Clone, Copy)]
pub struct Cubic {
    cwnd: f64,
    ssthresh: f64,

    c: f64,
    beta: f64,
    // 3(1-beta)/(1+beta), slope of the TCP-friendly estimate.
    alpha: f64,

    // Time of the last decrease. None until the first one, while ssthresh is infinite.
    t0: Option<Instant>,
    k: f64, // CUBIC: time required to get to w_max
    w_max: f64,
    w_max_last: f64, // fast convergence https://datatracker.ietf.org/doc/html/rfc8312#section-4.6
}

impl core::fmt::Debug for Cubic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cwnd={:.2},ssthresh={:.2},w_max={:.2}",
            self.cwnd, self.ssthresh, self.w_max
        )
    }
}

impl PartialEq for Cubic {
    fn eq(&self, other: &Self) -> bool {
        self.cwnd == other.cwnd && self.ssthresh == other.ssthresh
    }
}

impl Default for Cubic {
    fn default() -> Self {
        use crate::constants::{DEFAULT_CUBIC_BETA, DEFAULT_CUBIC_C, DEFAULT_CUBIC_IW};
        Cubic::new(DEFAULT_CUBIC_IW, DEFAULT_CUBIC_C, DEFAULT_CUBIC_BETA)
    }
}

impl Cubic {
    pub fn new(iw: f64, c: f64, beta: f64) -> Cubic {
        Cubic {
            cwnd: iw,
            ssthresh: f64::INFINITY,

            c,
            beta,
            alpha: 3. * (1. - beta) / (1. + beta),

            t0: None,
            k: 0.,
            w_max: 0.,
            w_max_last: 0.,
        }
    }

    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    // K is the number of seconds required to get back to w_max.
    fn calc_k(&self, w_max: f64) -> f64 {
        (w_max * (1. - self.beta) / self.c).cbrt()
    }

    fn w_cubic(&self, t: Duration) -> f64 {
        self.c * (t.as_secs_f64() - self.k).powi(3) + self.w_max
    }

    fn w_est(&self, t: Duration, rtt: Duration) -> f64 {
        self.w_max * self.beta + self.alpha * (t.as_secs_f64() / rtt.as_secs_f64())
    }
}

impl CongestionAvoidance for Cubic {
    fn cwnd(&self) -> f64 {
        self.cwnd
    }

    fn increase(&mut self, now: Instant, rtt: Duration) {
        let t = match self.t0 {
            // Feedback that predates the last decrease got reordered. t would be negative.
            Some(t0) => match now.checked_duration_since(t0) {
                Some(t) => t,
                None => return,
            },
            None => Duration::ZERO,
        };

        if self.cwnd < self.ssthresh {
            // Slow start
            self.cwnd += 1.;
            return;
        }

        if rtt.is_zero() {
            return;
        }

        let w_cubic = self.w_cubic(t);
        let w_est = self.w_est(t, rtt);
        if w_cubic < w_est {
            // TCP friendly region
            self.cwnd = w_est;
        } else {
            // Concave and convex regions. RFC 8312 uses W_cubic(t+RTT); W_cubic(t) grows a
            // bit faster for request/response traffic.
            self.cwnd += (w_cubic - self.cwnd) / self.cwnd;
        }
    }

    fn decrease(&mut self, now: Instant) {
        self.t0 = Some(now);

        // Fast convergence https://datatracker.ietf.org/doc/html/rfc8312#section-4.6
        if self.cwnd < self.w_max_last {
            self.w_max_last = self.cwnd;
            self.w_max = self.cwnd * (1. + self.beta) / 2.;
        } else {
            self.w_max = self.cwnd;
            self.w_max_last = self.cwnd;
        }

        self.k = self.calc_k(self.w_max);
        self.cwnd *= self.beta;
        self.ssthresh = self.cwnd.max(2.);
    }
}
