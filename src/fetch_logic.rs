//! Segment scheduling state machine.
//!
//! Time is always passed in explicitly, and requests leave as [`Command`]s collected in an
//! outbox, so every transition can be driven step by step without a network or a runtime.
//! [`crate::fetcher::SegmentFetcher`] funnels responses, ticks and cancellation into it.

use std::{
    collections::{BTreeMap, VecDeque},
    ops::Bound,
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use crate::{
    congestion::SharedCongestion,
    error::{Error, OptionContext, Result},
    metrics::METRICS,
    rtte::SharedRttEstimator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// (Re)transmit a request. `rto` is the timeout it was armed with.
    Send {
        segment: u64,
        rto: Duration,
        retx_count: usize,
    },
    Cancel {
        segment: u64,
    },
}

/// A segment requested but not yet completed.
#[derive(Debug)]
struct SegState {
    // Time of the most recent transmission.
    sent_at: Instant,
    rto_deadline: Instant,
    // Number of retransmissions, 0 on the initial request.
    retx_count: usize,
    queued_for_retx: bool,
}

pub(crate) struct FetchLogic {
    state: FetchState,

    // Lowest segment number not dispatched yet. None once u64::MAX went out.
    next_segment: Option<u64>,
    // Inclusive. None until known.
    last_segment: Option<u64>,
    last_segment_from_marker: bool,
    highest_completed: Option<u64>,

    completed: u64,
    retransmissions: u64,

    // Segments with at least one request sent whose response has not arrived.
    pending: BTreeMap<u64, SegState>,
    // Subset of pending whose RTO expired, in expiry order.
    retx_queue: VecDeque<u64>,

    // Window decreases are allowed once per RTO: a single loss episode must not compound.
    next_cwnd_decrease: Option<Instant>,

    retx_limit: usize,
    congestion: SharedCongestion,
    rtte: SharedRttEstimator,

    outbox: Vec<Command>,
}

impl FetchLogic {
    pub fn new(
        first_segment: u64,
        last_segment: Option<u64>,
        retx_limit: usize,
        congestion: SharedCongestion,
        rtte: SharedRttEstimator,
    ) -> Self {
        Self {
            state: FetchState::Running,
            next_segment: Some(first_segment),
            last_segment,
            last_segment_from_marker: false,
            highest_completed: None,
            completed: 0,
            retransmissions: 0,
            pending: BTreeMap::new(),
            retx_queue: VecDeque::new(),
            next_cwnd_decrease: None,
            retx_limit,
            congestion,
            rtte,
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn retransmissions(&self) -> u64 {
        self.retransmissions
    }

    pub fn last_segment(&self) -> Option<u64> {
        self.last_segment
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, segment: u64) -> bool {
        self.pending.contains_key(&segment)
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    /// Stop issuing work and withdraw everything in flight.
    pub fn abort(&mut self) {
        if !self.pending.is_empty() {
            debug!(pending = self.pending.len(), "withdrawing pending requests");
        }
        for segment in std::mem::take(&mut self.pending).into_keys() {
            self.outbox.push(Command::Cancel { segment });
        }
        self.retx_queue.clear();
        if self.state == FetchState::Running {
            self.state = FetchState::Failed;
        }
    }

    /// Mark the fetch failed without withdrawing anything, e.g. when the face is gone.
    pub fn fail(&mut self) {
        self.state = FetchState::Failed;
    }

    /// Handle a response for `segment`.
    ///
    /// `final_segment` is the last segment number declared by the response, if any.
    /// Returns true if the segment got completed by this response. Responses for segments
    /// that aren't pending are ignored.
    pub fn on_response(
        &mut self,
        now: Instant,
        segment: u64,
        congestion_marked: bool,
        final_segment: Option<u64>,
    ) -> bool {
        if self.state != FetchState::Running {
            return false;
        }
        if self.last_segment.is_some_and(|last| segment > last) {
            trace!(segment, "response past the final segment, ignoring");
            return false;
        }
        let Some(st) = self.pending.remove(&segment) else {
            trace!(segment, "response for a segment that isn't pending, ignoring");
            return false;
        };
        if st.queued_for_retx {
            self.retx_queue.retain(|s| *s != segment);
        }

        let rtt = now.saturating_duration_since(st.sent_at);
        if st.retx_count == 0 {
            // Pending count includes this segment.
            self.rtte.push(rtt, self.pending.len() + 1);
            METRICS.rtt.record(rtt.as_secs_f64());
        }

        if congestion_marked {
            METRICS.congestion_marks.increment(1);
            self.decrease_cwnd(now, "congestion mark");
        } else {
            self.congestion.increase(now, rtt);
        }

        self.completed += 1;
        self.highest_completed = Some(self.highest_completed.map_or(segment, |h| h.max(segment)));
        METRICS.segments_received.increment(1);
        trace!(segment, ?rtt, retx_count = st.retx_count, "segment completed");

        if let Some(final_segment) = final_segment {
            self.set_last_segment(final_segment);
        }
        true
    }

    fn set_last_segment(&mut self, value: u64) {
        if self.last_segment == Some(value) {
            return;
        }
        if self.last_segment_from_marker {
            warn!(
                known = ?self.last_segment,
                received = value,
                "conflicting final segment marker, ignoring"
            );
            return;
        }
        if let Some(highest) = self.highest_completed {
            if value < highest {
                warn!(
                    received = value,
                    highest_completed = highest,
                    "final segment marker below an already completed segment, ignoring"
                );
                return;
            }
        }
        if let Some(bound) = self.last_segment {
            if value > bound {
                debug!(
                    received = value,
                    bound, "final segment is past the requested range, keeping the range"
                );
                return;
            }
        }
        debug!(last_segment = value, "final segment learned");
        self.last_segment = Some(value);
        self.last_segment_from_marker = true;
    }

    /// Purge segments past the final one, and queue RTO-expired segments for retransmission.
    pub fn process_rto_expiry(&mut self, now: Instant) -> Result<()> {
        if self.state != FetchState::Running {
            return Ok(());
        }

        if let Some(last) = self.last_segment {
            let beyond: Vec<u64> = self
                .pending
                .range((Bound::Excluded(last), Bound::Unbounded))
                .map(|(segment, _)| *segment)
                .collect();
            if !beyond.is_empty() {
                debug!(count = beyond.len(), last, "purging segments past the final segment");
            }
            for segment in beyond {
                let st = self
                    .pending
                    .remove(&segment)
                    .context("bug: purged segment must be pending")?;
                if st.queued_for_retx {
                    self.retx_queue.retain(|s| *s != segment);
                }
                // Retransmitted requests are left to expire in the network.
                if st.retx_count == 0 {
                    self.outbox.push(Command::Cancel { segment });
                }
            }
        }

        let mut expired = Vec::new();
        for (&segment, st) in self.pending.iter() {
            if st.queued_for_retx || now < st.rto_deadline {
                continue;
            }
            if st.retx_count >= self.retx_limit {
                debug!(segment, retx_count = st.retx_count, "exceeded retransmission limit");
                self.state = FetchState::Failed;
                return Err(Error::ExceededRetxLimit { segment });
            }
            expired.push((segment, st.rto_deadline));
        }

        for (segment, rto_deadline) in expired {
            if self.decrease_cwnd(rto_deadline, "rto") {
                self.rtte.backoff();
            }
            let st = self
                .pending
                .get_mut(&segment)
                .context("bug: expired segment must be pending")?;
            st.queued_for_retx = true;
            self.retx_queue.push_back(segment);
            trace!(segment, "rto expired, queued for retransmission");
        }
        Ok(())
    }

    /// Issue requests while the congestion window allows: retransmissions first, then new
    /// segments. Transitions to Completed when there's nothing left to do.
    pub fn dispatch(&mut self, now: Instant) -> Result<()> {
        if self.state != FetchState::Running {
            return Ok(());
        }

        loop {
            let in_flight = self.pending.len() - self.retx_queue.len();
            if in_flight as f64 >= self.congestion.cwnd() {
                trace!(in_flight, "congestion window full");
                return Ok(());
            }

            if let Some(segment) = self.retx_queue.pop_front() {
                let rto = self.rtte.rto();
                let st = self
                    .pending
                    .get_mut(&segment)
                    .context("bug: retransmit queue out of sync with pending")?;
                st.queued_for_retx = false;
                st.retx_count += 1;
                st.sent_at = now;
                st.rto_deadline = now + rto;
                self.retransmissions += 1;
                METRICS.retransmissions.increment(1);
                debug!(segment, retx_count = st.retx_count, ?rto, "retransmitting");
                self.outbox.push(Command::Send {
                    segment,
                    rto,
                    retx_count: st.retx_count,
                });
                continue;
            }

            if let Some(segment) = self
                .next_segment
                .filter(|s| self.last_segment.is_none_or(|last| *s <= last))
            {
                self.next_segment = segment.checked_add(1);
                let rto = self.rtte.rto();
                self.pending.insert(
                    segment,
                    SegState {
                        sent_at: now,
                        rto_deadline: now + rto,
                        retx_count: 0,
                        queued_for_retx: false,
                    },
                );
                trace!(segment, ?rto, "requesting");
                self.outbox.push(Command::Send {
                    segment,
                    rto,
                    retx_count: 0,
                });
                continue;
            }

            if self.pending.is_empty() {
                debug!(completed = self.completed, "fetch completed");
                self.state = FetchState::Completed;
            }
            return Ok(());
        }
    }

    /// One full step without a response: expiry scan followed by dispatch.
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        self.process_rto_expiry(now)?;
        self.dispatch(now)
    }

    /// Earliest RTO deadline among requests still in the network.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .filter(|st| !st.queued_for_retx)
            .map(|st| st.rto_deadline)
            .min()
    }

    /// Decrease the window if allowed, returns whether it happened.
    fn decrease_cwnd(&mut self, effective_at: Instant, reason: &'static str) -> bool {
        if let Some(next) = self.next_cwnd_decrease {
            if effective_at < next {
                trace!(reason, "window decrease suppressed within the same loss episode");
                return false;
            }
        }
        self.next_cwnd_decrease = Some(effective_at + self.rtte.rto());
        let update = self.congestion.decrease(effective_at);
        METRICS.window_decreases.increment(1);
        debug!(reason, ?update, "window decreased");
        true
    }
}
