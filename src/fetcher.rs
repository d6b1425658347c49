use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
    time::{Duration, Instant},
};

use futures::Stream;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::{Span, debug, error_span, trace};

use crate::{
    congestion::SharedCongestion,
    error::{Error, Result},
    fetch_logic::{Command, FetchLogic, FetchState},
    message::{Data, FaceCommand, Request, Response},
    metrics::METRICS,
    naming::Name,
    opts::{FetchOpts, ValidatedFetchOpts},
    reorder::Ordered,
    rtte::SharedRttEstimator,
    traits::{DefaultFetchEnvironment, Face, FetchEnvironment},
};

/// A segment accepted by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSegment {
    pub segment: u64,
    pub data: Data,
}

/// Number of segments accepted so far. Stays readable after the fetcher is moved or consumed.
#[derive(Debug, Clone, Default)]
pub struct FetchCounter(Arc<AtomicU64>);

impl FetchCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

struct Timer {
    sleep: Option<Pin<Box<tokio::time::Sleep>>>,
}

impl Timer {
    /// Schedule a wakeup after `duration`.
    ///
    /// Returns true if the waker was registered (i.e. it's ok to return Poll::Pending).
    fn arm_in(&mut self, cx: &mut Context<'_>, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        let sleep = self
            .sleep
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
        sleep.as_mut().reset(deadline);
        sleep.as_mut().poll(cx) == Poll::Pending
    }
}

/// Fetches the segments of one named object.
///
/// Requests are issued through the [`Face`] as the congestion window allows, lost ones are
/// retransmitted after their RTO, and accepted segments are yielded in arrival order. Use
/// [`ordered`](Self::ordered), [`chunks`](Self::chunks) or [`into_object`](Self::into_object)
/// for segment order.
///
/// The stream ends after the last segment, or after the first error. Dropping the fetcher
/// withdraws outstanding requests.
pub struct SegmentFetcher<F: Face, Env: FetchEnvironment = DefaultFetchEnvironment> {
    prefix: Name,
    face: F,
    env: Env,
    opts: ValidatedFetchOpts,
    logic: FetchLogic,

    ready: VecDeque<FetchedSegment>,
    error: Option<Error>,
    counter: FetchCounter,

    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    timer: Timer,
    face_closed: bool,
    finished: bool,

    span: Span,
}

impl<F: Face> SegmentFetcher<F, DefaultFetchEnvironment> {
    pub fn new(prefix: Name, face: F, opts: FetchOpts) -> Result<Self> {
        Self::new_with_env(prefix, face, DefaultFetchEnvironment::default(), opts)
    }
}

impl<F: Face, Env: FetchEnvironment> SegmentFetcher<F, Env> {
    pub fn new_with_env(prefix: Name, face: F, env: Env, opts: FetchOpts) -> Result<Self> {
        let opts = opts.validate()?;
        let span = error_span!("fetch", prefix = %prefix);
        let logic = FetchLogic::new(
            opts.first_segment,
            opts.last_segment,
            opts.retx_limit,
            opts.congestion.clone(),
            opts.rtte.clone(),
        );
        span.in_scope(|| {
            debug!(
                first_segment = opts.first_segment,
                last_segment = ?opts.last_segment,
                retx_limit = opts.retx_limit,
                "starting fetch"
            )
        });
        Ok(Self {
            prefix,
            face,
            env,
            cancelled: Box::pin(opts.cancellation_token.clone().cancelled_owned()),
            opts,
            logic,
            ready: VecDeque::new(),
            error: None,
            counter: FetchCounter::default(),
            timer: Timer { sleep: None },
            face_closed: false,
            finished: false,
            span,
        })
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    pub fn state(&self) -> FetchState {
        self.logic.state()
    }

    /// Last segment to fetch, inclusive. None until the final segment marker arrives, unless
    /// the caller bounded the range.
    pub fn last_segment(&self) -> Option<u64> {
        self.logic.last_segment()
    }

    /// Number of segments accepted so far.
    pub fn fetched_count(&self) -> u64 {
        self.counter.get()
    }

    pub fn counter(&self) -> FetchCounter {
        self.counter.clone()
    }

    pub fn congestion(&self) -> &SharedCongestion {
        &self.opts.congestion
    }

    pub fn rtte(&self) -> &SharedRttEstimator {
        &self.opts.rtte
    }

    /// Abort the fetch. Same as cancelling the cancellation token.
    pub fn abort(&self) {
        self.opts.cancellation_token.cancel();
    }

    /// Yield segment data in segment order.
    pub fn ordered(self) -> Ordered<Self> {
        Ordered::new(self.opts.first_segment, self)
    }

    /// Yield segment payloads in segment order.
    pub fn chunks(self) -> impl Stream<Item = Result<Vec<u8>>> + Send + Unpin {
        use futures::StreamExt;
        self.ordered().map(|r| r.map(|data| data.content))
    }

    /// Fetch everything and concatenate the payloads.
    pub async fn into_object(self) -> Result<Vec<u8>> {
        use futures::TryStreamExt;
        self.chunks()
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }

    /// Fetch everything and write the payloads to `dest` in segment order.
    ///
    /// Returns the number of bytes written. `dest` is flushed at the end.
    pub async fn write_to<W: AsyncWrite + Unpin>(self, mut dest: W) -> Result<u64> {
        use futures::StreamExt;
        let mut chunks = self.chunks();
        let mut written = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;
        Ok(written)
    }

    fn segment_of(&self, response: &Response) -> Option<u64> {
        if let Some(token) = response.token {
            return Some(token);
        }
        let name = &response.data.name;
        if name.len() != self.prefix.len() + 1 || !self.prefix.is_prefix_of(name) {
            return None;
        }
        self.opts.segment_convention.parse(name.last()?)
    }

    fn final_segment_of(&self, segment: u64, data: &Data) -> Option<u64> {
        if data.is_final_block() {
            return Some(segment);
        }
        self.opts
            .segment_convention
            .parse(data.final_block_id.as_ref()?)
    }

    fn on_response(&mut self, now: Instant, response: Response) -> Result<()> {
        let Some(segment) = self.segment_of(&response) else {
            trace!(name = %response.data.name, "response doesn't belong to this fetch, ignoring");
            return Ok(());
        };
        if !self.logic.is_pending(segment) {
            trace!(segment, "response for a segment that isn't pending, ignoring");
            return Ok(());
        }
        if !self
            .opts
            .accept_content_types
            .contains(&response.data.content_type)
        {
            debug!(
                segment,
                content_type = response.data.content_type,
                "unexpected content type, ignoring"
            );
            return Ok(());
        }
        if let Some(verifier) = &self.opts.verifier {
            if let Err(reason) = verifier.verify(&response.data) {
                METRICS.verify_failures.increment(1);
                if self.opts.verify_failure_fatal {
                    return Err(Error::Verify { segment, reason });
                }
                debug!(segment, %reason, "verification failed, ignoring response");
                return Ok(());
            }
        }

        let final_segment = self.final_segment_of(segment, &response.data);
        if self
            .logic
            .on_response(now, segment, response.congestion_mark != 0, final_segment)
        {
            self.counter.increment();
            self.ready.push_back(FetchedSegment {
                segment,
                data: response.data,
            });
        }
        Ok(())
    }

    fn process_all_incoming(&mut self, cx: &mut Context<'_>, now: Instant) -> Result<()> {
        while !self.face_closed {
            match self.face.poll_recv(cx) {
                Poll::Ready(Some(response)) => self.on_response(now, response)?,
                Poll::Ready(None) => {
                    debug!("face closed");
                    self.face_closed = true;
                }
                Poll::Pending => break,
            }
        }
        Ok(())
    }

    fn flush_commands(&mut self) {
        for command in self.logic.take_commands() {
            let command = match command {
                Command::Send {
                    segment,
                    rto,
                    retx_count,
                } => {
                    let mut request = Request {
                        name: self.opts.segment_convention.append(&self.prefix, segment),
                        lifetime: rto + self.opts.lifetime_after_rto,
                        token: segment,
                    };
                    if let Some(modify) = &self.opts.modify_request {
                        modify(&mut request);
                        // Correlation relies on the token.
                        request.token = segment;
                    }
                    trace!(segment, retx_count, lifetime = ?request.lifetime, "sending request");
                    METRICS.requests_sent.increment(1);
                    FaceCommand::Send(request)
                }
                Command::Cancel { segment } => {
                    trace!(segment, "withdrawing request");
                    METRICS.cancels_sent.increment(1);
                    FaceCommand::Cancel(Request {
                        name: self.opts.segment_convention.append(&self.prefix, segment),
                        lifetime: Duration::ZERO,
                        token: segment,
                    })
                }
            };
            self.face.send(command);
        }
    }

    fn on_error(&mut self, e: Error) {
        debug!(
            error = %e,
            kind = e.kind(),
            completed = self.logic.completed(),
            pending = self.logic.pending_len(),
            "fetch failed"
        );
        METRICS.fetch_failures.increment(1);
        self.logic.abort();
        self.flush_commands();
        self.error = Some(e);
    }

    fn next_wakeup(&self, now: Instant) -> Instant {
        let tick = now + self.opts.tick_interval;
        match self.logic.next_deadline() {
            Some(deadline) => deadline.min(tick),
            None => tick,
        }
    }
}

// The main loop is here.
impl<F: Face, Env: FetchEnvironment> Stream for SegmentFetcher<F, Env> {
    type Item = Result<FetchedSegment>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let span = this.span.clone();
        let _guard = span.enter();

        macro_rules! bail_if_err {
            ($e:expr) => {
                match $e {
                    Ok(val) => val,
                    Err(e) => {
                        this.on_error(e);
                        continue;
                    }
                }
            };
        }

        let mut now = this.env.now();

        loop {
            // Accepted segments go out before a terminal error or completion.
            if let Some(segment) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(segment)));
            }

            if let Some(e) = this.error.take() {
                this.finished = true;
                return Poll::Ready(Some(Err(e)));
            }

            if this.finished {
                return Poll::Ready(None);
            }

            if this.logic.state() == FetchState::Completed {
                debug!(
                    count = this.counter.get(),
                    retransmissions = this.logic.retransmissions(),
                    "fetch finished"
                );
                this.finished = true;
                return Poll::Ready(None);
            }

            if this.cancelled.as_mut().poll(cx).is_ready() {
                debug!("cancelled");
                this.on_error(Error::Aborted);
                continue;
            }

            bail_if_err!(this.process_all_incoming(cx, now));

            bail_if_err!(this.logic.tick(now));
            this.flush_commands();

            if !this.ready.is_empty() || this.logic.state() != FetchState::Running {
                continue;
            }

            if this.face_closed {
                this.logic.fail();
                this.on_error(Error::Incomplete);
                continue;
            }

            let wakeup = this.next_wakeup(now);
            let duration = wakeup.saturating_duration_since(now);
            if this.timer.arm_in(cx, duration) {
                return Poll::Pending;
            }
            trace!(?duration, "failed arming timer, continuing loop");
            now = this.env.now();
        }
    }
}

impl<F: Face, Env: FetchEnvironment> Drop for SegmentFetcher<F, Env> {
    fn drop(&mut self) {
        let span = self.span.clone();
        let _guard = span.enter();
        self.logic.abort();
        self.flush_commands();
    }
}
