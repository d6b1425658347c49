use std::{
    collections::BTreeMap,
    pin::Pin,
    task::{Context, Poll, ready},
};

use futures::{Stream, StreamExt};
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    fetcher::FetchedSegment,
    message::Data,
};

/// Buffers out-of-order items until the gap before them is filled.
#[derive(Debug)]
pub struct Reorder<T> {
    next: u64,
    // Set once u64::MAX was popped.
    exhausted: bool,
    buffer: BTreeMap<u64, T>,
}

impl<T> Reorder<T> {
    pub fn new(first: u64) -> Self {
        Self {
            next: first,
            exhausted: false,
            buffer: BTreeMap::new(),
        }
    }

    /// Segment number that [`pop`](Self::pop) waits for.
    pub fn next_segment(&self) -> u64 {
        self.next
    }

    /// Returns false if the segment was already popped or is already buffered.
    pub fn push(&mut self, segment: u64, item: T) -> bool {
        if self.exhausted || segment < self.next || self.buffer.contains_key(&segment) {
            trace!(segment, next = self.next, "duplicate item, dropping");
            return false;
        }
        self.buffer.insert(segment, item);
        true
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.exhausted {
            return None;
        }
        let item = self.buffer.remove(&self.next)?;
        match self.next.checked_add(1) {
            Some(next) => self.next = next,
            None => self.exhausted = true,
        }
        Some(item)
    }

    /// Number of items waiting for a gap to fill.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Stream adaptor yielding segment data in segment order.
///
/// If the inner stream ends while items are still waiting for a gap to fill, yields
/// [`Error::LeftoverSegments`].
pub struct Ordered<S> {
    inner: S,
    reorder: Reorder<Data>,
    done: bool,
}

impl<S> Ordered<S> {
    pub fn new(first: u64, inner: S) -> Self {
        Self {
            inner,
            reorder: Reorder::new(first),
            done: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S> Stream for Ordered<S>
where
    S: Stream<Item = Result<FetchedSegment>> + Unpin,
{
    type Item = Result<Data>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(data) = this.reorder.pop() {
                return Poll::Ready(Some(Ok(data)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match ready!(this.inner.poll_next_unpin(cx)) {
                Some(Ok(fetched)) => {
                    this.reorder.push(fetched.segment, fetched.data);
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.done = true;
                    if !this.reorder.is_empty() {
                        let leftover = this.reorder.len();
                        debug!(
                            leftover,
                            next = this.reorder.next_segment(),
                            "stream ended with gaps"
                        );
                        this.reorder = Reorder::new(this.reorder.next_segment());
                        return Poll::Ready(Some(Err(Error::LeftoverSegments(leftover))));
                    }
                }
            }
        }
    }
}
