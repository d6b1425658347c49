use std::{
    task::{Context, Poll},
    time::Instant,
};

use crate::message::{Data, FaceCommand, Response};

/// An abstraction for the duplex request/response channel into the network.
///
/// Tests use a mock face.
pub trait Face: Send + Unpin + 'static {
    /// Fire-and-forget. Sending never blocks the fetcher.
    fn send(&mut self, command: FaceCommand);

    /// Ready(None) means the face was closed and no more responses will ever arrive.
    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Response>>;
}

// A trait for mocking time in tests.
pub trait FetchEnvironment: Send + Unpin + 'static {
    fn now(&self) -> Instant;
}

#[derive(Default, Clone, Copy, Debug)]
pub struct DefaultFetchEnvironment {}

impl FetchEnvironment for DefaultFetchEnvironment {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Decides whether a response can be trusted before it completes its segment.
pub trait Verifier: Send + Sync {
    fn verify(&self, data: &Data) -> Result<(), String>;
}

impl<F> Verifier for F
where
    F: Fn(&Data) -> Result<(), String> + Send + Sync,
{
    fn verify(&self, data: &Data) -> Result<(), String> {
        self(data)
    }
}
