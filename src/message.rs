use std::time::Duration;

use crate::naming::{Component, Name};

type Payload = Vec<u8>;

/// A response packet carrying (a segment of) named content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Data {
    pub name: Name,
    pub content_type: u32,
    /// Name component of the last segment of the object, if the producer knows it.
    pub final_block_id: Option<Component>,
    pub content: Payload,
}

impl Data {
    pub fn new(name: Name, content: impl Into<Payload>) -> Self {
        Self {
            name,
            content: content.into(),
            ..Default::default()
        }
    }

    /// True if this packet declares itself the last segment of the object.
    pub fn is_final_block(&self) -> bool {
        match (&self.final_block_id, self.name.last()) {
            (Some(f), Some(last)) => f == last,
            _ => false,
        }
    }
}

/// An outgoing request for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub name: Name,
    pub lifetime: Duration,
    /// Opaque to the network. Echoed back in the matching [`Response`].
    pub token: u64,
}

/// What the fetcher asks the face to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceCommand {
    Send(Request),
    /// Best-effort withdrawal of an outstanding request.
    Cancel(Request),
}

impl FaceCommand {
    pub fn request(&self) -> &Request {
        match self {
            FaceCommand::Send(r) | FaceCommand::Cancel(r) => r,
        }
    }
}

/// An incoming response from the face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Data,
    /// Token of the request this answers, if the face could correlate it.
    pub token: Option<u64>,
    /// Congestion mark set by the network. 0 means none.
    pub congestion_mark: u8,
}

impl Response {
    pub fn new(data: Data, token: Option<u64>) -> Self {
        Self {
            data,
            token,
            congestion_mark: 0,
        }
    }
}
