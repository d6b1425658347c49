use std::{
    sync::Arc,
    task::{Context, Poll},
};

use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::{
    message::{FaceCommand, Response},
    traits::Face,
};

/// A face that remembers everything sent through it. Responses are injected through the
/// paired [`RememberingFaceHandle`].
pub struct RememberingFace {
    sent: Arc<Mutex<Vec<FaceCommand>>>,
    rx: UnboundedReceiver<Response>,
}

pub struct RememberingFaceHandle {
    sent: Arc<Mutex<Vec<FaceCommand>>>,
    tx: Option<UnboundedSender<Response>>,
}

impl RememberingFace {
    pub fn new() -> (RememberingFace, RememberingFaceHandle) {
        let (tx, rx) = unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            RememberingFace {
                sent: sent.clone(),
                rx,
            },
            RememberingFaceHandle { sent, tx: Some(tx) },
        )
    }
}

impl Face for RememberingFace {
    fn send(&mut self, command: FaceCommand) {
        self.sent.lock().push(command);
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Response>> {
        self.rx.poll_recv(cx)
    }
}

impl RememberingFaceHandle {
    pub fn take_sent(&self) -> Vec<FaceCommand> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn respond(&self, response: Response) {
        self.tx
            .as_ref()
            .expect("face already closed")
            .send(response)
            .unwrap();
    }

    /// No more responses will arrive after this.
    pub fn close(&mut self) {
        self.tx = None;
    }
}
