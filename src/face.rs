use std::task::{Context, Poll};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::trace;

use crate::{
    message::{FaceCommand, Response},
    traits::Face,
};

/// The fetcher's end of an in-process face backed by unbounded channels.
pub struct ChannelFace {
    tx: UnboundedSender<FaceCommand>,
    rx: UnboundedReceiver<Response>,
}

/// The network's end of a [`ChannelFace`]: receives commands, sends responses.
///
/// Dropping every response sender closes the face, which fails a fetch that still has
/// segments in flight.
pub struct ChannelFaceRemote {
    pub commands: UnboundedReceiver<FaceCommand>,
    pub responses: UnboundedSender<Response>,
}

impl ChannelFace {
    pub fn pair() -> (ChannelFace, ChannelFaceRemote) {
        let (cmd_tx, cmd_rx) = unbounded_channel();
        let (resp_tx, resp_rx) = unbounded_channel();
        (
            ChannelFace {
                tx: cmd_tx,
                rx: resp_rx,
            },
            ChannelFaceRemote {
                commands: cmd_rx,
                responses: resp_tx,
            },
        )
    }
}

impl Face for ChannelFace {
    fn send(&mut self, command: FaceCommand) {
        if let Err(e) = self.tx.send(command) {
            trace!(command = ?e.0, "face remote is gone, dropping command");
        }
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Response>> {
        self.rx.poll_recv(cx)
    }
}
