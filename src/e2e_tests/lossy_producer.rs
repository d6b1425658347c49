use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rand::Rng;
use tracing::trace;

use crate::{
    face::ChannelFaceRemote,
    message::{Data, FaceCommand, Request, Response},
    naming::{Name, Segment3, SegmentConvention},
};

/// Serves one object split in segments, dropping LOSS_PCT percent of requests.
pub struct LossyProducer<const LOSS_PCT: usize> {
    prefix: Name,
    segments: Vec<Vec<u8>>,
    max_delay_ms: u64,
    served: AtomicUsize,
    lost: AtomicUsize,
}

impl<const LOSS_PCT: usize> LossyProducer<LOSS_PCT> {
    pub fn new(prefix: Name, object: &[u8], segment_size: usize, max_delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            prefix,
            segments: object.chunks(segment_size).map(|c| c.to_vec()).collect(),
            max_delay_ms,
            served: AtomicUsize::new(0),
            lost: AtomicUsize::new(0),
        })
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::Relaxed)
    }

    pub fn lost(&self) -> usize {
        self.lost.load(Ordering::Relaxed)
    }

    fn loss(&self) -> bool {
        let loss = rand::rng().random_bool(LOSS_PCT as f64 / 100.);
        if loss {
            self.lost.fetch_add(1, Ordering::Relaxed);
        }
        loss
    }

    fn respond_to(&self, request: &Request) -> Option<Response> {
        if !self.prefix.is_prefix_of(&request.name) {
            return None;
        }
        let segment = Segment3.parse(request.name.last()?)?;
        let content = self.segments.get(usize::try_from(segment).ok()?)?;
        let last = self.segments.len() as u64 - 1;
        let mut data = Data::new(request.name.clone(), content.clone());
        data.final_block_id = Some(Segment3.create(last));
        self.served.fetch_add(1, Ordering::Relaxed);
        Some(Response::new(data, Some(request.token)))
    }

    /// Serve until the fetcher's end of the face is dropped.
    pub async fn serve(self: Arc<Self>, mut remote: ChannelFaceRemote) {
        while let Some(command) = remote.commands.recv().await {
            let FaceCommand::Send(request) = command else {
                continue;
            };
            if self.loss() {
                trace!(name = %request.name, "dropping request");
                continue;
            }
            let Some(response) = self.respond_to(&request) else {
                continue;
            };
            let delay = Duration::from_millis(rand::rng().random_range(0..=self.max_delay_ms));
            let tx = remote.responses.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(response);
            });
        }
    }
}
