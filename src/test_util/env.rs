use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::traits::FetchEnvironment;

#[derive(Clone)]
pub struct MockFetchEnvironment {
    now: Arc<Mutex<Instant>>,
}

impl MockFetchEnvironment {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn increment_now(&self, dur: Duration) {
        *self.now.lock() += dur;
    }
}

impl FetchEnvironment for MockFetchEnvironment {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
