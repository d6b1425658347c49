#[macro_use]
mod macros;

pub mod congestion;
mod constants;
#[cfg(test)]
mod e2e_tests;
mod error;
mod face;
mod fetch_logic;
mod fetcher;
pub mod message;
mod metrics;
pub mod naming;
mod opts;
mod reorder;
pub mod rtte;
#[cfg(test)]
mod test_util;
mod traits;
mod utils;

pub use congestion::{
    CongestionAvoidance, CongestionAvoidanceKind, CongestionConfig, SharedCongestion,
    WindowUpdate,
};
pub use error::{Error, Result};
pub use face::{ChannelFace, ChannelFaceRemote};
pub use fetch_logic::FetchState;
pub use fetcher::{FetchCounter, FetchedSegment, SegmentFetcher};
pub use opts::{FetchOpts, RequestModifier};
pub use reorder::{Ordered, Reorder};
pub use rtte::{RoundTripEstimator, RttEstimator, RttEstimatorOpts, SharedRttEstimator};
pub use traits::{DefaultFetchEnvironment, Face, FetchEnvironment, Verifier};
