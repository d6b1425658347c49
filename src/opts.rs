use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    congestion::{CongestionConfig, SharedCongestion},
    constants::{
        DEFAULT_ACCEPT_CONTENT_TYPE, DEFAULT_LIFETIME_AFTER_RTO, DEFAULT_RETX_LIMIT,
        DEFAULT_TICK_INTERVAL,
    },
    error::{Error, Result},
    message::Request,
    naming::{Segment3, SegmentConvention},
    rtte::{RttEstimator, RttEstimatorOpts, SharedRttEstimator},
    traits::Verifier,
};

/// Called on every outgoing request, retransmissions included.
pub type RequestModifier = Arc<dyn Fn(&mut Request) + Send + Sync>;

#[derive(Default, Clone)]
pub struct FetchOpts {
    /// Segment number range as `[first, last_exclusive)`.
    ///
    /// If `last_exclusive` is None or past the final segment, fetching stops at the final segment.
    pub segment_range: (u64, Option<u64>),

    /// Maximum number of retransmissions per segment, excluding the initial request.
    pub retx_limit: Option<usize>,

    /// Added to the RTO to get the request lifetime.
    pub lifetime_after_rto: Option<Duration>,

    /// Acceptable content types. Responses of other types are treated as never arrived.
    pub accept_content_types: Option<Vec<u32>>,

    /// How often to scan for RTO expiry when no responses arrive.
    pub tick_interval: Option<Duration>,

    /// Congestion avoidance configuration. Ignored if `shared_congestion` is set.
    pub congestion: CongestionConfig,

    /// RTT estimator configuration. Ignored if `shared_rtte` is set.
    pub rtte: RttEstimatorOpts,

    /// Share a congestion window with other fetchers on the same network path.
    pub shared_congestion: Option<SharedCongestion>,

    /// Share an RTT estimator with other fetchers on the same network path.
    pub shared_rtte: Option<SharedRttEstimator>,

    /// Segment number naming convention. Segment3 by default.
    pub segment_convention: Option<Arc<dyn SegmentConvention>>,

    /// Response verifier. No verification by default.
    pub verifier: Option<Arc<dyn Verifier>>,

    /// If true, a verification failure fails the whole fetch. Otherwise the response is
    /// ignored and the segment is retried after its RTO.
    pub verify_failure_fatal: bool,

    /// Inspect or modify each request before it is sent. The token is not modifiable.
    pub modify_request: Option<RequestModifier>,

    /// Cancelling this aborts the fetch.
    pub cancellation_token: CancellationToken,
}

impl FetchOpts {
    pub(crate) fn validate(&self) -> Result<ValidatedFetchOpts> {
        let (first_segment, last_exclusive) = self.segment_range;
        let last_segment = match last_exclusive {
            Some(last_exclusive) if last_exclusive <= first_segment => {
                return Err(Error::InvalidRange {
                    first: first_segment,
                    last_exclusive,
                });
            }
            Some(last_exclusive) => Some(last_exclusive - 1),
            None => None,
        };

        let tick_interval = self.tick_interval.unwrap_or(DEFAULT_TICK_INTERVAL);
        if tick_interval.is_zero() {
            return Err(Error::InvalidOptions("tick_interval = 0"));
        }

        let accept_content_types = self
            .accept_content_types
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_ACCEPT_CONTENT_TYPE]);
        if accept_content_types.is_empty() {
            return Err(Error::InvalidOptions(
                "accept_content_types is empty, nothing would ever be accepted",
            ));
        }

        let congestion = match &self.shared_congestion {
            Some(shared) => shared.clone(),
            None => {
                self.congestion.validate()?;
                self.congestion.create()
            }
        };

        let rtte = match &self.shared_rtte {
            Some(shared) => shared.clone(),
            None => {
                if self.rtte.min_rto > self.rtte.max_rto {
                    return Err(Error::InvalidOptions("min_rto > max_rto"));
                }
                SharedRttEstimator::new(RttEstimator::new(self.rtte))
            }
        };

        Ok(ValidatedFetchOpts {
            first_segment,
            last_segment,
            retx_limit: self.retx_limit.unwrap_or(DEFAULT_RETX_LIMIT),
            lifetime_after_rto: self.lifetime_after_rto.unwrap_or(DEFAULT_LIFETIME_AFTER_RTO),
            accept_content_types,
            tick_interval,
            congestion,
            rtte,
            segment_convention: self
                .segment_convention
                .clone()
                .unwrap_or_else(|| Arc::new(Segment3)),
            verifier: self.verifier.clone(),
            verify_failure_fatal: self.verify_failure_fatal,
            modify_request: self.modify_request.clone(),
            cancellation_token: self.cancellation_token.clone(),
        })
    }
}

#[derive(Clone)]
pub(crate) struct ValidatedFetchOpts {
    pub first_segment: u64,
    // Inclusive. None means unknown until the final segment marker arrives.
    pub last_segment: Option<u64>,
    pub retx_limit: usize,
    pub lifetime_after_rto: Duration,
    pub accept_content_types: Vec<u32>,
    pub tick_interval: Duration,
    pub congestion: SharedCongestion,
    pub rtte: SharedRttEstimator,
    pub segment_convention: Arc<dyn SegmentConvention>,
    pub verifier: Option<Arc<dyn Verifier>>,
    pub verify_failure_fatal: bool,
    pub modify_request: Option<RequestModifier>,
    pub cancellation_token: CancellationToken,
}
