mod lossy_producer;

use std::time::Duration;

use lossy_producer::LossyProducer;
use tokio::time::timeout;
use tracing::{Instrument, error_span, info};

use crate::{
    ChannelFace, Error, FetchOpts, SegmentFetcher,
    congestion::{CongestionConfig, SharedCongestion, cubic::Cubic},
    naming::Name,
    rtte::{RttEstimator, RttEstimatorOpts, SharedRttEstimator},
    test_util::setup_test_logging,
};

pub const TIMEOUT: Duration = Duration::from_secs(50);

fn make_object(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn fast_rtte() -> RttEstimatorOpts {
    RttEstimatorOpts {
        init_rto: Duration::from_millis(50),
        min_rto: Duration::from_millis(20),
        max_rto: Duration::from_secs(1),
        ..Default::default()
    }
}

async fn fetch_object<const LOSS_PCT: usize>(
    name: &str,
    object: &[u8],
    opts: FetchOpts,
) -> crate::Result<Vec<u8>> {
    let prefix = Name::from_generic([name]);
    let producer = LossyProducer::<LOSS_PCT>::new(prefix.clone(), object, 100, 5);
    let (face, remote) = ChannelFace::pair();
    tokio::spawn(
        producer
            .clone()
            .serve(remote)
            .instrument(error_span!("producer", name)),
    );

    let fetcher = SegmentFetcher::new(prefix, face, opts)?;
    let counter = fetcher.counter();
    let result = fetcher.into_object().await;
    info!(
        name,
        count = counter.get(),
        served = producer.served(),
        lost = producer.lost(),
        "fetch done"
    );
    result
}

#[tokio::test]
async fn test_e2e_fetch_no_loss() {
    setup_test_logging();
    let object = make_object(10_000);
    let fetched = timeout(
        TIMEOUT,
        fetch_object::<0>(
            "no-loss",
            &object,
            FetchOpts {
                rtte: fast_rtte(),
                ..Default::default()
            },
        ),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(fetched, object);
}

#[tokio::test]
async fn test_e2e_fetch_lossy() {
    setup_test_logging();
    let object = make_object(20_000);
    let fetched = timeout(
        TIMEOUT,
        fetch_object::<5>(
            "lossy",
            &object,
            FetchOpts {
                rtte: fast_rtte(),
                congestion: CongestionConfig {
                    tracing: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        ),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(fetched, object);
}

#[tokio::test]
async fn test_e2e_fetch_range() {
    setup_test_logging();
    let object = make_object(1_000);
    let fetched = timeout(
        TIMEOUT,
        fetch_object::<0>(
            "range",
            &object,
            FetchOpts {
                segment_range: (2, Some(5)),
                rtte: fast_rtte(),
                ..Default::default()
            },
        ),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(fetched, &object[200..500]);
}

#[tokio::test]
async fn test_e2e_shared_congestion() {
    setup_test_logging();
    let congestion = SharedCongestion::new(Cubic::default());
    let rtte = SharedRttEstimator::new(RttEstimator::new(fast_rtte()));
    let window = congestion.subscribe();

    let a = make_object(5_000);
    let b: Vec<u8> = make_object(7_000).into_iter().rev().collect();
    let opts = FetchOpts {
        shared_congestion: Some(congestion.clone()),
        shared_rtte: Some(rtte),
        ..Default::default()
    };
    let (fa, fb) = timeout(
        TIMEOUT,
        futures::future::join(
            fetch_object::<2>("a", &a, opts.clone()),
            fetch_object::<2>("b", &b, opts),
        ),
    )
    .await
    .unwrap();
    assert_eq!(fa.unwrap(), a);
    assert_eq!(fb.unwrap(), b);
    assert!(window.has_changed().unwrap());
}

#[tokio::test]
async fn test_e2e_total_loss_fails() {
    setup_test_logging();
    let object = make_object(1_000);
    let result = timeout(
        TIMEOUT,
        fetch_object::<100>(
            "black-hole",
            &object,
            FetchOpts {
                retx_limit: Some(2),
                rtte: fast_rtte(),
                ..Default::default()
            },
        ),
    )
    .await
    .unwrap();
    assert!(
        matches!(result, Err(Error::ExceededRetxLimit { segment: 0 | 1 })),
        "{result:?}"
    );
}

#[tokio::test]
async fn test_e2e_cancel() {
    setup_test_logging();
    let object = make_object(1_000);
    let token = tokio_util::sync::CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let result = timeout(
        TIMEOUT,
        fetch_object::<100>(
            "cancelled",
            &object,
            FetchOpts {
                rtte: fast_rtte(),
                cancellation_token: token,
                ..Default::default()
            },
        ),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(Error::Aborted)), "{result:?}");
}
