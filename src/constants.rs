use std::time::Duration;

use tracing::Level;

// Maximum number of retransmissions per segment, excluding the initial request.
pub const DEFAULT_RETX_LIMIT: usize = 15;

// Request lifetime is RTO plus this. Lets a late response still arrive and be useful
// (it completes the segment) even after we decided to retransmit.
pub const DEFAULT_LIFETIME_AFTER_RTO: Duration = Duration::from_millis(1000);

// How often to wake up and scan for RTO expiry when nothing arrives.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(4);

// ContentType=BLOB
pub const DEFAULT_ACCEPT_CONTENT_TYPE: u32 = 0;

pub const CONGESTION_TRACING_LOG_LEVEL: Level = Level::DEBUG;
pub const RTTE_TRACING_LOG_LEVEL: Level = Level::TRACE;

// CUBIC defaults, RFC 8312.
pub const DEFAULT_CUBIC_IW: f64 = 2.;
pub const DEFAULT_CUBIC_C: f64 = 0.4;
pub const DEFAULT_CUBIC_BETA: f64 = 0.7;
