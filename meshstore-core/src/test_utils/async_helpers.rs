//! Async test helpers
//!
//! Timeouts around store event subscriptions and arbitrary futures.

use std::future::Future;
use tokio::time::{timeout, Duration};

use crate::core_data::{StoreEvent, Subscription};

/// Default timeout duration for tests (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short timeout for tests that should fail fast (100ms)
pub const SHORT_TEST_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Closed,
}

impl std::fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
            RecvTimeoutError::Closed => write!(f, "subscription closed"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Receive the next store event or give up after `duration`
pub async fn recv_event_timeout(
    subscription: &mut Subscription,
    duration: Duration,
) -> Result<StoreEvent, RecvTimeoutError> {
    timeout(duration, subscription.recv())
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .ok_or(RecvTimeoutError::Closed)
}

/// Collect exactly `count` events, each within `per_event_timeout`
pub async fn collect_events(
    subscription: &mut Subscription,
    count: usize,
    per_event_timeout: Duration,
) -> Result<Vec<StoreEvent>, RecvTimeoutError> {
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        events.push(recv_event_timeout(subscription, per_event_timeout).await?);
    }
    Ok(events)
}

/// Helper to assert a future completes within duration
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}
