use std::time::Duration;

use futures_retry::{ErrorHandler, RetryPolicy};

use crate::lease::store::StoreError;

/// Retries write conflicts a fixed number of times with a fixed delay in
/// between; every other error is forwarded immediately.
pub(crate) struct FixedCountWithDelayStrategy {
    max_retries: usize,
    delay: Duration,
}

impl FixedCountWithDelayStrategy {
    pub(crate) fn new(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

impl ErrorHandler<StoreError> for FixedCountWithDelayStrategy {
    type OutError = StoreError;

    // `attempt` counts from 1, so the first call follows the initial try.
    fn handle(&mut self, attempt: usize, e: StoreError) -> RetryPolicy<StoreError> {
        if attempt > self.max_retries {
            return RetryPolicy::ForwardError(e);
        }

        if e.is_conflict() {
            RetryPolicy::WaitRetry(self.delay)
        } else {
            RetryPolicy::ForwardError(e)
        }
    }
}
