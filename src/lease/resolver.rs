use std::{future::Future, time::Duration};

use futures_retry::FutureRetry;
use tracing::{debug, warn};

use super::store::StoreError;
use crate::util::retry::FixedCountWithDelayStrategy;

/// How a contested claim ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Our write went through.
    Won,
    /// A fresh read showed someone else holding a live lease.
    Lost,
    /// Every retry hit another conflict.
    Exhausted,
    /// The store failed for a reason other than a conflict.
    Failed(StoreError),
}

impl Resolution {
    pub fn is_won(&self) -> bool {
        matches!(self, Resolution::Won)
    }
}

/// Re-runs a full read-check-write attempt when a conditional write loses a race.
///
/// Each retry waits `backoff` first and must re-read the record; replaying the
/// stale write would only conflict again.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    max_retries: usize,
    backoff: Duration,
}

impl ConflictResolver {
    pub const DEFAULT_MAX_RETRIES: usize = 3;
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

    pub fn new(max_retries: usize, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Runs `attempt` once and keeps retrying it while it fails with
    /// [`StoreError::Conflict`], at most `max_retries` more times.
    ///
    /// `attempt` resolves to `Ok(true)` when the write succeeded and `Ok(false)`
    /// when the lease turned out not to be claimable.
    pub async fn resolve<F, Fut>(&self, lease: &str, attempt: F) -> Resolution
    where
        F: FnMut() -> Fut + Unpin,
        Fut: Future<Output = Result<bool, StoreError>>,
    {
        let strategy = FixedCountWithDelayStrategy::new(self.max_retries, self.backoff);
        match FutureRetry::new(attempt, strategy).await {
            Ok((true, attempts)) => {
                if attempts > 1 {
                    debug!(lease, attempts, "won lease after write conflicts");
                }
                Resolution::Won
            }
            Ok((false, attempts)) => {
                if attempts > 1 {
                    debug!(lease, attempts, "lease taken by a competitor during conflict retries");
                }
                Resolution::Lost
            }
            Err((StoreError::Conflict, attempts)) => {
                warn!(lease, attempts, "gave up on lease after repeated write conflicts");
                Resolution::Exhausted
            }
            Err((error, attempts)) => {
                debug!(lease, attempts, %error, "lease attempt failed");
                Resolution::Failed(error)
            }
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES, Self::DEFAULT_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use tokio::time::Instant;

    use super::*;

    /// Replays a scripted sequence of attempt outcomes and records when each ran.
    struct Script {
        outcomes: Mutex<VecDeque<Result<bool, StoreError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Script {
        fn new(outcomes: Vec<Result<bool, StoreError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        async fn next(&self) -> Result<bool, StoreError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("script ran out of outcomes")
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|pair| pair[1] - pair[0]).collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_needs_no_retry() {
        let script = Script::new(vec![Ok(true)]);
        let resolution = ConflictResolver::default()
            .resolve("lease", || script.next())
            .await;

        assert_eq!(resolution, Resolution::Won);
        assert_eq!(script.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_then_win() {
        let script = Script::new(vec![Err(StoreError::Conflict), Ok(true)]);
        let resolution = ConflictResolver::default()
            .resolve("lease", || script.next())
            .await;

        assert!(resolution.is_won());
        assert_eq!(script.gaps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_then_competitor_holds_it() {
        let script = Script::new(vec![Err(StoreError::Conflict), Ok(false)]);
        let resolution = ConflictResolver::default()
            .resolve("lease", || script.next())
            .await;

        assert_eq!(resolution, Resolution::Lost);
        assert_eq!(script.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_retries() {
        let script = Script::new(vec![Err(StoreError::Conflict); 4]);
        let resolution = ConflictResolver::default()
            .resolve("lease", || script.next())
            .await;

        assert_eq!(resolution, Resolution::Exhausted);
        assert_eq!(script.call_count(), 4);
        assert_eq!(script.gaps(), vec![Duration::from_secs(1); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_abandons_retries() {
        let script = Script::new(vec![
            Err(StoreError::Conflict),
            Err(StoreError::transient("connection reset")),
        ]);
        let resolution = ConflictResolver::default()
            .resolve("lease", || script.next())
            .await;

        assert!(matches!(resolution, Resolution::Failed(StoreError::Transient(_))));
        assert_eq!(script.call_count(), 2);
    }
}
