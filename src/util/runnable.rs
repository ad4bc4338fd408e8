use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::watch;

/// Receiving half of the stop flag shared by every periodic loop.
#[derive(Clone)]
pub(crate) struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    #[cfg(test)]
    pub(crate) fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    pub(crate) fn subscribe(tx: &watch::Sender<bool>) -> Self {
        Self(tx.subscribe())
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once stop is requested, or once the sender is gone.
    pub(crate) async fn stopped(&mut self) {
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

/// Runs `runnable` until `stop` fires, sleeping for `runnable.delay()` after
/// each pass. A pass that already started always runs to completion.
pub(crate) async fn run_with_delay<T: PeriodicRunnable + ?Sized>(
    runnable: Arc<T>,
    mut stop: StopSignal,
) {
    while !stop.is_stopped() {
        runnable.run_once().await;

        if stop.is_stopped() {
            break;
        }

        let delay = runnable.delay().await;
        let mut shutdown_signal = false;
        tokio::select! {
            _ = stop.stopped() => { shutdown_signal = true }
            _ = tokio::time::sleep(delay) => {}
        }

        if shutdown_signal {
            break;
        }
    }

    runnable.before_shutdown_complete().await;
}

#[async_trait]
pub(crate) trait PeriodicRunnable: Send + Sync {
    async fn run_once(&self);

    /// Pause before the next pass. Re-read every time so the cadence can change.
    async fn delay(&self) -> Duration;

    async fn before_shutdown_complete(&self) {}
}
