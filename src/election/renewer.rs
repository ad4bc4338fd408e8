use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

use super::controller::ElectionController;
use crate::util::runnable::PeriodicRunnable;

/// Keeps the lease alive while this instance leads.
///
/// Never acquires: a backup instance only becomes leader through the
/// controller's observation loop.
pub(crate) struct RenewalScheduler {
    controller: Arc<ElectionController>,
}

impl RenewalScheduler {
    pub(crate) fn new(controller: Arc<ElectionController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl PeriodicRunnable for RenewalScheduler {
    async fn run_once(&self) {
        self.controller.renew_once().await;
    }

    async fn delay(&self) -> Duration {
        self.controller.retry_period().await
    }

    async fn before_shutdown_complete(&self) {
        info!(identity = %self.controller.identity(), "stopped renewing lease");
    }
}
