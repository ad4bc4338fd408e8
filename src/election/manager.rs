use std::sync::Arc;

use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{error, info};

use super::{controller::ElectionController, renewer::RenewalScheduler, Role};
use crate::{
    config::ElectionConfig,
    interface::notifier::RoleNotifier,
    lease::store::LeaseStore,
    util::{
        clock::{Clock, SystemClock},
        runnable::{run_with_delay, StopSignal},
    },
};

struct Loops {
    renewal: JoinHandle<()>,
    observation: JoinHandle<()>,
}

/// Owns the observation and renewal loops of one contender.
///
/// ```ignore
/// let config = ElectionConfig::from_env()?;
/// let elector = LeaderElector::new(config, store, Arc::new(LogNotifier::new("meta-pod-0")));
/// elector.start().await;
/// // ...
/// elector.stop().await;
/// ```
pub struct LeaderElector {
    controller: Arc<ElectionController>,
    stop_tx: watch::Sender<bool>,
    loops: Mutex<Option<Loops>>,
}

impl LeaderElector {
    pub fn new(
        config: ElectionConfig,
        store: Arc<dyn LeaseStore>,
        notifier: Arc<dyn RoleNotifier>,
    ) -> Self {
        Self::with_clock(config, store, notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ElectionConfig,
        store: Arc<dyn LeaseStore>,
        notifier: Arc<dyn RoleNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            controller: Arc::new(ElectionController::new(&config, store, notifier, clock)),
            stop_tx,
            loops: Mutex::new(None),
        }
    }

    /// Spawns both loops on the current tokio runtime. Does nothing if they are already running.
    pub async fn start(&self) {
        let mut loops = self.loops.lock().await;
        if loops.is_some() {
            info!(identity = %self.controller.identity(), "leader election already started");
            return;
        }

        self.stop_tx.send_replace(false);
        info!(identity = %self.controller.identity(), "starting leader election");

        let observation = tokio::spawn(run_with_delay(
            self.controller.clone(),
            StopSignal::subscribe(&self.stop_tx),
        ));
        let renewal = tokio::spawn(run_with_delay(
            Arc::new(RenewalScheduler::new(self.controller.clone())),
            StopSignal::subscribe(&self.stop_tx),
        ));
        *loops = Some(Loops {
            renewal,
            observation,
        });
    }

    /// Asks both loops to stop and waits for them to exit.
    ///
    /// A cycle already in flight is allowed to finish. Stopping never emits a
    /// role transition.
    pub async fn stop(&self) {
        let Some(loops) = self.loops.lock().await.take() else {
            return;
        };

        self.stop_tx.send_replace(true);
        let results = futures::future::join_all([loops.renewal, loops.observation]).await;
        for result in results {
            if let Err(err) = result {
                error!(identity = %self.controller.identity(), error = %err, "election loop panicked");
            }
        }
        info!(identity = %self.controller.identity(), "stopped leader election");
    }

    pub fn is_leader(&self) -> bool {
        self.controller.is_leader()
    }

    pub fn role(&self) -> Role {
        self.controller.role()
    }

    /// Watches role changes as they happen.
    pub fn subscribe(&self) -> watch::Receiver<Role> {
        self.controller.subscribe()
    }

    pub async fn current_leader(&self) -> Option<String> {
        self.controller.current_leader().await
    }

    pub async fn retry_period(&self) -> std::time::Duration {
        self.controller.retry_period().await
    }

    pub async fn lease_duration(&self) -> std::time::Duration {
        self.controller.lease_duration().await
    }

    pub fn controller(&self) -> &Arc<ElectionController> {
        &self.controller
    }
}
