use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::{ElectionState, Role};
use crate::{
    config::ElectionConfig,
    interface::notifier::RoleNotifier,
    lease::{
        classify,
        resolver::{ConflictResolver, Resolution},
        store::{LeaseStore, StoreError},
        LeaseRecord, LeaseVersion, VersionedLease,
    },
    util::{clock::Clock, runnable::PeriodicRunnable},
};

/// Runs the acquisition decision and the role state machine for one contender.
///
/// `role` is held for the whole of a cycle, store round trips included, so the
/// observation loop and the renewal loop never interleave a promotion with a
/// demotion. `state` is only ever locked briefly, and only while `role` is
/// either held or not needed.
pub struct ElectionController {
    identity: String,
    lease: String,
    store: Arc<dyn LeaseStore>,
    notifier: Arc<dyn RoleNotifier>,
    clock: Arc<dyn Clock>,
    resolver: ConflictResolver,
    store_timeout: Duration,

    role: Mutex<Role>,
    state: Mutex<ElectionState>,
    role_tx: watch::Sender<Role>,
}

impl ElectionController {
    pub fn new(
        config: &ElectionConfig,
        store: Arc<dyn LeaseStore>,
        notifier: Arc<dyn RoleNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (role_tx, _) = watch::channel(Role::Backup);
        Self {
            identity: config.identity().to_string(),
            lease: config.lease_key(),
            store,
            notifier,
            clock,
            resolver: config.conflict_resolver(),
            store_timeout: config.store_timeout(),
            role: Mutex::new(Role::Backup),
            state: Mutex::new(ElectionState::new(
                config.lease_duration(),
                config.retry_period(),
            )),
            role_tx,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn role(&self) -> Role {
        *self.role_tx.borrow()
    }

    pub fn is_leader(&self) -> bool {
        self.role().is_leader()
    }

    pub fn subscribe(&self) -> watch::Receiver<Role> {
        self.role_tx.subscribe()
    }

    pub async fn retry_period(&self) -> Duration {
        self.state.lock().await.retry_period
    }

    pub async fn lease_duration(&self) -> Duration {
        self.state.lock().await.lease_duration
    }

    /// The live holder seen by the most recent status check.
    pub async fn current_leader(&self) -> Option<String> {
        self.state.lock().await.observed_leader.clone()
    }

    /// Claims the lease, or renews it if we already hold it.
    ///
    /// Write conflicts are retried through the [`ConflictResolver`]; every other
    /// failure is logged and reported as `false` for this cycle.
    pub async fn try_acquire_or_renew(&self, is_renewal: bool) -> bool {
        let resolution = self
            .resolver
            .resolve(&self.lease, || self.attempt(is_renewal))
            .await;
        match resolution {
            Resolution::Won => true,
            Resolution::Lost | Resolution::Exhausted => false,
            Resolution::Failed(error) => {
                warn!(
                    identity = %self.identity,
                    lease = %self.lease,
                    is_renewal,
                    %error,
                    "failed to update lease"
                );
                false
            }
        }
    }

    /// One read-check-write pass. `Ok(false)` means someone else holds a live lease.
    async fn attempt(&self, is_renewal: bool) -> Result<bool, StoreError> {
        let current = self.read().await?;
        let now = self.clock.now();

        let lease_duration = {
            let mut state = self.state.lock().await;
            self.adopt_timing(&mut state, current.as_ref());
            state.lease_duration
        };

        let status = classify(
            current.as_ref().map(|lease| &lease.record),
            now,
            &self.identity,
            lease_duration,
        );
        if !status.is_claimable() {
            debug!(
                identity = %self.identity,
                lease = %self.lease,
                holder = ?current.as_ref().and_then(|lease| lease.record.holder()),
                lease_duration_secs = lease_duration.as_secs(),
                renew_time = ?current.as_ref().and_then(|lease| lease.record.renew_time),
                %now,
                "lease is held and not expired"
            );
            return Ok(false);
        }

        let (mut record, version) = match current {
            Some(VersionedLease { record, version }) => (record, Some(version)),
            None => (LeaseRecord::default(), None),
        };
        // A renewal keeps our acquire_time only if the record still names us.
        let keeps_acquire_time = is_renewal
            && record.holder() == Some(self.identity.as_str())
            && record.acquire_time.is_some();
        record.holder_identity = Some(self.identity.clone());
        record.lease_duration_seconds = Some(lease_duration.as_secs());
        record.renew_time = Some(now);
        if !keeps_acquire_time {
            record.acquire_time = Some(now);
        }

        let written = self.write(version.as_ref(), record).await?;
        debug!(
            identity = %self.identity,
            lease = %self.lease,
            version = %written,
            is_renewal,
            previous = ?status,
            %now,
            "updated lease"
        );
        Ok(true)
    }

    /// Cheap read-only check of who holds a live lease right now.
    pub async fn check_leader_status(&self) -> Result<Option<String>, StoreError> {
        let current = self.read().await?;
        let now = self.clock.now();

        let mut state = self.state.lock().await;
        self.adopt_timing(&mut state, current.as_ref());
        let status = classify(
            current.as_ref().map(|lease| &lease.record),
            now,
            &self.identity,
            state.lease_duration,
        );
        let leader = status.live_holder(&self.identity).map(str::to_owned);
        state.observed_leader = leader.clone();
        Ok(leader)
    }

    /// One pass of the observation loop.
    pub async fn observe_once(&self) {
        let mut role = self.role.lock().await;

        let leader = match self.check_leader_status().await {
            Ok(leader) => leader,
            Err(error) => {
                warn!(
                    identity = %self.identity,
                    lease = %self.lease,
                    %error,
                    "failed to check leader status, skipping cycle"
                );
                return;
            }
        };

        if leader.as_deref() == Some(self.identity.as_str()) {
            if *role == Role::Backup {
                self.transition(&mut role, Role::Leader).await;
            }
        } else if *role == Role::Leader {
            self.transition(&mut role, Role::Backup).await;
        } else if self.try_acquire_or_renew(false).await {
            self.state.lock().await.observed_leader = Some(self.identity.clone());
            self.transition(&mut role, Role::Leader).await;
        }
    }

    /// One tick of the renewal loop: keep the lease while leader, step down if that fails.
    pub async fn renew_once(&self) {
        let mut role = self.role.lock().await;
        if *role != Role::Leader {
            return;
        }

        if !self.try_acquire_or_renew(true).await {
            warn!(
                identity = %self.identity,
                lease = %self.lease,
                "failed to renew lease, becoming backup"
            );
            self.transition(&mut role, Role::Backup).await;
        }
    }

    /// Takes over the lease duration a record carries, if it carries one.
    fn adopt_timing(&self, state: &mut ElectionState, current: Option<&VersionedLease>) {
        let Some(seconds) = current.and_then(|lease| lease.record.lease_duration_seconds) else {
            return;
        };
        if let Some(retry_period) = state.adopt_lease_duration(seconds) {
            info!(
                identity = %self.identity,
                lease = %self.lease,
                lease_duration_secs = seconds,
                retry_period_secs = retry_period.as_secs(),
                "tightened retry period to a third of the lease duration"
            );
        }
    }

    async fn transition(&self, role: &mut Role, to: Role) {
        let from = *role;
        info!(identity = %self.identity, lease = %self.lease, %from, %to, "role changed");
        *role = to;
        self.role_tx.send_replace(to);
        match to {
            Role::Leader => self.notifier.on_become_leader().await,
            Role::Backup => self.notifier.on_become_backup().await,
        }
    }

    async fn read(&self) -> Result<Option<VersionedLease>, StoreError> {
        self.bounded("read", self.store.read()).await
    }

    async fn write(
        &self,
        expected: Option<&LeaseVersion>,
        record: LeaseRecord,
    ) -> Result<LeaseVersion, StoreError> {
        self.bounded("write", self.store.write(expected, record)).await
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::transient(format!(
                "lease {operation} timed out after {:?}",
                self.store_timeout
            ))),
        }
    }
}

#[async_trait]
impl PeriodicRunnable for ElectionController {
    async fn run_once(&self) {
        self.observe_once().await;
    }

    async fn delay(&self) -> Duration {
        self.retry_period().await
    }

    async fn before_shutdown_complete(&self) {
        info!(identity = %self.identity, lease = %self.lease, "stopped electing leader");
    }
}
