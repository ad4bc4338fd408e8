use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    store::{LeaseStore, StoreError},
    LeaseRecord, LeaseVersion, VersionedLease,
};

#[derive(Default)]
struct Inner {
    current: Option<(LeaseRecord, u64)>,
    next_version: u64,
    forced_conflicts: usize,
    forced_failures: usize,
    reads: usize,
    writes: usize,
}

/// An in-process [`LeaseStore`] with real optimistic concurrency.
///
/// Useful for running several contenders inside one process, and for tests:
/// every call can be delayed to simulate a round trip, and conflicts or
/// transient failures can be injected.
pub struct InMemoryLeaseStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            latency: None,
        }
    }

    /// Delays every read and write by `latency` before it touches the record.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Starts the store with `record` already in place.
    pub fn with_record(mut self, record: LeaseRecord) -> Self {
        let inner = self.inner.get_mut();
        inner.next_version += 1;
        inner.current = Some((record, inner.next_version));
        self
    }

    /// The next `count` writes fail with [`StoreError::Conflict`].
    pub async fn inject_conflicts(&self, count: usize) {
        self.inner.lock().await.forced_conflicts += count;
    }

    /// The next `count` calls (reads or writes) fail with [`StoreError::Transient`].
    pub async fn inject_failures(&self, count: usize) {
        self.inner.lock().await.forced_failures += count;
    }

    /// Overwrites the record unconditionally, as an operator would.
    pub async fn overwrite(&self, record: LeaseRecord) {
        let mut inner = self.inner.lock().await;
        inner.next_version += 1;
        let version = inner.next_version;
        inner.current = Some((record, version));
    }

    pub async fn snapshot(&self) -> Option<LeaseRecord> {
        self.inner
            .lock()
            .await
            .current
            .as_ref()
            .map(|(record, _)| record.clone())
    }

    pub async fn read_count(&self) -> usize {
        self.inner.lock().await.reads
    }

    pub async fn write_count(&self) -> usize {
        self.inner.lock().await.writes
    }

    async fn simulate_round_trip(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

fn take_one(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn read(&self) -> Result<Option<VersionedLease>, StoreError> {
        self.simulate_round_trip().await;

        let mut inner = self.inner.lock().await;
        inner.reads += 1;
        if take_one(&mut inner.forced_failures) {
            return Err(StoreError::transient("injected read failure"));
        }

        Ok(inner
            .current
            .as_ref()
            .map(|(record, version)| VersionedLease {
                record: record.clone(),
                version: LeaseVersion::new(version.to_string()),
            }))
    }

    async fn write(
        &self,
        expected: Option<&LeaseVersion>,
        record: LeaseRecord,
    ) -> Result<LeaseVersion, StoreError> {
        self.simulate_round_trip().await;

        let mut inner = self.inner.lock().await;
        inner.writes += 1;
        if take_one(&mut inner.forced_failures) {
            return Err(StoreError::transient("injected write failure"));
        }
        if take_one(&mut inner.forced_conflicts) {
            return Err(StoreError::Conflict);
        }

        let current = inner
            .current
            .as_ref()
            .map(|(_, version)| version.to_string());
        if current.as_deref() != expected.map(LeaseVersion::as_str) {
            return Err(StoreError::Conflict);
        }

        inner.next_version += 1;
        let version = inner.next_version;
        inner.current = Some((record, version));
        Ok(LeaseVersion::new(version.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claimed_by(holder: &str) -> LeaseRecord {
        LeaseRecord {
            holder_identity: Some(holder.to_string()),
            lease_duration_seconds: Some(10),
            ..LeaseRecord::default()
        }
    }

    #[tokio::test]
    async fn create_only_succeeds_once() {
        let store = InMemoryLeaseStore::new();
        assert_eq!(store.read().await.unwrap(), None);

        store.write(None, claimed_by("a")).await.unwrap();
        assert_eq!(
            store.write(None, claimed_by("b")).await,
            Err(StoreError::Conflict)
        );
        assert_eq!(store.snapshot().await.unwrap().holder(), Some("a"));
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemoryLeaseStore::new().with_record(claimed_by("a"));
        let first = store.read().await.unwrap().unwrap();
        let second = store.read().await.unwrap().unwrap();

        store
            .write(Some(&first.version), claimed_by("b"))
            .await
            .unwrap();
        assert_eq!(
            store.write(Some(&second.version), claimed_by("c")).await,
            Err(StoreError::Conflict)
        );
        assert_eq!(store.snapshot().await.unwrap().holder(), Some("b"));
        assert_eq!(store.write_count().await, 2);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let store = InMemoryLeaseStore::new();
        store.inject_failures(1).await;
        store.inject_conflicts(1).await;

        assert!(matches!(store.read().await, Err(StoreError::Transient(_))));
        assert_eq!(
            store.write(None, claimed_by("a")).await,
            Err(StoreError::Conflict)
        );
        store.write(None, claimed_by("a")).await.unwrap();
        assert_eq!(store.read_count().await, 1);
    }

    #[tokio::test]
    async fn overwrite_bumps_the_version() {
        let store = InMemoryLeaseStore::new().with_record(claimed_by("a"));
        let before = store.read().await.unwrap().unwrap();
        store.overwrite(claimed_by("operator")).await;
        assert_eq!(
            store.write(Some(&before.version), claimed_by("a")).await,
            Err(StoreError::Conflict)
        );
    }
}
