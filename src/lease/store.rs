use async_trait::async_trait;
use thiserror::Error;

use super::{LeaseRecord, LeaseVersion, VersionedLease};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record changed since the caller last read it.
    #[error("lease was modified concurrently")]
    Conflict,
    /// Anything else: the store was unreachable, timed out, or answered with garbage.
    #[error("lease store unavailable: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn transient(reason: impl Into<String>) -> Self {
        StoreError::Transient(reason.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

/// Conditional access to the single record backing one election.
///
/// Implementations must never overwrite blindly: `write` succeeds only when the
/// stored version still equals `expected` (or, for `expected == None`, when no
/// record exists yet), and fails with [`StoreError::Conflict`] otherwise.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Returns the current record, or `None` if it was never created.
    async fn read(&self) -> Result<Option<VersionedLease>, StoreError>;

    /// Replaces the record if it is still at `expected`, returning the new version.
    async fn write(
        &self,
        expected: Option<&LeaseVersion>,
        record: LeaseRecord,
    ) -> Result<LeaseVersion, StoreError>;
}
