use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};

pub mod memory;
pub mod resolver;
pub mod store;

/// The shared coordination record all contenders race for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseRecord {
    pub holder_identity: Option<String>,
    pub lease_duration_seconds: Option<u64>,
    pub acquire_time: Option<DateTime<Utc>>,
    pub renew_time: Option<DateTime<Utc>>,
}

impl LeaseRecord {
    /// The holder, with an empty identity treated as no holder at all.
    pub fn holder(&self) -> Option<&str> {
        self.holder_identity.as_deref().filter(|holder| !holder.is_empty())
    }

    /// Whether more than `lease_duration` has passed since the last renewal.
    ///
    /// A record that was never renewed never expires.
    pub fn is_expired(&self, now: DateTime<Utc>, lease_duration: Duration) -> bool {
        match self.renew_time {
            Some(renew_time) => match (now - renew_time).to_std() {
                Ok(elapsed) => elapsed > lease_duration,
                // renew_time is in our future
                Err(_) => false,
            },
            None => false,
        }
    }
}

/// Opaque token identifying the revision of a record, as handed out by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseVersion(String);

impl LeaseVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedLease {
    pub record: LeaseRecord,
    pub version: LeaseVersion,
}

/// Who, if anyone, currently owns a lease from the point of view of one contender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseStatus {
    Unclaimed,
    HeldBySelf,
    HeldByOther(String),
    Expired(String),
}

impl LeaseStatus {
    /// Whether the contender may write itself in as holder.
    pub fn is_claimable(&self) -> bool {
        !matches!(self, LeaseStatus::HeldByOther(_))
    }

    /// The live holder, if any. Expired holders don't count.
    pub fn live_holder<'a>(&'a self, identity: &'a str) -> Option<&'a str> {
        match self {
            LeaseStatus::HeldBySelf => Some(identity),
            LeaseStatus::HeldByOther(holder) => Some(holder),
            LeaseStatus::Unclaimed | LeaseStatus::Expired(_) => None,
        }
    }
}

/// Classifies `record` for the contender named `identity`.
///
/// Expiry is checked before ownership, so a contender whose own lease lapsed
/// sees `Expired` rather than `HeldBySelf`.
pub fn classify(
    record: Option<&LeaseRecord>,
    now: DateTime<Utc>,
    identity: &str,
    lease_duration: Duration,
) -> LeaseStatus {
    let Some(record) = record else {
        return LeaseStatus::Unclaimed;
    };
    let Some(holder) = record.holder() else {
        return LeaseStatus::Unclaimed;
    };

    if record.is_expired(now, lease_duration) {
        LeaseStatus::Expired(holder.to_owned())
    } else if holder == identity {
        LeaseStatus::HeldBySelf
    } else {
        LeaseStatus::HeldByOther(holder.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn held_by(holder: &str, renewed: i64) -> LeaseRecord {
        LeaseRecord {
            holder_identity: Some(holder.to_string()),
            lease_duration_seconds: Some(10),
            acquire_time: Some(at(0)),
            renew_time: Some(at(renewed)),
        }
    }

    #[test]
    fn missing_record_is_unclaimed() {
        assert_eq!(
            classify(None, at(0), "me", Duration::from_secs(10)),
            LeaseStatus::Unclaimed
        );
    }

    #[test]
    fn empty_holder_is_unclaimed() {
        let record = LeaseRecord {
            holder_identity: Some(String::new()),
            ..held_by("ignored", 0)
        };
        assert_eq!(
            classify(Some(&record), at(1), "me", Duration::from_secs(10)),
            LeaseStatus::Unclaimed
        );
    }

    #[test]
    fn fresh_foreign_lease_is_not_claimable() {
        let status = classify(Some(&held_by("other", 0)), at(5), "me", Duration::from_secs(10));
        assert_eq!(status, LeaseStatus::HeldByOther("other".to_string()));
        assert!(!status.is_claimable());
        assert_eq!(status.live_holder("me"), Some("other"));
    }

    #[test]
    fn own_lease_is_claimable() {
        let status = classify(Some(&held_by("me", 0)), at(5), "me", Duration::from_secs(10));
        assert_eq!(status, LeaseStatus::HeldBySelf);
        assert!(status.is_claimable());
        assert_eq!(status.live_holder("me"), Some("me"));
    }

    #[test]
    fn expiry_is_strictly_greater_than_duration() {
        let record = held_by("other", 0);
        let duration = Duration::from_secs(10);
        assert_eq!(
            classify(Some(&record), at(10), "me", duration),
            LeaseStatus::HeldByOther("other".to_string())
        );

        let status = classify(Some(&record), at(11), "me", duration);
        assert_eq!(status, LeaseStatus::Expired("other".to_string()));
        assert!(status.is_claimable());
        assert_eq!(status.live_holder("me"), None);
    }

    #[test]
    fn own_expired_lease_reports_expired() {
        let status = classify(Some(&held_by("me", 0)), at(30), "me", Duration::from_secs(10));
        assert_eq!(status, LeaseStatus::Expired("me".to_string()));
    }

    #[test]
    fn never_renewed_lease_does_not_expire() {
        let record = LeaseRecord {
            renew_time: None,
            ..held_by("other", 0)
        };
        assert_eq!(
            classify(Some(&record), at(1_000), "me", Duration::from_secs(10)),
            LeaseStatus::HeldByOther("other".to_string())
        );
    }

    #[test]
    fn renewal_from_the_future_is_not_expired() {
        let record = held_by("other", 100);
        assert!(!record.is_expired(at(0), Duration::from_secs(1)));
    }
}
