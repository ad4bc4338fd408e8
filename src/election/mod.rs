use std::{fmt, time::Duration};

pub mod controller;
pub mod manager;
mod renewer;

/// The role this instance believes it has. Every instance starts as `Backup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Backup,
    Leader,
}

impl Role {
    pub fn is_leader(self) -> bool {
        self == Role::Leader
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Backup => f.write_str("backup"),
            Role::Leader => f.write_str("leader"),
        }
    }
}

/// Lease parameters cached by one contender and the holder it last saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ElectionState {
    pub(crate) lease_duration: Duration,
    pub(crate) retry_period: Duration,
    pub(crate) observed_leader: Option<String>,
}

impl ElectionState {
    pub(crate) fn new(lease_duration: Duration, retry_period: Duration) -> Self {
        Self {
            lease_duration,
            retry_period,
            observed_leader: None,
        }
    }

    /// Adopts the duration a record carries and, if needed, tightens the retry
    /// period to a third of it so a single missed cycle can't lose the lease.
    ///
    /// Returns the new retry period when it changed. The period only ever
    /// shrinks; a later, longer duration leaves it where it is.
    pub(crate) fn adopt_lease_duration(&mut self, seconds: u64) -> Option<Duration> {
        self.lease_duration = Duration::from_secs(seconds);
        if self.retry_period.saturating_mul(3) > self.lease_duration {
            let tightened = Duration::from_secs((seconds / 3).max(1));
            if tightened != self.retry_period {
                self.retry_period = tightened;
                return Some(tightened);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(lease: u64, retry: u64) -> ElectionState {
        ElectionState::new(Duration::from_secs(lease), Duration::from_secs(retry))
    }

    #[test]
    fn tightens_retry_period_to_a_third() {
        let mut state = state(10, 5);
        assert_eq!(state.adopt_lease_duration(9), Some(Duration::from_secs(3)));
        assert_eq!(state.lease_duration, Duration::from_secs(9));
        assert_eq!(state.retry_period, Duration::from_secs(3));
    }

    #[test]
    fn rounds_down_to_whole_seconds() {
        let mut state = state(10, 5);
        assert_eq!(state.adopt_lease_duration(10), Some(Duration::from_secs(3)));
    }

    #[test]
    fn never_drops_below_one_second() {
        let mut state = state(10, 3);
        assert_eq!(state.adopt_lease_duration(2), Some(Duration::from_secs(1)));
        assert_eq!(state.adopt_lease_duration(1), None);
        assert_eq!(state.retry_period, Duration::from_secs(1));
    }

    #[test]
    fn leaves_a_safe_period_alone() {
        let mut state = state(10, 3);
        assert_eq!(state.adopt_lease_duration(15), None);
        assert_eq!(state.retry_period, Duration::from_secs(3));
    }

    #[test]
    fn huge_retry_period_is_tightened_without_overflow() {
        let mut state = ElectionState::new(Duration::from_secs(10), Duration::MAX);
        assert_eq!(state.adopt_lease_duration(10), Some(Duration::from_secs(3)));
        assert_eq!(state.retry_period, Duration::from_secs(3));
    }

    #[test]
    fn does_not_widen_again() {
        let mut state = state(10, 5);
        state.adopt_lease_duration(6);
        assert_eq!(state.retry_period, Duration::from_secs(2));

        assert_eq!(state.adopt_lease_duration(60), None);
        assert_eq!(state.lease_duration, Duration::from_secs(60));
        assert_eq!(state.retry_period, Duration::from_secs(2));
    }
}
