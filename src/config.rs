use std::{env, time::Duration};

use thiserror::Error;

use crate::lease::resolver::ConflictResolver;

pub const POD_NAME_ENV: &str = "META_POD_NAME";
pub const NAMESPACE_ENV: &str = "META_NAMESPACE";
pub const LEASE_NAME_ENV: &str = "META_LEASE_NAME";

const MAX_IDENTITY_LEN: usize = 253;
const MIN_RETRY_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("invalid identity {identity:?}: {reason}")]
    InvalidIdentity { identity: String, reason: &'static str },
    #[error("lease duration must be at least one second")]
    LeaseDurationTooShort,
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Settings fixed at construction time. Nothing here is re-read at runtime.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    lease_name: String,
    namespace: String,
    identity: String,
    retry_period: Duration,
    lease_duration: Duration,
    conflict_retries: usize,
    conflict_backoff: Duration,
    store_timeout: Duration,
}

impl ElectionConfig {
    pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(3);
    pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(10);
    pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(
        lease_name: impl Into<String>,
        namespace: impl Into<String>,
        identity: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let lease_name = lease_name.into();
        let namespace = namespace.into();
        let identity = identity.into();

        if lease_name.is_empty() {
            return Err(ConfigError::EmptyField("lease name"));
        }
        if namespace.is_empty() {
            return Err(ConfigError::EmptyField("namespace"));
        }
        validate_identity(&identity)?;

        Ok(Self {
            lease_name,
            namespace,
            identity,
            retry_period: Self::DEFAULT_RETRY_PERIOD,
            lease_duration: Self::DEFAULT_LEASE_DURATION,
            conflict_retries: ConflictResolver::DEFAULT_MAX_RETRIES,
            conflict_backoff: ConflictResolver::DEFAULT_BACKOFF,
            store_timeout: Self::DEFAULT_STORE_TIMEOUT,
        })
    }

    /// Builds the config from `META_LEASE_NAME`, `META_NAMESPACE` and `META_POD_NAME`.
    ///
    /// An unset or empty variable is [`ConfigError::MissingEnv`]; there is no
    /// `default`/`meta-pod-0` fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(
            required_env(LEASE_NAME_ENV)?,
            required_env(NAMESPACE_ENV)?,
            required_env(POD_NAME_ENV)?,
        )
    }

    /// Interval between election cycles; anything under one second is raised to one second.
    pub fn with_retry_period(mut self, retry_period: Duration) -> Self {
        self.retry_period = retry_period.max(MIN_RETRY_PERIOD);
        self
    }

    /// Lease duration used until the store reports one.
    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Result<Self, ConfigError> {
        if lease_duration.as_secs() < 1 {
            return Err(ConfigError::LeaseDurationTooShort);
        }
        self.lease_duration = lease_duration;
        Ok(self)
    }

    pub fn with_conflict_retries(mut self, retries: usize, backoff: Duration) -> Self {
        self.conflict_retries = retries;
        self.conflict_backoff = backoff;
        self
    }

    /// Upper bound on a single store round trip.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn lease_name(&self) -> &str {
        &self.lease_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn retry_period(&self) -> Duration {
        self.retry_period
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    pub(crate) fn conflict_resolver(&self) -> ConflictResolver {
        ConflictResolver::new(self.conflict_retries, self.conflict_backoff)
    }

    /// `namespace/lease_name`, as it appears in logs.
    pub fn lease_key(&self) -> String {
        format!("{}/{}", self.namespace, self.lease_name)
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

fn validate_identity(identity: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &'static str| -> Result<(), ConfigError> {
        Err(ConfigError::InvalidIdentity {
            identity: identity.to_string(),
            reason,
        })
    };

    if identity.is_empty() {
        return Err(ConfigError::EmptyField("identity"));
    }
    if identity.len() > MAX_IDENTITY_LEN {
        return invalid("longer than 253 bytes");
    }
    if identity.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return invalid("contains whitespace or control characters");
    }
    Ok(())
}
