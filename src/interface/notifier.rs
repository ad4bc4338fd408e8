use async_trait::async_trait;
use tracing::warn;

/// Side effects to run when this instance changes role.
///
/// Both hooks are awaited inline by the election loops while they hold the
/// role lock, so they must finish well inside one retry period.
#[async_trait]
pub trait RoleNotifier: Send + Sync {
    async fn on_become_leader(&self);
    async fn on_become_backup(&self);
}

/// Logs every transition and does nothing else.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    identity: String,
}

impl LogNotifier {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

#[async_trait]
impl RoleNotifier for LogNotifier {
    async fn on_become_leader(&self) {
        warn!(identity = %self.identity, role = "master", "became the leader");
    }

    async fn on_become_backup(&self) {
        warn!(identity = %self.identity, role = "backup", "became a backup");
    }
}
