//! Three contenders racing for one in-memory lease.
//!
//! Run with `RUST_LOG=lease_election=debug` to watch every cycle.

use std::{sync::Arc, time::Duration};

use lease_election::{ElectionConfig, InMemoryLeaseStore, LeaderElector, LogNotifier};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(InMemoryLeaseStore::new().with_latency(Duration::from_millis(20)));
    let mut electors = Vec::new();
    for pod in ["meta-pod-0", "meta-pod-1", "meta-pod-2"] {
        let config = ElectionConfig::new("meta-lease", "default", pod)?
            .with_retry_period(Duration::from_secs(1))
            .with_lease_duration(Duration::from_secs(3))?;
        let elector = LeaderElector::new(config, store.clone(), Arc::new(LogNotifier::new(pod)));
        elector.start().await;
        electors.push(elector);
    }

    tokio::time::sleep(Duration::from_secs(5)).await;
    let leader = electors.iter().position(LeaderElector::is_leader);
    if let Some(index) = leader {
        info!(leader = ?electors[index].current_leader().await, "stopping the leader");
        electors.remove(index).stop().await;
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = tokio::time::sleep(Duration::from_secs(10)) => {}
    }

    for elector in &electors {
        elector.stop().await;
    }
    info!(holder = ?store.snapshot().await.and_then(|lease| lease.holder_identity), "done");
    Ok(())
}
