//! Cluster-membership coordination: a static single-process/fixed-size
//! mode and a dynamic mode backed by a pluggable membership registry.

pub mod dynamic;
pub mod static_cluster;

pub use dynamic::{DynamicCluster, MembershipRegistry, TestRegistry};
pub use static_cluster::StaticCluster;

/// A snapshot of this instance's position in the cluster, as reported
/// by whichever registry is in use. `index == -1` or `total == 0`
/// means the instance has left (or never joined) the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterState {
    pub index: i32,
    pub total: usize,
    pub workers: usize,
}

impl ClusterState {
    pub fn left() -> Self {
        Self { index: -1, total: 0, workers: 0 }
    }
}

/// Log a cluster re-balance, distinguishing "left", "single worker",
/// and "worker range".
pub fn log_rebalance(instance: &str, key: &str, env: &str, state: &ClusterState) {
    if state.index == -1 || state.total == 0 {
        tracing::info!(instance, key, env, "cluster re-balanced: instance has left cluster {key}/{env}");
    } else if state.workers <= 1 {
        tracing::info!(
            instance,
            key,
            env,
            index = state.index + 1,
            total = state.total,
            "cluster re-balanced: instance single-thread index {} from cluster {key}/{env} of {} threads",
            state.index + 1,
            state.total
        );
    } else {
        tracing::info!(
            instance,
            key,
            env,
            from = state.index + 1,
            to = state.index + state.workers as i32,
            total = state.total,
            "cluster re-balanced: instance thread indices {}..{} from cluster {key}/{env} of {} threads",
            state.index + 1,
            state.index + state.workers as i32,
            state.total
        );
    }
}
