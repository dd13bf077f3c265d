use std::sync::{Arc, Mutex, RwLock};

use twine_core::error::Result;
use twine_core::traits::ClusterHandle;

use crate::{log_rebalance, ClusterState};

/// The pluggable binding to an external membership service (etcd,
/// ZooKeeper, Consul, ...). No concrete production implementation
/// ships here, so this is left as an extension point with an
/// in-process test double ([`TestRegistry`]).
pub trait MembershipRegistry: Send + Sync {
    /// Register `instance` as present in the cluster and start
    /// tracking membership changes.
    fn join(&self, instance: &str) -> Result<()>;
    /// Remove `instance` from the cluster.
    fn leave(&self, instance: &str) -> Result<()>;
    /// Install a callback invoked whenever the registry observes a
    /// membership change (including this instance's own join/leave).
    fn on_change(&self, callback: Box<dyn Fn(ClusterState) + Send + Sync>);
    /// The state as currently known to the registry.
    fn current(&self) -> ClusterState;
}

/// A cluster coordinator whose index/size track a [`MembershipRegistry`]
/// and can change for the lifetime of the process.
pub struct DynamicCluster {
    registry: Arc<dyn MembershipRegistry>,
    instance: String,
    name: String,
    env: String,
    state: Arc<RwLock<ClusterState>>,
}

impl DynamicCluster {
    pub fn join(registry: Arc<dyn MembershipRegistry>, instance: &str, name: &str, env: &str) -> Result<Self> {
        registry.join(instance)?;
        let state = Arc::new(RwLock::new(registry.current()));
        let callback_state = Arc::clone(&state);
        let instance_owned = instance.to_string();
        let name_owned = name.to_string();
        let env_owned = env.to_string();
        registry.on_change(Box::new(move |new_state| {
            *callback_state.write().expect("cluster state lock poisoned") = new_state;
            log_rebalance(&instance_owned, &name_owned, &env_owned, &new_state);
        }));
        Ok(Self {
            registry,
            instance: instance.to_string(),
            name: name.to_string(),
            env: env.to_string(),
            state,
        })
    }

    pub fn leave(&self) -> Result<()> {
        self.registry.leave(&self.instance)
    }
}

impl ClusterHandle for DynamicCluster {
    fn node_index(&self) -> i32 {
        self.state.read().expect("cluster state lock poisoned").index
    }

    fn cluster_size(&self) -> usize {
        self.state.read().expect("cluster state lock poisoned").total
    }
}

type ChangeCallback = Box<dyn Fn(ClusterState) + Send + Sync>;

/// In-process membership registry for tests: `join`/`leave` update a
/// shared state directly and fire any installed callback synchronously.
pub struct TestRegistry {
    total: usize,
    state: Mutex<ClusterState>,
    callback: Mutex<Option<ChangeCallback>>,
}

impl TestRegistry {
    pub fn new(total: usize) -> Arc<Self> {
        Arc::new(Self {
            total,
            state: Mutex::new(ClusterState::left()),
            callback: Mutex::new(None),
        })
    }

    /// Simulate another instance joining or leaving, re-balancing this
    /// instance's index within `total`.
    pub fn set_index(&self, index: i32) {
        let new_state = if index < 0 {
            ClusterState::left()
        } else {
            ClusterState { index, total: self.total, workers: 1 }
        };
        *self.state.lock().expect("state lock poisoned") = new_state;
        if let Some(callback) = self.callback.lock().expect("callback lock poisoned").as_ref() {
            callback(new_state);
        }
    }
}

impl MembershipRegistry for TestRegistry {
    fn join(&self, _instance: &str) -> Result<()> {
        if self.state.lock().expect("state lock poisoned").index == -1 {
            self.set_index(0);
        }
        Ok(())
    }

    fn leave(&self, _instance: &str) -> Result<()> {
        self.set_index(-1);
        Ok(())
    }

    fn on_change(&self, callback: Box<dyn Fn(ClusterState) + Send + Sync>) {
        *self.callback.lock().expect("callback lock poisoned") = Some(callback);
    }

    fn current(&self) -> ClusterState {
        *self.state.lock().expect("state lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn joining_assigns_index_zero_by_default() {
        let registry = TestRegistry::new(3);
        let cluster = DynamicCluster::join(registry, "node-a", "twine", "test").unwrap();
        assert_eq!(cluster.node_index(), 0);
        assert_eq!(cluster.cluster_size(), 3);
    }

    #[test]
    fn rebalance_callback_updates_cluster_view() {
        let registry = TestRegistry::new(4);
        let cluster = DynamicCluster::join(Arc::clone(&registry), "node-a", "twine", "test").unwrap();
        registry.set_index(2);
        assert_eq!(cluster.node_index(), 2);
        assert_eq!(cluster.cluster_size(), 4);
    }

    #[test]
    fn leaving_reports_no_ownership() {
        let registry = TestRegistry::new(2);
        let cluster = DynamicCluster::join(Arc::clone(&registry), "node-a", "twine", "test").unwrap();
        cluster.leave().unwrap();
        assert_eq!(cluster.node_index(), -1);
        assert!(!cluster.owns(42));
    }

    #[test]
    fn callback_fires_on_every_change() {
        let registry = TestRegistry::new(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let cluster = DynamicCluster::join(Arc::clone(&registry), "node-a", "twine", "test").unwrap();
        drop(cluster);
        registry.on_change(Box::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        registry.set_index(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
