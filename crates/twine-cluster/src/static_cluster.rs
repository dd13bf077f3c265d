use twine_core::config::Config;
use twine_core::traits::ClusterHandle;

use crate::{log_rebalance, ClusterState};

/// A cluster coordinator whose index and size are read once from
/// configuration at startup and never change: `*:node-index` /
/// `*:cluster-size`, or `0`/`1` (a single-node "cluster") when neither
/// clustering nor those keys are configured.
pub struct StaticCluster {
    state: ClusterState,
}

impl StaticCluster {
    pub fn from_config(config: &Config) -> Self {
        let index = config.get_int("*:node-index", 0) as i32;
        let total = config.get_int("*:cluster-size", 1).max(0) as usize;
        let instance = config.get_string("*:node-id", "twine");
        let name = config.get_string("*:cluster-name", "twine");
        let env = config.get_string("*:environment", "production");
        let state = ClusterState { index, total, workers: 1 };
        log_rebalance(&instance, &name, &env, &state);
        Self { state }
    }

    pub fn new(index: i32, total: usize) -> Self {
        Self { state: ClusterState { index, total, workers: 1 } }
    }
}

impl ClusterHandle for StaticCluster {
    fn node_index(&self) -> i32 {
        self.state.index
    }

    fn cluster_size(&self) -> usize {
        self.state.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_single_node_when_unconfigured() {
        let cfg = Config::empty("twine-worker");
        let cluster = StaticCluster::from_config(&cfg);
        assert_eq!(cluster.node_index(), 0);
        assert_eq!(cluster.cluster_size(), 1);
        assert!(cluster.owns(12345));
    }

    #[test]
    fn reads_index_and_size_from_configuration() {
        let cfg = Config::from_str("[twine-worker]\nnode-index = 2\ncluster-size = 4\n", "twine-worker").unwrap();
        let cluster = StaticCluster::from_config(&cfg);
        assert_eq!(cluster.node_index(), 2);
        assert_eq!(cluster.cluster_size(), 4);
    }
}
