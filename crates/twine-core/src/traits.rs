use oxigraph::model::{NamedNode, Triple};

use crate::error::Result;

/// What `Context` needs from a SPARQL endpoint. The concrete HTTP-backed
/// implementation lives in the store crate; this trait is defined here
/// so that `Context` can hold a handle to it without `twine-core`
/// depending on that crate (which itself depends on `twine-core`).
pub trait SparqlClient: Send + Sync {
    fn select_graph(&self, uri: &NamedNode) -> Result<Vec<Triple>>;
    fn put_graph(&self, uri: &NamedNode, triples: &[Triple]) -> Result<()>;
}

/// What `Context` needs from the S3-compatible object store.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes. A missing object (404/403 from the
    /// underlying service) is not an error; it is reported as `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, content_type: &str, body: &[u8]) -> Result<()>;
}

/// What `Context` needs from the cluster coordinator: just enough to let
/// a processor ask "is this graph mine to handle". The coordinator
/// itself (static config vs. dynamic membership registry) lives in
/// `twine-cluster`.
pub trait ClusterHandle: Send + Sync {
    /// This node's index in `[0, cluster_size())`, or `-1` if this node
    /// is not currently a cluster participant (e.g. still joining).
    fn node_index(&self) -> i32;
    fn cluster_size(&self) -> usize;

    /// Whether the given hash falls into this node's partition, given
    /// the current `node_index`/`cluster_size`. `-1` node index never
    /// owns anything.
    fn owns(&self, hash: u64) -> bool {
        let size = self.cluster_size();
        let index = self.node_index();
        if size == 0 || index < 0 {
            return false;
        }
        (hash % size as u64) == index as u64
    }
}

/// What `Context` needs from the SQL subject/object index: a blocking
/// façade over whatever async database client the store crate uses,
/// so processors (which run on a plain synchronous dispatch thread)
/// can call it without needing an ambient async runtime. The concrete
/// implementation owns its own runtime internally, the same way the
/// broker crate's AMQP client does.
pub trait SqlIndex: Send + Sync {
    fn reindex_graph(&self, graph_uri: &str, triples: &[Triple], media_predicates: &[String]) -> Result<()>;
    fn graphs_referencing(&self, uri: &str) -> Result<Vec<String>>;
}

/// A single-node, always-participating coordinator, used when no
/// clustering is configured at all.
pub struct SingleNode;

impl ClusterHandle for SingleNode {
    fn node_index(&self) -> i32 {
        0
    }

    fn cluster_size(&self) -> usize {
        1
    }

    fn owns(&self, _hash: u64) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_node_owns_everything() {
        let node = SingleNode;
        assert!(node.owns(0));
        assert!(node.owns(12345));
    }
}
