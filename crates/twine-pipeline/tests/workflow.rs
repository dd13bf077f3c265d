//! Integration coverage for the processor pipeline driven end to end
//! through `process_rdf_quads`, against fake SPARQL/S3 transports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use oxigraph::model::{NamedNode, Triple};

use twine_core::config::Config;
use twine_core::context::Context;
use twine_core::error::Result;
use twine_core::plugin::PluginToken;
use twine_core::traits::{ObjectStore, SparqlClient};
use twine_pipeline::{process_rdf_quads, register_builtins, register_rdf_input};

/// An in-memory object store keyed by graph URI, standing in for S3.
#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, _content_type: &str, body: &[u8]) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body.to_vec());
        Ok(())
    }
}

struct NullSparql;
impl SparqlClient for NullSparql {
    fn select_graph(&self, _uri: &NamedNode) -> Result<Vec<Triple>> {
        Ok(Vec::new())
    }
    fn put_graph(&self, _uri: &NamedNode, _triples: &[Triple]) -> Result<()> {
        Ok(())
    }
}

fn ctx_with_workflow(workflow: &str, store: Arc<MemoryStore>) -> Arc<Context> {
    let toml = format!("[twine]\nworkflow = \"{workflow}\"\n");
    let ctx = Context::builder(Config::from_str(&toml, "twine").unwrap())
        .sparql(Arc::new(NullSparql))
        .store(store)
        .build();
    let mut registry = ctx.registry().write().unwrap();
    register_builtins(&mut registry);
    register_rdf_input(&mut registry, PluginToken::INTERNAL);
    drop(registry);
    ctx
}

/// spec.md §8 round-trip: a graph written by `s3-put` and then read back
/// by `s3-get` on a later message yields an isomorphic `prior`.
#[test]
fn s3_put_then_s3_get_round_trips_an_isomorphic_graph() {
    let store = Arc::new(MemoryStore::default());
    let ctx = ctx_with_workflow("s3-put", Arc::clone(&store));
    let body = b"<urn:s1> <urn:p1> <urn:o1> <urn:g> .\n<urn:s2> <urn:p2> <urn:o2> <urn:g> .\n";
    process_rdf_quads(&ctx, "application/n-quads", body, None).unwrap();

    // A second message against the same graph, this time reading prior
    // state back via s3-get rather than writing.
    let ctx2 = ctx_with_workflow("s3-get", store);
    let mut seen = twine_core::graph::Graph::new("urn:g").unwrap();
    {
        let registry = ctx2.registry().read().unwrap();
        registry.resolve_processor(&ctx2, "s3-get", &mut seen).unwrap();
    }

    let mut expected = twine_core::graph::Graph::new("urn:g").unwrap();
    expected.add_ntriples(b"<urn:s1> <urn:p1> <urn:o1> .\n<urn:s2> <urn:p2> <urn:o2> .\n").unwrap();
    let mut actual = expected.clone();
    actual.set_current(seen.prior().unwrap().to_vec());
    assert!(expected.isomorphic_to(&actual));
}

/// spec.md §8 idempotence: re-running the pipeline against unchanged
/// input produces the same stored object both times.
#[test]
fn rerunning_s3_put_on_unchanged_input_is_idempotent() {
    let store = Arc::new(MemoryStore::default());
    let ctx = ctx_with_workflow("s3-put", store.clone());
    let body = b"<urn:s> <urn:p> <urn:o> <urn:g> .\n";

    process_rdf_quads(&ctx, "application/n-quads", body, None).unwrap();
    let first = store.get("urn:g").unwrap();
    process_rdf_quads(&ctx, "application/n-quads", body, None).unwrap();
    let second = store.get("urn:g").unwrap();

    assert_eq!(first, second);
}

/// spec.md §8 scenario 2 shape, exercised at the pipeline layer rather
/// than through a broker: a document with two named graphs runs the
/// default workflow once per graph, in document (URI sort) order, and
/// `pre:`/`post:` fan-out processors registered by distinct plug-ins fire
/// for every graph in registration order.
#[test]
fn default_workflow_runs_pre_and_post_fanout_per_graph_in_order() {
    let store = Arc::new(MemoryStore::default());
    let toml = "[twine]\nworkflow = \"pre, post\"\n";
    let ctx = Context::builder(Config::from_str(toml, "twine").unwrap())
        .sparql(Arc::new(NullSparql))
        .store(store)
        .build();

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let mut registry = ctx.registry().write().unwrap();
        register_rdf_input(&mut registry, PluginToken::INTERNAL);

        let pre_log = Arc::clone(&seen);
        registry.register_processor(
            PluginToken::new(1),
            "pre:log",
            Box::new(move |_, graph| {
                pre_log.lock().unwrap().push(format!("pre:{}", graph.uri().as_str()));
                Ok(())
            }),
        );
        let post_log = Arc::clone(&seen);
        registry.register_processor(
            PluginToken::new(2),
            "post:log",
            Box::new(move |_, graph| {
                post_log.lock().unwrap().push(format!("post:{}", graph.uri().as_str()));
                Ok(())
            }),
        );
    }

    let body = b"<urn:s1> <urn:p1> <urn:o1> <urn:g1> .\n<urn:s2> <urn:p2> <urn:o2> <urn:g2> .\n";
    process_rdf_quads(&ctx, "application/n-quads", body, None).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "pre:urn:g1".to_string(),
            "post:urn:g1".to_string(),
            "pre:urn:g2".to_string(),
            "post:urn:g2".to_string(),
        ]
    );
}
