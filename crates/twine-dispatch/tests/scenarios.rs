//! End-to-end dispatch scenarios from spec.md §8, exercised with the
//! in-process `ChannelBroker` and fake SPARQL/S3 transports so no live
//! broker or store is needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use oxigraph::model::{NamedNode, Triple};

use twine_broker::{Broker, ChannelBroker, Message};
use twine_core::config::Config;
use twine_core::context::Context;
use twine_core::error::{Result, TwineError};
use twine_core::plugin::PluginToken;
use twine_core::traits::{ObjectStore, SparqlClient};
use twine_dispatch::DispatchLoop;
use twine_pipeline::{register_builtins, register_rdf_input};

/// Records every graph it was asked to `put_graph`, and can be told to
/// fail for a specific graph URI (to drive the scenario 2 partial-
/// failure case).
#[derive(Default)]
struct FakeSparql {
    puts: Mutex<Vec<String>>,
    gets: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
}

impl FakeSparql {
    fn fail_on(uri: &str) -> Self {
        Self {
            fail_on: Mutex::new(Some(uri.to_string())),
            ..Default::default()
        }
    }

    fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }
}

impl SparqlClient for FakeSparql {
    fn select_graph(&self, uri: &NamedNode) -> Result<Vec<Triple>> {
        self.gets.lock().unwrap().push(uri.as_str().to_string());
        Ok(Vec::new())
    }

    fn put_graph(&self, uri: &NamedNode, _triples: &[Triple]) -> Result<()> {
        if self.fail_on.lock().unwrap().as_deref() == Some(uri.as_str()) {
            return Err(TwineError::UpstreamFailure(format!("simulated failure for {uri}")));
        }
        self.puts.lock().unwrap().push(uri.as_str().to_string());
        Ok(())
    }
}

struct NullStore;
impl ObjectStore for NullStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    fn put(&self, _key: &str, _content_type: &str, _body: &[u8]) -> Result<()> {
        Ok(())
    }
}

fn build_ctx(sparql: Arc<FakeSparql>) -> Arc<Context> {
    let ctx = Context::builder(Config::from_str("[twine]\nworkflow = \"sparql-get, sparql-put\"\n", "twine").unwrap())
        .sparql(sparql)
        .store(Arc::new(NullStore))
        .build();
    let mut registry = ctx.registry().write().unwrap();
    register_builtins(&mut registry);
    register_rdf_input(&mut registry, PluginToken::INTERNAL);
    drop(registry);
    ctx
}

/// Runs `dispatch.run()` on the calling thread, but first spawns a
/// watcher that flips `shutdown` once the broker has ack'd or rejected
/// `expected` messages — `ChannelBroker::next` never blocks, so without
/// this the loop would otherwise spin forever on an empty queue.
fn run_until(dispatch: &DispatchLoop, broker: &Arc<ChannelBroker>, shutdown: &Arc<AtomicBool>, expected: usize) {
    let broker = Arc::clone(broker);
    let shutdown_clone = Arc::clone(shutdown);
    std::thread::spawn(move || loop {
        if broker.acked().len() + broker.rejected().len() >= expected {
            shutdown_clone.store(true, Ordering::SeqCst);
            break;
        }
        std::thread::yield_now();
    });
    let _ = dispatch.run();
}

/// Scenario 1: a single N-Quads message with one named graph runs the
/// configured `[sparql-get, sparql-put]` pipeline once and is acked.
#[test]
fn scenario_1_single_nquads_message_is_acked() {
    let sparql = Arc::new(FakeSparql::default());
    let ctx = build_ctx(Arc::clone(&sparql));
    let broker = Arc::new(ChannelBroker::new());
    broker.push(Message::new("application/n-quads", b"<urn:s> <urn:p> <urn:o> <urn:g> .\n".to_vec()).with_subject("msg-1"));

    let shutdown = Arc::new(AtomicBool::new(false));
    let dispatch = DispatchLoop::new(ctx, broker.clone() as Arc<dyn Broker>, Arc::clone(&shutdown));
    run_until(&dispatch, &broker, &shutdown, 1);

    assert_eq!(broker.acked(), vec!["msg-1".to_string()]);
    assert_eq!(sparql.puts(), vec!["urn:g".to_string()]);
}

/// Scenario 2: a TriG-shaped message (here, N-Quads with two distinct
/// graphs) runs the pipeline once per named graph in document (URI sort)
/// order. When the second graph's `sparql-put` fails, the first graph's
/// write has already happened and the message is rejected.
#[test]
fn scenario_2_partial_graph_failure_keeps_earlier_writes_and_rejects() {
    let sparql = Arc::new(FakeSparql::fail_on("urn:g2"));
    let ctx = build_ctx(Arc::clone(&sparql));
    let broker = Arc::new(ChannelBroker::new());
    let body = b"<urn:s1> <urn:p1> <urn:o1> <urn:g1> .\n<urn:s2> <urn:p2> <urn:o2> <urn:g2> .\n".to_vec();
    broker.push(Message::new("application/n-quads", body).with_subject("msg-2"));

    let shutdown = Arc::new(AtomicBool::new(false));
    let dispatch = DispatchLoop::new(ctx, broker.clone() as Arc<dyn Broker>, Arc::clone(&shutdown));
    run_until(&dispatch, &broker, &shutdown, 1);

    assert_eq!(broker.rejected(), vec!["msg-2".to_string()]);
    assert!(broker.acked().is_empty());
    // urn:g1 was written before urn:g2 failed; no rollback is attempted.
    assert_eq!(sparql.puts(), vec!["urn:g1".to_string()]);
}

/// Scenario 6: a shutdown requested before a message is pulled causes the
/// loop to reject that message without invoking any handler, then exit —
/// no further ack/reject calls occur.
#[test]
fn scenario_6_shutdown_before_dispatch_rejects_without_processing() {
    let sparql = Arc::new(FakeSparql::default());
    let ctx = build_ctx(Arc::clone(&sparql));
    let broker = Arc::new(ChannelBroker::new());
    broker.push(Message::new("application/n-quads", b"<urn:s> <urn:p> <urn:o> <urn:g> .\n".to_vec()).with_subject("msg-6"));

    // Shutdown is already requested; `next()` still returns the queued
    // message (ChannelBroker never blocks), but the loop must reject it
    // without calling into the registry.
    let shutdown = Arc::new(AtomicBool::new(true));
    let dispatch = DispatchLoop::new(ctx, broker.clone() as Arc<dyn Broker>, shutdown);
    dispatch.run().unwrap();

    assert_eq!(broker.rejected(), vec!["msg-6".to_string()]);
    assert!(broker.acked().is_empty());
    assert!(sparql.puts().is_empty());
}
