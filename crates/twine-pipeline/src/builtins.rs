use twine_core::context::Context;
use twine_core::error::Result;
use twine_core::graph::Graph;
use twine_core::plugin::PluginToken;
use twine_core::registry::Registry;
use twine_store::index;
use twine_store::sparql::serialize_as_nquads;

/// Register the five built-in processors (`sparql-get`, `sparql-put`,
/// `s3-get`, `s3-put`, `dump-nquads`) under
/// [`PluginToken::INTERNAL`], so they exist before any plug-in attaches
/// and are never detached by `Registry::detach`.
pub fn register_builtins(registry: &mut Registry) {
    registry.register_processor(PluginToken::INTERNAL, "sparql-get", Box::new(sparql_get));
    registry.register_processor(PluginToken::INTERNAL, "sparql-put", Box::new(sparql_put));
    registry.register_processor(PluginToken::INTERNAL, "s3-get", Box::new(s3_get));
    registry.register_processor(PluginToken::INTERNAL, "s3-put", Box::new(s3_put));
    registry.register_processor(PluginToken::INTERNAL, "dump-nquads", Box::new(dump_nquads));
}

/// Fetch the graph's previously stored triples from the SPARQL store
/// into `Graph::prior`, leaving `current` untouched.
fn sparql_get(ctx: &Context, graph: &mut Graph) -> Result<()> {
    let triples = ctx.sparql().select_graph(graph.uri())?;
    graph.set_prior(triples);
    Ok(())
}

/// Push `Graph::current` into the SPARQL store, replacing whatever was
/// there before.
fn sparql_put(ctx: &Context, graph: &mut Graph) -> Result<()> {
    let uri = graph.uri().clone();
    ctx.sparql().put_graph(&uri, graph.current())
}

/// Fetch the graph's previously stored triples from the object store's
/// N-Triples dump into `Graph::prior`. An object that doesn't exist yet
/// (first time this graph is seen) leaves `prior` empty rather than
/// failing.
fn s3_get(ctx: &Context, graph: &mut Graph) -> Result<()> {
    let key = object_key(graph);
    match ctx.store().get(&key)? {
        Some(body) => {
            let triples = twine_core::graph::parse_ntriples(&body)?;
            graph.set_prior(triples);
        }
        None => graph.set_prior(Vec::new()),
    }
    Ok(())
}

/// Store `Graph::current` as an N-Triples object in the cache, then
/// rebuild the subject/object and target-media SQL indexes for it so
/// the graph can be found by downstream consumers.
fn s3_put(ctx: &Context, graph: &mut Graph) -> Result<()> {
    let key = object_key(graph);
    let body = graph.serialize_current_ntriples()?;
    ctx.store().put(&key, "application/n-triples", &body)?;

    if let Some(sql_index) = ctx.sql() {
        let media_predicates = index::media_predicates(ctx.config());
        sql_index.reindex_graph(graph.uri().as_str(), graph.current(), &media_predicates)?;
    }
    Ok(())
}

/// Write the graph as N-Quads to the context's logging sink, for
/// debugging workflow runs without a live SPARQL/S3 endpoint — a
/// long-running worker's stdout is normally the log stream, so this
/// goes through `tracing` rather than writing to stdout directly.
fn dump_nquads(ctx: &Context, graph: &mut Graph) -> Result<()> {
    let body = serialize_as_nquads(graph.uri(), graph.current())?;
    let text = String::from_utf8_lossy(&body);
    tracing::info!(parent: ctx.logger(), graph = %graph.uri(), "{text}");
    Ok(())
}

fn object_key(graph: &Graph) -> String {
    graph.uri().as_str().to_string()
}
