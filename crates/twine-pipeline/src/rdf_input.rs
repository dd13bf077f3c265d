use std::collections::BTreeMap;
use std::io::Cursor;

use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{GraphName, Triple};
use twine_core::error::{Result, TwineError};
use twine_core::graph::Graph;
use twine_core::{Context, PluginToken, Registry};

use crate::pipeline::Pipeline;

/// RDF quads input handler for `application/trig`, `application/n-quads`,
/// and `text/x-nquads`: parses the message body, groups its triples by
/// named graph, and runs the configured pipeline over each one in turn.
///
/// Although any format the underlying RDF library can parse carries
/// named-graph information in principle, only these three MIME types
/// are registered. A message with no named graphs is a failure, not a
/// no-op: there is nothing for this workflow to place anywhere.
pub fn process_rdf_quads(ctx: &Context, mime_type: &str, body: &[u8], _subject: Option<&str>) -> Result<()> {
    let format = rdf_format_for(mime_type)?;
    let mut by_graph: BTreeMap<String, Vec<Triple>> = BTreeMap::new();
    let parser = RdfParser::from_format(format);
    for quad in parser.for_reader(Cursor::new(body)) {
        let quad = quad.map_err(|e| TwineError::ParseFailure(e.to_string()))?;
        if let GraphName::NamedNode(graph_name) = quad.graph_name {
            by_graph
                .entry(graph_name.into_string())
                .or_default()
                .push(Triple::new(quad.subject, quad.predicate, quad.object));
        }
    }
    if by_graph.is_empty() {
        return Err(TwineError::ParseFailure("parsed body contains no named graphs to process".into()));
    }

    let workflow_spec = ctx.config().get_string("*:workflow", "");
    let pipeline = Pipeline::parse(&workflow_spec);
    let job = ctx.current_job();

    for (uri, triples) in by_graph {
        let mut graph = Graph::new(&uri)?;
        graph.set_current(triples);
        if let Some(job) = &job {
            let count = job.graph_processed();
            tracing::debug!(graph = %uri, progress = count, "processing named graph");
        }
        pipeline.run(ctx, &mut graph)?;
    }
    Ok(())
}

fn rdf_format_for(mime_type: &str) -> Result<RdfFormat> {
    let base = mime_type.split(';').next().unwrap_or(mime_type).trim();
    match base {
        "application/n-quads" | "text/x-nquads" => Ok(RdfFormat::NQuads),
        "application/trig" => Ok(RdfFormat::TriG),
        other => Err(TwineError::NoHandler(format!("unsupported RDF input mime type '{other}'"))),
    }
}

/// Register the RDF quads input handler under `owner` for every
/// supported MIME type.
pub fn register_rdf_input(registry: &mut Registry, owner: PluginToken) {
    for mime in ["application/trig", "application/n-quads", "text/x-nquads"] {
        registry.register_input(owner, mime, "RDF quads", Box::new(process_rdf_quads));
    }
}
