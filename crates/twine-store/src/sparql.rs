use std::io::Cursor;
use std::sync::Arc;

use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::{GraphName, NamedNode, Quad, Triple};

use twine_core::error::{Result, TwineError};
use twine_core::traits::SparqlClient as SparqlClientTrait;

use crate::object_store::urlencode;

/// Configuration for a remote SPARQL endpoint: the three independently
/// configurable URIs named in the workflow engine's configuration
/// table (query, update, graph-store).
#[derive(Debug, Clone)]
pub struct SparqlConfig {
    pub query_uri: String,
    pub update_uri: String,
    pub data_uri: String,
}

/// SPARQL 1.1 Graph Store HTTP Protocol client, backed by a blocking
/// HTTP client. `select_graph` issues a `CONSTRUCT WHERE { GRAPH <uri>
/// { ?s ?p ?o } }` query against `query_uri` and parses the N-Triples
/// response back into `oxigraph` triples; `put_graph` PUTs
/// N-Triples-serialised triples to `data_uri?graph=<url-encoded uri>`.
pub struct HttpSparqlClient {
    http: reqwest::blocking::Client,
    config: SparqlConfig,
}

impl HttpSparqlClient {
    pub fn new(config: SparqlConfig) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            config,
        }
    }
}

impl SparqlClientTrait for HttpSparqlClient {
    fn select_graph(&self, uri: &NamedNode) -> Result<Vec<Triple>> {
        let query = format!("CONSTRUCT {{ ?s ?p ?o }} WHERE {{ GRAPH <{}> {{ ?s ?p ?o }} }}", uri.as_str());
        let response = self
            .http
            .get(&self.config.query_uri)
            .query(&[("query", &query), ("format", &"application/n-triples".to_string())])
            .header("Accept", "application/n-triples")
            .send()
            .map_err(|e| TwineError::Transient(format!("SPARQL query failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TwineError::UpstreamFailure(format!(
                "SPARQL query returned status {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .map_err(|e| TwineError::Transient(format!("SPARQL query body: {e}")))?;

        let mut triples = Vec::new();
        for result in RdfParser::from_format(RdfFormat::NTriples).for_reader(Cursor::new(body.as_ref())) {
            let quad = result.map_err(|e| TwineError::ParseFailure(format!("SPARQL result parse: {e}")))?;
            triples.push(Triple::new(quad.subject, quad.predicate, quad.object));
        }
        Ok(triples)
    }

    fn put_graph(&self, uri: &NamedNode, triples: &[Triple]) -> Result<()> {
        let mut buf = Vec::new();
        {
            let mut serializer = RdfSerializer::from_format(RdfFormat::NTriples).serialize_to_write(&mut buf);
            for triple in triples {
                serializer
                    .serialize_triple(triple.as_ref())
                    .map_err(|e| TwineError::ParseFailure(format!("N-Triples serialize: {e}")))?;
            }
            serializer
                .finish()
                .map_err(|e| TwineError::ParseFailure(format!("N-Triples serialize: {e}")))?;
        }

        let url = format!("{}?graph={}", self.config.data_uri, urlencode(uri.as_str()));
        let response = self
            .http
            .put(&url)
            // N-Triples is valid Turtle, so the graph-store protocol's
            // text/turtle content type still describes this body.
            .header("Content-Type", "text/turtle")
            .body(buf)
            .send()
            .map_err(|e| TwineError::Transient(format!("SPARQL graph-store PUT failed: {e}")))?;

        // A non-2xx PUT is a real failure, not something to silently
        // ignore.
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TwineError::UpstreamFailure(format!(
                "SPARQL graph-store PUT returned status {}",
                response.status()
            )))
        }
    }
}

pub fn shared(config: SparqlConfig) -> Arc<dyn SparqlClientTrait> {
    Arc::new(HttpSparqlClient::new(config))
}

/// Tag every triple in `graph` with `graph_uri` and serialize as
/// N-Quads, for callers (e.g. `dump-nquads`) that want the graph name
/// alongside the triples rather than a bare N-Triples stream.
pub fn serialize_as_nquads(graph_uri: &NamedNode, triples: &[Triple]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let graph_name = GraphName::NamedNode(graph_uri.clone());
    let mut serializer = RdfSerializer::from_format(RdfFormat::NQuads).serialize_to_write(&mut buf);
    for triple in triples {
        let quad = Quad::new(triple.subject.clone(), triple.predicate.clone(), triple.object.clone(), graph_name.clone());
        serializer
            .serialize_quad(quad.as_ref())
            .map_err(|e| TwineError::ParseFailure(format!("N-Quads serialize: {e}")))?;
    }
    serializer
        .finish()
        .map_err(|e| TwineError::ParseFailure(format!("N-Quads serialize: {e}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_store_put_url_is_query_encoded() {
        let uri = NamedNode::new("http://example.org/graph/1").unwrap();
        let encoded = urlencode(uri.as_str());
        assert!(!encoded.contains("://"));
        assert!(encoded.contains("http"));
    }
}
