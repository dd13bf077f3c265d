use std::io::Cursor;

use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::{GraphName, NamedNode, Quad, Triple};

use crate::error::{Result, TwineError};

/// An immutable handle for a single named RDF graph as it moves through
/// the workflow pipeline.
///
/// `uri` never changes over the graph's lifetime. `current` holds the
/// desired post-processing triple set and may only be mutated by
/// processors earlier in the same pipeline run; `prior` is populated by
/// the `sparql-get`/`s3-get` built-in processors with the graph's state
/// before this update, and is `None` until one of them runs.
#[derive(Debug, Clone)]
pub struct Graph {
    uri: NamedNode,
    current: Vec<Triple>,
    prior: Option<Vec<Triple>>,
}

impl Graph {
    /// Create a new, empty graph for `uri`. Fails if `uri` is not a
    /// well-formed absolute IRI.
    pub fn new(uri: &str) -> Result<Self> {
        if uri.is_empty() {
            return Err(TwineError::ParseFailure("graph uri must not be empty".into()));
        }
        let uri = NamedNode::new(uri)
            .map_err(|e| TwineError::ParseFailure(format!("invalid graph uri '{uri}': {e}")))?;
        Ok(Self {
            uri,
            current: Vec::new(),
            prior: None,
        })
    }

    pub fn uri(&self) -> &NamedNode {
        &self.uri
    }

    pub fn current(&self) -> &[Triple] {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Vec<Triple> {
        &mut self.current
    }

    pub fn set_current(&mut self, triples: Vec<Triple>) {
        self.current = triples;
    }

    pub fn prior(&self) -> Option<&[Triple]> {
        self.prior.as_deref()
    }

    pub fn set_prior(&mut self, triples: Vec<Triple>) {
        self.prior = Some(triples);
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn triple_count(&self) -> usize {
        self.current.len()
    }

    /// Parse an N-Triples document and append its triples to `current`.
    pub fn add_ntriples(&mut self, body: &[u8]) -> Result<()> {
        for triple in parse_ntriples(body)? {
            self.current.push(triple);
        }
        Ok(())
    }

    /// Serialise `current` as N-Triples.
    pub fn serialize_current_ntriples(&self) -> Result<Vec<u8>> {
        serialize_ntriples(&self.current)
    }

    /// Serialise `current` as an N-Quads document, one quad per triple
    /// tagged with this graph's `uri`. Used by the `dump-nquads`
    /// processor.
    pub fn serialize_current_nquads(&self) -> Result<Vec<u8>> {
        let graph_name = GraphName::NamedNode(self.uri.clone());
        let quads: Vec<Quad> = self
            .current
            .iter()
            .map(|t| Quad::new(t.subject.clone(), t.predicate.clone(), t.object.clone(), graph_name.clone()))
            .collect();
        let mut out = Vec::new();
        let mut writer = RdfSerializer::from_format(RdfFormat::NQuads).serialize_to_write(&mut out);
        for quad in &quads {
            writer
                .serialize_quad(quad.as_ref())
                .map_err(|e| TwineError::ParseFailure(e.to_string()))?;
        }
        writer.finish().map_err(|e| TwineError::ParseFailure(e.to_string()))?;
        Ok(out)
    }

    /// Bag-equality over ground triples: true if `current` and `other`
    /// contain the same triples irrespective of order.
    ///
    /// This is a narrowing of full RDF graph isomorphism (it does not
    /// attempt blank-node relabelling); Twine's own graphs are
    /// overwhelmingly ground (URI/literal) triples, so this is
    /// sufficient for the round-trip property it backs. See DESIGN.md.
    pub fn isomorphic_to(&self, other: &Graph) -> bool {
        let mut a: Vec<String> = self.current.iter().map(|t| t.to_string()).collect();
        let mut b: Vec<String> = other.current.iter().map(|t| t.to_string()).collect();
        a.sort();
        b.sort();
        a == b
    }
}

/// Parse an N-Triples document into a flat triple list.
pub fn parse_ntriples(body: &[u8]) -> Result<Vec<Triple>> {
    let parser = RdfParser::from_format(RdfFormat::NTriples);
    let mut triples = Vec::new();
    for quad in parser.for_reader(Cursor::new(body)) {
        let quad = quad.map_err(|e| TwineError::ParseFailure(e.to_string()))?;
        triples.push(Triple::new(quad.subject, quad.predicate, quad.object));
    }
    Ok(triples)
}

/// Serialise a flat triple list as N-Triples.
pub fn serialize_ntriples(triples: &[Triple]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut writer = RdfSerializer::from_format(RdfFormat::NTriples).serialize_to_write(&mut out);
    for triple in triples {
        writer
            .serialize_triple(triple.as_ref())
            .map_err(|e| TwineError::ParseFailure(e.to_string()))?;
    }
    writer.finish().map_err(|e| TwineError::ParseFailure(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_must_be_absolute() {
        assert!(Graph::new("not a uri").is_err());
        assert!(Graph::new("urn:example:graph").is_ok());
    }

    #[test]
    fn ntriples_round_trip_is_isomorphic() {
        let body = b"<urn:s> <urn:p> <urn:o> .\n";
        let mut g1 = Graph::new("urn:g").unwrap();
        g1.add_ntriples(body).unwrap();

        let serialised = g1.serialize_current_ntriples().unwrap();
        let mut g2 = Graph::new("urn:g").unwrap();
        g2.add_ntriples(&serialised).unwrap();

        assert!(g1.isomorphic_to(&g2));
    }

    #[test]
    fn empty_graph_is_empty() {
        let g = Graph::new("urn:g").unwrap();
        assert!(g.is_empty());
        assert_eq!(g.triple_count(), 0);
        assert!(g.prior().is_none());
    }
}
