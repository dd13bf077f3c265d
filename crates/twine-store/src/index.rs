use std::collections::{BTreeMap, BTreeSet};

use oxigraph::model::Triple;
use sqlx::PgPool;

use twine_core::config::Config;
use twine_core::error::{Result, TwineError};
use twine_core::traits::SqlIndex;

/// Predicates whose objects get indexed into `target_media`, in
/// addition to the ordinary subject/object index every graph gets.
pub fn default_media_predicates() -> Vec<String> {
    vec![
        "http://xmlns.com/foaf/0.1/page".to_string(),
        "http://search.yahoo.com/mrss/player".to_string(),
        "http://search.yahoo.com/mrss/content".to_string(),
    ]
}

/// The effective media-predicate list: the fixed defaults plus any
/// `*:media-predicate*`-keyed configuration entries, so an operator can
/// register an additional predicate (e.g. a site-specific thumbnail
/// property) without a rebuild.
pub fn media_predicates(config: &Config) -> Vec<String> {
    let mut predicates = default_media_predicates();
    for (key, value) in config.enumerate_all("*") {
        if key.starts_with("media-predicate") {
            predicates.push(value);
        }
    }
    predicates
}

/// Collect, as two sorted sets, every IRI appearing as a subject and
/// every IRI appearing as an object across `triples`; blank nodes and
/// literal objects are skipped. Pure so it can be tested without a live
/// database (spec.md §8 scenario 4).
pub fn collect_subject_objects(triples: &[Triple]) -> (Vec<String>, Vec<String>) {
    let mut subjects: BTreeSet<String> = BTreeSet::new();
    let mut objects: BTreeSet<String> = BTreeSet::new();
    for t in triples {
        // `Subject`/`Term`'s `Display` wraps IRIs in angle brackets
        // (Turtle term syntax); both sets need the raw IRI, matching
        // what `target_media` stores below, so both go through
        // `as_str()` on the named-node variant rather than `to_string()`.
        if let oxigraph::model::SubjectRef::NamedNode(n) = t.subject.as_ref() {
            subjects.insert(n.as_str().to_string());
        }
        if let oxigraph::model::TermRef::NamedNode(n) = t.object.as_ref() {
            objects.insert(n.as_str().to_string());
        }
    }
    (subjects.into_iter().collect(), objects.into_iter().collect())
}

/// For every triple `(s, p, o)` where `p` is one of `media_predicates`
/// and `o` is an IRI, group `o` under `s`. Pure for the same reason as
/// [`collect_subject_objects`].
pub fn collect_target_media(triples: &[Triple], media_predicates: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut by_subject: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for t in triples {
        if media_predicates.iter().any(|p| p == t.predicate.as_str()) {
            if let (oxigraph::model::SubjectRef::NamedNode(s), oxigraph::model::TermRef::NamedNode(o)) =
                (t.subject.as_ref(), t.object.as_ref())
            {
                by_subject.entry(s.as_str().to_string()).or_default().push(o.as_str().to_string());
            }
        }
    }
    by_subject
}

/// Rebuild the subject/object index and the media-target index for one
/// graph, inside a single transaction. Called by `s3-put` after a
/// successful object-store write, deleting stale rows before inserting
/// fresh ones so a graph that shrinks (fewer subjects/media links than
/// before) doesn't leave orphaned index entries behind.
pub async fn reindex_graph(pool: &PgPool, graph_uri: &str, triples: &[Triple], media_predicates: &[String]) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| TwineError::UpstreamFailure(format!("index tx begin: {e}")))?;

    sqlx::query("DELETE FROM subject_objects WHERE graph = $1")
        .bind(graph_uri)
        .execute(&mut *tx)
        .await
        .map_err(|e| TwineError::UpstreamFailure(format!("index delete subject_objects: {e}")))?;

    let (subjects, objects) = collect_subject_objects(triples);

    sqlx::query("INSERT INTO subject_objects (graph, subjects, objects) VALUES ($1, $2, $3)")
        .bind(graph_uri)
        .bind(&subjects)
        .bind(&objects)
        .execute(&mut *tx)
        .await
        .map_err(|e| TwineError::UpstreamFailure(format!("index insert subject_objects: {e}")))?;

    sqlx::query("DELETE FROM target_media WHERE graph = $1")
        .bind(graph_uri)
        .execute(&mut *tx)
        .await
        .map_err(|e| TwineError::UpstreamFailure(format!("index delete target_media: {e}")))?;

    let by_subject = collect_target_media(triples, media_predicates);
    for (subject, media) in &by_subject {
        sqlx::query("INSERT INTO target_media (graph, subject, objects) VALUES ($1, $2, $3)")
            .bind(graph_uri)
            .bind(subject)
            .bind(media)
            .execute(&mut *tx)
            .await
            .map_err(|e| TwineError::UpstreamFailure(format!("index insert target_media: {e}")))?;
    }

    tx.commit()
        .await
        .map_err(|e| TwineError::UpstreamFailure(format!("index tx commit: {e}")))?;
    Ok(())
}

/// Every graph whose `subject_objects` row lists `uri` as a subject or
/// object, used to find graphs that reference a given resource.
pub async fn graphs_referencing(pool: &PgPool, uri: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT graph FROM subject_objects WHERE $1 = ANY(subjects) OR $1 = ANY(objects)",
    )
    .bind(uri)
    .fetch_all(pool)
    .await
    .map_err(|e| TwineError::UpstreamFailure(format!("graphs_referencing query: {e}")))?;
    Ok(rows.into_iter().map(|(g,)| g).collect())
}

/// Blocking façade over [`reindex_graph`]/[`graphs_referencing`], for
/// callers (the pipeline's `s3-put` processor, running on a plain
/// synchronous dispatch thread) that have no ambient async runtime.
/// Owns a dedicated single-threaded Tokio runtime purely to drive
/// `sqlx`'s async driver, mirroring the broker crate's blocking
/// `AmqpBroker` facade over `lapin`.
pub struct BlockingIndex {
    pool: PgPool,
    runtime: tokio::runtime::Runtime,
}

impl BlockingIndex {
    pub fn new(pool: PgPool) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        Ok(Self { pool, runtime })
    }
}

impl SqlIndex for BlockingIndex {
    fn reindex_graph(&self, graph_uri: &str, triples: &[Triple], media_predicates: &[String]) -> Result<()> {
        self.runtime.block_on(reindex_graph(&self.pool, graph_uri, triples, media_predicates))
    }

    fn graphs_referencing(&self, uri: &str) -> Result<Vec<String>> {
        self.runtime.block_on(graphs_referencing(&self.pool, uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_media_predicates_is_non_empty() {
        assert_eq!(default_media_predicates().len(), 3);
    }

    #[test]
    fn media_predicates_includes_configured_extras() {
        let config = Config::from_str(
            "[twine]\nmedia-predicate-thumbnail = \"http://example.org/vocab#thumbnail\"\n",
            "twine",
        )
        .unwrap();
        let predicates = media_predicates(&config);
        assert_eq!(predicates.len(), default_media_predicates().len() + 1);
        assert!(predicates.contains(&"http://example.org/vocab#thumbnail".to_string()));
    }

    #[test]
    fn media_predicates_with_no_extras_matches_the_defaults() {
        let predicates = media_predicates(&Config::empty("twine"));
        assert_eq!(predicates, default_media_predicates());
    }

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        use oxigraph::model::NamedNode;
        Triple::new(NamedNode::new(s).unwrap(), NamedNode::new(p).unwrap(), NamedNode::new(o).unwrap())
    }

    /// spec.md §8 scenario 4: `(A, foaf:page, M)` and `(A, rdf:type,
    /// Thing)` should yield `subjects=[A]`, `objects=[M, Thing]`, and one
    /// `target_media` row `(A, [M])`.
    #[test]
    fn scenario_4_index_rebuild_matches_the_literal_example() {
        let a = "http://example.org/A";
        let m = "http://example.org/M";
        let thing = "http://example.org/vocab#Thing";
        let foaf_page = "http://xmlns.com/foaf/0.1/page";
        let rdf_type = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

        let triples = vec![triple(a, foaf_page, m), triple(a, rdf_type, thing)];

        let (subjects, objects) = collect_subject_objects(&triples);
        assert_eq!(subjects, vec![a.to_string()]);
        assert_eq!(objects, vec![m.to_string(), thing.to_string()]);

        let by_subject = collect_target_media(&triples, &default_media_predicates());
        assert_eq!(by_subject.len(), 1);
        assert_eq!(by_subject.get(a), Some(&vec![m.to_string()]));
    }

    #[test]
    fn blank_and_literal_objects_are_excluded_from_the_object_set() {
        use oxigraph::model::{BlankNode, Literal, NamedNode, Subject, Term};
        let triples = vec![
            Triple::new(
                NamedNode::new("http://example.org/A").unwrap(),
                NamedNode::new("http://example.org/knows").unwrap(),
                Term::BlankNode(BlankNode::new("x").unwrap()),
            ),
            Triple::new(
                Subject::NamedNode(NamedNode::new("http://example.org/A").unwrap()),
                NamedNode::new("http://example.org/name").unwrap(),
                Term::Literal(Literal::new_simple_literal("A")),
            ),
        ];
        let (subjects, objects) = collect_subject_objects(&triples);
        assert_eq!(subjects, vec!["http://example.org/A".to_string()]);
        assert!(objects.is_empty());
    }
}
