//! Clients for the services the workflow engine treats as external:
//! a remote SPARQL store, an S3-compatible object store (with its own
//! AWS v2 request signer), and the Postgres subject/object index.

pub mod index;
pub mod migrate;
pub mod object_store;
pub mod s3_sign;
pub mod sparql;

pub use object_store::{S3Config, S3Store};
pub use sparql::{HttpSparqlClient, SparqlConfig};
