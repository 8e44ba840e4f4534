//! # Shoal Graph
//!
//! Maps the RDF model (triples, predicates) onto the graph model (vertices,
//! edges, indices) held by [`shoal_store::GStore`], and owns every way data
//! gets in:
//!
//! - **Exchange-load**: each server reads its share of the input files and
//!   scatters triples to their owning shards with one-sided writes into a
//!   pre-agreed staging slot (fast path, needs the one-sided fabric).
//! - **All-files load**: each server reads every file and keeps only the
//!   triples it owns (no network, more I/O; the fallback without RDMA).
//! - **Incremental load**: dictionary extension plus `id2id`-remapped
//!   inserts into the live store.
//!
//! The [`Graph`] facade is what the query engine talks to.

pub mod dynamic;
pub mod error;
pub mod files;
pub mod graph;
pub mod loader;

pub use error::{Error, Result};
pub use graph::Graph;
pub use loader::{LoadPhase, Loader};
