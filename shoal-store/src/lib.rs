//! # Shoal Store
//!
//! The per-server shard of the graph: an in-memory key-value store mapping
//! `(vertex, predicate, direction)` to sorted adjacency lists, plus typed
//! attribute values and the local index entries.
//!
//! ## Layout
//!
//! The store is one large word arena split into two zones: a hash-bucket
//! zone of fixed-size buckets (each a handful of `(key, value)` slot pairs
//! with a chained overflow slot) and a payload zone of packed vertex-ID
//! arrays. Bucket geometry is derived deterministically from configuration,
//! so every server in the cluster computes identical offsets — that is what
//! makes the one-sided remote fetch protocol possible: a reader walks a
//! peer's buckets by address arithmetic alone.
//!
//! ## Concurrency
//!
//! Readers are lock-free (acquire loads on arena words). Writers serialize
//! per main bucket; payload and overflow-bucket allocation is a fetch-add.
//! Bulk load additionally partitions vertices among engine threads so most
//! inserts never contend.

pub mod arena;
pub mod error;
pub mod gstore;
pub mod layout;
pub mod remote;

pub use arena::Arena;
pub use error::{Error, Result};
pub use gstore::{Edges, GStore};
pub use layout::{EdgeKey, Geometry, ASSOCIATIVITY, BUCKET_WORDS};
pub use remote::{RemoteMem, ThreadScratch};
