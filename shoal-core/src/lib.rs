//! # Shoal Core
//!
//! Shared types for the Shoal distributed RDF graph store.
//!
//! This crate provides:
//! - Vertex/predicate IDs and pattern terms (`Vid`, `Term`) with the
//!   reserved `TYPE_ID` / `PREDICATE_ID` constants
//! - Triple and attribute-triple types with the four aggregate orderings
//! - The typed attribute value (`AttrValue`)
//! - The deterministic partitioner (`hash_mod`)
//! - The string dictionary (`StringDict`)
//! - Cluster configuration (`ClusterConfig`)
//!
//! ## Design Principles
//!
//! 1. **No global state**: configuration travels as `Arc<ClusterConfig>`
//! 2. **Deterministic partitioning**: every server computes identical
//!    `hash_mod` results, so shard ownership never needs coordination
//! 3. **Integer-only hot path**: strings live in the dictionary; triples,
//!    patterns and result tables carry IDs only

pub mod config;
pub mod dict;
pub mod error;
pub mod ids;
pub mod partition;
pub mod triple;
pub mod value;

pub use config::ClusterConfig;
pub use dict::StringDict;
pub use error::{Error, Result};
pub use ids::{Dir, Term, Vid, BLANK_ID, NO_ANCHOR, PREDICATE_ID, TYPE_ID};
pub use partition::hash_mod;
pub use triple::{AttrTriple, Triple};
pub use value::AttrValue;
