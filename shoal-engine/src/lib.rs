//! # Shoal Engine
//!
//! The parallel query execution engine. Each engine is a worker thread
//! that advances queries step by step through their planned patterns:
//!
//! - [`kernels`]: the join kernels — const→unknown, known→known and
//!   friends, index starts with stride sharding, attribute and
//!   unknown-predicate (VERSATILE) variants
//! - [`driver`]: the control flow around them — force-dispatch fan-out,
//!   fork/join vs in-place, UNION/OPTIONAL dispatch, co-run semi-join,
//!   reply handling
//! - [`rmap`]: the per-engine table of in-flight fork/join parents
//! - [`filter`] / [`finalize`]: FILTER evaluation and
//!   DISTINCT/ORDER/OFFSET/LIMIT/projection
//! - [`worker`]: the per-thread scheduler loop (fast path, priority,
//!   work-stealing, adaptive snooze)
//! - [`proxy`]: the client-facing thread that assigns query IDs and waits
//!   for final replies
//! - [`cluster`]: single-process cluster bootstrap used by the server
//!   binary and the test suites

pub mod cluster;
pub mod driver;
pub mod error;
pub mod filter;
pub mod finalize;
pub mod kernels;
pub mod proxy;
pub mod rmap;
pub mod worker;

pub use cluster::Cluster;
pub use driver::Engine;
pub use error::{Error, Result};
pub use proxy::Proxy;
pub use rmap::ReplyMap;
