//! # Shoal Net
//!
//! The transport seams of the cluster, in their in-process forms:
//!
//! - [`Adaptor`]: the per-thread message endpoint engines and proxies use —
//!   non-blocking `send` (false means backpressure, the caller stashes and
//!   retries) and non-blocking `try_recv`.
//! - [`Mesh`]: bounded channels between every `(server, thread)` pair of a
//!   single-process cluster.
//! - [`SharedMem`]: the one-sided read/write fabric over the servers'
//!   arenas, standing in for RDMA verbs. A multi-node deployment provides
//!   its own implementations of the same two seams.
//!
//! Delivery is reliable and in-order per (source, destination) pair, which
//! is all the engine requires.

pub mod adaptor;
pub mod mesh;
pub mod shm;

pub use adaptor::Adaptor;
pub use mesh::Mesh;
pub use shm::SharedMem;
