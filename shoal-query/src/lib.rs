//! # Shoal Query
//!
//! The query model shared by proxies, engines and the wire:
//!
//! - [`Pattern`] / [`PatternGroup`]: planned triple patterns with UNION
//!   alternatives, OPTIONAL groups and FILTER expressions
//! - [`ResultTable`]: the flat row-major binding table with its
//!   variable-to-column map and the three merge operators (fork-join
//!   append, UNION multiset union, OPTIONAL left-outer)
//! - [`SparqlQuery`]: the unit of execution carried between engines
//! - [`Bundle`]: the tagged wire union (query / dynamic load / store check)
//! - [`Coder`]: globally-unique query-ID assignment
//!
//! Queries arrive already parsed and planned; this crate carries no SPARQL
//! text.

pub mod bundle;
pub mod coder;
pub mod error;
pub mod filter;
pub mod pattern;
pub mod query;
pub mod result;

pub use bundle::{Bundle, GStoreCheckReq, RdfLoadReq};
pub use coder::Coder;
pub use error::{Error, Result};
pub use filter::{CmpOp, FilterArg, FilterExpr};
pub use pattern::{OrderEntry, Pattern, PatternGroup};
pub use query::{QueryKind, SparqlQuery};
pub use result::{ResultTable, VarCol, VarType};
