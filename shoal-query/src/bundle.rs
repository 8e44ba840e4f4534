//! The wire bundle
//!
//! Everything engines exchange is one of three tagged payloads: a query
//! (request or reply), a dynamic-load command, or a store consistency
//! check. Framing and delivery belong to the transport adaptor; the core
//! only requires reliable in-order delivery per (source, destination)
//! pair.

use serde::{Deserialize, Serialize};

use crate::query::SparqlQuery;

/// Dynamic (incremental) load command and its reply
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RdfLoadReq {
    pub id: i64,
    pub pid: i64,
    /// Directory of dictionary-extension and data files
    pub dname: String,
    pub check_dup: bool,
    /// Triples inserted locally; filled in by the executing engine
    pub load_ret: i64,
}

impl RdfLoadReq {
    pub fn new(dname: impl Into<String>, check_dup: bool) -> Self {
        Self {
            id: -1,
            pid: -1,
            dname: dname.into(),
            check_dup,
            load_ret: 0,
        }
    }
}

/// Store consistency check command and its reply
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GStoreCheckReq {
    pub id: i64,
    pub pid: i64,
    pub index_check: bool,
    pub normal_check: bool,
    /// Violations found; filled in by the executing engine
    pub check_ret: i64,
}

impl GStoreCheckReq {
    pub fn new(index_check: bool, normal_check: bool) -> Self {
        Self {
            id: -1,
            pid: -1,
            index_check,
            normal_check,
            check_ret: 0,
        }
    }
}

/// Tagged union carried by the transport
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Bundle {
    Sparql(SparqlQuery),
    DynamicLoad(RdfLoadReq),
    GStoreCheck(GStoreCheckReq),
}
