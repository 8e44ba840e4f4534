//! The unit of execution
//!
//! A `SparqlQuery` travels between proxies and engines, carrying its plan
//! (the pattern group), its partial result, and the control fields the
//! driver needs: step cursor, join anchor, co-run window, priority and the
//! parent ID replies route back to.

use serde::{Deserialize, Serialize};

use shoal_core::{Term, NO_ANCHOR};

use crate::pattern::{OrderEntry, Pattern, PatternGroup};
use crate::result::ResultTable;

/// Request on the way down, reply on the way back up
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    Request,
    Reply,
}

/// A planned query (or sub-query) with its partial result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SparqlQuery {
    /// Assigned by the executing engine's coder; -1 until then
    pub id: i64,
    /// Parent query ID; replies route to `Coder::sid_of/tid_of(pid)`
    pub pid: i64,
    /// Destination engine. Dispatch encodes "same server, engine `t`"
    /// as `-t - 1`; index-start sub-queries read their stride offset here.
    pub tid: i64,
    pub kind: QueryKind,
    /// Sub-queries run above their parent's priority
    pub priority: u32,

    /// Next pattern to execute
    pub step: usize,
    /// Step at which to run the co-run semi-join, if planned
    pub corun_step: Option<usize>,
    /// Step the co-run window ends at (exclusive)
    pub fetch_step: Option<usize>,
    /// The variable whose binding keeps rows on this shard
    pub local_var: Term,
    /// Fan this query out to every engine before executing
    pub force_dispatch: bool,
    /// OPTIONAL groups have been dispatched already
    pub optional_dispatched: bool,

    pub distinct: bool,
    pub offset: usize,
    pub limit: Option<usize>,
    pub orders: Vec<OrderEntry>,

    pub pattern_group: PatternGroup,
    pub result: ResultTable,
}

impl SparqlQuery {
    pub fn new(pattern_group: PatternGroup) -> Self {
        Self {
            id: -1,
            pid: -1,
            tid: 0,
            kind: QueryKind::Request,
            priority: 0,
            step: 0,
            corun_step: None,
            fetch_step: None,
            local_var: NO_ANCHOR,
            force_dispatch: false,
            optional_dispatched: false,
            distinct: false,
            offset: 0,
            limit: None,
            orders: Vec::new(),
            pattern_group,
            result: ResultTable::new(),
        }
    }

    pub fn is_request(&self) -> bool {
        self.kind == QueryKind::Request
    }

    /// All patterns in this group have been executed
    pub fn is_finished(&self) -> bool {
        self.step >= self.pattern_group.patterns.len()
    }

    pub fn get_pattern(&self, step: usize) -> &Pattern {
        &self.pattern_group.patterns[step]
    }

    pub fn current_pattern(&self) -> &Pattern {
        self.get_pattern(self.step)
    }

    /// The first pattern reads a local index (type or predicate index)
    pub fn start_from_index(&self) -> bool {
        self.pattern_group
            .patterns
            .first()
            .is_some_and(|p| p.starts_from_index())
    }

    pub fn is_union(&self) -> bool {
        !self.pattern_group.unions.is_empty()
    }

    pub fn is_optional(&self) -> bool {
        !self.pattern_group.optional.is_empty()
    }

    pub fn has_filters(&self) -> bool {
        !self.pattern_group.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::{Dir, TYPE_ID};

    #[test]
    fn test_finished_when_steps_exhausted() {
        let mut q = SparqlQuery::new(PatternGroup::from_patterns(vec![Pattern::new(
            10, 100, Dir::Out, -1,
        )]));
        assert!(!q.is_finished());
        q.step = 1;
        assert!(q.is_finished());
    }

    #[test]
    fn test_empty_group_is_finished() {
        let q = SparqlQuery::new(PatternGroup::default());
        assert!(q.is_finished());
        assert!(!q.start_from_index());
    }

    #[test]
    fn test_start_from_index() {
        let q = SparqlQuery::new(PatternGroup::from_patterns(vec![Pattern::new(
            300,
            TYPE_ID as Term,
            Dir::In,
            -1,
        )]));
        assert!(q.start_from_index());
    }
}
