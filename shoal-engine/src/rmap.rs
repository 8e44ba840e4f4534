//! The reply map
//!
//! Tracks fork/join, UNION and OPTIONAL parents waiting on child replies.
//! Each engine owns one, guarded by its lock; work-stolen executions route
//! replies through the queue owner's map so merges always happen where the
//! parent was registered.

use hashbrown::HashMap;

use shoal_query::{ResultTable, SparqlQuery};

struct Item {
    count: usize,
    parent: SparqlQuery,
    merged: ResultTable,
}

/// Per-engine table of in-flight multi-reply queries
#[derive(Default)]
pub struct ReplyMap {
    items: HashMap<i64, Item>,
}

impl ReplyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parent waiting on `count` children
    ///
    /// An OPTIONAL parent whose groups are already dispatched seeds the
    /// merge with its own rows: the left side of the outer merge.
    pub fn put_parent_request(&mut self, parent: SparqlQuery, count: usize) {
        let merged = if parent.is_optional() && parent.optional_dispatched {
            parent.result.clone()
        } else {
            ResultTable::new()
        };
        self.items.insert(parent.id, Item { count, parent, merged });
    }

    /// Merge one child reply into its parent's accumulator
    pub fn put_reply(&mut self, mut reply: SparqlQuery) {
        let Some(item) = self.items.get_mut(&reply.pid) else {
            tracing::warn!(pid = reply.pid, "reply for unknown parent dropped");
            return;
        };
        item.count -= 1;
        if item.parent.is_union() {
            item.merged.merge_union(&mut reply.result);
        } else if item.parent.is_optional() && item.parent.optional_dispatched {
            item.merged.merge_optional(&reply.result);
        } else {
            item.merged.append_result(&mut reply.result);
        }
    }

    /// All children of `pid` have replied
    pub fn is_ready(&self, pid: i64) -> bool {
        self.items.get(&pid).is_some_and(|item| item.count == 0)
    }

    /// Remove the parent and hand it back with the merged result
    ///
    /// The parent's own blind flag and projection survive the swap; the
    /// merged table contributes rows, columns and the variable map.
    pub fn get_merged_reply(&mut self, pid: i64) -> Option<SparqlQuery> {
        let item = self.items.remove(&pid)?;
        let mut parent = item.parent;
        let blind = parent.result.blind;
        let required_vars = std::mem::take(&mut parent.result.required_vars);
        parent.result = item.merged;
        parent.result.blind = blind;
        parent.result.required_vars = required_vars;
        Some(parent)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_query::{Pattern, PatternGroup};
    use shoal_core::Dir;

    fn parent_with_id(id: i64) -> SparqlQuery {
        let mut q = SparqlQuery::new(PatternGroup::from_patterns(vec![Pattern::new(
            10, 100, Dir::Out, -1,
        )]));
        q.id = id;
        q
    }

    fn child_reply(pid: i64, rows: &[&[u64]]) -> SparqlQuery {
        let mut q = SparqlQuery::new(PatternGroup::default());
        q.pid = pid;
        q.result.col_num = rows.first().map_or(0, |r| r.len());
        q.result.add_var2col(-1, 0);
        for row in rows {
            q.result.table.extend_from_slice(row);
        }
        q
    }

    #[test]
    fn test_fork_join_appends() {
        let mut rmap = ReplyMap::new();
        rmap.put_parent_request(parent_with_id(7), 2);
        assert!(!rmap.is_ready(7));

        rmap.put_reply(child_reply(7, &[&[11]]));
        assert!(!rmap.is_ready(7));
        rmap.put_reply(child_reply(7, &[&[12]]));
        assert!(rmap.is_ready(7));

        let merged = rmap.get_merged_reply(7).unwrap();
        assert_eq!(merged.result.get_row_num(), 2);
        assert!(rmap.is_empty());
    }

    #[test]
    fn test_reply_order_does_not_matter() {
        let run = |first: &[u64], second: &[u64]| {
            let mut rmap = ReplyMap::new();
            rmap.put_parent_request(parent_with_id(9), 2);
            rmap.put_reply(child_reply(9, &[first]));
            rmap.put_reply(child_reply(9, &[second]));
            let mut rows: Vec<u64> = rmap.get_merged_reply(9).unwrap().result.table;
            rows.sort_unstable();
            rows
        };
        assert_eq!(run(&[11], &[12]), run(&[12], &[11]));
    }

    #[test]
    fn test_unknown_parent_is_dropped() {
        let mut rmap = ReplyMap::new();
        rmap.put_reply(child_reply(42, &[&[1]]));
        assert!(rmap.is_empty());
    }
}
