//! Final processing before results return to the proxy
//!
//! DISTINCT sorts row indices by the projected columns and collapses
//! adjacent duplicates on those columns; ORDER BY sorts by dictionary
//! strings per order entry; OFFSET and LIMIT slice rows; projection keeps
//! the required variables in declared order. Blind results skip all of it.

use std::cmp::Ordering;

use parking_lot::RwLock;

use shoal_core::{StringDict, Vid, BLANK_ID};
use shoal_query::SparqlQuery;

use crate::error::Result;

/// Apply DISTINCT, ORDER BY, OFFSET, LIMIT and projection in place
pub fn final_process(query: &mut SparqlQuery, dict: &RwLock<StringDict>) -> Result<()> {
    if query.result.blind || query.result.table.is_empty() {
        return Ok(());
    }

    let col_num = query.result.col_num;
    let rows = query.result.get_row_num();
    let mut order: Vec<usize> = (0..rows).collect();

    if query.distinct {
        // compare only the projected columns; fall back to all columns
        // when no projection was declared
        let proj_cols: Vec<usize> = if query.result.required_vars.is_empty() {
            (0..col_num).collect()
        } else {
            query
                .result
                .required_vars
                .iter()
                .filter_map(|&v| query.result.var2col(v))
                .collect()
        };
        let key = |r: usize| -> Vec<Vid> {
            proj_cols.iter().map(|&c| query.result.get_row_col(r, c)).collect()
        };
        order.sort_by(|&a, &b| key(a).cmp(&key(b)));
        order.dedup_by(|a, b| key(*a) == key(*b));
    }

    if !query.orders.is_empty() {
        let dict = dict.read();
        let deref = |id: Vid| dict.id2str(id).map(|s| s.to_string()).unwrap_or_default();
        order.sort_by(|&a, &b| {
            for entry in &query.orders {
                let Some(col) = query.result.var2col(entry.var) else {
                    continue;
                };
                let str_a = deref(query.result.get_row_col(a, col));
                let str_b = deref(query.result.get_row_col(b, col));
                let cmp = str_a.cmp(&str_b);
                if cmp != Ordering::Equal {
                    return if entry.descending { cmp.reverse() } else { cmp };
                }
            }
            Ordering::Equal
        });
    }

    // OFFSET / LIMIT on the surviving row order
    let start = query.offset.min(order.len());
    let end = match query.limit {
        Some(limit) => (start + limit).min(order.len()),
        None => order.len(),
    };
    let order = &order[start..end];

    // materialize, projecting to the required variables when declared
    if query.result.required_vars.is_empty() {
        let mut table = Vec::with_capacity(order.len() * col_num);
        let mut attr_table = Vec::new();
        for &r in order {
            query.result.append_row_to(r, &mut table);
            if query.result.attr_col_num > 0 {
                query.result.append_attr_row_to(r, &mut attr_table);
            }
        }
        query.result.table = table;
        query.result.attr_table = attr_table;
    } else {
        let proj: Vec<Option<usize>> = query
            .result
            .required_vars
            .iter()
            .map(|&v| query.result.var2col(v))
            .collect();
        let mut table = Vec::with_capacity(order.len() * proj.len());
        for &r in order {
            for col in &proj {
                table.push(match col {
                    Some(c) => query.result.get_row_col(r, *c),
                    None => BLANK_ID,
                });
            }
        }
        query.result.table = table;
        query.result.col_num = proj.len();
        query.result.attr_table.clear();
        query.result.attr_col_num = 0;
        let required = query.result.required_vars.clone();
        query.result.v2c.clear();
        for (i, v) in required.into_iter().enumerate() {
            query.result.add_var2col(v, i);
        }
    }

    query.result.row_num = query.result.get_row_num();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::dict::IdSpace;
    use shoal_core::Term;
    use shoal_query::{OrderEntry, PatternGroup};
    use std::sync::Arc;

    fn dict_with(entries: &[(&str, Vid)]) -> Arc<RwLock<StringDict>> {
        let mut d = StringDict::new();
        for (s, id) in entries {
            d.insert(*s, *id, IdSpace::Normal);
        }
        Arc::new(RwLock::new(d))
    }

    fn query_with_rows(vars: &[Term], rows: &[&[Vid]]) -> SparqlQuery {
        let mut q = SparqlQuery::new(PatternGroup::default());
        q.result.col_num = vars.len();
        for (i, &v) in vars.iter().enumerate() {
            q.result.add_var2col(v, i);
        }
        for row in rows {
            q.result.table.extend_from_slice(row);
        }
        q
    }

    #[test]
    fn test_distinct_collapses_projected_duplicates() {
        let dict = dict_with(&[]);
        let mut q = query_with_rows(&[-1, -2], &[&[11, 1], &[12, 2], &[11, 3]]);
        q.distinct = true;
        q.result.required_vars = vec![-1];
        final_process(&mut q, &dict).unwrap();
        assert_eq!(q.result.col_num, 1);
        assert_eq!(q.result.table, vec![11, 12]);
    }

    #[test]
    fn test_distinct_is_idempotent() {
        let dict = dict_with(&[]);
        let mut q = query_with_rows(&[-1], &[&[12], &[11], &[12]]);
        q.distinct = true;
        q.result.required_vars = vec![-1];
        final_process(&mut q, &dict).unwrap();
        let once = q.result.table.clone();
        final_process(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, once);
    }

    #[test]
    fn test_order_by_dictionary_strings() {
        let dict = dict_with(&[("\"Alice\"", 10), ("\"Bob\"", 11), ("\"Carol\"", 12)]);
        let mut q = query_with_rows(&[-1], &[&[12], &[10], &[11]]);
        q.orders.push(OrderEntry { var: -1, descending: false });
        final_process(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![10, 11, 12]);

        let mut q = query_with_rows(&[-1], &[&[12], &[10], &[11]]);
        q.orders.push(OrderEntry { var: -1, descending: true });
        final_process(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![12, 11, 10]);
    }

    #[test]
    fn test_limit_offset_window() {
        let dict = dict_with(&[("\"a\"", 1), ("\"b\"", 2), ("\"c\"", 3), ("\"d\"", 4)]);
        let mut q = query_with_rows(&[-1], &[&[1], &[2], &[3], &[4]]);
        q.orders.push(OrderEntry { var: -1, descending: false });
        q.offset = 1;
        q.limit = Some(2);
        final_process(&mut q, &dict).unwrap();
        // rows [k, k+n) of the ordered result
        assert_eq!(q.result.table, vec![2, 3]);
    }

    #[test]
    fn test_offset_past_end() {
        let dict = dict_with(&[]);
        let mut q = query_with_rows(&[-1], &[&[1]]);
        q.offset = 9;
        final_process(&mut q, &dict).unwrap();
        assert!(q.result.table.is_empty());
    }

    #[test]
    fn test_blind_skips_everything() {
        let dict = dict_with(&[]);
        let mut q = query_with_rows(&[-1], &[&[1], &[1]]);
        q.result.blind = true;
        q.distinct = true;
        final_process(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![1, 1]);
    }

    #[test]
    fn test_projection_reorders_columns() {
        let dict = dict_with(&[]);
        let mut q = query_with_rows(&[-1, -2], &[&[1, 2]]);
        q.result.required_vars = vec![-2, -1];
        final_process(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![2, 1]);
        assert_eq!(q.result.var2col(-2), Some(0));
        assert_eq!(q.result.var2col(-1), Some(1));
    }
}
