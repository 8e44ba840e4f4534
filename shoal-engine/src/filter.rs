//! FILTER evaluation
//!
//! Builds a per-row satisfaction vector initialized true, recurses on AND
//! in place and on OR by splitting and re-merging, and flips rows to false
//! when a leaf predicate fails. Comparisons are string comparisons over
//! dictionary-dereferenced IDs; unbound IDs dereference to the empty
//! string. Regexes compile once per filter, not per row.

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use tracing::warn;

use shoal_core::{StringDict, Term, Vid, BLANK_ID};
use shoal_query::{CmpOp, FilterArg, FilterExpr, ResultTable, SparqlQuery};

use crate::error::{Error, Result};

/// Apply every filter of the query's group and drop failing rows
pub fn apply_filters(query: &mut SparqlQuery, dict: &RwLock<StringDict>) -> Result<()> {
    if !query.has_filters() {
        return Ok(());
    }

    let rows = query.result.get_row_num();
    let mut satisfied = vec![true; rows];
    {
        let dict = dict.read();
        for filter in &query.pattern_group.filters {
            eval_filter(filter, &query.result, &dict, &mut satisfied)?;
        }
    }

    let mut table = Vec::with_capacity(query.result.table.len());
    let mut attr_table = Vec::new();
    for (row, keep) in satisfied.iter().enumerate() {
        if *keep {
            query.result.append_row_to(row, &mut table);
            if query.result.attr_col_num > 0 {
                query.result.append_attr_row_to(row, &mut attr_table);
            }
        }
    }
    query.result.table = table;
    query.result.attr_table = attr_table;
    query.result.row_num = query.result.get_row_num();
    Ok(())
}

fn eval_filter(
    filter: &FilterExpr,
    result: &ResultTable,
    dict: &StringDict,
    satisfied: &mut [bool],
) -> Result<()> {
    match filter {
        FilterExpr::And(lhs, rhs) => {
            eval_filter(lhs, result, dict, satisfied)?;
            eval_filter(rhs, result, dict, satisfied)?;
        }
        FilterExpr::Or(lhs, rhs) => {
            // a row satisfies OR iff it satisfies either arm
            let mut left = vec![true; satisfied.len()];
            let mut right = vec![true; satisfied.len()];
            eval_filter(lhs, result, dict, &mut left)?;
            eval_filter(rhs, result, dict, &mut right)?;
            for (i, sat) in satisfied.iter_mut().enumerate() {
                *sat = *sat && (left[i] || right[i]);
            }
        }
        FilterExpr::Cmp { op, lhs, rhs } => {
            relational_filter(*op, lhs, rhs, result, dict, satisfied)?;
        }
        FilterExpr::Bound(var) => {
            let col = result.var2col(*var);
            for (row, sat) in satisfied.iter_mut().enumerate() {
                if !*sat {
                    continue;
                }
                let bound = match col {
                    Some(c) => result.get_row_col(row, c) != BLANK_ID,
                    None => false,
                };
                if !bound {
                    *sat = false;
                }
            }
        }
        FilterExpr::IsIri(var) => {
            let pattern = Regex::new(IRI_REF_PATTERN)
                .map_err(|e| Error::protocol(format!("bad isIRI pattern: {e}")))?;
            match_filter(*var, &pattern, result, dict, satisfied, false);
        }
        FilterExpr::IsLiteral(var) => {
            let pattern = Regex::new(LITERAL_PATTERN)
                .map_err(|e| Error::protocol(format!("bad isLiteral pattern: {e}")))?;
            match_filter(*var, &pattern, result, dict, satisfied, false);
        }
        FilterExpr::Regex { var, pattern, flags } => {
            let icase = flags.as_deref().is_some_and(|f| f.contains('i'));
            let re = RegexBuilder::new(pattern)
                .case_insensitive(icase)
                .build()
                .map_err(|e| Error::protocol(format!("bad regex {pattern:?}: {e}")))?;
            match_filter(*var, &re, result, dict, satisfied, true);
        }
    }
    Ok(())
}

fn deref(dict: &StringDict, id: Vid) -> String {
    dict.id2str(id).map(|s| s.to_string()).unwrap_or_default()
}

fn relational_filter(
    op: CmpOp,
    lhs: &FilterArg,
    rhs: &FilterArg,
    result: &ResultTable,
    dict: &StringDict,
    satisfied: &mut [bool],
) -> Result<()> {
    let col_of = |arg: &FilterArg| match arg {
        FilterArg::Var(v) => result.var2col(*v),
        FilterArg::Literal(_) => None,
    };
    let lcol = col_of(lhs);
    let rcol = col_of(rhs);

    let get_str = |arg: &FilterArg, row: usize, col: Option<usize>| -> String {
        match arg {
            FilterArg::Var(_) => match col {
                Some(c) => deref(dict, result.get_row_col(row, c)),
                None => String::new(),
            },
            // literals compare as their quoted dictionary form
            FilterArg::Literal(lit) => format!("\"{lit}\""),
        }
    };

    for (row, sat) in satisfied.iter_mut().enumerate() {
        if !*sat {
            continue;
        }
        let a = get_str(lhs, row, lcol);
        let b = get_str(rhs, row, rcol);
        let keep = match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
        if !keep {
            *sat = false;
        }
    }
    Ok(())
}

/// Flip rows whose dereferenced string fails the regex
///
/// `strip_quotes` implements the `regex()` builtin contract: the argument
/// must be a literal, whose surrounding quotes are removed before
/// matching. `isIRI` / `isLiteral` match the full dictionary form instead.
fn match_filter(
    var: Term,
    re: &Regex,
    result: &ResultTable,
    dict: &StringDict,
    satisfied: &mut [bool],
    strip_quotes: bool,
) {
    let col = result.var2col(var);
    for (row, sat) in satisfied.iter_mut().enumerate() {
        if !*sat {
            continue;
        }
        let Some(c) = col else {
            *sat = false;
            continue;
        };
        let mut s = deref(dict, result.get_row_col(row, c));
        if strip_quotes {
            if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
                s = s[1..s.len() - 1].to_string();
            } else {
                warn!(var, "regex argument is not a string literal");
            }
        }
        if !re.is_match(&s) {
            *sat = false;
        }
    }
}

/// Full-match IRI form: `<...>` reference or prefixed name
const IRI_REF_PATTERN: &str = r#"^(<([^<>\\"{}|^`])*>|.*:.*)$"#;

/// Full-match RDF literal: quoted string with optional language tag or
/// datatype IRI
const LITERAL_PATTERN: &str = r#"^('([^'\\\n\r]|\\[tbnrf"'])*'|"([^"\\\n\r]|\\[tbnrf"'])*")(@[a-zA-Z]+(-[a-zA-Z0-9]+)*|\^\^(<([^<>\\"{}|^`])*>|.*:.*))?$"#;

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::dict::IdSpace;
    use shoal_query::{PatternGroup, SparqlQuery};
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
    fn test_regex_case_insensitive_prefix() {
        let dict = dict_with(&[("\"Alice\"", 10), ("\"Bob\"", 11)]);
        let mut q = query_with_rows(&[-1], &[&[10], &[11]]);
        q.pattern_group.filters.push(FilterExpr::Regex {
            var: -1,
            pattern: "^al".to_string(),
            flags: Some("i".to_string()),
        });
        apply_filters(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![10]);
    }

    #[test]
    fn test_regex_without_icase_flag() {
        let dict = dict_with(&[("\"Alice\"", 10)]);
        let mut q = query_with_rows(&[-1], &[&[10]]);
        q.pattern_group.filters.push(FilterExpr::Regex {
            var: -1,
            pattern: "^al".to_string(),
            flags: None,
        });
        apply_filters(&mut q, &dict).unwrap();
        assert!(q.result.table.is_empty());
    }

    #[test]
    fn test_relational_on_strings() {
        let dict = dict_with(&[("\"Alice\"", 10), ("\"Bob\"", 11)]);
        let mut q = query_with_rows(&[-1], &[&[10], &[11]]);
        q.pattern_group
            .filters
            .push(FilterExpr::cmp_lit(CmpOp::Eq, -1, "Alice"));
        apply_filters(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![10]);
    }

    #[test]
    fn test_or_merges_by_disjunction() {
        let dict = dict_with(&[("\"Alice\"", 10), ("\"Bob\"", 11), ("\"Carol\"", 12)]);
        let mut q = query_with_rows(&[-1], &[&[10], &[11], &[12]]);
        q.pattern_group.filters.push(FilterExpr::Or(
            Box::new(FilterExpr::cmp_lit(CmpOp::Eq, -1, "Alice")),
            Box::new(FilterExpr::cmp_lit(CmpOp::Eq, -1, "Bob")),
        ));
        apply_filters(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![10, 11]);
    }

    #[test]
    fn test_and_narrows() {
        let dict = dict_with(&[("\"Alice\"", 10), ("\"Bob\"", 11)]);
        let mut q = query_with_rows(&[-1], &[&[10], &[11]]);
        q.pattern_group.filters.push(FilterExpr::And(
            Box::new(FilterExpr::cmp_lit(CmpOp::Ne, -1, "Bob")),
            Box::new(FilterExpr::cmp_lit(CmpOp::Ne, -1, "Carol")),
        ));
        apply_filters(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![10]);
    }

    #[test]
    fn test_bound_drops_nulls() {
        let dict = dict_with(&[]);
        let mut q = query_with_rows(&[-1, -2], &[&[10, 25], &[11, BLANK_ID]]);
        q.pattern_group.filters.push(FilterExpr::Bound(-2));
        apply_filters(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![10, 25]);
    }

    #[test]
    fn test_is_iri_and_is_literal() {
        let dict = dict_with(&[("<http://example.org/Alice>", 10), ("\"Alice\"", 11)]);
        let mut q = query_with_rows(&[-1], &[&[10], &[11]]);
        q.pattern_group.filters.push(FilterExpr::IsIri(-1));
        apply_filters(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![10]);

        let mut q = query_with_rows(&[-1], &[&[10], &[11]]);
        q.pattern_group.filters.push(FilterExpr::IsLiteral(-1));
        apply_filters(&mut q, &dict).unwrap();
        assert_eq!(q.result.table, vec![11]);
    }

    #[test]
    fn test_unbound_var_compares_as_empty() {
        let dict = dict_with(&[("\"Alice\"", 10)]);
        let mut q = query_with_rows(&[-1], &[&[10]]);
        // ?missing = "Alice" can never hold; ?missing dereferences to ""
        q.pattern_group
            .filters
            .push(FilterExpr::cmp_lit(CmpOp::Eq, -9, "Alice"));
        apply_filters(&mut q, &dict).unwrap();
        assert!(q.result.table.is_empty());
    }
}
