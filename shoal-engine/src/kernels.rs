//! The join kernels
//!
//! One step advances a query through its current pattern. The kernel is
//! chosen by the variable types of subject and object (`const`, `known`,
//! `unknown`) and the pattern's predicate category (ordinary, attribute,
//! unknown predicate). Unsupported combinations are protocol errors; the
//! driver terminates the offending query.
//!
//! Every kernel carries the attribute columns alongside the vertex columns
//! when rows are kept or expanded, so attribute bindings survive later
//! joins.

use shoal_core::{ClusterConfig, Term, Vid, NO_ANCHOR, PREDICATE_ID, TYPE_ID};
use shoal_graph::Graph;
use shoal_store::ThreadScratch;

use shoal_query::{SparqlQuery, VarType};

use crate::error::{Error, Result};

fn as_vid(term: Term) -> Result<Vid> {
    if term < 0 {
        return Err(Error::protocol(format!("expected a constant term, got variable {term}")));
    }
    Ok(term as Vid)
}

/// Execute the current pattern of `req`; advances `req.step` on success
pub fn execute_one_step(
    graph: &Graph,
    scratch: &mut ThreadScratch,
    cfg: &ClusterConfig,
    req: &mut SparqlQuery,
) -> Result<()> {
    if req.is_finished() {
        return Ok(());
    }

    if req.step == 0 && req.start_from_index() {
        return index_to_unknown(graph, cfg, req);
    }

    let pattern = *req.current_pattern();
    let s_type = req.result.variable_type(pattern.subject);
    let o_type = req.result.variable_type(pattern.object);

    // unknown predicate (VERSATILE only)
    if pattern.predicate < 0 {
        if !cfg.versatile {
            return Err(Error::protocol(
                "variable predicate requires VERSATILE mode",
            ));
        }
        return match (s_type, o_type) {
            (VarType::Const, VarType::Unknown) => const_unknown_unknown(graph, scratch, req),
            (VarType::Known, VarType::Unknown) => known_unknown_unknown(graph, scratch, req),
            _ => Err(Error::protocol(format!(
                "unsupported triple pattern with unknown predicate ({s_type:?}|{o_type:?})"
            ))),
        };
    }

    // attribute pattern
    if cfg.enable_vattr && pattern.pred_type > 0 {
        return match (s_type, o_type) {
            (VarType::Const, VarType::Unknown) => const_to_unknown_attr(graph, scratch, req),
            (VarType::Known, VarType::Unknown) => known_to_unknown_attr(graph, scratch, req),
            _ => Err(Error::protocol(format!(
                "unsupported attribute pattern ({s_type:?}|{o_type:?})"
            ))),
        };
    }

    match (s_type, o_type) {
        (VarType::Const, VarType::Unknown) => const_to_unknown(graph, scratch, req),
        (VarType::Known, VarType::Const) => known_to_const(graph, scratch, req),
        (VarType::Known, VarType::Known) => known_to_known(graph, scratch, req),
        (VarType::Known, VarType::Unknown) => known_to_unknown(graph, scratch, req),
        _ => Err(Error::protocol(format!(
            "unsupported triple pattern ({s_type:?}|{o_type:?})"
        ))),
    }
}

fn const_to_unknown(graph: &Graph, scratch: &mut ThreadScratch, req: &mut SparqlQuery) -> Result<()> {
    let pattern = *req.current_pattern();
    let start = as_vid(pattern.subject)?;
    let pid = as_vid(pattern.predicate)?;

    if req.result.col_num != 0 {
        return Err(Error::protocol("const-to-unknown requires an empty result"));
    }

    let updated: Vec<Vid> = graph
        .edges(scratch, start, pid, pattern.direction)?
        .iter()
        .collect();

    req.result.table = updated;
    req.result.add_var2col(pattern.object, 0);
    req.result.col_num = 1;
    req.step += 1;
    Ok(())
}

fn known_to_unknown(graph: &Graph, scratch: &mut ThreadScratch, req: &mut SparqlQuery) -> Result<()> {
    let pattern = *req.current_pattern();
    let pid = as_vid(pattern.predicate)?;
    let col = req
        .result
        .var2col(pattern.subject)
        .ok_or_else(|| Error::protocol("known subject has no column"))?;

    let mut updated: Vec<Vid> = Vec::with_capacity(req.result.table.len());
    let mut updated_attr = Vec::new();
    for i in 0..req.result.get_row_num() {
        let prev = req.result.get_row_col(i, col);
        let edges = graph.edges(scratch, prev, pid, pattern.direction)?;
        for k in 0..edges.len() {
            req.result.append_row_to(i, &mut updated);
            updated.push(edges.get(k));
            if req.result.attr_col_num > 0 {
                req.result.append_attr_row_to(i, &mut updated_attr);
            }
        }
    }

    let new_col = req.result.col_num;
    req.result.table = updated;
    req.result.attr_table = updated_attr;
    req.result.add_var2col(pattern.object, new_col);
    req.result.col_num = new_col + 1;
    req.step += 1;
    Ok(())
}

fn known_to_known(graph: &Graph, scratch: &mut ThreadScratch, req: &mut SparqlQuery) -> Result<()> {
    let pattern = *req.current_pattern();
    let pid = as_vid(pattern.predicate)?;
    let s_col = req
        .result
        .var2col(pattern.subject)
        .ok_or_else(|| Error::protocol("known subject has no column"))?;
    let o_col = req
        .result
        .var2col(pattern.object)
        .ok_or_else(|| Error::protocol("known object has no column"))?;

    let mut updated = Vec::new();
    let mut updated_attr = Vec::new();
    for i in 0..req.result.get_row_num() {
        let prev = req.result.get_row_col(i, s_col);
        let expected = req.result.get_row_col(i, o_col);
        let edges = graph.edges(scratch, prev, pid, pattern.direction)?;
        if edges.contains(expected) {
            req.result.append_row_to(i, &mut updated);
            if req.result.attr_col_num > 0 {
                req.result.append_attr_row_to(i, &mut updated_attr);
            }
        }
    }

    req.result.table = updated;
    req.result.attr_table = updated_attr;
    req.step += 1;
    Ok(())
}

fn known_to_const(graph: &Graph, scratch: &mut ThreadScratch, req: &mut SparqlQuery) -> Result<()> {
    let pattern = *req.current_pattern();
    let pid = as_vid(pattern.predicate)?;
    let expected = as_vid(pattern.object)?;
    let s_col = req
        .result
        .var2col(pattern.subject)
        .ok_or_else(|| Error::protocol("known subject has no column"))?;

    let mut updated = Vec::new();
    let mut updated_attr = Vec::new();
    for i in 0..req.result.get_row_num() {
        let prev = req.result.get_row_col(i, s_col);
        let edges = graph.edges(scratch, prev, pid, pattern.direction)?;
        if edges.contains(expected) {
            req.result.append_row_to(i, &mut updated);
            if req.result.attr_col_num > 0 {
                req.result.append_attr_row_to(i, &mut updated_attr);
            }
        }
    }

    req.result.table = updated;
    req.result.attr_table = updated_attr;
    req.step += 1;
    Ok(())
}

/// Start-from-index step: emit this engine's stride-sharded slice of a
/// local index list
///
/// Dispatched sub-queries carry their slice offset in `tid` — negative for
/// same-server targets, which also take the shorter stride because the
/// dispatching engine does not take a slice of its own.
fn index_to_unknown(graph: &Graph, cfg: &ClusterConfig, req: &mut SparqlQuery) -> Result<()> {
    let pattern = *req.get_pattern(0);
    let tpid = as_vid(pattern.subject)?;
    let id01 = as_vid(pattern.predicate)?;
    if id01 != TYPE_ID && id01 != PREDICATE_ID {
        return Err(Error::protocol("index step must read the type or predicate index"));
    }
    if req.result.col_num != 0 {
        return Err(Error::protocol("index-to-unknown requires an empty result"));
    }

    let (start, stride) = if req.tid < 0 {
        ((-req.tid - 1) as usize, cfg.mt_threshold.saturating_sub(1).max(1))
    } else {
        (req.tid as usize, cfg.mt_threshold.max(1))
    };

    let mut updated: Vec<Vid> = Vec::new();
    if let Some(edges) = graph.index_edges_local(tpid, pattern.direction) {
        let mut k = start;
        while k < edges.len() {
            updated.push(edges.get(k));
            k += stride;
        }
    }

    req.result.table = updated;
    req.result.col_num = 1;
    req.result.add_var2col(pattern.object, 0);
    req.step += 1;
    req.local_var = NO_ANCHOR;
    Ok(())
}

fn const_unknown_unknown(graph: &Graph, scratch: &mut ThreadScratch, req: &mut SparqlQuery) -> Result<()> {
    let pattern = *req.current_pattern();
    let start = as_vid(pattern.subject)?;

    if req.result.col_num != 0 {
        return Err(Error::protocol("const-unknown-unknown requires an empty result"));
    }

    // own the predicate list before reusing the scratch for neighbor reads
    let pids: Vec<Vid> = graph
        .edges(scratch, start, PREDICATE_ID, pattern.direction)?
        .iter()
        .collect();

    let mut updated: Vec<Vid> = Vec::new();
    for p in pids {
        let edges = graph.edges(scratch, start, p, pattern.direction)?;
        for k in 0..edges.len() {
            updated.push(p);
            updated.push(edges.get(k));
        }
    }

    req.result.table = updated;
    req.result.col_num = 2;
    req.result.add_var2col(pattern.predicate, 0);
    req.result.add_var2col(pattern.object, 1);
    req.step += 1;
    Ok(())
}

fn known_unknown_unknown(graph: &Graph, scratch: &mut ThreadScratch, req: &mut SparqlQuery) -> Result<()> {
    let pattern = *req.current_pattern();
    let s_col = req
        .result
        .var2col(pattern.subject)
        .ok_or_else(|| Error::protocol("known subject has no column"))?;

    let mut updated: Vec<Vid> = Vec::new();
    let mut updated_attr = Vec::new();
    for i in 0..req.result.get_row_num() {
        let prev = req.result.get_row_col(i, s_col);
        let pids: Vec<Vid> = graph
            .edges(scratch, prev, PREDICATE_ID, pattern.direction)?
            .iter()
            .collect();
        for p in pids {
            let edges = graph.edges(scratch, prev, p, pattern.direction)?;
            for k in 0..edges.len() {
                req.result.append_row_to(i, &mut updated);
                updated.push(p);
                updated.push(edges.get(k));
                if req.result.attr_col_num > 0 {
                    req.result.append_attr_row_to(i, &mut updated_attr);
                }
            }
        }
    }

    let old_col = req.result.col_num;
    req.result.table = updated;
    req.result.attr_table = updated_attr;
    req.result.add_var2col(pattern.predicate, old_col);
    req.result.add_var2col(pattern.object, old_col + 1);
    req.result.col_num = old_col + 2;
    req.step += 1;
    Ok(())
}

fn const_to_unknown_attr(graph: &Graph, scratch: &mut ThreadScratch, req: &mut SparqlQuery) -> Result<()> {
    let pattern = *req.current_pattern();
    let start = as_vid(pattern.subject)?;
    let aid = as_vid(pattern.predicate)?;
    if pattern.direction != shoal_core::Dir::Out {
        return Err(Error::protocol("attribute patterns always use OUT"));
    }

    let mut updated_attr = Vec::new();
    if let Some(v) = graph.attr(scratch, start, aid)? {
        updated_attr.push(Some(v));
    }

    req.result.attr_table = updated_attr;
    req.result.add_attr_var2col(pattern.object, 0, pattern.pred_type);
    req.result.attr_col_num = 1;
    req.step += 1;
    Ok(())
}

fn known_to_unknown_attr(graph: &Graph, scratch: &mut ThreadScratch, req: &mut SparqlQuery) -> Result<()> {
    let pattern = *req.current_pattern();
    let aid = as_vid(pattern.predicate)?;
    if pattern.direction != shoal_core::Dir::Out {
        return Err(Error::protocol("attribute patterns always use OUT"));
    }
    let s_col = req
        .result
        .var2col(pattern.subject)
        .ok_or_else(|| Error::protocol("known subject has no column"))?;

    let mut updated = Vec::new();
    let mut updated_attr = Vec::with_capacity(req.result.attr_table.len());
    for i in 0..req.result.get_row_num() {
        let prev = req.result.get_row_col(i, s_col);
        if let Some(v) = graph.attr(scratch, prev, aid)? {
            req.result.append_row_to(i, &mut updated);
            if req.result.attr_col_num > 0 {
                req.result.append_attr_row_to(i, &mut updated_attr);
            }
            updated_attr.push(Some(v));
        }
    }

    let new_attr_col = req.result.attr_col_num;
    req.result.table = updated;
    req.result.attr_table = updated_attr;
    req.result.add_attr_var2col(pattern.object, new_attr_col, pattern.pred_type);
    req.result.attr_col_num = new_attr_col + 1;
    req.step += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::{AttrTriple, AttrValue, ClusterConfig, Dir, Triple};
    use shoal_query::{Pattern, PatternGroup};
    use std::sync::Arc;

    fn graph_with(
        triples: &[(Vid, Vid, Vid)],
        attrs: &[(Vid, Vid, AttrValue)],
    ) -> (Arc<ClusterConfig>, Graph, ThreadScratch) {
        let cfg = Arc::new(ClusterConfig {
            num_servers: 1,
            kvstore_words: 1 << 15,
            ..Default::default()
        });
        let graph = Graph::new(0, Arc::clone(&cfg));
        let store = graph.store();
        store.refresh();

        let mut out: Vec<Triple> = triples.iter().map(|&(s, p, o)| Triple::new(s, p, o)).collect();
        let mut inn = out.clone();
        out.sort_by(Triple::cmp_spo);
        inn.sort_by(Triple::cmp_ops);
        out.dedup();
        inn.dedup();
        store.insert_normal(&out, &inn).unwrap();
        let sav: Vec<AttrTriple> = attrs.iter().map(|&(s, a, v)| AttrTriple::new(s, a, v)).collect();
        store.insert_attr(&sav).unwrap();
        store.insert_index().unwrap();

        (cfg, graph, ThreadScratch::new(0))
    }

    fn run_patterns(
        graph: &Graph,
        scratch: &mut ThreadScratch,
        cfg: &ClusterConfig,
        patterns: Vec<Pattern>,
    ) -> SparqlQuery {
        let mut q = SparqlQuery::new(PatternGroup::from_patterns(patterns));
        while !q.is_finished() {
            execute_one_step(graph, scratch, cfg, &mut q).unwrap();
        }
        q
    }

    fn rows_of(q: &SparqlQuery) -> Vec<Vec<Vid>> {
        let r = &q.result;
        let mut rows: Vec<Vec<Vid>> = (0..r.get_row_num())
            .map(|i| (0..r.col_num).map(|c| r.get_row_col(i, c)).collect())
            .collect();
        rows.sort();
        rows
    }

    /// Naive reference: join the pattern chain by Cartesian product and
    /// filtering over the raw triple list
    fn naive_two_step(triples: &[(Vid, Vid, Vid)], start: Vid, p1: Vid, p2: Vid) -> Vec<Vec<Vid>> {
        let mut rows = Vec::new();
        for &(s1, q1, x) in triples {
            if s1 != start || q1 != p1 {
                continue;
            }
            for &(s2, q2, y) in triples {
                if s2 == x && q2 == p2 {
                    rows.push(vec![x, y]);
                }
            }
        }
        rows.sort();
        rows.dedup();
        rows
    }

    #[test]
    fn test_const_to_unknown() {
        let data = [(10, 100, 11), (10, 100, 12), (11, 100, 12)];
        let (cfg, graph, mut scratch) = graph_with(&data, &[]);
        let q = run_patterns(&graph, &mut scratch, &cfg, vec![Pattern::new(10, 100, Dir::Out, -1)]);
        assert_eq!(rows_of(&q), vec![vec![11], vec![12]]);
    }

    #[test]
    fn test_two_step_matches_naive_join() {
        let data = [
            (10, 100, 11),
            (10, 100, 12),
            (11, 100, 12),
            (12, 100, 10),
            (11, 100, 10),
        ];
        let (cfg, graph, mut scratch) = graph_with(&data, &[]);
        let q = run_patterns(
            &graph,
            &mut scratch,
            &cfg,
            vec![
                Pattern::new(10, 100, Dir::Out, -1),
                Pattern::new(-1, 100, Dir::Out, -2),
            ],
        );
        assert_eq!(rows_of(&q), naive_two_step(&data, 10, 100, 100));
    }

    #[test]
    fn test_known_to_known_intersects() {
        let data = [(10, 100, 11), (10, 101, 11), (10, 100, 12)];
        let (cfg, graph, mut scratch) = graph_with(&data, &[]);
        // walk out, back over incoming edges, then check the closing edge
        // with the known-known kernel
        let q = run_patterns(
            &graph,
            &mut scratch,
            &cfg,
            vec![
                Pattern::new(10, 100, Dir::Out, -1),
                Pattern::new(-1, 100, Dir::In, -2), // who points at ?x via 100
                Pattern::new(-2, 101, Dir::Out, -1), // and reaches ?x via 101
            ],
        );
        assert_eq!(rows_of(&q), vec![vec![11, 10]]);
    }

    #[test]
    fn test_direction_in_walks_reverse_edges() {
        let data = [(10, 100, 11), (12, 100, 11)];
        let (cfg, graph, mut scratch) = graph_with(&data, &[]);
        let q = run_patterns(&graph, &mut scratch, &cfg, vec![Pattern::new(11, 100, Dir::In, -1)]);
        assert_eq!(rows_of(&q), vec![vec![10], vec![12]]);
    }

    #[test]
    fn test_attr_kernel_drops_valueless_rows() {
        let data = [(10, 100, 11), (10, 100, 12)];
        let attrs = [(11, 200, AttrValue::Int(25))];
        let (cfg, graph, mut scratch) = graph_with(&data, &attrs);
        let q = run_patterns(
            &graph,
            &mut scratch,
            &cfg,
            vec![
                Pattern::new(10, 100, Dir::Out, -1),
                Pattern::attr(-1, 200, -2, 1),
            ],
        );
        assert_eq!(rows_of(&q), vec![vec![11]]);
        assert_eq!(q.result.attr_col_num, 1);
        assert_eq!(q.result.get_attr_row_col(0, 0), Some(AttrValue::Int(25)));
    }

    #[test]
    fn test_unsupported_shape_is_protocol_error() {
        let data = [(10, 100, 11)];
        let (cfg, graph, mut scratch) = graph_with(&data, &[]);
        // const → const is not a supported kernel
        let mut q = SparqlQuery::new(PatternGroup::from_patterns(vec![Pattern::new(
            10,
            100,
            Dir::Out,
            11,
        )]));
        let err = execute_one_step(&graph, &mut scratch, &cfg, &mut q).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_index_stride_sharding_partitions_exactly() {
        let mut data = vec![];
        for v in 10..30u64 {
            data.push((v, TYPE_ID, 300));
        }
        let (cfg, graph, mut scratch) = graph_with(&data, &[]);

        // two disjoint slices with the positive-tid stride (mt_threshold=2)
        let mut seen = Vec::new();
        for off in 0..cfg.mt_threshold {
            let mut q = SparqlQuery::new(PatternGroup::from_patterns(vec![Pattern::new(
                300,
                TYPE_ID as Term,
                Dir::In,
                -1,
            )]));
            q.tid = off as i64;
            execute_one_step(&graph, &mut scratch, &cfg, &mut q).unwrap();
            assert_eq!(q.local_var, shoal_core::NO_ANCHOR);
            seen.extend(q.result.table.iter().copied());
        }
        seen.sort_unstable();
        let expected: Vec<Vid> = (10..30).collect();
        assert_eq!(seen, expected, "slices must cover the index exactly once");
    }
}

