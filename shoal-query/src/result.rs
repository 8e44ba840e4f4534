//! The flat binding table
//!
//! Rows are stored row-major in one `Vec<Vid>`; attribute bindings live in
//! a parallel typed table. The variable-to-column map covers both: an entry
//! with `attr_type == 0` indexes the vertex table, anything else indexes
//! the attribute table.
//!
//! The three merge operators implement the reply-collection semantics:
//! fork-join children append, UNION children multiset-union (aligning
//! columns, padding missing variables with the null binding), OPTIONAL
//! children left-outer-merge against the parent's seed rows.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use shoal_core::{AttrValue, Term, Vid, BLANK_ID};

/// Variable binding site: column index plus attribute type tag
/// (0 = vertex column, 1/2/3 = typed attribute column)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarCol {
    pub col: usize,
    pub attr_type: u8,
}

/// How a pattern term relates to the current result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarType {
    /// Bound literal ID in the pattern
    Const,
    /// Variable already bound to a column
    Known,
    /// Free variable
    Unknown,
}

/// Row-major binding table with variable-to-column map
///
/// Attribute cells are nullable: an OPTIONAL row that matched no branch
/// carries `None` in the branch's attribute columns. Store-side attribute
/// values stay dense; nullability exists only in results.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub table: Vec<Vid>,
    pub attr_table: Vec<Option<AttrValue>>,
    pub col_num: usize,
    pub attr_col_num: usize,
    /// Row count as last materialized before the table was cleared for a
    /// blind reply; live tables derive it from the data
    pub row_num: usize,
    /// Discard payload when merging into the parent
    pub blind: bool,
    /// Total variables the planner assigned (used by co-run sub-queries)
    pub nvars: usize,
    pub v2c: HashMap<Term, VarCol>,
    /// Projection, in declared order
    pub required_vars: Vec<Term>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live row count
    pub fn get_row_num(&self) -> usize {
        if self.col_num == 0 {
            if self.attr_col_num == 0 {
                0
            } else {
                self.attr_table.len() / self.attr_col_num
            }
        } else {
            self.table.len() / self.col_num
        }
    }

    pub fn get_row_col(&self, row: usize, col: usize) -> Vid {
        self.table[row * self.col_num + col]
    }

    pub fn get_attr_row_col(&self, row: usize, col: usize) -> Option<AttrValue> {
        self.attr_table[row * self.attr_col_num + col]
    }

    /// Append row `row`'s vertex columns to `out`
    pub fn append_row_to(&self, row: usize, out: &mut Vec<Vid>) {
        let base = row * self.col_num;
        out.extend_from_slice(&self.table[base..base + self.col_num]);
    }

    /// Append row `row`'s attribute columns to `out`
    pub fn append_attr_row_to(&self, row: usize, out: &mut Vec<Option<AttrValue>>) {
        let base = row * self.attr_col_num;
        out.extend_from_slice(&self.attr_table[base..base + self.attr_col_num]);
    }

    /// Column of a vertex-bound variable
    pub fn var2col(&self, var: Term) -> Option<usize> {
        match self.v2c.get(&var) {
            Some(vc) if vc.attr_type == 0 => Some(vc.col),
            _ => None,
        }
    }

    /// Column and type of an attribute-bound variable
    pub fn var2col_attr(&self, var: Term) -> Option<(usize, u8)> {
        match self.v2c.get(&var) {
            Some(vc) if vc.attr_type != 0 => Some((vc.col, vc.attr_type)),
            _ => None,
        }
    }

    pub fn add_var2col(&mut self, var: Term, col: usize) {
        self.v2c.insert(var, VarCol { col, attr_type: 0 });
    }

    pub fn add_attr_var2col(&mut self, var: Term, col: usize, attr_type: u8) {
        self.v2c.insert(var, VarCol { col, attr_type });
    }

    /// Classify a pattern term against the current bindings
    pub fn variable_type(&self, term: Term) -> VarType {
        if term >= 0 {
            VarType::Const
        } else if self.v2c.contains_key(&term) {
            VarType::Known
        } else {
            VarType::Unknown
        }
    }

    /// Drop the payload (for blind replies), keeping shape metadata
    pub fn clear_data(&mut self) {
        self.table.clear();
        self.attr_table.clear();
    }

    /// Vertex columns in order, as `col -> var`
    fn col2var(&self) -> Vec<Option<Term>> {
        let mut cols = vec![None; self.col_num];
        for (&var, vc) in &self.v2c {
            if vc.attr_type == 0 && vc.col < self.col_num {
                cols[vc.col] = Some(var);
            }
        }
        cols
    }

    /// Add a vertex column for `var`, backfilling existing rows with the
    /// null binding
    fn add_column(&mut self, var: Term) {
        let rows = self.get_row_num();
        let old = self.col_num;
        let mut table = Vec::with_capacity(rows * (old + 1));
        for r in 0..rows {
            table.extend_from_slice(&self.table[r * old..(r + 1) * old]);
            table.push(BLANK_ID);
        }
        self.table = table;
        self.col_num = old + 1;
        self.add_var2col(var, old);
    }

    /// Add a nullable attribute column for `var`, backfilling with `None`
    fn add_attr_column(&mut self, var: Term, attr_type: u8) {
        let rows = self.get_row_num();
        let old = self.attr_col_num;
        let mut attr_table = Vec::with_capacity(rows * (old + 1));
        for r in 0..rows {
            attr_table.extend_from_slice(&self.attr_table[r * old..(r + 1) * old]);
            attr_table.push(None);
        }
        self.attr_table = attr_table;
        self.attr_col_num = old + 1;
        self.add_attr_var2col(var, old, attr_type);
    }

    /// Attribute columns in order, as `col -> var`
    fn attr_col2var(&self) -> Vec<Option<Term>> {
        let mut cols = vec![None; self.attr_col_num];
        for (&var, vc) in &self.v2c {
            if vc.attr_type != 0 && vc.col < self.attr_col_num {
                cols[vc.col] = Some(var);
            }
        }
        cols
    }

    /// Fork-join merge: plain append (children share the parent's layout)
    pub fn append_result(&mut self, other: &mut ResultTable) {
        if self.col_num == 0 && self.attr_col_num == 0 && self.v2c.is_empty() {
            *self = std::mem::take(other);
            return;
        }
        self.table.append(&mut other.table);
        self.attr_table.append(&mut other.attr_table);
        self.blind = self.blind || other.blind;
    }

    /// UNION merge: multiset union, aligning columns by variable
    ///
    /// Variables the incoming branch lacks pad with the null binding;
    /// variables it introduces become new columns backfilled with null.
    pub fn merge_union(&mut self, other: &mut ResultTable) {
        if self.col_num == 0 && self.attr_col_num == 0 && self.v2c.is_empty() {
            *self = std::mem::take(other);
            return;
        }

        // adopt branch-only variables as new columns, in column order for
        // determinism
        let mut incoming: Vec<(usize, Term)> = other
            .v2c
            .iter()
            .filter(|(_, vc)| vc.attr_type == 0)
            .map(|(&var, vc)| (vc.col, var))
            .collect();
        incoming.sort_unstable();
        for (_, var) in &incoming {
            if self.var2col(*var).is_none() {
                self.add_column(*var);
            }
        }

        let cols = self.col2var();
        let attr_cols = self.attr_col2var();
        let rows = other.get_row_num();
        for r in 0..rows {
            for var in &cols {
                let val = var
                    .and_then(|v| other.var2col(v))
                    .map(|c| other.get_row_col(r, c))
                    .unwrap_or(BLANK_ID);
                self.table.push(val);
            }
            for var in &attr_cols {
                let val = var
                    .and_then(|v| other.var2col_attr(v))
                    .and_then(|(oc, _)| other.get_attr_row_col(r, oc));
                self.attr_table.push(val);
            }
        }
    }

    /// OPTIONAL merge: left-outer against the seed rows already in `self`
    ///
    /// Matching is on the vertex variables shared with the child (the
    /// parent's bindings the child was seeded with). Matched seed rows are
    /// replaced by their extensions; unmatched ones keep null in every
    /// column the child introduced, attribute columns included.
    pub fn merge_optional(&mut self, other: &ResultTable) {
        // shared vertex vars, keyed for the join
        let shared: Vec<(usize, usize)> = {
            let mut s: Vec<(usize, usize)> = self
                .v2c
                .iter()
                .filter(|(_, vc)| vc.attr_type == 0)
                .filter_map(|(&var, vc)| other.var2col(var).map(|oc| (vc.col, oc)))
                .collect();
            s.sort_unstable();
            s
        };

        // child-only vars become new (null-backfilled) columns
        let mut fresh: Vec<(usize, Term)> = other
            .v2c
            .iter()
            .filter(|(_, vc)| vc.attr_type == 0)
            .filter(|(&var, _)| self.var2col(var).is_none())
            .map(|(&var, vc)| (vc.col, var))
            .collect();
        fresh.sort_unstable();
        for (_, var) in &fresh {
            self.add_column(*var);
        }
        let mut fresh_attr: Vec<(usize, Term, u8)> = other
            .v2c
            .iter()
            .filter(|(_, vc)| vc.attr_type != 0)
            .filter(|(&var, _)| self.var2col_attr(var).is_none())
            .map(|(&var, vc)| (vc.col, var, vc.attr_type))
            .collect();
        fresh_attr.sort_unstable();
        for &(_, var, ty) in &fresh_attr {
            self.add_attr_column(var, ty);
        }

        // index child rows by their shared-column key
        let mut by_key: HashMap<Vec<Vid>, Vec<usize>> = HashMap::new();
        for r in 0..other.get_row_num() {
            let key: Vec<Vid> = shared.iter().map(|&(_, oc)| other.get_row_col(r, oc)).collect();
            by_key.entry(key).or_default().push(r);
        }

        let cols = self.col2var();
        let attr_cols = self.attr_col2var();
        let rows = self.get_row_num();
        let old_table = std::mem::take(&mut self.table);
        let old_attr = std::mem::take(&mut self.attr_table);
        let stride = self.col_num;
        let attr_stride = self.attr_col_num;
        for r in 0..rows {
            let row = &old_table[r * stride..(r + 1) * stride];
            let attr_row = &old_attr[r * attr_stride..(r + 1) * attr_stride];
            let key: Vec<Vid> = shared.iter().map(|&(sc, _)| row[sc]).collect();
            match by_key.get(&key) {
                None => {
                    self.table.extend_from_slice(row);
                    self.attr_table.extend_from_slice(attr_row);
                }
                Some(matches) => {
                    for &m in matches {
                        for (c, var) in cols.iter().enumerate() {
                            let val = var
                                .and_then(|v| other.var2col(v))
                                .map(|oc| other.get_row_col(m, oc))
                                .unwrap_or(row[c]);
                            self.table.push(val);
                        }
                        for (c, var) in attr_cols.iter().enumerate() {
                            let val = var
                                .and_then(|v| other.var2col_attr(v))
                                .map(|(oc, _)| other.get_attr_row_col(m, oc))
                                .unwrap_or(attr_row[c]);
                            self.attr_table.push(val);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(vars: &[Term], rows: &[&[Vid]]) -> ResultTable {
        let mut t = ResultTable::new();
        t.col_num = vars.len();
        for (i, &v) in vars.iter().enumerate() {
            t.add_var2col(v, i);
        }
        for row in rows {
            t.table.extend_from_slice(row);
        }
        t
    }

    fn rows_of(t: &ResultTable) -> Vec<Vec<Vid>> {
        (0..t.get_row_num())
            .map(|r| (0..t.col_num).map(|c| t.get_row_col(r, c)).collect())
            .collect()
    }

    #[test]
    fn test_variable_type() {
        let t = table(&[-1], &[&[10]]);
        assert_eq!(t.variable_type(5), VarType::Const);
        assert_eq!(t.variable_type(-1), VarType::Known);
        assert_eq!(t.variable_type(-2), VarType::Unknown);
    }

    #[test]
    fn test_append_result_adopts_when_empty() {
        let mut parent = ResultTable::new();
        let mut child = table(&[-1], &[&[10], &[11]]);
        parent.append_result(&mut child);
        assert_eq!(parent.get_row_num(), 2);
        assert_eq!(parent.var2col(-1), Some(0));
    }

    #[test]
    fn test_append_result_concatenates() {
        let mut a = table(&[-1, -2], &[&[1, 2]]);
        let mut b = table(&[-1, -2], &[&[3, 4]]);
        a.append_result(&mut b);
        assert_eq!(rows_of(&a), vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_merge_union_same_layout() {
        let mut a = table(&[-1], &[&[11]]);
        let mut b = table(&[-1], &[&[12], &[12]]);
        a.merge_union(&mut b);
        // multiset union keeps duplicates
        assert_eq!(rows_of(&a), vec![vec![11], vec![12], vec![12]]);
    }

    #[test]
    fn test_merge_union_aligns_columns() {
        let mut a = table(&[-1], &[&[11]]);
        let mut b = table(&[-2], &[&[7]]);
        a.merge_union(&mut b);
        assert_eq!(a.col_num, 2);
        let rows = rows_of(&a);
        assert_eq!(rows[0], vec![11, BLANK_ID]);
        assert_eq!(rows[1], vec![BLANK_ID, 7]);
    }

    #[test]
    fn test_merge_optional_left_outer() {
        // seed: ?x in {11, 12}; child matched only ?x=11 with ?a=25
        let mut seed = table(&[-1], &[&[11], &[12]]);
        let child = table(&[-1, -2], &[&[11, 25]]);
        seed.merge_optional(&child);
        assert_eq!(seed.col_num, 2);
        let rows = rows_of(&seed);
        assert!(rows.contains(&vec![11, 25]));
        assert!(rows.contains(&vec![12, BLANK_ID]));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_merge_optional_attr_columns() {
        use shoal_core::AttrValue;

        // seed: ?x in {11, 12}; child bound ?a (an int attribute) for 11
        let mut seed = table(&[-1], &[&[11], &[12]]);
        let mut child = table(&[-1], &[&[11]]);
        child.attr_col_num = 1;
        child.add_attr_var2col(-2, 0, 1);
        child.attr_table.push(Some(AttrValue::Int(25)));

        seed.merge_optional(&child);
        assert_eq!(seed.attr_col_num, 1);
        let mut got: Vec<(Vid, Option<AttrValue>)> = (0..seed.get_row_num())
            .map(|r| (seed.get_row_col(r, 0), seed.get_attr_row_col(r, 0)))
            .collect();
        got.sort_by_key(|&(v, _)| v);
        assert_eq!(
            got,
            vec![(11, Some(AttrValue::Int(25))), (12, None)]
        );
    }

    #[test]
    fn test_merge_optional_multiplies_matches() {
        let mut seed = table(&[-1], &[&[11]]);
        let child = table(&[-1, -2], &[&[11, 1], &[11, 2]]);
        seed.merge_optional(&child);
        assert_eq!(rows_of(&seed), vec![vec![11, 1], vec![11, 2]]);
    }

    #[test]
    fn test_clear_data_keeps_shape() {
        let mut t = table(&[-1], &[&[10]]);
        t.row_num = t.get_row_num();
        t.clear_data();
        assert_eq!(t.row_num, 1);
        assert_eq!(t.col_num, 1);
        assert!(t.table.is_empty());
    }
}
