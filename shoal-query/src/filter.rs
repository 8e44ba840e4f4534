//! FILTER expression trees
//!
//! Expressions are evaluated per row against the dereferenced dictionary
//! strings of bound IDs; evaluation lives in the engine, this is the model.

use serde::{Deserialize, Serialize};

use shoal_core::Term;

/// Relational comparator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Comparison operand: a variable's dereferenced string or a literal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterArg {
    Var(Term),
    Literal(String),
}

/// FILTER expression tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Cmp {
        op: CmpOp,
        lhs: FilterArg,
        rhs: FilterArg,
    },
    Bound(Term),
    IsIri(Term),
    IsLiteral(Term),
    Regex {
        var: Term,
        pattern: String,
        flags: Option<String>,
    },
}

impl FilterExpr {
    /// Convenience constructor for a variable-vs-literal comparison
    pub fn cmp_lit(op: CmpOp, var: Term, lit: impl Into<String>) -> Self {
        FilterExpr::Cmp {
            op,
            lhs: FilterArg::Var(var),
            rhs: FilterArg::Literal(lit.into()),
        }
    }
}
