//! Planned triple patterns and pattern groups

use serde::{Deserialize, Serialize};

use shoal_core::{Dir, Term, PREDICATE_ID, TYPE_ID};

use crate::filter::FilterExpr;

/// One planned triple pattern
///
/// `pred_type` is 0 for an ordinary predicate and the attribute type tag
/// (1/2/3) for an attribute pattern, whose object binds a typed scalar
/// column instead of a vertex column.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub subject: Term,
    pub predicate: Term,
    pub direction: Dir,
    pub object: Term,
    pub pred_type: u8,
}

impl Pattern {
    pub fn new(subject: Term, predicate: Term, direction: Dir, object: Term) -> Self {
        Self {
            subject,
            predicate,
            direction,
            object,
            pred_type: 0,
        }
    }

    pub fn attr(subject: Term, predicate: Term, object: Term, pred_type: u8) -> Self {
        Self {
            subject,
            predicate,
            direction: Dir::Out,
            object,
            pred_type,
        }
    }

    /// True if this pattern reads a local index rather than adjacency:
    /// a constant subject naming a type (`(T, TYPE_ID, IN, ?x)`) or the
    /// predicate index (`PREDICATE_ID`)
    pub fn starts_from_index(&self) -> bool {
        if self.subject <= 0 {
            return false;
        }
        (self.predicate == TYPE_ID as Term && self.direction == Dir::In)
            || self.predicate == PREDICATE_ID as Term
    }
}

/// ORDER BY entry
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub var: Term,
    pub descending: bool,
}

/// A group of patterns with its UNION alternatives, OPTIONAL groups and
/// FILTER expressions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternGroup {
    pub patterns: Vec<Pattern>,
    pub filters: Vec<FilterExpr>,
    pub optional: Vec<PatternGroup>,
    pub unions: Vec<PatternGroup>,
}

impl PatternGroup {
    pub fn from_patterns(patterns: Vec<Pattern>) -> Self {
        Self {
            patterns,
            ..Default::default()
        }
    }
}
