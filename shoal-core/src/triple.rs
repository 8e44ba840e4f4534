//! Triples, attribute triples and the aggregate orderings
//!
//! The loader sorts each engine thread's share of the data before bulk
//! insert. The ordering decides how keys are laid out in the store:
//! subject-major (`spo` / `ops`) in VERSATILE mode so per-vertex predicate
//! lists fall out of adjacent runs, predicate-major (`pso` / `pos`)
//! otherwise for predicate-range friendliness.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::ids::Vid;
use crate::value::AttrValue;

/// One RDF triple in the integer ID space
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub s: Vid,
    pub p: Vid,
    pub o: Vid,
}

impl Triple {
    pub fn new(s: Vid, p: Vid, o: Vid) -> Self {
        Self { s, p, o }
    }

    /// Subject, predicate, object
    pub fn cmp_spo(&self, other: &Self) -> Ordering {
        (self.s, self.p, self.o).cmp(&(other.s, other.p, other.o))
    }

    /// Object, predicate, subject
    pub fn cmp_ops(&self, other: &Self) -> Ordering {
        (self.o, self.p, self.s).cmp(&(other.o, other.p, other.s))
    }

    /// Predicate, subject, object
    pub fn cmp_pso(&self, other: &Self) -> Ordering {
        (self.p, self.s, self.o).cmp(&(other.p, other.s, other.o))
    }

    /// Predicate, object, subject
    pub fn cmp_pos(&self, other: &Self) -> Ordering {
        (self.p, self.o, self.s).cmp(&(other.p, other.o, other.s))
    }
}

/// Drop adjacent duplicates from a sorted triple run
///
/// Equality ignores the sort order, so any of the four orderings works.
pub fn dedup_triples(triples: &mut Vec<Triple>) {
    triples.dedup();
}

/// One attribute triple: subject, attribute predicate, typed scalar
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttrTriple {
    pub s: Vid,
    pub a: Vid,
    pub v: AttrValue,
}

impl AttrTriple {
    pub fn new(s: Vid, a: Vid, v: AttrValue) -> Self {
        Self { s, a, v }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spo_groups_by_subject() {
        let mut ts = vec![
            Triple::new(2, 1, 1),
            Triple::new(1, 2, 9),
            Triple::new(1, 1, 5),
        ];
        ts.sort_by(Triple::cmp_spo);
        assert_eq!(
            ts,
            vec![
                Triple::new(1, 1, 5),
                Triple::new(1, 2, 9),
                Triple::new(2, 1, 1),
            ]
        );
    }

    #[test]
    fn test_pos_groups_by_predicate_then_object() {
        let mut ts = vec![
            Triple::new(9, 1, 2),
            Triple::new(5, 2, 1),
            Triple::new(4, 1, 2),
        ];
        ts.sort_by(Triple::cmp_pos);
        assert_eq!(
            ts,
            vec![
                Triple::new(4, 1, 2),
                Triple::new(9, 1, 2),
                Triple::new(5, 2, 1),
            ]
        );
    }

    #[test]
    fn test_dedup_after_sort() {
        let mut ts = vec![
            Triple::new(1, 1, 1),
            Triple::new(1, 1, 1),
            Triple::new(1, 1, 2),
        ];
        ts.sort_by(Triple::cmp_spo);
        dedup_triples(&mut ts);
        assert_eq!(ts.len(), 2);
    }
}
