//! Bidirectional string dictionary
//!
//! Maps textual IRIs/literals to integer IDs and back. The ID space is
//! split into two monotonic counters: *index IDs* for predicates and types
//! (the `str_index` file) and *normal IDs* for entities and literals
//! (`str_normal`). Incremental load extends the dictionary with fresh IDs
//! for unseen strings.
//!
//! Strings are stored once as `Arc<str>` and shared between the forward and
//! reverse maps.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::ids::Vid;

/// Which counter a dictionary entry draws from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdSpace {
    /// Predicates and types (`str_index`)
    Index,
    /// Entities and literals (`str_normal`)
    Normal,
}

/// First assignable index ID (0 and 1 are the reserved predicates)
pub const FIRST_INDEX_ID: Vid = 2;

/// First assignable normal ID, above the packed-key predicate range so an
/// entity ID can never masquerade as a predicate
pub const FIRST_NORMAL_ID: Vid = 1 << 17;

/// Bidirectional string↔ID dictionary with split ID counters
#[derive(Clone, Debug)]
pub struct StringDict {
    id2str: HashMap<Vid, Arc<str>>,
    str2id: HashMap<Arc<str>, Vid>,
    next_index_id: Vid,
    next_normal_id: Vid,
}

impl Default for StringDict {
    fn default() -> Self {
        Self {
            id2str: HashMap::new(),
            str2id: HashMap::new(),
            next_index_id: FIRST_INDEX_ID,
            next_normal_id: FIRST_NORMAL_ID,
        }
    }
}

impl StringDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `id` names a known string
    pub fn exist_id(&self, id: Vid) -> bool {
        self.id2str.contains_key(&id)
    }

    /// True if `s` is a known string
    pub fn exist_str(&self, s: &str) -> bool {
        self.str2id.contains_key(s)
    }

    /// Dereference an ID; unknown IDs resolve to `None`
    pub fn id2str(&self, id: Vid) -> Option<Arc<str>> {
        self.id2str.get(&id).cloned()
    }

    /// Look up a string's ID
    pub fn str2id(&self, s: &str) -> Option<Vid> {
        self.str2id.get(s).copied()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.id2str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2str.is_empty()
    }

    /// Insert an entry with a caller-assigned ID, advancing the space's
    /// counter past it
    ///
    /// Later entries with the same ID overwrite the forward mapping; the
    /// dictionary files are expected not to do that.
    pub fn insert(&mut self, s: impl Into<Arc<str>>, id: Vid, space: IdSpace) {
        let s = s.into();
        self.id2str.insert(id, Arc::clone(&s));
        self.str2id.insert(s, id);
        match space {
            IdSpace::Index => self.next_index_id = self.next_index_id.max(id + 1),
            IdSpace::Normal => self.next_normal_id = self.next_normal_id.max(id + 1),
        }
    }

    /// Return the ID for `s`, allocating a fresh one from `space` if unseen
    pub fn get_or_insert(&mut self, s: &str, space: IdSpace) -> Vid {
        if let Some(id) = self.str2id(s) {
            return id;
        }
        let id = match space {
            IdSpace::Index => {
                let id = self.next_index_id;
                self.next_index_id += 1;
                id
            }
            IdSpace::Normal => {
                let id = self.next_normal_id;
                self.next_normal_id += 1;
                id
            }
        };
        self.insert(s.to_owned(), id, space);
        id
    }

    pub fn next_index_id(&self) -> Vid {
        self.next_index_id
    }

    pub fn next_normal_id(&self) -> Vid {
        self.next_normal_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut d = StringDict::new();
        d.insert("<http://example.org/Alice>", 10, IdSpace::Normal);
        assert!(d.exist_id(10));
        assert_eq!(d.str2id("<http://example.org/Alice>"), Some(10));
        assert_eq!(d.id2str(10).as_deref(), Some("<http://example.org/Alice>"));
        assert!(!d.exist_id(11));
    }

    #[test]
    fn test_get_or_insert_is_idempotent() {
        let mut d = StringDict::new();
        d.insert("knows", 100, IdSpace::Index);
        assert_eq!(d.get_or_insert("knows", IdSpace::Index), 100);
        let fresh = d.get_or_insert("likes", IdSpace::Index);
        assert_eq!(fresh, 101);
        assert_eq!(d.get_or_insert("likes", IdSpace::Index), 101);
    }

    #[test]
    fn test_counters_are_independent() {
        let mut d = StringDict::new();
        d.insert("knows", 100, IdSpace::Index);
        d.insert("\"Alice\"", 10, IdSpace::Normal);
        assert_eq!(d.get_or_insert("new-pred", IdSpace::Index), 101);
        // normal IDs never dip into the predicate range
        assert_eq!(d.get_or_insert("\"Bob\"", IdSpace::Normal), FIRST_NORMAL_ID);
    }

    #[test]
    fn test_fresh_ids_avoid_reserved_predicates() {
        let mut d = StringDict::new();
        assert_eq!(d.get_or_insert("first-pred", IdSpace::Index), FIRST_INDEX_ID);
    }
}
