//! Per-retrieval column and join aliases.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

/// Hands out select aliases that are unique within one retrieval.
///
/// Include handlers select helper columns under these aliases and schedule
/// fixes against them. A fresh sequence is used for every retrieval, so the
/// same request always yields the same SQL. The sequence also remembers
/// which join aliases have been added, so handlers sharing a join add it once.
#[derive(Debug, Default)]
pub struct AliasSequence {
    issued: Cell<u32>,
    joined: RefCell<HashSet<String>>,
}

impl AliasSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next alias derived from `hint`, e.g. `phase.tags` → `phase_tags_1`.
    pub fn next(&self, hint: &str) -> String {
        let n = self.issued.get() + 1;
        self.issued.set(n);

        let mut alias: String = hint
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if !alias.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            alias.insert(0, '_');
        }
        format!("{alias}_{n}")
    }

    /// Record the join alias `alias`. True when it was not joined yet.
    pub fn claim_join(&self, alias: &str) -> bool {
        self.joined.borrow_mut().insert(alias.to_string())
    }

    pub fn reset(&self) {
        self.issued.set(0);
        self.joined.borrow_mut().clear();
    }
}
