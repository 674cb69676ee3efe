//! Accumulated match results across rounds

use std::collections::HashSet;

use super::protocol::{MatchPartner, MatchResultEntry};

/// Append-only list of match results, unique per `(with, round)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchHistory {
    entries: Vec<MatchResultEntry>,
    seen: HashSet<(MatchPartner, u32)>,
}

impl MatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; returns false if `(with, round)` is already present
    pub fn insert(&mut self, entry: MatchResultEntry) -> bool {
        if !self.seen.insert((entry.with.clone(), entry.round)) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Append several entries, returning how many were new
    pub fn extend<I: IntoIterator<Item = MatchResultEntry>>(&mut self, entries: I) -> usize {
        entries
            .into_iter()
            .map(|e| self.insert(e))
            .filter(|added| *added)
            .count()
    }

    pub fn entries(&self) -> &[MatchResultEntry] {
        &self.entries
    }

    /// First entry recorded for a round
    pub fn for_round(&self, round: u32) -> Option<&MatchResultEntry> {
        self.entries.iter().find(|e| e.round == round)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
