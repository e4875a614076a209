// src/pivot/rank.rs

use std::collections::{BTreeMap, HashMap};

use super::MonthLabel;

/// A search-frequency rank. `1` is the most searched term.
pub type Rank = u32;

/// Cell value for "no rank recorded". Disjoint from every legal rank.
pub const ABSENT: Rank = 0;

/// Ranks above this are not kept.
pub const MAX_RANK: Rank = 500_000;

pub fn is_legal_rank(rank: Rank) -> bool {
    (1..=MAX_RANK).contains(&rank)
}

/// Per-category rank data keyed by month, iterated in ascending calendar order.
pub type MonthData = BTreeMap<MonthLabel, RankMap>;

/// One month of one category: search term → rank, in source order.
///
/// The first occurrence of a term wins; later duplicates are ignored. Terms are
/// trimmed and empty terms are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankMap {
    entries: Vec<(String, Rank)>,
    index: HashMap<String, usize>,
}

impl RankMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the term was empty or already present.
    pub fn insert(&mut self, term: impl AsRef<str>, rank: Rank) -> bool {
        let term = term.as_ref().trim();
        if term.is_empty() || self.index.contains_key(term) {
            return false;
        }
        self.index.insert(term.to_string(), self.entries.len());
        self.entries.push((term.to_string(), rank));
        true
    }

    pub fn get(&self, term: &str) -> Option<Rank> {
        self.index.get(term).map(|&i| self.entries[i].1)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.index.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Rank)> + '_ {
        self.entries.iter().map(|(t, r)| (t.as_str(), *r))
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    /// Copy of this map without out-of-range ranks, plus how many were dropped.
    pub fn legal_only(&self) -> (RankMap, usize) {
        let mut kept = RankMap::new();
        let mut dropped = 0;
        for (term, rank) in self.iter() {
            if is_legal_rank(rank) {
                kept.insert(term, rank);
            } else {
                dropped += 1;
            }
        }
        (kept, dropped)
    }
}

impl<S: AsRef<str>> FromIterator<(S, Rank)> for RankMap {
    fn from_iter<I: IntoIterator<Item = (S, Rank)>>(iter: I) -> Self {
        let mut map = RankMap::new();
        for (term, rank) in iter {
            map.insert(term, rank);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_wins_and_order_is_kept() {
        let map: RankMap = [("b", 2), ("a", 1), ("b", 9), ("  ", 4), (" c ", 3)]
            .into_iter()
            .collect();
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries, vec![("b", 2), ("a", 1), ("c", 3)]);
        assert_eq!(map.get("b"), Some(2));
        assert!(!map.contains("  "));
    }

    #[test]
    fn legal_only_drops_zero_and_oversized() {
        let map: RankMap = [("a", 0), ("b", 500_000), ("c", 500_001), ("d", 1)]
            .into_iter()
            .collect();
        let (kept, dropped) = map.legal_only();
        assert_eq!(dropped, 2);
        assert_eq!(kept.terms().collect::<Vec<_>>(), vec!["b", "d"]);
    }
}
