//! Work out what a scan offers that a table does not have yet.
//!
//! Detection reads only the schema and the row-key set, never rank cells, so it
//! can run from persisted metadata without loading the table.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    path::PathBuf,
};

use tracing::debug;

use crate::pivot::{MonthLabel, PivotTable, Schema};

/// Membership test over a table's row keys.
pub trait KeyLookup {
    fn contains_key(&self, term: &str) -> bool;
}

impl KeyLookup for PivotTable {
    fn contains_key(&self, term: &str) -> bool {
        PivotTable::contains_key(self, term)
    }
}

impl KeyLookup for HashSet<String> {
    fn contains_key(&self, term: &str) -> bool {
        self.contains(term)
    }
}

/// One discovered source file for a (category, month).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMonth {
    pub path: PathBuf,
    /// Terms in the file, when the scanner was asked to read them.
    pub terms: Option<HashSet<String>>,
}

impl SourceMonth {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            terms: None,
        }
    }
}

/// Everything a scan found for one table: category → month → file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailableSources {
    categories: BTreeMap<String, BTreeMap<MonthLabel, SourceMonth>>,
}

impl AvailableSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry it replaced, if any.
    pub fn insert(
        &mut self,
        category: impl Into<String>,
        month: MonthLabel,
        source: SourceMonth,
    ) -> Option<SourceMonth> {
        self.categories
            .entry(category.into())
            .or_default()
            .insert(month, source)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category names in name order.
    pub fn categories(&self) -> impl Iterator<Item = &str> + '_ {
        self.categories.keys().map(String::as_str)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn months_for(&self, category: &str) -> BTreeSet<MonthLabel> {
        self.categories
            .get(category)
            .map(|months| months.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Union of months across all categories.
    pub fn months(&self) -> BTreeSet<MonthLabel> {
        self.categories
            .values()
            .flat_map(|months| months.keys().copied())
            .collect()
    }

    pub fn get(&self, category: &str, month: &MonthLabel) -> Option<&SourceMonth> {
        self.categories.get(category)?.get(month)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MonthLabel, &SourceMonth)> + '_ {
        self.categories.iter().flat_map(|(cat, months)| {
            months
                .iter()
                .map(move |(month, src)| (cat.as_str(), month, src))
        })
    }
}

/// Difference between what is available and what a table holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Available months with no column in the table.
    pub new_months: BTreeSet<MonthLabel>,
    /// Available categories with no column in the table.
    pub new_categories: BTreeSet<String>,
    /// Upper bound on terms not yet in the table; only counts sources whose
    /// terms were read.
    pub new_keywords_estimate: usize,
    /// Existing categories (schema order) with available months they have not
    /// supplied yet, including months other categories already added.
    pub pending_months: Vec<(String, BTreeSet<MonthLabel>)>,
    /// Months offered by each new category.
    pub category_months: BTreeMap<String, BTreeSet<MonthLabel>>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.new_categories.is_empty() && self.pending_months.is_empty()
    }

    pub fn has_month_work(&self) -> bool {
        !self.pending_months.is_empty()
    }

    pub fn has_category_work(&self) -> bool {
        !self.new_categories.is_empty()
    }
}

pub fn detect_changes(
    schema: &Schema,
    keys: &impl KeyLookup,
    available: &AvailableSources,
) -> Delta {
    let new_months: BTreeSet<MonthLabel> = available
        .months()
        .into_iter()
        .filter(|m| !schema.has_month(m))
        .collect();

    let mut new_categories = BTreeSet::new();
    let mut category_months = BTreeMap::new();
    for category in available.categories() {
        if !schema.has_category(category) {
            new_categories.insert(category.to_string());
            category_months.insert(category.to_string(), available.months_for(category));
        }
    }

    let pending_months = schema
        .categories()
        .iter()
        .filter_map(|category| {
            let pending: BTreeSet<MonthLabel> = available
                .months_for(category)
                .into_iter()
                .filter(|m| !schema.is_supplied_by(m, category))
                .collect();
            (!pending.is_empty()).then(|| (category.clone(), pending))
        })
        .collect();

    let mut unseen: HashSet<&str> = HashSet::new();
    for (_, _, src) in available.iter() {
        if let Some(terms) = &src.terms {
            unseen.extend(
                terms
                    .iter()
                    .map(String::as_str)
                    .filter(|t| !keys.contains_key(t)),
            );
        }
    }

    let delta = Delta {
        new_months,
        new_categories,
        new_keywords_estimate: unseen.len(),
        pending_months,
        category_months,
    };
    debug!(
        "delta: {} new months, {} new categories, ~{} new keywords",
        delta.new_months.len(),
        delta.new_categories.len(),
        delta.new_keywords_estimate
    );
    delta
}
