// src/pivot/table.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use super::{
    rank::{is_legal_rank, MonthData, Rank, ABSENT},
    schema::validate_category_name,
    Column, MonthLabel, Schema,
};
use crate::error::MergeError;

/// One anchor-category row: its term and the ranks it has per month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorRow {
    pub term: String,
    pub ranks: BTreeMap<MonthLabel, Rank>,
}

impl AnchorRow {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ranks: BTreeMap::new(),
        }
    }

    pub fn with_rank(mut self, month: MonthLabel, rank: Rank) -> Self {
        self.ranks.insert(month, rank);
        self
    }
}

/// A fixed-shape row, indexed positionally against the table's [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    term: String,
    presence: Vec<bool>,
    ranks: Vec<Rank>,
}

impl Row {
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Presence bits, parallel to `Schema::categories`.
    pub fn presence(&self) -> &[bool] {
        &self.presence
    }

    /// Rank cells, parallel to `Schema::months`; `ABSENT` where unranked.
    pub fn ranks(&self) -> &[Rank] {
        &self.ranks
    }
}

/// Keyword × category-presence × monthly-rank table.
///
/// Rows keep append order and are never removed. All mutation goes through
/// the merge engine, which works on a copy and only hands back tables that
/// pass [`PivotTable::check_integrity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotTable {
    schema: Schema,
    rows: Vec<Row>,
    index: HashMap<String, usize>,
}

impl PivotTable {
    /// Build a table from the anchor category. Row order is `rows`' order.
    ///
    /// Out-of-range anchor ranks are stored as absent; the row itself is kept.
    pub fn create(anchor_category: &str, rows: Vec<AnchorRow>) -> Result<Self, MergeError> {
        validate_category_name(anchor_category)?;

        let mut table = PivotTable {
            schema: Schema::empty(),
            rows: Vec::with_capacity(rows.len()),
            index: HashMap::with_capacity(rows.len()),
        };
        let cat = table.add_category_column(anchor_category);

        let months: BTreeSet<MonthLabel> =
            rows.iter().flat_map(|r| r.ranks.keys().copied()).collect();
        for month in months {
            let pos = table.ensure_month_column(month).0;
            table.schema.add_supplier(pos, cat);
        }

        for row in rows {
            let term = row.term.trim();
            if term.is_empty() {
                return Err(MergeError::schema(&row.term, "anchor row has an empty term"));
            }
            if table.index.contains_key(term) {
                return Err(MergeError::schema(term, "duplicate key in anchor rows"));
            }
            let (idx, _) = table.ensure_row(term);
            table.rows[idx].presence[cat] = true;
            for (month, rank) in row.ranks {
                if !is_legal_rank(rank) {
                    debug!(term, %month, rank, "anchor rank out of range, stored as absent");
                    continue;
                }
                if let Some(pos) = table.schema.month_position(&month) {
                    table.rows[idx].ranks[pos] = rank;
                }
            }
        }

        table.check_integrity()?;
        Ok(table)
    }

    /// Build a table from the anchor category's monthly rank maps.
    ///
    /// Row order follows the most recent month's source order, then terms
    /// first seen in earlier months, newest month first. Terms with no legal
    /// rank in any month are left out.
    pub fn from_anchor_months(anchor_category: &str, data: &MonthData) -> Result<Self, MergeError> {
        let mut order: Vec<String> = Vec::new();
        let mut rows: HashMap<String, AnchorRow> = HashMap::new();
        for (month, map) in data.iter().rev() {
            let (legal, _) = map.legal_only();
            for (term, rank) in legal.iter() {
                let row = rows.entry(term.to_string()).or_insert_with(|| {
                    order.push(term.to_string());
                    AnchorRow::new(term)
                });
                row.ranks.insert(*month, rank);
            }
        }
        let anchor_rows = order
            .into_iter()
            .filter_map(|term| rows.remove(&term))
            .collect();
        let mut table = Self::create(anchor_category, anchor_rows)?;
        // months whose every rank was filtered still count as supplied;
        // the anchor is always category 0
        for month in data.keys() {
            let pos = table.ensure_month_column(*month).0;
            table.schema.add_supplier(pos, 0);
        }
        Ok(table)
    }

    /// Rebuild a table from persisted rows, validating every invariant.
    pub fn from_parts(
        schema: Schema,
        rows: Vec<(String, Vec<bool>, Vec<Rank>)>,
    ) -> Result<Self, MergeError> {
        let mut table = PivotTable {
            schema,
            rows: Vec::with_capacity(rows.len()),
            index: HashMap::with_capacity(rows.len()),
        };
        for (term, presence, ranks) in rows {
            if table.index.contains_key(&term) {
                return Err(MergeError::schema(term, "duplicate key"));
            }
            if presence.len() != table.schema.categories().len()
                || ranks.len() != table.schema.months().len()
            {
                return Err(MergeError::schema(term, "row width does not match schema"));
            }
            table.index.insert(term.clone(), table.rows.len());
            table.rows.push(Row {
                term,
                presence,
                ranks,
            });
        }
        table.check_integrity()?;
        Ok(table)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> Vec<Column> {
        self.schema.columns()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.schema.has_category(name)
    }

    pub fn has_month(&self, month: &MonthLabel) -> bool {
        self.schema.has_month(month)
    }

    pub fn categories(&self) -> &[String] {
        self.schema.categories()
    }

    pub fn months(&self) -> &[MonthLabel] {
        self.schema.months()
    }

    pub fn contains_key(&self, term: &str) -> bool {
        self.index.contains_key(term)
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.rows.iter()
    }

    pub fn row(&self, term: &str) -> Option<&Row> {
        self.index.get(term).map(|&i| &self.rows[i])
    }

    /// `None` if either the term or the month is unknown; `Some(ABSENT)` for
    /// an empty cell.
    pub fn rank(&self, term: &str, month: &MonthLabel) -> Option<Rank> {
        let row = self.row(term)?;
        let pos = self.schema.month_position(month)?;
        Some(row.ranks[pos])
    }

    pub fn presence(&self, term: &str, category: &str) -> Option<bool> {
        let row = self.row(term)?;
        let idx = self.schema.category_index(category)?;
        Some(row.presence[idx])
    }

    /// Number of rows with the presence bit set for `category`.
    pub fn category_size(&self, category: &str) -> usize {
        match self.schema.category_index(category) {
            Some(idx) => self.rows.iter().filter(|r| r.presence[idx]).count(),
            None => 0,
        }
    }

    /// Verify key uniqueness, row shape, column order, rank range, and that
    /// every ranked cell belongs to a row present in one of the month's
    /// supplying categories.
    pub fn check_integrity(&self) -> Result<(), MergeError> {
        let cats = self.schema.categories().len();
        let months = self.schema.months();

        if months.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MergeError::integrity(
                "months",
                "month columns are not in ascending calendar order",
            ));
        }
        if self.index.len() != self.rows.len() {
            return Err(MergeError::integrity("rows", "row keys are not unique"));
        }

        for (i, row) in self.rows.iter().enumerate() {
            if self.index.get(&row.term) != Some(&i) {
                return Err(MergeError::integrity(&row.term, "row index is stale"));
            }
            if row.presence.len() != cats || row.ranks.len() != months.len() {
                return Err(MergeError::integrity(&row.term, "row width does not match schema"));
            }
            for (pos, &rank) in row.ranks.iter().enumerate() {
                if rank == ABSENT {
                    continue;
                }
                if !is_legal_rank(rank) {
                    return Err(MergeError::integrity(
                        &row.term,
                        format!("rank {} in {} is out of range", rank, months[pos]),
                    ));
                }
                let supplied = self
                    .schema
                    .supplier_indices(pos)
                    .iter()
                    .any(|&c| row.presence[c]);
                if !supplied {
                    return Err(MergeError::integrity(
                        &row.term,
                        format!(
                            "ranked in {} but absent from every category supplying it",
                            months[pos]
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Verify that `self` only adds to `prior`: same leading rows in the same
    /// order, no column dropped, no presence bit cleared.
    pub fn check_extends(&self, prior: &PivotTable) -> Result<(), MergeError> {
        if self.rows.len() < prior.rows.len() {
            return Err(MergeError::integrity("rows", "merge removed rows"));
        }
        let prior_cats = prior.schema.categories();
        if self.schema.categories().get(..prior_cats.len()) != Some(prior_cats) {
            return Err(MergeError::integrity(
                "categories",
                "merge reordered or removed category columns",
            ));
        }
        if let Some(missing) = prior.months().iter().find(|m| !self.has_month(m)) {
            return Err(MergeError::integrity(missing.to_string(), "merge removed a month column"));
        }
        for (old, new) in prior.rows.iter().zip(&self.rows) {
            if old.term != new.term {
                return Err(MergeError::integrity(&old.term, "merge reordered rows"));
            }
            if old.presence.iter().zip(&new.presence).any(|(&o, &n)| o && !n) {
                return Err(MergeError::integrity(&old.term, "merge cleared a presence bit"));
            }
        }
        Ok(())
    }

    /// Append `term` if it is new. Returns its row index and whether it was added.
    pub(crate) fn ensure_row(&mut self, term: &str) -> (usize, bool) {
        if let Some(&idx) = self.index.get(term) {
            return (idx, false);
        }
        let idx = self.rows.len();
        self.rows.push(Row {
            term: term.to_string(),
            presence: vec![false; self.schema.categories().len()],
            ranks: vec![ABSENT; self.schema.months().len()],
        });
        self.index.insert(term.to_string(), idx);
        (idx, true)
    }

    pub(crate) fn add_category_column(&mut self, name: &str) -> usize {
        let idx = self.schema.push_category(name);
        for row in &mut self.rows {
            row.presence.push(false);
        }
        idx
    }

    /// Create the month column if needed. Returns its position and whether it was added.
    pub(crate) fn ensure_month_column(&mut self, month: MonthLabel) -> (usize, bool) {
        if let Some(pos) = self.schema.month_position(&month) {
            return (pos, false);
        }
        let pos = self.schema.insert_month(month);
        for row in &mut self.rows {
            row.ranks.insert(pos, ABSENT);
        }
        (pos, true)
    }

    pub(crate) fn mark_supplier(&mut self, month_pos: usize, category_idx: usize) {
        self.schema.add_supplier(month_pos, category_idx);
    }

    pub(crate) fn set_presence(&mut self, row: usize, category_idx: usize) {
        self.rows[row].presence[category_idx] = true;
    }

    pub(crate) fn set_rank(&mut self, row: usize, month_pos: usize, rank: Rank) {
        self.rows[row].ranks[month_pos] = rank;
    }
}
