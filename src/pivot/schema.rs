// src/pivot/schema.rs

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
};

use super::MonthLabel;
use crate::error::MergeError;

/// Header of the key column in serialized tables.
pub const SEARCH_TERM_HEADER: &str = "Search Term";

/// One column of a pivot table, in serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    Term,
    Category(String),
    Month(MonthLabel),
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Term => f.write_str(SEARCH_TERM_HEADER),
            Column::Category(name) => f.write_str(name),
            Column::Month(m) => write!(f, "{}", m),
        }
    }
}

/// Column layout of a pivot table.
///
/// Categories keep first-insertion order; months are kept sorted. For each
/// month the schema also records which categories have supplied ranks to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    categories: Vec<String>,
    category_index: HashMap<String, usize>,
    months: Vec<MonthLabel>,
    month_set: HashSet<MonthLabel>,
    /// Parallel to `months`: indices into `categories`, in supply order.
    suppliers: Vec<Vec<usize>>,
}

impl Schema {
    pub(crate) fn empty() -> Self {
        Self {
            categories: Vec::new(),
            category_index: HashMap::new(),
            months: Vec::new(),
            month_set: HashSet::new(),
            suppliers: Vec::new(),
        }
    }

    /// Rebuild a schema from persisted parts.
    ///
    /// `suppliers` maps a month to the categories that supplied it; a month with
    /// no entry is treated as supplied by every category.
    pub fn from_parts(
        categories: Vec<String>,
        months: Vec<MonthLabel>,
        suppliers: &BTreeMap<MonthLabel, Vec<String>>,
    ) -> Result<Self, MergeError> {
        let mut schema = Schema::empty();
        for name in categories {
            validate_category_name(&name)?;
            if schema.has_category(&name) {
                return Err(MergeError::schema(name, "category listed twice"));
            }
            schema.push_category(&name);
        }
        for month in months {
            if schema.has_month(&month) {
                return Err(MergeError::schema(month.to_string(), "month listed twice"));
            }
            let pos = schema.insert_month(month);
            match suppliers.get(&month) {
                Some(names) => {
                    for name in names {
                        let idx = schema
                            .category_index(name)
                            .ok_or_else(|| MergeError::UnknownCategory(name.clone()))?;
                        schema.add_supplier(pos, idx);
                    }
                }
                None => {
                    for idx in 0..schema.categories.len() {
                        schema.add_supplier(pos, idx);
                    }
                }
            }
        }
        Ok(schema)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Months in ascending calendar order.
    pub fn months(&self) -> &[MonthLabel] {
        &self.months
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.category_index.contains_key(name)
    }

    pub fn has_month(&self, month: &MonthLabel) -> bool {
        self.month_set.contains(month)
    }

    pub fn category_index(&self, name: &str) -> Option<usize> {
        self.category_index.get(name).copied()
    }

    /// Position of `month` among the month columns.
    pub fn month_position(&self, month: &MonthLabel) -> Option<usize> {
        if !self.has_month(month) {
            return None;
        }
        self.months.binary_search(month).ok()
    }

    /// Categories that have written ranks into `month`, in the order they did so.
    pub fn suppliers(&self, month: &MonthLabel) -> Vec<&str> {
        self.month_position(month)
            .map(|pos| {
                self.suppliers[pos]
                    .iter()
                    .map(|&i| self.categories[i].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn supplier_indices(&self, month_pos: usize) -> &[usize] {
        &self.suppliers[month_pos]
    }

    pub fn is_supplied_by(&self, month: &MonthLabel, category: &str) -> bool {
        match (self.month_position(month), self.category_index(category)) {
            (Some(pos), Some(idx)) => self.suppliers[pos].contains(&idx),
            _ => false,
        }
    }

    /// Key column, then categories, then months.
    pub fn columns(&self) -> Vec<Column> {
        let mut cols = Vec::with_capacity(1 + self.categories.len() + self.months.len());
        cols.push(Column::Term);
        cols.extend(self.categories.iter().cloned().map(Column::Category));
        cols.extend(self.months.iter().copied().map(Column::Month));
        cols
    }

    pub fn column_count(&self) -> usize {
        1 + self.categories.len() + self.months.len()
    }

    pub(crate) fn push_category(&mut self, name: &str) -> usize {
        let idx = self.categories.len();
        self.categories.push(name.to_string());
        self.category_index.insert(name.to_string(), idx);
        idx
    }

    /// Insert `month` at its calendar position and return that position.
    pub(crate) fn insert_month(&mut self, month: MonthLabel) -> usize {
        let pos = match self.months.binary_search(&month) {
            Ok(pos) => return pos,
            Err(pos) => pos,
        };
        self.months.insert(pos, month);
        self.month_set.insert(month);
        self.suppliers.insert(pos, Vec::new());
        pos
    }

    pub(crate) fn add_supplier(&mut self, month_pos: usize, category_idx: usize) {
        let list = &mut self.suppliers[month_pos];
        if !list.contains(&category_idx) {
            list.push(category_idx);
        }
    }
}

/// Category names become column headers, so they must be non-empty and must
/// not read back as a month or as the key column.
pub(crate) fn validate_category_name(name: &str) -> Result<(), MergeError> {
    if name.trim().is_empty() {
        return Err(MergeError::schema(name, "category name is empty"));
    }
    if name != name.trim() {
        return Err(MergeError::schema(
            name,
            "category name has surrounding whitespace",
        ));
    }
    if name == SEARCH_TERM_HEADER {
        return Err(MergeError::schema(name, "category name collides with key column"));
    }
    if MonthLabel::parse(name).is_some() {
        return Err(MergeError::schema(name, "category name looks like a month"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> MonthLabel {
        s.parse().unwrap()
    }

    #[test]
    fn months_insert_in_calendar_position() {
        let mut schema = Schema::empty();
        schema.push_category("Beauty");
        assert_eq!(schema.insert_month(m("2025-06")), 0);
        assert_eq!(schema.insert_month(m("2024-01")), 0);
        assert_eq!(schema.insert_month(m("2025-03")), 1);
        assert_eq!(schema.insert_month(m("2025-03")), 1);
        assert_eq!(
            schema.months(),
            &[m("2024-01"), m("2025-03"), m("2025-06")]
        );
        assert_eq!(schema.month_position(&m("2025-06")), Some(2));
        assert_eq!(schema.month_position(&m("2025-07")), None);
    }

    #[test]
    fn columns_follow_key_categories_months() {
        let mut schema = Schema::empty();
        schema.push_category("Grocery");
        schema.push_category("Beauty");
        schema.insert_month(m("2025-07"));
        schema.insert_month(m("2025-06"));
        let headers: Vec<String> = schema.columns().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            headers,
            vec!["Search Term", "Grocery", "Beauty", "2025-06", "2025-07"]
        );
        assert_eq!(schema.column_count(), 5);
    }

    #[test]
    fn from_parts_defaults_suppliers_to_all_categories() {
        let mut suppliers = BTreeMap::new();
        suppliers.insert(m("2025-07"), vec!["Beauty".to_string()]);
        let schema = Schema::from_parts(
            vec!["Beauty".into(), "Grocery".into()],
            vec![m("2025-07"), m("2025-06")],
            &suppliers,
        )
        .unwrap();
        assert_eq!(schema.suppliers(&m("2025-06")), vec!["Beauty", "Grocery"]);
        assert_eq!(schema.suppliers(&m("2025-07")), vec!["Beauty"]);
        assert!(schema.is_supplied_by(&m("2025-07"), "Beauty"));
        assert!(!schema.is_supplied_by(&m("2025-07"), "Grocery"));
    }

    #[test]
    fn from_parts_rejects_bad_names() {
        let none = BTreeMap::new();
        assert!(matches!(
            Schema::from_parts(vec!["2025-June".into()], vec![], &none),
            Err(MergeError::Schema { .. })
        ));
        assert!(matches!(
            Schema::from_parts(vec!["A".into(), "A".into()], vec![], &none),
            Err(MergeError::Schema { .. })
        ));
    }
}
