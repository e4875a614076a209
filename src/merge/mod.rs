//! Category and month merges.
//!
//! Both operations take the current table by reference, apply the new data to
//! a copy, validate the copy, and only then return it. The caller keeps the
//! old table on any error.
//!
//! A month column is shared by every category that reports it: each merge
//! writes the cells of the terms in its own rank maps and leaves every other
//! cell alone. When two categories rank the same term in the same month, the
//! merge that ran last wins.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::error::MergeError;
use crate::pivot::{schema::validate_category_name, MonthData, MonthLabel, PivotTable, RankMap};

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub new_rows: usize,
    pub new_months: Vec<MonthLabel>,
    pub cells_written: usize,
    /// Source entries dropped because their rank was 0 or above `MAX_RANK`.
    pub ranks_filtered: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub table: PivotTable,
    pub summary: MergeSummary,
}

/// Add a category that the table does not have yet.
///
/// New terms are appended in first-seen order, walking months ascending and
/// each month's terms in source order. Month columns that do not exist are
/// created at their calendar position.
#[instrument(level = "debug", skip(table, data), fields(months = data.len()))]
pub fn add_category(
    table: &PivotTable,
    category: &str,
    data: &MonthData,
) -> Result<MergeOutcome, MergeError> {
    validate_category_name(category)?;
    if table.has_category(category) {
        return Err(MergeError::DuplicateCategory(category.to_string()));
    }

    let (filtered, ranks_filtered) = filter_ranks(data);
    let mut next = table.clone();
    let mut summary = MergeSummary {
        ranks_filtered,
        ..Default::default()
    };

    for map in filtered.values() {
        for term in map.terms() {
            if next.ensure_row(term).1 {
                summary.new_rows += 1;
            }
        }
    }

    let cat = next.add_category_column(category);
    for (month, map) in &filtered {
        write_month(&mut next, cat, *month, map, &mut summary);
    }

    let outcome = commit(table, next, summary)?;
    info!(
        "added category `{}`: {} new rows, {} new months, {} cells, {} ranks filtered",
        category,
        outcome.summary.new_rows,
        outcome.summary.new_months.len(),
        outcome.summary.cells_written,
        outcome.summary.ranks_filtered
    );
    Ok(outcome)
}

/// Add (or refresh) months for a category that is already in the table.
///
/// Months are applied in ascending order. Terms not yet in the table are
/// appended. Refreshing an existing month overwrites only the cells of terms
/// in `data`; cells written by other categories for that month stay as they are.
#[instrument(level = "debug", skip(table, data), fields(months = data.len()))]
pub fn add_months(
    table: &PivotTable,
    category: &str,
    data: &MonthData,
) -> Result<MergeOutcome, MergeError> {
    let cat = table
        .schema()
        .category_index(category)
        .ok_or_else(|| MergeError::UnknownCategory(category.to_string()))?;

    if data.is_empty() {
        debug!("no months supplied for `{}`", category);
        return Ok(MergeOutcome {
            table: table.clone(),
            summary: MergeSummary::default(),
        });
    }

    let (filtered, ranks_filtered) = filter_ranks(data);
    let mut next = table.clone();
    let mut summary = MergeSummary {
        ranks_filtered,
        ..Default::default()
    };

    for (month, map) in &filtered {
        write_month(&mut next, cat, *month, map, &mut summary);
    }

    let outcome = commit(table, next, summary)?;
    info!(
        "added {} months to `{}`: {} new rows, {} new columns, {} cells, {} ranks filtered",
        filtered.len(),
        category,
        outcome.summary.new_rows,
        outcome.summary.new_months.len(),
        outcome.summary.cells_written,
        outcome.summary.ranks_filtered
    );
    Ok(outcome)
}

fn filter_ranks(data: &MonthData) -> (BTreeMap<MonthLabel, RankMap>, usize) {
    let mut dropped = 0;
    let filtered = data
        .iter()
        .map(|(month, map)| {
            let (legal, n) = map.legal_only();
            if n > 0 {
                debug!("{}: dropped {} out-of-range ranks", month, n);
            }
            dropped += n;
            (*month, legal)
        })
        .collect();
    (filtered, dropped)
}

fn write_month(
    table: &mut PivotTable,
    cat: usize,
    month: MonthLabel,
    map: &RankMap,
    summary: &mut MergeSummary,
) {
    let (pos, created) = table.ensure_month_column(month);
    if created {
        summary.new_months.push(month);
    }
    table.mark_supplier(pos, cat);

    for (term, rank) in map.iter() {
        let (row, added) = table.ensure_row(term);
        if added {
            summary.new_rows += 1;
        }
        table.set_presence(row, cat);
        table.set_rank(row, pos, rank);
        summary.cells_written += 1;
    }
}

fn commit(
    prior: &PivotTable,
    next: PivotTable,
    summary: MergeSummary,
) -> Result<MergeOutcome, MergeError> {
    next.check_integrity()?;
    next.check_extends(prior)?;
    Ok(MergeOutcome {
        table: next,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::{AnchorRow, Rank, ABSENT};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn m(s: &str) -> MonthLabel {
        s.parse().unwrap()
    }

    fn month_data(entries: Vec<(&str, Vec<(&str, Rank)>)>) -> MonthData {
        entries
            .into_iter()
            .map(|(month, ranks)| (m(month), ranks.into_iter().collect::<RankMap>()))
            .collect()
    }

    fn headers(table: &PivotTable) -> Vec<String> {
        table.columns().iter().map(|c| c.to_string()).collect()
    }

    fn terms(table: &PivotTable) -> Vec<&str> {
        table.rows().map(|r| r.term()).collect()
    }

    fn beauty_table() -> PivotTable {
        let june = m("2025-06");
        PivotTable::create(
            "Beauty",
            vec![
                AnchorRow::new("kw1").with_rank(june, 10),
                AnchorRow::new("kw2").with_rank(june, 20),
            ],
        )
        .unwrap()
    }

    #[test]
    fn add_category_appends_new_terms_and_shares_month() {
        let table = beauty_table();
        let june = m("2025-06");
        let out = add_category(
            &table,
            "Grocery",
            &month_data(vec![("2025-06", vec![("kw2", 5), ("kw3", 30)])]),
        )
        .unwrap();
        let t = &out.table;

        assert_eq!(headers(t), vec!["Search Term", "Beauty", "Grocery", "2025-06"]);
        assert_eq!(terms(t), vec!["kw1", "kw2", "kw3"]);

        assert_eq!(t.presence("kw3", "Beauty"), Some(false));
        assert_eq!(t.presence("kw3", "Grocery"), Some(true));
        assert_eq!(t.rank("kw3", &june), Some(30));

        assert_eq!(t.presence("kw2", "Beauty"), Some(true));
        assert_eq!(t.presence("kw2", "Grocery"), Some(true));
        // shared column, last write wins: Grocery ran after Beauty
        assert_eq!(t.rank("kw2", &june), Some(5));

        assert_eq!(t.presence("kw1", "Grocery"), Some(false));
        assert_eq!(t.rank("kw1", &june), Some(10));

        assert_eq!(out.summary.new_rows, 1);
        assert!(out.summary.new_months.is_empty());
        assert_eq!(out.summary.cells_written, 2);
        assert_eq!(t.schema().suppliers(&june), vec!["Beauty", "Grocery"]);
    }

    #[test]
    fn add_category_orders_new_rows_by_ascending_month() {
        let table = beauty_table();
        let out = add_category(
            &table,
            "Toys",
            &month_data(vec![
                ("2025-08", vec![("late", 1), ("kw1", 2)]),
                ("2025-05", vec![("early", 3), ("late", 4)]),
            ]),
        )
        .unwrap();
        assert_eq!(terms(&out.table), vec!["kw1", "kw2", "early", "late"]);
        assert_eq!(
            headers(&out.table),
            vec!["Search Term", "Beauty", "Toys", "2025-05", "2025-06", "2025-08"]
        );
        assert_eq!(out.table.rank("kw2", &m("2025-05")), Some(ABSENT));
        assert_eq!(out.table.rank("late", &m("2025-05")), Some(4));
        assert_eq!(
            out.summary.new_months,
            vec![m("2025-05"), m("2025-08")]
        );
    }

    #[test]
    fn add_category_rejects_duplicates_and_month_like_names() {
        let table = beauty_table();
        let data = month_data(vec![("2025-06", vec![("kw1", 1)])]);
        assert_eq!(
            add_category(&table, "Beauty", &data).unwrap_err(),
            MergeError::DuplicateCategory("Beauty".into())
        );
        assert!(matches!(
            add_category(&table, "2025-July", &data),
            Err(MergeError::Schema { .. })
        ));
        assert_eq!(table, beauty_table());
    }

    #[test]
    fn out_of_range_rank_does_not_create_row() {
        let table = beauty_table();
        let july = m("2025-07");
        let out = add_months(
            &table,
            "Beauty",
            &month_data(vec![("2025-07", vec![("kw4", 600_000)])]),
        )
        .unwrap();
        assert!(!out.table.contains_key("kw4"));
        assert_eq!(out.table.row_count(), 2);
        assert!(out.table.has_month(&july));
        assert_eq!(out.table.rank("kw1", &july), Some(ABSENT));
        assert_eq!(out.summary.ranks_filtered, 1);
    }

    #[test]
    fn add_months_requires_known_category() {
        let table = beauty_table();
        let err = add_months(
            &table,
            "Garden",
            &month_data(vec![("2025-07", vec![("kw1", 1)])]),
        )
        .unwrap_err();
        assert_eq!(err, MergeError::UnknownCategory("Garden".into()));
    }

    #[test]
    fn add_months_inserts_columns_chronologically_and_appends_rows() {
        let table = beauty_table();
        let out = add_months(
            &table,
            "Beauty",
            &month_data(vec![
                ("2025-07", vec![("kw2", 2), ("kw5", 8)]),
                ("2025-04", vec![("kw1", 11)]),
            ]),
        )
        .unwrap();
        let t = &out.table;
        assert_eq!(
            headers(t),
            vec!["Search Term", "Beauty", "2025-04", "2025-06", "2025-07"]
        );
        assert_eq!(terms(t), vec!["kw1", "kw2", "kw5"]);
        assert_eq!(t.presence("kw5", "Beauty"), Some(true));
        assert_eq!(t.rank("kw5", &m("2025-06")), Some(ABSENT));
        assert_eq!(t.rank("kw1", &m("2025-04")), Some(11));
        assert_eq!(t.rank("kw1", &m("2025-06")), Some(10));
    }

    #[test]
    fn refreshing_a_shared_month_keeps_other_categories_cells() {
        let june = m("2025-06");
        let table = add_category(
            &beauty_table(),
            "Grocery",
            &month_data(vec![("2025-06", vec![("kw3", 30)])]),
        )
        .unwrap()
        .table;

        let out = add_months(
            &table,
            "Beauty",
            &month_data(vec![("2025-06", vec![("kw1", 12)])]),
        )
        .unwrap();
        assert_eq!(out.table.rank("kw1", &june), Some(12));
        assert_eq!(out.table.rank("kw2", &june), Some(20));
        assert_eq!(out.table.rank("kw3", &june), Some(30));
        assert_eq!(out.table.presence("kw3", "Beauty"), Some(false));
    }

    #[test]
    fn add_months_sets_presence_for_existing_terms_of_other_categories() {
        let table = add_category(
            &beauty_table(),
            "Grocery",
            &month_data(vec![("2025-06", vec![("kw3", 30)])]),
        )
        .unwrap()
        .table;
        let out = add_months(
            &table,
            "Beauty",
            &month_data(vec![("2025-07", vec![("kw3", 1)])]),
        )
        .unwrap();
        assert_eq!(out.table.presence("kw3", "Beauty"), Some(true));
        assert_eq!(out.table.presence("kw3", "Grocery"), Some(true));
        assert_eq!(out.table.row_count(), 3);
    }

    #[test]
    fn re_adding_identical_months_is_idempotent() {
        let data = month_data(vec![("2025-07", vec![("kw2", 3), ("kw9", 4)])]);
        let once = add_months(&beauty_table(), "Beauty", &data).unwrap().table;
        let twice = add_months(&once, "Beauty", &data).unwrap().table;
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_month_data_is_a_no_op() {
        let table = beauty_table();
        let out = add_months(&table, "Beauty", &MonthData::new()).unwrap();
        assert_eq!(out.table, table);
        assert_eq!(out.summary, MergeSummary::default());
    }

    #[derive(Debug, Clone)]
    struct Op {
        category: usize,
        months: Vec<(u32, Vec<(usize, Rank)>)>,
    }

    const CATEGORIES: [&str; 4] = ["Beauty", "Grocery", "Toys", "Garden"];

    fn rank_strategy() -> impl Strategy<Value = Rank> {
        prop_oneof![
            8 => 1u32..=500_000,
            1 => Just(0u32),
            1 => 500_001u32..=700_000,
        ]
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        (
            0..CATEGORIES.len(),
            prop::collection::vec(
                (1u32..=12, prop::collection::vec((0usize..20, rank_strategy()), 0..8)),
                0..4,
            ),
        )
            .prop_map(|(category, months)| Op { category, months })
    }

    fn to_month_data(op: &Op) -> MonthData {
        let mut data = MonthData::new();
        for (month, ranks) in &op.months {
            let map = data
                .entry(MonthLabel::new(2025, *month).unwrap())
                .or_default();
            for (term, rank) in ranks {
                map.insert(format!("t{}", term), *rank);
            }
        }
        data
    }

    proptest! {
        #[test]
        fn merges_preserve_invariants(ops in prop::collection::vec(op_strategy(), 1..12)) {
            let mut table = beauty_table();
            for op in &ops {
                let category = CATEGORIES[op.category];
                let data = to_month_data(op);
                let before = table.clone();
                let out = if table.has_category(category) {
                    add_months(&table, category, &data)
                } else {
                    add_category(&table, category, &data)
                };
                let next = out.expect("merge should succeed").table;

                prop_assert!(next.check_integrity().is_ok());
                prop_assert!(next.check_extends(&before).is_ok());
                prop_assert!(next.row_count() >= before.row_count());
                prop_assert!(next.columns().len() >= before.columns().len());

                // column order: key, categories in insertion order, months ascending
                let cols = next.columns();
                prop_assert_eq!(&cols[0], &crate::pivot::Column::Term);
                let cats = next.categories().len();
                prop_assert_eq!(&next.categories()[..before.categories().len()], before.categories());
                prop_assert!(next.months().windows(2).all(|w| w[0] < w[1]));
                prop_assert_eq!(cols.len(), 1 + cats + next.months().len());

                // cells outside the supplied maps are untouched
                for row in before.rows() {
                    for (pos, month) in before.months().iter().enumerate() {
                        let supplied = data.get(month).map_or(false, |map| {
                            map.get(row.term()).map_or(false, |r| crate::pivot::is_legal_rank(r))
                        });
                        if !supplied {
                            prop_assert_eq!(next.rank(row.term(), month), Some(row.ranks()[pos]));
                        }
                    }
                }
                table = next;
            }
        }
    }
}
