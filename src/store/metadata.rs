// src/store/metadata.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::pivot::{MonthLabel, PivotTable, Schema};

/// Import history of one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStatus {
    pub files_processed: Vec<String>,
    pub last_processed: Option<DateTime<Utc>>,
    pub total_keywords: usize,
}

/// Table structure saved next to the table so that change detection can run
/// without reading the table's cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub country: String,
    /// In column order.
    pub categories: Vec<String>,
    /// Ascending.
    pub months: Vec<MonthLabel>,
    /// Month → categories that wrote ranks into it.
    pub suppliers: BTreeMap<MonthLabel, Vec<String>>,
    /// Row keys in row order.
    pub keywords: Vec<String>,
    pub row_count: usize,
    #[serde(default)]
    pub processing_status: BTreeMap<String, CategoryStatus>,
    pub last_updated: DateTime<Utc>,
}

impl TableMetadata {
    /// Snapshot `table`, carrying over processing history from `previous`.
    pub fn from_table(country: &str, table: &PivotTable, previous: Option<&TableMetadata>) -> Self {
        let schema = table.schema();
        let suppliers = schema
            .months()
            .iter()
            .map(|m| {
                let names = schema.suppliers(m).into_iter().map(str::to_string).collect();
                (*m, names)
            })
            .collect();
        Self {
            country: country.to_string(),
            categories: schema.categories().to_vec(),
            months: schema.months().to_vec(),
            suppliers,
            keywords: table.rows().map(|r| r.term().to_string()).collect(),
            row_count: table.row_count(),
            processing_status: previous
                .map(|p| p.processing_status.clone())
                .unwrap_or_default(),
            last_updated: Utc::now(),
        }
    }

    pub fn schema(&self) -> Result<Schema> {
        Schema::from_parts(self.categories.clone(), self.months.clone(), &self.suppliers)
            .with_context(|| format!("rebuilding schema for {}", self.country))
    }

    /// Whether this snapshot was taken of a table with exactly these columns.
    /// A table written after its metadata (or without it) fails this check.
    pub fn matches_columns(&self, categories: &[String], months: &[MonthLabel]) -> bool {
        self.categories == categories && self.months == months
    }

    pub fn keys(&self) -> HashSet<String> {
        self.keywords.iter().cloned().collect()
    }

    /// Record that `files` were merged into `category`.
    pub fn record_processed(&mut self, category: &str, files: &[PathBuf], total_keywords: usize) {
        let status = self
            .processing_status
            .entry(category.to_string())
            .or_default();
        for f in files {
            let name = f
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| f.display().to_string());
            if !status.files_processed.contains(&name) {
                status.files_processed.push(name);
            }
        }
        status.last_processed = Some(Utc::now());
        status.total_keywords = total_keywords;
    }
}

/// `<output_dir>/metadata/<country>_structure.json`
pub fn metadata_path(output_dir: &Path, country: &str) -> PathBuf {
    output_dir
        .join("metadata")
        .join(format!("{}_structure.json", country.to_lowercase()))
}

pub fn load_metadata(path: &Path) -> Result<Option<TableMetadata>> {
    if !path.exists() {
        return Ok(None);
    }
    let f = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let meta = serde_json::from_reader(f).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(meta))
}

/// Write atomically: temp file in the same directory, then rename.
pub fn save_metadata(path: &Path, meta: &TableMetadata) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "structure.json".to_string());
    let tmp_path = dir.join(format!(".{}.tmp", file_name));
    let mut tmp =
        fs::File::create(&tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;

    // pretty-print with a trailing newline
    serde_json::to_writer_pretty(&mut tmp, meta).context("serializing metadata")?;
    tmp.write_all(b"\n")?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{detect_changes, AvailableSources, SourceMonth};
    use crate::merge::add_category;
    use crate::pivot::{AnchorRow, MonthData, RankMap};
    use tempfile::tempdir;

    fn m(s: &str) -> MonthLabel {
        s.parse().unwrap()
    }

    fn table() -> PivotTable {
        let base = PivotTable::create(
            "Beauty",
            vec![AnchorRow::new("kw1").with_rank(m("2025-06"), 1)],
        )
        .unwrap();
        let mut data = MonthData::new();
        data.insert(m("2025-07"), [("kw2", 2)].into_iter().collect::<RankMap>());
        add_category(&base, "Grocery", &data).unwrap().table
    }

    #[test]
    fn save_load_restores_schema_without_cells() {
        let tmp = tempdir().unwrap();
        let path = metadata_path(tmp.path(), "US");
        assert!(path.ends_with("metadata/us_structure.json"));
        assert!(load_metadata(&path).unwrap().is_none());

        let table = table();
        let mut meta = TableMetadata::from_table("US", &table, None);
        meta.record_processed("Grocery", &[PathBuf::from("/data/US/Grocery/2025-07.csv")], 1);
        save_metadata(&path, &meta).unwrap();

        let loaded = load_metadata(&path).unwrap().unwrap();
        assert_eq!(loaded, meta);
        assert_eq!(loaded.schema().unwrap(), *table.schema());
        assert_eq!(
            loaded.processing_status["Grocery"].files_processed,
            vec!["2025-07.csv".to_string()]
        );

        // detection from metadata matches detection from the table
        let mut available = AvailableSources::new();
        available.insert("Beauty", m("2025-07"), SourceMonth::new("b.csv"));
        available.insert("Toys", m("2025-08"), SourceMonth::new("t.csv"));
        let from_meta = detect_changes(&loaded.schema().unwrap(), &loaded.keys(), &available);
        let from_table = detect_changes(table.schema(), &table, &available);
        assert_eq!(from_meta, from_table);
    }

    #[test]
    fn column_match_detects_older_snapshot() {
        let base = PivotTable::create(
            "Beauty",
            vec![AnchorRow::new("kw1").with_rank(m("2025-06"), 1)],
        )
        .unwrap();
        let old = TableMetadata::from_table("US", &base, None);
        let table = table();
        assert!(!old.matches_columns(table.categories(), table.months()));
        assert!(old.matches_columns(base.categories(), base.months()));

        let current = TableMetadata::from_table("US", &table, Some(&old));
        assert!(current.matches_columns(table.categories(), table.months()));
    }

    #[test]
    fn previous_status_is_carried_over() {
        let table = table();
        let mut first = TableMetadata::from_table("US", &table, None);
        first.record_processed("Beauty", &[PathBuf::from("a.csv")], 1);
        first.record_processed("Beauty", &[PathBuf::from("a.csv"), PathBuf::from("b.csv")], 2);
        let second = TableMetadata::from_table("US", &table, Some(&first));
        let status = &second.processing_status["Beauty"];
        assert_eq!(status.files_processed, vec!["a.csv", "b.csv"]);
        assert_eq!(status.total_keywords, 2);
    }
}
