// src/source/scan.rs

use anyhow::{Context, Result};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use super::{filename::month_from_filename, rank_file};
use crate::detect::{AvailableSources, SourceMonth};
use crate::pivot::{MonthLabel, RankMap};
use crate::plan::RankSource;

fn is_visible_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| !n.starts_with('.'))
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))? {
        let path = entry?.path();
        if !is_visible_dir(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Country directories directly under `data_root`, sorted by name.
pub fn list_countries(data_root: &Path) -> Result<Vec<String>> {
    if !data_root.is_dir() {
        anyhow::bail!("data root `{}` is not a directory", data_root.display());
    }
    sorted_subdirs(data_root)
}

/// Discover `<data_root>/<country>/<category>/*.csv` monthly exports.
///
/// With `with_terms`, every file is also read so change detection can
/// estimate how many new keywords it would bring.
pub fn scan_country(data_root: &Path, country: &str, with_terms: bool) -> Result<AvailableSources> {
    let country_dir = data_root.join(country);
    let mut sources = AvailableSources::new();

    for category in sorted_subdirs(&country_dir)? {
        let category_dir = country_dir.join(&category);
        let pattern = format!("{}/*.csv", category_dir.display());
        let mut paths: Vec<PathBuf> = glob(&pattern)
            .with_context(|| format!("invalid glob pattern `{}`", pattern))?
            .filter_map(Result::ok)
            .collect();
        paths.sort();

        for path in paths {
            let Some(fname) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(month) = month_from_filename(fname) else {
                warn!("{}: cannot tell the month from `{}`, skipping", category, fname);
                continue;
            };
            let mut src = SourceMonth::new(&path);
            if with_terms {
                src.terms = Some(rank_file::read_terms(&path)?);
            }
            if let Some(prev) = sources.insert(category.as_str(), month, src) {
                warn!(
                    "{} {}: `{}` replaces `{}`",
                    category,
                    month,
                    path.display(),
                    prev.path.display()
                );
            }
        }
    }

    debug!(
        "{}: {} categories, {} months available",
        country,
        sources.categories().count(),
        sources.months().len()
    );
    Ok(sources)
}

/// Loads rank maps from the files a scan discovered.
pub struct FileRankSource<'a> {
    sources: &'a AvailableSources,
}

impl<'a> FileRankSource<'a> {
    pub fn new(sources: &'a AvailableSources) -> Self {
        Self { sources }
    }

    /// Paths behind `months` of `category`, in month order.
    pub fn files(&self, category: &str, months: &[MonthLabel]) -> Vec<PathBuf> {
        months
            .iter()
            .filter_map(|m| self.sources.get(category, m))
            .map(|src| src.path.clone())
            .collect()
    }
}

impl RankSource for FileRankSource<'_> {
    fn load(&self, category: &str, month: &MonthLabel) -> Result<RankMap> {
        let src = self
            .sources
            .get(category, month)
            .with_context(|| format!("no source file for `{}` {}", category, month))?;
        rank_file::read_rank_file(&src.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    const BODY: &str = "banner\nSearch Term,Search Frequency Rank\nkw1,1\nkw2,2\n";

    #[test]
    fn scans_categories_and_months() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        write(&root.join("US/Beauty/2025-June.csv"), BODY);
        write(
            &root.join("US/Beauty/US_Top_search_terms_Simple_Month_2025_07_31.csv"),
            BODY,
        );
        write(&root.join("US/Beauty/notes.csv"), BODY);
        write(&root.join("US/Grocery/2025-06.csv"), BODY);
        write(&root.join("US/.cache/2025-06.csv"), BODY);
        fs::create_dir_all(root.join("CA")).unwrap();

        assert_eq!(list_countries(root).unwrap(), vec!["CA", "US"]);

        let sources = scan_country(root, "US", true).unwrap();
        assert_eq!(sources.categories().collect::<Vec<_>>(), vec!["Beauty", "Grocery"]);
        let june: MonthLabel = "2025-06".parse().unwrap();
        let july: MonthLabel = "2025-07".parse().unwrap();
        assert_eq!(
            sources.months_for("Beauty").into_iter().collect::<Vec<_>>(),
            vec![june, july]
        );
        let terms = sources.get("Grocery", &june).unwrap().terms.clone().unwrap();
        assert_eq!(terms.len(), 2);

        let loader = FileRankSource::new(&sources);
        let map = loader.load("Beauty", &july).unwrap();
        assert_eq!(map.get("kw2"), Some(2));
        assert!(loader.load("Grocery", &july).is_err());
        assert_eq!(loader.files("Beauty", &[june, july]).len(), 2);
    }

    #[test]
    fn missing_data_root_is_an_error() {
        let tmp = tempdir().unwrap();
        assert!(list_countries(&tmp.path().join("nope")).is_err());
    }
}
