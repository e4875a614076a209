// src/pipeline.rs

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
    time::Instant,
};
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::detect::{detect_changes, AvailableSources, Delta};
use crate::error::PlanError;
use crate::merge::MergeSummary;
use crate::pivot::{MonthData, PivotTable, Schema};
use crate::plan::{Decision, Operation, RankSource, UpdatePlanner};
use crate::source::{list_countries, scan_country, FileRankSource};
use crate::store::{
    export_parquet, load_metadata, read_header, read_table, save_metadata, write_table,
    TableMetadata, TablePaths,
};

/// What one `update` run did to a country's table.
#[derive(Debug)]
pub struct CountryReport {
    pub country: String,
    /// Set when the table did not exist and was built from this category.
    pub created_from: Option<String>,
    pub delta: Delta,
    pub decision: Decision,
    pub applied: Vec<(Operation, MergeSummary)>,
    pub failure: Option<PlanError>,
    pub row_count: usize,
    /// Files written this run; empty when nothing changed.
    pub written: Vec<PathBuf>,
}

impl CountryReport {
    pub fn new_rows(&self) -> usize {
        self.applied.iter().map(|(_, s)| s.new_rows).sum()
    }
}

/// Countries named in the config, or every country directory.
///
/// Output files are named after the lowercased country, so names that differ
/// only in case are kept once (first occurrence wins).
pub fn countries(cfg: &Config) -> Result<Vec<String>> {
    let names = if cfg.countries.is_empty() {
        list_countries(&cfg.data_root)?
    } else {
        cfg.countries.clone()
    };
    let mut seen = HashSet::new();
    Ok(names
        .into_iter()
        .filter(|country| {
            let first = seen.insert(country.to_lowercase());
            if !first {
                warn!(
                    "country `{}` maps to the same table as an earlier entry, skipping",
                    country
                );
            }
            first
        })
        .collect())
}

/// Pick the category a new table is built from.
fn anchor_category(cfg: &Config, sources: &AvailableSources) -> Result<String> {
    match &cfg.anchor_category {
        Some(name) if sources.has_category(name) => Ok(name.clone()),
        Some(name) => bail!("anchor category `{}` has no source files", name),
        None => sources
            .categories()
            .next()
            .map(str::to_string)
            .context("no categories to build a table from"),
    }
}

fn create_table(anchor: &str, sources: &AvailableSources) -> Result<PivotTable> {
    let loader = FileRankSource::new(sources);
    let mut data = MonthData::new();
    for month in sources.months_for(anchor) {
        let map = loader
            .load(anchor, &month)
            .with_context(|| format!("loading anchor `{}` {}", anchor, month))?;
        data.insert(month, map);
    }
    let table = PivotTable::from_anchor_months(anchor, &data)
        .with_context(|| format!("building table from `{}`", anchor))?;
    info!(
        "created table from `{}`: {} rows, {} months",
        anchor,
        table.row_count(),
        table.months().len()
    );
    Ok(table)
}

/// Load an existing table. Month suppliers come from `meta` only when it was
/// written for the same columns and the table validates against them;
/// otherwise every category is taken to have supplied every month.
///
/// The flag is `true` when `meta` was missing or could not be used.
fn load_table(paths: &TablePaths, meta: Option<&TableMetadata>) -> Result<(PivotTable, bool)> {
    match meta {
        None => warn!(
            "{}: no metadata, assuming every category supplied every month",
            paths.table.display()
        ),
        Some(meta) => {
            let (categories, months) = read_header(&paths.table)?;
            if meta.matches_columns(&categories, &months) {
                match read_table(&paths.table, &meta.suppliers) {
                    Ok(table) => return Ok((table, false)),
                    Err(e) => warn!(
                        "{}: metadata suppliers rejected ({:#}), assuming every category supplied every month",
                        paths.table.display(),
                        e
                    ),
                }
            } else {
                warn!(
                    "{}: metadata is older than the table, assuming every category supplied every month",
                    paths.table.display()
                );
            }
        }
    }
    Ok((read_table(&paths.table, &BTreeMap::new())?, true))
}

/// A loaded or freshly built table.
struct Loaded {
    table: PivotTable,
    created_from: Option<String>,
    /// Metadata on disk does not describe `table` and must be rewritten.
    stale_metadata: bool,
}

/// Load a country's table, or build it from the anchor category.
fn load_or_create(
    cfg: &Config,
    paths: &TablePaths,
    previous: Option<&TableMetadata>,
    sources: &AvailableSources,
) -> Result<Loaded> {
    if paths.table.exists() {
        let (table, stale_metadata) = load_table(paths, previous)?;
        return Ok(Loaded {
            table,
            created_from: None,
            stale_metadata,
        });
    }
    let anchor = anchor_category(cfg, sources)?;
    let table = create_table(&anchor, sources)?;
    Ok(Loaded {
        table,
        created_from: Some(anchor),
        stale_metadata: false,
    })
}

/// Scan, detect, plan with `decision`, execute, persist.
///
/// A plan that fails part way still persists every operation that committed
/// before the failure; the failure is returned in the report.
#[instrument(level = "info", skip(cfg, decision), fields(decision = %decision))]
pub fn update_country(cfg: &Config, country: &str, decision: Decision) -> Result<CountryReport> {
    let start = Instant::now();
    let sources = scan_country(&cfg.data_root, country, false)?;
    let paths = TablePaths::new(&cfg.output_dir, country);
    let previous = load_metadata(&paths.metadata)?;

    if sources.is_empty() && !paths.table.exists() {
        warn!("{}: no source files and no table, nothing to do", country);
        return Ok(CountryReport {
            country: country.to_string(),
            created_from: None,
            delta: Delta::default(),
            decision,
            applied: Vec::new(),
            failure: None,
            row_count: 0,
            written: Vec::new(),
        });
    }

    let Loaded {
        table,
        created_from,
        stale_metadata,
    } = load_or_create(cfg, &paths, previous.as_ref(), &sources)?;
    let mut planner = UpdatePlanner::new(detect_changes(table.schema(), &table, &sources));
    let delta = planner.delta();
    info!(
        "{}: {} new categories, {} new months, {} categories with pending months",
        country,
        delta.new_categories.len(),
        delta.new_months.len(),
        delta.pending_months.len()
    );

    let loader = FileRankSource::new(&sources);
    planner.decide(decision)?;
    for op in planner.operations() {
        debug!("{}: planned {:?}", country, op);
    }
    let outcome = planner.execute(table, &loader)?;
    if let Some(e) = &outcome.failure {
        error!("{}: plan stopped early: {}", country, e);
    }

    let table = outcome.table;
    let mut written = Vec::new();
    if created_from.is_some() || stale_metadata || !outcome.applied.is_empty() {
        let mut meta = TableMetadata::from_table(country, &table, previous.as_ref());
        if let Some(anchor) = &created_from {
            let months: Vec<_> = table.schema().months().to_vec();
            meta.record_processed(anchor, &loader.files(anchor, &months), table.category_size(anchor));
        }
        for (op, _) in &outcome.applied {
            let category = op.category();
            meta.record_processed(
                category,
                &loader.files(category, op.months()),
                table.category_size(category),
            );
        }

        write_table(&paths.table, &table)?;
        written.push(paths.table.clone());
        save_metadata(&paths.metadata, &meta)?;
        written.push(paths.metadata.clone());
        if cfg.write_parquet {
            export_parquet(&paths.parquet, &table)?;
            written.push(paths.parquet.clone());
        }
    } else {
        info!("{}: table unchanged", country);
    }

    info!(
        "{}: {} operations applied, {} rows, done in {:?}",
        country,
        outcome.applied.len(),
        table.row_count(),
        start.elapsed()
    );
    Ok(CountryReport {
        country: country.to_string(),
        created_from,
        delta: planner.delta().clone(),
        decision,
        applied: outcome.applied,
        failure: outcome.failure,
        row_count: table.row_count(),
        written,
    })
}

/// Delta between a country's sources and its table, without changing
/// anything on disk. Reads every source file to estimate new keywords.
#[instrument(level = "info", skip(cfg))]
pub fn status_country(cfg: &Config, country: &str) -> Result<Delta> {
    let sources = scan_country(&cfg.data_root, country, true)?;
    let paths = TablePaths::new(&cfg.output_dir, country);

    let meta = load_metadata(&paths.metadata)?;
    let table_exists = paths.table.exists();
    // metadata alone is enough while it still describes the table's columns
    let meta_current = match &meta {
        Some(meta) if table_exists => {
            let (categories, months) = read_header(&paths.table)?;
            meta.matches_columns(&categories, &months)
        }
        Some(_) => true,
        None => false,
    };

    let delta = match meta {
        Some(meta) if meta_current => detect_changes(&meta.schema()?, &meta.keys(), &sources),
        meta if table_exists => {
            let (table, _) = load_table(&paths, meta.as_ref())?;
            detect_changes(table.schema(), &table, &sources)
        }
        _ => detect_changes(&Schema::empty(), &HashSet::<String>::new(), &sources),
    };
    Ok(delta)
}

/// Run `update_country` for every configured country, one rayon task per
/// country. A failing country does not stop the others.
pub fn update(cfg: &Config, decision: Decision) -> Result<Vec<(String, Result<CountryReport>)>> {
    let countries = countries(cfg)?;
    info!("updating {} countries with `{}`", countries.len(), decision);
    Ok(countries
        .into_par_iter()
        .map(|country| {
            let result = update_country(cfg, &country, decision);
            (country, result)
        })
        .collect())
}

pub fn status(cfg: &Config) -> Result<Vec<(String, Result<Delta>)>> {
    let countries = countries(cfg)?;
    Ok(countries
        .into_par_iter()
        .map(|country| {
            let result = status_country(cfg, &country);
            (country, result)
        })
        .collect())
}
