// src/store/table_csv.rs

use anyhow::{anyhow, bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};
use tracing::info;

use crate::pivot::{MonthLabel, PivotTable, Rank, Schema, ABSENT, SEARCH_TERM_HEADER};

/// Write `table` as CSV: key, categories, months. Written to a temp file
/// and renamed into place.
pub fn write_table(path: &Path, table: &PivotTable) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut wtr = WriterBuilder::new()
            .from_path(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;

        let header: Vec<String> = table.columns().iter().map(|c| c.to_string()).collect();
        wtr.write_record(&header)?;

        let mut record: Vec<String> = Vec::with_capacity(header.len());
        for row in table.rows() {
            record.clear();
            record.push(row.term().to_string());
            record.extend(row.presence().iter().map(|&p| if p { "1" } else { "0" }.to_string()));
            record.extend(row.ranks().iter().map(|r| r.to_string()));
            wtr.write_record(&record)
                .with_context(|| format!("writing row `{}`", row.term()))?;
        }
        wtr.flush()?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;

    info!(
        "wrote {} rows × {} columns to {}",
        table.row_count(),
        table.columns().len(),
        path.display()
    );
    Ok(())
}

enum HeaderKind {
    Category(usize),
    Month(MonthLabel),
}

fn parse_header(
    path: &Path,
    headers: &StringRecord,
) -> Result<(Vec<String>, Vec<MonthLabel>, Vec<HeaderKind>)> {
    let mut iter = headers.iter();
    match iter.next() {
        Some(h) if h.trim() == SEARCH_TERM_HEADER => {}
        other => bail!(
            "{}: first column must be `{}`, found {:?}",
            path.display(),
            SEARCH_TERM_HEADER,
            other
        ),
    }

    let mut categories = Vec::new();
    let mut months = Vec::new();
    let mut kinds = Vec::new();
    for h in iter {
        let h = h.trim();
        match MonthLabel::parse(h) {
            Some(m) => {
                months.push(m);
                kinds.push(HeaderKind::Month(m));
            }
            None => {
                kinds.push(HeaderKind::Category(categories.len()));
                categories.push(h.to_string());
            }
        }
    }
    Ok((categories, months, kinds))
}

/// Category and month columns of a table file, without reading its rows.
pub fn read_header(path: &Path) -> Result<(Vec<String>, Vec<MonthLabel>)> {
    let mut rdr = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .clone();
    let (categories, months, _) = parse_header(path, &headers)?;
    Ok((categories, months))
}

/// Load a table written by [`write_table`].
///
/// Headers that parse as months are month columns; the rest are categories.
/// `suppliers` restores which categories wrote each month (see
/// [`Schema::from_parts`] for the default when a month is missing).
pub fn read_table(path: &Path, suppliers: &BTreeMap<MonthLabel, Vec<String>>) -> Result<PivotTable> {
    let mut rdr = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .clone();
    let (categories, months, kinds) = parse_header(path, &headers)?;

    let schema = Schema::from_parts(categories, months, suppliers)
        .with_context(|| format!("schema of {}", path.display()))?;
    let month_count = schema.months().len();
    let cat_count = schema.categories().len();

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("reading row {} of {}", line + 1, path.display()))?;
        let term = record
            .get(0)
            .map(|t| t.trim().to_string())
            .ok_or_else(|| anyhow!("row {} has no key", line + 1))?;
        let mut presence = vec![false; cat_count];
        let mut ranks = vec![ABSENT; month_count];
        for (kind, raw) in kinds.iter().zip(record.iter().skip(1)) {
            match kind {
                HeaderKind::Category(idx) => {
                    presence[*idx] = parse_flag(raw)
                        .with_context(|| format!("row `{}`: bad presence value `{}`", term, raw))?;
                }
                HeaderKind::Month(m) => {
                    let pos = schema
                        .month_position(m)
                        .ok_or_else(|| anyhow!("month {} missing from schema", m))?;
                    ranks[pos] = parse_cell(raw)
                        .with_context(|| format!("row `{}`: bad rank `{}` in {}", term, raw, m))?;
                }
            }
        }
        rows.push((term, presence, ranks));
    }

    let table = PivotTable::from_parts(schema, rows)
        .with_context(|| format!("validating {}", path.display()))?;
    info!("loaded {} rows from {}", table.row_count(), path.display());
    Ok(table)
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim() {
        "1" | "1.0" | "true" | "True" => Ok(true),
        "0" | "0.0" | "" | "false" | "False" => Ok(false),
        other => bail!("not a 0/1 flag: `{}`", other),
    }
}

fn parse_cell(raw: &str) -> Result<Rank> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(ABSENT);
    }
    if let Ok(v) = raw.parse::<Rank>() {
        return Ok(v);
    }
    let v: f64 = raw.parse().with_context(|| format!("not a number: `{}`", raw))?;
    if v.fract() != 0.0 || v < 0.0 || v > Rank::MAX as f64 {
        bail!("not a whole rank: `{}`", raw);
    }
    Ok(v as Rank)
}
