// src/source/rank_file.rs

use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};
use tracing::debug;

use crate::pivot::{Rank, RankMap};

pub const TERM_COLUMN: &str = "Search Term";
pub const RANK_COLUMN: &str = "Search Frequency Rank";

/// Read a monthly ranking export into a [`RankMap`].
///
/// Exports start with a one-line report banner before the real header; the
/// header is taken from whichever of the first two lines names both columns.
/// Ranks are returned unfiltered; range policy belongs to the merge engine.
pub fn read_rank_file(path: &Path) -> Result<RankMap> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_rank_csv(BufReader::new(file), &path.display().to_string())
}

/// Only the distinct terms of a ranking export.
pub fn read_terms(path: &Path) -> Result<HashSet<String>> {
    let map = read_rank_file(path)?;
    Ok(map.terms().map(str::to_string).collect())
}

pub fn read_rank_csv<R: Read>(reader: R, origin: &str) -> Result<RankMap> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = rdr.records();

    // 1) locate the header among the first two lines
    let mut columns = None;
    for _ in 0..2 {
        let Some(record) = records.next() else { break };
        let record = record.with_context(|| format!("reading header of {}", origin))?;
        if let Some(found) = header_columns(&record) {
            columns = Some(found);
            break;
        }
    }
    let (term_idx, rank_idx) = columns.ok_or_else(|| {
        anyhow!(
            "{}: no header with `{}` and `{}` columns",
            origin,
            TERM_COLUMN,
            RANK_COLUMN
        )
    })?;

    // 2) data rows, first occurrence of a term wins
    let mut map = RankMap::new();
    let mut skipped = 0usize;
    for (line, record) in records.enumerate() {
        let record = record.with_context(|| format!("reading row {} of {}", line + 1, origin))?;
        let term = record.get(term_idx).unwrap_or("");
        match record.get(rank_idx).and_then(parse_rank) {
            Some(rank) => {
                map.insert(term, rank);
            }
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("{}: skipped {} rows without a usable rank", origin, skipped);
    }
    Ok(map)
}

fn header_columns(record: &StringRecord) -> Option<(usize, usize)> {
    let find = |name: &str| {
        record
            .iter()
            .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
    };
    Some((find(TERM_COLUMN)?, find(RANK_COLUMN)?))
}

/// `1,234`, `1234` and `1234.0` all read as 1234.
fn parse_rank(raw: &str) -> Option<Rank> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '"')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(v) = cleaned.parse::<Rank>() {
        return Some(v);
    }
    let v = cleaned.parse::<f64>().ok()?;
    if v.fract() == 0.0 && v >= 0.0 && v <= Rank::MAX as f64 {
        Some(v as Rank)
    } else {
        None
    }
}
