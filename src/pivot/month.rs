// src/pivot/month.rs

use chrono::Month;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// A calendar month used as a rank column, ordered by (year, month).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthLabel {
    year: i32,
    month: u32,
}

impl MonthLabel {
    /// Returns `None` unless `month` is in `1..=12` and `year` has four digits
    /// (`1000..=9999`), the range the `YYYY-MM` form can show.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (1000..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Full English month name, e.g. `July`.
    pub fn month_name(&self) -> &'static str {
        Month::try_from(self.month as u8)
            .map(|m| m.name())
            .unwrap_or("Unknown")
    }

    /// Parse `YYYY-MM`, `YYYY-M` or `YYYY-<Month>` (full or three-letter name).
    pub fn parse(s: &str) -> Option<Self> {
        let (year, rest) = s.trim().split_once('-')?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year: i32 = year.parse().ok()?;
        let rest = rest.trim();
        let month = if rest.bytes().all(|b| b.is_ascii_digit()) && !rest.is_empty() {
            rest.parse::<u32>().ok()?
        } else {
            // chrono accepts both "July" and "Jul", case-insensitively
            Month::from_str(rest).ok()?.number_from_month()
        };
        Self::new(year, month)
    }
}

impl fmt::Display for MonthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not a month label: `{}`", s))
    }
}

impl Serialize for MonthLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
