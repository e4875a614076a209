// src/source/filename.rs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::pivot::MonthLabel;

/// `US_Top_search_terms_Simple_Month_2025_07_31.csv`
static SIMPLE_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[A-Z]{2,}_.*Simple_Month_(\d{4})_(\d{1,2})_\d{1,2}\.csv$")
        .expect("SIMPLE_MONTH regex")
});

/// `2025-July.csv`, `2025-Jul.csv`, `2025-07.csv`
static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d{4}-(?:[a-z]+|\d{1,2}))\.csv$").expect("YEAR_MONTH regex"));

/// Month a monthly rank export covers, from its file name alone.
pub fn month_from_filename(file_name: &str) -> Option<MonthLabel> {
    if let Some(caps) = SIMPLE_MONTH.captures(file_name) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        return MonthLabel::new(year, month);
    }
    if let Some(caps) = YEAR_MONTH.captures(file_name) {
        return MonthLabel::parse(&caps[1]);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_month_exports() {
        let m = month_from_filename("US_Top_search_terms_Simple_Month_2025_07_31.csv").unwrap();
        assert_eq!(m.to_string(), "2025-07");
        let m = month_from_filename("CA_Top_search_terms_Simple_Month_2024_02_29.csv").unwrap();
        assert_eq!(m.to_string(), "2024-02");
    }

    #[test]
    fn parses_year_month_names() {
        assert_eq!(month_from_filename("2025-July.csv").unwrap().to_string(), "2025-07");
        assert_eq!(month_from_filename("2023-aug.csv").unwrap().to_string(), "2023-08");
        assert_eq!(month_from_filename("2025-06.csv").unwrap().to_string(), "2025-06");
    }

    #[test]
    fn ignores_other_files() {
        assert_eq!(month_from_filename("combined.csv"), None);
        assert_eq!(month_from_filename("2025-July.txt"), None);
        assert_eq!(month_from_filename("2025-Juli.csv"), None);
        assert_eq!(month_from_filename("US_Top_search_terms_Simple_Month_2025_13_01.csv"), None);
    }
}
