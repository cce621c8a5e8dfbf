use anyhow::{Context, Result};
use chrono::NaiveDate;

/// Acquisition window, start inclusive and end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            anyhow::bail!("Date range end {} must be after start {}", end, start);
        }
        Ok(DateRange { start, end })
    }

    /// Parse two ISO dates (`YYYY-MM-DD`)
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = parse_iso_date(start)?;
        let end = parse_iso_date(end)?;
        Self::new(start, end)
    }
}

pub fn parse_iso_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}

/// Make a product id safe to use as a file name
pub fn sanitize_file_stem(stem: &str) -> String {
    let cleaned: String = stem
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}
