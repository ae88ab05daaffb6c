use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::CrawlError;

static ISSUE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\.\s*([A-Za-zÄÖÜäöü]+)\s+(\d{4})").unwrap());

/// Parse the localized issue date shown on the detail view, e.g.
/// `17. Jänner 1898`. The archive uses Austrian month names; the German
/// equivalents are accepted as well.
pub fn parse_issue_date(text: &str) -> Result<NaiveDate, CrawlError> {
    let invalid = || CrawlError::InvalidDate {
        text: text.to_string(),
    };

    let caps = ISSUE_DATE_RE.captures(text).ok_or_else(invalid)?;
    let day: u32 = caps[1].parse().map_err(|_| invalid())?;
    let month = month_number(&caps[2]).ok_or_else(invalid)?;
    let year: i32 = caps[3].parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

fn month_number(name: &str) -> Option<u32> {
    match name.to_lowercase().as_str() {
        "jänner" | "januar" => Some(1),
        "februar" | "feber" => Some(2),
        "märz" => Some(3),
        "april" => Some(4),
        "mai" => Some(5),
        "juni" => Some(6),
        "juli" => Some(7),
        "august" => Some(8),
        "september" => Some(9),
        "oktober" => Some(10),
        "november" => Some(11),
        "dezember" => Some(12),
        _ => None,
    }
}

/// Compact `YYYYMMDD` key used by both the text endpoint and the page markers.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse a dd.mm.yyyy CLI date bound.
pub fn parse_range_bound(text: &str) -> Result<NaiveDate, CrawlError> {
    NaiveDate::parse_from_str(text, "%d.%m.%Y").map_err(|_| CrawlError::InvalidDate {
        text: text.to_string(),
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn austrian_month_names() {
        let date = parse_issue_date("17. Jänner 1898").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1898, 1, 17).unwrap());
    }

    #[test]
    fn german_month_names_accepted_too() {
        let date = parse_issue_date("17. Januar 1898").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1898, 1, 17).unwrap());
    }

    #[test]
    fn date_embedded_in_surrounding_text() {
        let date = parse_issue_date("Mittwoch, 8. April 1892").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1892, 4, 8).unwrap());
    }

    #[test]
    fn unknown_month_is_an_error() {
        assert!(matches!(
            parse_issue_date("17. Nebelung 1898"),
            Err(CrawlError::InvalidDate { .. })
        ));
        assert!(parse_issue_date("no date here").is_err());
    }

    #[test]
    fn impossible_day_is_an_error() {
        assert!(parse_issue_date("31. Februar 1898").is_err());
    }

    #[test]
    fn compact_key_format() {
        let date = NaiveDate::from_ymd_opt(1892, 4, 8).unwrap();
        assert_eq!(date_key(date), "18920408");
    }

    #[test]
    fn range_bounds_are_dotted() {
        let date = parse_range_bound("01.01.1898").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1898, 1, 1).unwrap());
        assert!(parse_range_bound("1898-01-01").is_err());
    }
}
