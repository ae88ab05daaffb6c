use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::date::date_key;

/// Slices an issue's full text into per-page substrings using the positional
/// markers the archive embeds between pages:
///
/// `[ {journal title} - {YYYYMMDD} - Seite {page} ]`
///
/// Page `n` is delimited by the markers for `n` and `n + 1`. The marker format
/// is specific to this archive's rendering and the sole coupling point; the
/// orchestrator only sees the (text, page) -> Option contract.
pub struct TagSegmenter {
    journal_title: String,
    date_key: String,
}

impl TagSegmenter {
    pub fn new(journal_title: &str, issue_date: NaiveDate) -> Self {
        Self {
            journal_title: journal_title.to_string(),
            date_key: date_key(issue_date),
        }
    }

    fn marker(&self, page: u32) -> String {
        format!("[ {} - {} - Seite {} ]", self.journal_title, self.date_key, page)
    }

    /// Text belonging to `page`, or None when the page's start marker is
    /// absent. A missing end marker means `page` is the issue's last page and
    /// the remainder of the text belongs to it.
    pub fn page_text<'a>(&self, issue_text: &'a str, page: u32) -> Option<&'a str> {
        let start = self.marker(page);
        let Some(pos) = issue_text.find(&start) else {
            warn!("Start tag {start:?} not found in issue full text");
            return None;
        };
        let rest = &issue_text[pos + start.len()..];

        let end = self.marker(page + 1);
        match rest.find(&end) {
            Some(end_pos) => Some(&rest[..end_pos]),
            None => {
                debug!("End tag {end:?} not found, assuming page {page} is the last page");
                Some(rest)
            }
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> TagSegmenter {
        let date = NaiveDate::from_ymd_opt(1892, 4, 8).unwrap();
        TagSegmenter::new("Bukowiner Nachrichten", date)
    }

    fn synthetic_issue(pages: u32) -> String {
        let seg = segmenter();
        (1..=pages)
            .map(|p| format!("{}body of page {p}\n", seg.marker(p)))
            .collect()
    }

    #[test]
    fn round_trip_over_synthetic_issue() {
        let seg = segmenter();
        let text = synthetic_issue(4);
        for page in 1..=3 {
            assert_eq!(
                seg.page_text(&text, page).unwrap(),
                format!("body of page {page}\n")
            );
        }
    }

    #[test]
    fn last_page_takes_the_remainder() {
        let seg = segmenter();
        let text = synthetic_issue(3);
        assert_eq!(seg.page_text(&text, 3).unwrap(), "body of page 3\n");
    }

    #[test]
    fn missing_start_marker_yields_none() {
        let seg = segmenter();
        let text = synthetic_issue(3);
        assert!(seg.page_text(&text, 7).is_none());
        assert!(seg.page_text("no markers at all", 1).is_none());
    }

    #[test]
    fn marker_must_match_title_and_date_exactly() {
        let date = NaiveDate::from_ymd_opt(1892, 4, 8).unwrap();
        let other = TagSegmenter::new("Die Presse", date);
        assert!(other.page_text(&synthetic_issue(2), 1).is_none());
    }
}
