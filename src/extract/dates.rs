use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Formats tried, in order, against a candidate date string.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%A %d %B %Y",
    "%a %d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

static LABEL: OnceLock<Regex> = OnceLock::new();
static CANDIDATE: OnceLock<Regex> = OnceLock::new();
static ORDINAL: OnceLock<Regex> = OnceLock::new();

fn label_re() -> &'static Regex {
    LABEL.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:applications?\s+close|closing(?:\s+date)?|closes|posted(?:\s+on)?|advertised|published|date)\s*[:\-]?\s*",
        )
        .expect("label pattern is valid")
    })
}

fn candidate_re() -> &'static Regex {
    CANDIDATE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            \d{4}-\d{2}-\d{2}(?:[T\s]\d{2}:\d{2}(?::\d{2})?)?
            | \d{1,2}[/.\-]\d{1,2}[/.\-]\d{4}
            | (?:[a-z]+,?\s+)?\d{1,2}(?:st|nd|rd|th)?\s+[a-z]{3,9},?\s+\d{4}
            | [a-z]{3,9}\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}
            ",
        )
        .expect("candidate pattern is valid")
    })
}

fn ordinal_re() -> &'static Regex {
    ORDINAL.get_or_init(|| Regex::new(r"(?i)(\d)(?:st|nd|rd|th)\b").expect("ordinal pattern is valid"))
}

/// Parses a scraped date string, tolerating labels and loose formats.
///
/// Tries RFC 3339 and RFC 2822 first, then strips labels such as
/// "Closes:" or "Posted" and tries common day-first and month-first
/// layouts. As a last resort the first date-looking substring is used.
/// Dates without a zone are read in `offset` (midnight when no time is given).
pub fn parse_lenient(text: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let unlabelled = label_re().replace(text, "");
    if let Some(dt) = parse_candidate(&unlabelled, offset) {
        return Some(dt);
    }

    candidate_re()
        .find_iter(text)
        .find_map(|m| parse_candidate(m.as_str(), offset))
}

fn parse_candidate(candidate: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let normalized = ordinal_re().replace_all(candidate.trim(), "$1");
    let normalized = normalized.replace(',', " ");
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return localize(naive, offset);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&normalized, format) {
            return date.and_hms_opt(0, 0, 0).and_then(|n| localize(n, offset));
        }
    }

    None
}

fn localize(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_rfc_formats() {
        assert_eq!(
            parse_lenient("2025-03-04T10:00:00+11:00", utc()),
            Some(Utc.with_ymd_and_hms(2025, 3, 3, 23, 0, 0).unwrap())
        );
        assert_eq!(
            parse_lenient("Tue, 04 Mar 2025 10:00:00 GMT", utc()),
            Some(Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_plain_dates() {
        assert_eq!(parse_lenient("2025-03-04", utc()), Some(ymd(2025, 3, 4)));
        assert_eq!(parse_lenient("04/03/2025", utc()), Some(ymd(2025, 3, 4)));
        assert_eq!(parse_lenient("4 March 2025", utc()), Some(ymd(2025, 3, 4)));
        assert_eq!(parse_lenient("12 Nov 2025", utc()), Some(ymd(2025, 11, 12)));
        assert_eq!(parse_lenient("March 4, 2025", utc()), Some(ymd(2025, 3, 4)));
    }

    #[test]
    fn test_labels_and_ordinals() {
        assert_eq!(parse_lenient("Closes: 12 Nov 2025", utc()), Some(ymd(2025, 11, 12)));
        assert_eq!(parse_lenient("Posted - 1st July 2025", utc()), Some(ymd(2025, 7, 1)));
        assert_eq!(
            parse_lenient("Applications close: Friday, 21st March 2025", utc()),
            Some(ymd(2025, 3, 21))
        );
    }

    #[test]
    fn test_embedded_date() {
        assert_eq!(
            parse_lenient("Advertised on the portal since 2025-02-14 by HR", utc()),
            Some(ymd(2025, 2, 14))
        );
    }

    #[test]
    fn test_naive_dates_use_offset() {
        let aedt = FixedOffset::east_opt(11 * 3600).unwrap();
        assert_eq!(
            parse_lenient("2025-03-04", aedt),
            Some(Utc.with_ymd_and_hms(2025, 3, 3, 13, 0, 0).unwrap())
        );
        assert_eq!(
            parse_lenient("2025-03-04T09:30:00", aedt),
            Some(Utc.with_ymd_and_hms(2025, 3, 3, 22, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_lenient("", utc()), None);
        assert_eq!(parse_lenient("ongoing", utc()), None);
        assert_eq!(parse_lenient("31/02/2025", utc()), None);
    }
}
