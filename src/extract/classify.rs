//! Heuristic categories for job listings.

use regex::Regex;
use std::sync::OnceLock;

static BAND: OnceLock<Regex> = OnceLock::new();
static EMPLOYMENT: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
static SALARY: OnceLock<Regex> = OnceLock::new();

fn band_re() -> &'static Regex {
    BAND.get_or_init(|| Regex::new(r"(?i)\bband\s*([0-9]{1,2})\b").expect("band pattern is valid"))
}

fn salary_re() -> &'static Regex {
    SALARY.get_or_init(|| {
        Regex::new(r"\$[0-9][\d,]*(?:\.\d{2})?(?:\s*-\s*\$?[0-9][\d,]*(?:\.\d{2})?)?").expect("salary pattern is valid")
    })
}

fn employment_res() -> &'static [(Regex, &'static str)] {
    EMPLOYMENT.get_or_init(|| {
        [
            (r"(?i)\bfull[-\s]?time\b", "Full Time"),
            (r"(?i)\bpart[-\s]?time\b", "Part Time"),
            (r"(?i)\bcasual\b", "Casual"),
            (r"(?i)\b(?:temporary|fixed[-\s]?term)\b", "Temporary"),
            (r"(?i)\bcontract\b", "Contract"),
        ]
        .into_iter()
        .map(|(pattern, label)| (Regex::new(pattern).expect("employment pattern is valid"), label))
        .collect()
    })
}

/// Finds a pay band such as "Band 5" and normalizes its spelling.
pub fn guess_band(text: &str) -> Option<String> {
    band_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|n| format!("Band {}", n.as_str().trim_start_matches('0')))
        .filter(|band| band != "Band ")
}

/// First employment type mentioned in the text.
pub fn guess_employment_type(text: &str) -> Option<&'static str> {
    employment_res()
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, label)| *label)
}

/// First dollar amount or range ("$85,000 - $92,000") in the text.
pub fn guess_salary(text: &str) -> Option<String> {
    salary_re().find(text).map(|m| m.as_str().trim_end_matches(',').to_string())
}

/// All categories derivable from a block of listing text, band first.
pub fn categories_for(text: &str) -> Vec<String> {
    let mut categories = Vec::new();
    if let Some(band) = guess_band(text) {
        categories.push(band);
    }
    if let Some(kind) = guess_employment_type(text) {
        categories.push(kind.to_string());
    }
    categories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_band() {
        assert_eq!(guess_band("Planner - Band 5"), Some("Band 5".into()));
        assert_eq!(guess_band("BAND6 Coordinator"), Some("Band 6".into()));
        assert_eq!(guess_band("band 05"), Some("Band 5".into()));
        assert_eq!(guess_band("Bandwidth engineer"), None);
        assert_eq!(guess_band("Band 0"), None);
    }

    #[test]
    fn test_guess_employment_type() {
        assert_eq!(guess_employment_type("Permanent Full-time"), Some("Full Time"));
        assert_eq!(guess_employment_type("part time, 0.6 EFT"), Some("Part Time"));
        assert_eq!(guess_employment_type("Fixed term to June"), Some("Temporary"));
        assert_eq!(guess_employment_type("Ongoing"), None);
    }

    #[test]
    fn test_guess_salary() {
        assert_eq!(
            guess_salary("Paying $85,000 - $92,000 plus super"),
            Some("$85,000 - $92,000".into())
        );
        assert_eq!(guess_salary("From $41.50 per hour"), Some("$41.50".into()));
        assert_eq!(guess_salary("Up to $90,000, negotiable"), Some("$90,000".into()));
        assert_eq!(guess_salary("Attractive package"), None);
    }

    #[test]
    fn test_categories_for() {
        assert_eq!(
            categories_for("Band 4 Casual Lifeguard"),
            vec!["Band 4".to_string(), "Casual".to_string()]
        );
        assert!(categories_for("Mayor").is_empty());
    }
}
