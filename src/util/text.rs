use std::borrow::Cow;

/// Marker appended when a summary is cut short.
const ELLIPSIS: &str = "...";

/// Collapses runs of whitespace into single spaces and trims both ends.
///
/// Scraped markup tends to carry indentation, non-breaking spaces and
/// newlines from the page layout; none of that belongs in a feed title.
/// Control characters are removed first (see [`xml_safe`]).
///
/// # Examples
///
/// ```
/// use feedforge::util::clean_text;
///
/// assert_eq!(clean_text("  Senior\n\t Planner  "), "Senior Planner");
/// assert_eq!(clean_text("   "), "");
/// ```
pub fn clean_text(s: &str) -> String {
    let safe = xml_safe(s);
    let mut out = String::with_capacity(safe.len());
    for word in safe.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Removes characters that XML 1.0 documents cannot carry.
///
/// Strips C0 control characters other than tab, newline and carriage return,
/// DEL, and the non-characters U+FFFE / U+FFFF. Everything else, including
/// `<`, `&` and quotes, is left for the XML writer to escape.
///
/// Returns `Cow::Borrowed` when the input is already clean (common case).
pub fn xml_safe(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_forbidden) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !is_forbidden(*c)).collect())
}

fn is_forbidden(c: char) -> bool {
    match c {
        '\t' | '\n' | '\r' => false,
        '\u{0}'..='\u{1f}' | '\u{7f}' => true,
        '\u{fffe}' | '\u{ffff}' => true,
        _ => false,
    }
}

/// Truncates a string to at most `max_chars` characters.
///
/// When truncation happens the last three characters are replaced by "...",
/// so the result never exceeds `max_chars`. Cuts always land on a `char`
/// boundary.
///
/// # Examples
///
/// ```
/// use feedforge::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 8), "Hello...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }
    if max_chars <= ELLIPSIS.len() {
        return Cow::Owned(s.chars().take(max_chars).collect());
    }
    let keep = max_chars - ELLIPSIS.len();
    let cut = s.char_indices().nth(keep).map(|(idx, _)| idx).unwrap_or(s.len());
    Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("a \n\n b\tc"), "a b c");
        assert_eq!(clean_text("\u{a0}Band 5\u{a0}"), "Band 5");
    }

    #[test]
    fn test_clean_text_drops_controls() {
        assert_eq!(clean_text("Evil\u{1b}[31m title"), "Evil[31m title");
        assert_eq!(clean_text("bell\u{7}"), "bell");
    }

    #[test]
    fn test_xml_safe_borrows_clean_input() {
        let s = "Parks & Gardens <Band 4>";
        assert!(matches!(xml_safe(s), Cow::Borrowed(_)));
    }

    #[test]
    fn test_xml_safe_keeps_tab_newline_cr() {
        assert_eq!(xml_safe("a\tb\nc\rd"), "a\tb\nc\rd");
    }

    #[test]
    fn test_xml_safe_strips_forbidden() {
        assert_eq!(xml_safe("a\u{0}b\u{8}c\u{fffe}d\u{7f}"), "abcd");
    }

    #[test]
    fn test_truncate_exact_fit() {
        assert_eq!(truncate_chars("12345", 5), "12345");
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        let s = "äöüäöüäöü";
        let out = truncate_chars(s, 6);
        assert_eq!(out, "äöü...");
        assert_eq!(out.chars().count(), 6);
    }

    #[test]
    fn test_truncate_tiny_limits() {
        assert_eq!(truncate_chars("Test", 0), "");
        assert_eq!(truncate_chars("Testing", 2), "Te");
    }
}
