use std::sync::LazyLock;

use regex::Regex;

static LINE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[\r\n]|<br\s*/?>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Flatten a free-text field onto one line: line breaks and `<br>` markup
/// become spaces, whitespace runs collapse to a single space, ends trimmed.
pub fn normalize(raw: &str) -> String {
    let mut flat = raw.to_string();
    // Removing one `<br>` can splice a new one together ("<br<br>>").
    while LINE_BREAK_RE.is_match(&flat) {
        flat = LINE_BREAK_RE.replace_all(&flat, " ").into_owned();
    }
    WHITESPACE_RE.replace_all(&flat, " ").trim().to_string()
}
