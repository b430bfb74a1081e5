//! Named-placeholder rendering for the mail subject and body.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid date format pattern {pattern:?}")]
pub struct DateFormatError {
    pub pattern: String,
}

/// Replace every `{key}` occurrence for the given keys. Placeholders not
/// in the list stay untouched instead of failing the render.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Collapse each run of exactly two consecutive spaces to one, e.g. the
/// gap left by an empty name placeholder. Deliberately narrow: four spaces
/// become two, and no other whitespace is touched.
pub fn collapse_double_spaces(s: &str) -> String {
    s.replace("  ", " ")
}

/// Format a date with a strftime-style pattern, turning chrono's deferred
/// formatting failure into a typed error instead of a panic.
pub fn format_date(date: NaiveDate, pattern: &str) -> Result<String, DateFormatError> {
    use std::fmt::Write as _;
    let mut out = String::new();
    write!(out, "{}", date.format(pattern)).map_err(|_| DateFormatError {
        pattern: pattern.to_string(),
    })?;
    Ok(out)
}
