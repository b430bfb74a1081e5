//! Target-date computation and filter template rendering.
//!
//! The filter template uses `$name` / `${name}` placeholders with a fixed
//! schema of `today` and `future_expiry_date`; `$$` is a literal dollar.
//! Anything else is a configuration error and is surfaced before the first
//! network call.

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("unknown placeholder `${0}` in filter template")]
    UnknownPlaceholder(String),
    #[error("dangling `$` in filter template")]
    DanglingDollar,
}

/// The single date the whole run revolves around: `today + days_to_add`.
/// Built once, used for the remote filter and the local dispatch guard.
pub fn target_date(today: NaiveDate, days_to_add: u32) -> NaiveDate {
    today + Duration::days(i64::from(days_to_add))
}

// Matches `$$`, `${name}`, `$name`, or a lone `$` (empty trailing branch).
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:(\$)|\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*)|)")
        .expect("valid placeholder regex")
});

/// Substitute the date placeholders into the filter template.
///
/// Both dates render in ISO form (`%Y-%m-%d`), the same form the remote
/// system reports expiry dates in.
pub fn render_filter(
    template: &str,
    today: NaiveDate,
    future_expiry_date: NaiveDate,
) -> Result<String, FilterError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).expect("capture group 0 always present");
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        if caps.get(1).is_some() {
            out.push('$');
            continue;
        }
        let name = match caps.get(2).or_else(|| caps.get(3)) {
            Some(m) => m.as_str(),
            None => return Err(FilterError::DanglingDollar),
        };
        match name {
            "today" => out.push_str(&today.to_string()),
            "future_expiry_date" => out.push_str(&future_expiry_date.to_string()),
            other => return Err(FilterError::UnknownPlaceholder(other.to_string())),
        }
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn target_date_adds_days() {
        assert_eq!(target_date(d("2023-03-01"), 14), d("2023-03-15"));
        assert_eq!(target_date(d("2023-12-31"), 1), d("2024-01-01"));
        assert_eq!(target_date(d("2023-03-01"), 0), d("2023-03-01"));
    }

    #[test]
    fn renders_both_placeholders_iso() {
        let out = render_filter("from $today to $future_expiry_date", d("2023-03-01"), d("2023-03-15")).unwrap();
        assert_eq!(out, "from 2023-03-01 to 2023-03-15");
    }

    #[test]
    fn renders_braced_form() {
        let out = render_filter("${future_expiry_date}!", d("2023-03-01"), d("2023-03-15")).unwrap();
        assert_eq!(out, "2023-03-15!");
    }

    #[test]
    fn double_dollar_is_literal() {
        let out = render_filter("cost $$5 on $today", d("2023-03-01"), d("2023-03-15")).unwrap();
        assert_eq!(out, "cost $5 on 2023-03-01");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let err = render_filter("$expiry", d("2023-03-01"), d("2023-03-15")).unwrap_err();
        assert_eq!(err, FilterError::UnknownPlaceholder("expiry".into()));
    }

    #[test]
    fn dangling_dollar_is_an_error() {
        let err = render_filter("broken $ template", d("2023-03-01"), d("2023-03-15")).unwrap_err();
        assert_eq!(err, FilterError::DanglingDollar);
        let err = render_filter("trailing $", d("2023-03-01"), d("2023-03-15")).unwrap_err();
        assert_eq!(err, FilterError::DanglingDollar);
    }

    #[test]
    fn renders_the_example_filter() {
        let cfg: crate::config::Config =
            serde_yaml::from_str(crate::config::example()).unwrap();
        let out = render_filter(&cfg.filter, d("2023-03-01"), d("2023-03-15")).unwrap();
        assert!(out.contains(">2023-03-15<"));
        assert!(!out.contains('$'));
    }
}
