use std::collections::HashMap;

use crate::config::ColMapping;

/// One decoded report row: child element name mapped to its text content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRow(HashMap<String, String>);

impl ReportRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: String, value: String) {
        self.0.insert(column, value);
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for ReportRow {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One notifiable account, extracted from a report row.
///
/// `reported_expiry_date` is carried verbatim; the dispatch guard compares
/// it by string equality against the computed target date, never by parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub reported_expiry_date: String,
}

impl CandidateRecord {
    /// Map a row through the configured column names. Returns `None` when
    /// the e-mail address or the expiry date is blank after trimming; the
    /// name fields may be blank or absent.
    pub fn from_row(row: &ReportRow, mapping: &ColMapping) -> Option<Self> {
        let email = row.get(&mapping.email).unwrap_or("");
        let expiry_date = row.get(&mapping.expiry_date).unwrap_or("");
        if email.trim().is_empty() || expiry_date.trim().is_empty() {
            return None;
        }
        Some(Self {
            email: email.to_string(),
            first_name: row.get(&mapping.first_name).map(str::to_string),
            last_name: row.get(&mapping.last_name).map(str::to_string),
            reported_expiry_date: expiry_date.to_string(),
        })
    }

    /// Trimmed first and last name joined by a single space, empty parts
    /// dropped. Used for log lines only.
    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        parts.join(" ")
    }
}
