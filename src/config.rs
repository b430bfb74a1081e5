//! Configuration loader and validator for the expiry notifier.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Base path of the analytics-capable API, e.g.
    /// `https://api-eu.hosted.exlibrisgroup.com/almaws/v1`.
    pub api_base_path: String,
    /// API key with read access to the analytics endpoint.
    pub api_key: String,
    /// Location of the report holding the account data.
    pub path: String,
    /// Filter template applied to the report. May use the `$today` and
    /// `$future_expiry_date` placeholders; both render as ISO dates.
    pub filter: String,
    /// Rows per page. The remote API accepts 25-1000 in multiples of 25;
    /// this is not enforced locally, the endpoint rejects other values.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Days added to today to form the target expiry date.
    #[serde(default = "default_days_to_add")]
    pub days_to_add: u32,
    pub col_mapping: ColMapping,
    /// Sender address, also used for the Sender and Reply-To headers.
    pub from_email: String,
    /// When set, replaces every real recipient for the whole run.
    #[serde(default)]
    pub to_email_test: Option<String>,
    /// Seconds to wait between e-mail transmissions (fractions allowed).
    #[serde(default)]
    pub email_pause: Option<f64>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log file path; log output goes to the console only when unset.
    #[serde(default)]
    pub log_file: Option<String>,
    /// strftime-style pattern for the expiry date in rendered e-mails.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Subject template. Supports `{first_name}`, `{last_name}` and
    /// `{expiry_date}`.
    pub mail_subject: String,
    /// HTML body template with the same placeholders as the subject.
    pub mail_body: String,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

/// Report column names backing the four extracted fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColMapping {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub expiry_date: String,
}

fn default_limit() -> u32 {
    100
}

fn default_days_to_add() -> u32 {
    14
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.api_base_path.trim().is_empty() {
        return Err(ConfigError::Invalid("api_base_path must be non-empty"));
    }
    if cfg.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("api_key must be non-empty"));
    }
    if cfg.path.trim().is_empty() {
        return Err(ConfigError::Invalid("path must be non-empty"));
    }
    if cfg.filter.trim().is_empty() {
        return Err(ConfigError::Invalid("filter must be non-empty"));
    }
    if cfg.from_email.trim().is_empty() {
        return Err(ConfigError::Invalid("from_email must be non-empty"));
    }
    if cfg.mail_subject.trim().is_empty() {
        return Err(ConfigError::Invalid("mail_subject must be non-empty"));
    }
    if cfg.mail_body.trim().is_empty() {
        return Err(ConfigError::Invalid("mail_body must be non-empty"));
    }

    let cm = &cfg.col_mapping;
    if cm.first_name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "col_mapping.first_name must be non-empty",
        ));
    }
    if cm.last_name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "col_mapping.last_name must be non-empty",
        ));
    }
    if cm.email.trim().is_empty() {
        return Err(ConfigError::Invalid("col_mapping.email must be non-empty"));
    }
    if cm.expiry_date.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "col_mapping.expiry_date must be non-empty",
        ));
    }

    if cfg.smtp_host.trim().is_empty() {
        return Err(ConfigError::Invalid("smtp_host must be non-empty"));
    }

    Ok(())
}

/// Example YAML configuration, kept parseable and valid.
pub fn example() -> &'static str {
    r#"# Base path of the API that exposes the analytics reports.
api_base_path: "https://api-eu.hosted.exlibrisgroup.com/almaws/v1"

# API key with read access to the analytics endpoint.
api_key: "YOUR_API_KEY_WITH_READ_ACCESS_TO_ANALYTICS"

# Location of a report containing at least a first name, last name,
# e-mail and expiry date column for every account.
path: "/shared/My Institution/Reports/users_expiry_date"

# Selects accounts whose expiry date equals the computed target date.
# "$future_expiry_date" is replaced before the request is made.
filter: '<sawx:expr xsi:type="sawx:comparison" op="equal" xmlns:sawx="com.siebel.analytics.web/expression/v1.1" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema"><sawx:expr xsi:type="sawx:sqlExpression">"User Details"."Expiry Date"</sawx:expr><sawx:expr xsi:type="xsd:date">$future_expiry_date</sawx:expr></sawx:expr>'

# Rows per page; 25-1000, divisible by 25 (remote API constraint).
limit: 100

# Accounts expiring this many days from today get the notification.
days_to_add: 14

# Which report column backs which extracted field.
col_mapping:
  first_name: "Column3"
  last_name: "Column4"
  email: "Column1"
  expiry_date: "Column2"

from_email: "my_institution@example.com"

# For testing: every notification goes to this address instead of the
# real recipients. Remove the key to mail real accounts.
to_email_test: "my_test_address@example.com"

# Pause between transmissions to spare the mail relay.
email_pause: 0.5

log_level: "INFO"
log_file: "notification.log"

# How the expiry date is rendered inside the e-mails.
date_format: "%d.%m.%Y"

mail_subject: "Your account at My Institution expires at {expiry_date}"
mail_body: |
  <html>
      <body>
          <p>Dear {first_name} {last_name}!</p>
          <p>Your account at My Institution expires at {expiry_date}.</p>
          <p>Please contact our staff to renew your account.</p>
          <p>Best regards</p>
          <p>
              My Institution<br />
              My Address 123<br />
              City 4567
          </p>
      </body>
  </html>

smtp_host: "localhost"
smtp_port: 25
"#
}
