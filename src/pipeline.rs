//! The run itself: build the filter, page through the report, extract
//! candidates, then guard and send one e-mail at a time.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::time::Duration;
use tracing::{debug, info};

use crate::analytics::{self, ReportQuery, ReportSource};
use crate::config::Config;
use crate::filter;
use crate::mailer::{self, MailTransport, OutgoingEmail};
use crate::model::CandidateRecord;
use crate::template;

/// Counters for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Candidates extracted from the report.
    pub candidates: usize,
    /// Notifications delivered.
    pub sent: usize,
    /// Candidates suppressed by the expiry-date guard.
    pub skipped: usize,
}

/// Execute one notification run.
///
/// Strictly sequential: one page at a time, then one e-mail at a time with
/// the configured pause in between. A fetch or delivery failure aborts the
/// run; the guard never does.
pub async fn run(
    cfg: &Config,
    source: &dyn ReportSource,
    mailer: &dyn MailTransport,
    today: NaiveDate,
) -> Result<RunSummary> {
    let future_expiry_date = filter::target_date(today, cfg.days_to_add);

    // Surface template problems before the first network call.
    template::format_date(future_expiry_date, &cfg.date_format)
        .context("invalid date_format in configuration")?;
    let filter_for_api = filter::render_filter(&cfg.filter, today, future_expiry_date)
        .context("invalid filter template in configuration")?;

    info!("---------------------------------------");
    info!(%future_expiry_date, "processing accounts expiring on the target date");

    info!("retrieving account data from the analytics report");
    let rows = analytics::collect_rows(
        source,
        &ReportQuery {
            path: cfg.path.clone(),
            filter: filter_for_api,
            limit: cfg.limit,
        },
    )
    .await
    .context("analytics paging failed, aborting the run")?;

    let mut candidates = Vec::new();
    for row in &rows {
        match CandidateRecord::from_row(row, &cfg.col_mapping) {
            Some(record) => {
                debug!(
                    first_name = record.first_name.as_deref().unwrap_or(""),
                    last_name = record.last_name.as_deref().unwrap_or(""),
                    email = %record.email,
                    expiry_date = %record.reported_expiry_date,
                    "collected account row"
                );
                candidates.push(record);
            }
            None => debug!("discarding row without e-mail address or expiry date"),
        }
    }

    let mut summary = RunSummary {
        candidates: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        info!(%future_expiry_date, "no accounts expire on the target date; no e-mail will be sent");
        return Ok(summary);
    }
    info!(count = candidates.len(), "sending notification e-mails");

    let target = future_expiry_date.to_string();
    for record in &candidates {
        let to_mail = cfg.to_email_test.as_deref().unwrap_or(&record.email);

        // Guard against a malfunctioning remote filter returning the whole
        // account population: only the exact reported date may be mailed.
        if record.reported_expiry_date != target {
            debug!(
                to = %to_mail,
                reported = %record.reported_expiry_date,
                expected = %target,
                "skipping record, reported expiry date differs from the target date"
            );
            summary.skipped += 1;
            continue;
        }

        let (subject, html_body) = mailer::render_notification(
            record.first_name.as_deref().unwrap_or(""),
            record.last_name.as_deref().unwrap_or(""),
            future_expiry_date,
            &cfg.date_format,
            &cfg.mail_subject,
            &cfg.mail_body,
        )?;

        debug!(name = %record.full_name(), to = %to_mail, "sending notification");
        mailer
            .deliver(&OutgoingEmail {
                to: to_mail.to_string(),
                from: cfg.from_email.clone(),
                subject,
                html_body,
            })
            .await
            .with_context(|| format!("failed to deliver notification to {to_mail}"))?;
        summary.sent += 1;

        if let Some(pause) = cfg.email_pause {
            if pause.is_finite() && pause > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(pause)).await;
            }
        }
    }

    Ok(summary)
}
