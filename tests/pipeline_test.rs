use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use expiry_notifier::analytics::{
    self, FetchError, PageRequest, ReportPage, ReportQuery, ReportSource,
};
use expiry_notifier::config::{ColMapping, Config};
use expiry_notifier::mailer::{DeliveryError, MailTransport, OutgoingEmail};
use expiry_notifier::model::ReportRow;
use expiry_notifier::pipeline;

fn today() -> NaiveDate {
    "2023-03-01".parse().unwrap()
}

// With days_to_add = 14 the target date is 2023-03-15.
const TARGET: &str = "2023-03-15";

fn test_config() -> Config {
    Config {
        api_base_path: "https://api.example.com/v1".into(),
        api_key: "secret".into(),
        path: "/shared/reports/expiry".into(),
        filter: "<expr>$future_expiry_date</expr>".into(),
        limit: 25,
        days_to_add: 14,
        col_mapping: ColMapping {
            first_name: "Column3".into(),
            last_name: "Column4".into(),
            email: "Column1".into(),
            expiry_date: "Column2".into(),
        },
        from_email: "noreply@example.com".into(),
        to_email_test: None,
        email_pause: None,
        log_level: "INFO".into(),
        log_file: None,
        date_format: "%Y-%m-%d".into(),
        mail_subject: "Hi {first_name} {last_name}".into(),
        mail_body: "<p>Dear {first_name} {last_name}, your account expires at {expiry_date}.</p>"
            .into(),
        smtp_host: "localhost".into(),
        smtp_port: 25,
    }
}

fn row(email: &str, expiry: &str, first: &str, last: &str) -> ReportRow {
    let mut row = ReportRow::new();
    if !email.is_empty() {
        row.insert("Column1".into(), email.into());
    }
    if !expiry.is_empty() {
        row.insert("Column2".into(), expiry.into());
    }
    row.insert("Column3".into(), first.into());
    row.insert("Column4".into(), last.into());
    row
}

#[derive(Default)]
struct ScriptedSource {
    responses: Mutex<VecDeque<Result<ReportPage, FetchError>>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedSource {
    fn with_responses(responses: Vec<Result<ReportPage, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            ..Default::default()
        }
    }

    fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSource for ScriptedSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<ReportPage, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ReportPage {
                    is_finished: true,
                    resumption_token: None,
                    rows: Vec::new(),
                })
            })
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingMailer {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(email.clone());
        if self.fail {
            return Err(DeliveryError::Address(
                "not an address".parse::<lettre::message::Mailbox>().unwrap_err(),
            ));
        }
        Ok(())
    }
}

#[tokio::test]
async fn paging_follows_the_resumption_token() {
    let source = ScriptedSource::with_responses(vec![
        Ok(ReportPage {
            is_finished: false,
            resumption_token: Some("T".into()),
            rows: vec![row("a@example.com", TARGET, "A", "One")],
        }),
        Ok(ReportPage {
            is_finished: true,
            resumption_token: None,
            rows: vec![row("b@example.com", TARGET, "B", "Two")],
        }),
    ]);

    let rows = analytics::collect_rows(
        &source,
        &ReportQuery {
            path: "/shared/reports/expiry".into(),
            filter: "<expr/>".into(),
            limit: 25,
        },
    )
    .await
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("Column1"), Some("a@example.com"));
    assert_eq!(rows[1].get("Column1"), Some("b@example.com"));

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert!(matches!(requests[0], PageRequest::Initial { .. }));
    assert_eq!(requests[1], PageRequest::Resume { token: "T".into() });
}

#[tokio::test]
async fn unfinished_page_without_token_is_an_error() {
    let source = ScriptedSource::with_responses(vec![Ok(ReportPage {
        is_finished: false,
        resumption_token: None,
        rows: Vec::new(),
    })]);

    let err = analytics::collect_rows(
        &source,
        &ReportQuery {
            path: "p".into(),
            filter: "f".into(),
            limit: 25,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FetchError::MissingToken));
}

#[tokio::test]
async fn fetch_failure_aborts_the_run_before_any_send() {
    let source = ScriptedSource::with_responses(vec![Err(FetchError::MissingElement(
        "QueryResult/IsFinished",
    ))]);
    let mailer = RecordingMailer::default();

    let err = pipeline::run(&test_config(), &source, &mailer, today())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("aborting the run"));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn end_to_end_sends_matches_and_skips_mismatches() {
    let source = ScriptedSource::with_responses(vec![Ok(ReportPage {
        is_finished: true,
        resumption_token: None,
        rows: vec![
            row("jane@example.com", TARGET, "Jane", "Doe"),
            row("", TARGET, "No", "Email"),
            row("john@example.com", "2099-01-01", "John", "Mismatch"),
            row("alex@example.com", TARGET, "", "Lee"),
        ],
    })]);
    let mailer = RecordingMailer::default();

    let summary = pipeline::run(&test_config(), &source, &mailer, today())
        .await
        .unwrap();

    // The blank-email row is never a candidate; the mismatched date is
    // suppressed by the guard.
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.skipped, 1);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, "jane@example.com");
    assert_eq!(sent[0].from, "noreply@example.com");
    assert_eq!(sent[0].subject, "Hi Jane Doe");
    assert!(sent[0].html_body.contains("expires at 2023-03-15"));

    // Empty first name leaves a double space that collapses to one.
    assert_eq!(sent[1].to, "alex@example.com");
    assert_eq!(sent[1].subject, "Hi Lee");
}

#[tokio::test]
async fn guard_never_mails_a_mismatched_record() {
    let source = ScriptedSource::with_responses(vec![Ok(ReportPage {
        is_finished: true,
        resumption_token: None,
        rows: vec![
            row("a@example.com", "2023-03-16", "A", "One"),
            // Same date in a different rendering must also be suppressed;
            // the comparison is verbatim, not parsed.
            row("b@example.com", "15.03.2023", "B", "Two"),
        ],
    })]);
    let mailer = RecordingMailer::default();

    let summary = pipeline::run(&test_config(), &source, &mailer, today())
        .await
        .unwrap();
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.skipped, 2);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_address_overrides_every_recipient() {
    let source = ScriptedSource::with_responses(vec![Ok(ReportPage {
        is_finished: true,
        resumption_token: None,
        rows: vec![
            row("jane@example.com", TARGET, "Jane", "Doe"),
            row("john@example.com", TARGET, "John", "Roe"),
        ],
    })]);
    let mailer = RecordingMailer::default();
    let cfg = Config {
        to_email_test: Some("qa@example.com".into()),
        ..test_config()
    };

    let summary = pipeline::run(&cfg, &source, &mailer, today()).await.unwrap();
    assert_eq!(summary.sent, 2);
    for email in mailer.sent() {
        assert_eq!(email.to, "qa@example.com");
    }
}

#[tokio::test]
async fn delivery_failure_aborts_the_remaining_batch() {
    let source = ScriptedSource::with_responses(vec![Ok(ReportPage {
        is_finished: true,
        resumption_token: None,
        rows: vec![
            row("jane@example.com", TARGET, "Jane", "Doe"),
            row("john@example.com", TARGET, "John", "Roe"),
        ],
    })]);
    let mailer = RecordingMailer::failing();

    let err = pipeline::run(&test_config(), &source, &mailer, today())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("jane@example.com"));
    // Only the first delivery was attempted.
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn pause_applies_between_sends() {
    let source = ScriptedSource::with_responses(vec![Ok(ReportPage {
        is_finished: true,
        resumption_token: None,
        rows: vec![
            row("jane@example.com", TARGET, "Jane", "Doe"),
            row("john@example.com", TARGET, "John", "Roe"),
        ],
    })]);
    let mailer = RecordingMailer::default();
    let cfg = Config {
        email_pause: Some(0.05),
        ..test_config()
    };

    let started = Instant::now();
    let summary = pipeline::run(&cfg, &source, &mailer, today()).await.unwrap();
    assert_eq!(summary.sent, 2);
    assert!(started.elapsed() >= std::time::Duration::from_millis(100));
}

#[tokio::test]
async fn bad_date_format_fails_before_any_network_call() {
    let source = ScriptedSource::default();
    let mailer = RecordingMailer::default();
    let cfg = Config {
        date_format: "%".into(),
        ..test_config()
    };

    let err = pipeline::run(&cfg, &source, &mailer, today()).await.unwrap_err();
    assert!(err.to_string().contains("date_format"));
    assert!(source.requests().is_empty());
}

#[tokio::test]
async fn bad_filter_template_fails_before_any_network_call() {
    let source = ScriptedSource::default();
    let mailer = RecordingMailer::default();
    let cfg = Config {
        filter: "<expr>$not_a_placeholder</expr>".into(),
        ..test_config()
    };

    let err = pipeline::run(&cfg, &source, &mailer, today()).await.unwrap_err();
    assert!(err.to_string().contains("filter template"));
    assert!(source.requests().is_empty());
}
