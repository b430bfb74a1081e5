//! Notify accounts whose expiry date falls on `today + days_to_add`.
//!
//! The pipeline renders a date filter, pages through an analytics report
//! via its resumption-token protocol, extracts candidate records, re-checks
//! each candidate's expiry date locally and sends one templated HTML e-mail
//! per match through a local SMTP relay.

pub mod analytics;
pub mod config;
pub mod filter;
pub mod mailer;
pub mod model;
pub mod pipeline;
pub mod template;
