#![warn(clippy::all, clippy::pedantic)]
#![allow(
    // Acceptable for trait naming consistency (e.g., NewsStore, PgStore)
    clippy::module_name_repetitions,

    // Scoring and cost maths intentionally mix integer counts into f64
    clippy::cast_precision_loss,

    // Paging and store limits convert usize ↔ i64 for database bindings
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,

    // Domain logic often requires helper declarations mid-function for readability
    clippy::items_after_statements,

    // Error context via anyhow::Context already provides sufficient documentation
    clippy::missing_errors_doc,

    // Panic paths are defensive (e.g., mutex poisoning), not part of normal flow
    clippy::missing_panics_doc,

    // Technical identifiers (RSS, ETag, LLM) don't need markdown formatting
    clippy::doc_markdown,

    // Named format args reduce readability for long structured-log lines
    clippy::uninlined_format_args,

    // if-let-else patterns are clearer than map_or for error handling flows
    clippy::option_if_let_else,

    // Too noisy: many utility methods return useful values but aren't always used
    clippy::must_use_candidate
)]

pub mod analysis;
pub(crate) mod api;
pub mod app;
pub mod clients;
pub mod cluster;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod poller;
pub mod scheduler;
pub(crate) mod schema;
pub mod store;
pub mod summarizer;
pub mod util;
