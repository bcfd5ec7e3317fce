//! hostaudit: declarative audit checks run against a host through a
//! whitelisted command pipeline.
//!
//! An audit file lists named checks. Each check's command text is
//! evaluated in an embedded script sandbox whose host functions run
//! whitelisted shell pipelines, capture their output as artifacts, and
//! hand it to the comparison engine. Outcomes are written to
//! `result.json`; progress goes to the log files.

#![forbid(unsafe_code)]

pub mod archive;
pub mod artifacts;
pub mod cli;
pub mod compare;
pub mod config;
pub mod console;
pub mod engine;
pub mod error_codes;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod platform;
pub mod report;
pub mod sandbox;
pub mod whitelist;

pub use compare::{Operator, compare};
pub use config::{AuditConfig, AuditSpec};
pub use engine::Engine;
pub use error_codes::{AuditError, ErrorCode};
pub use report::{ComparisonOutcome, RunSummary};
pub use whitelist::Whitelist;
