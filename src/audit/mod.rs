//! Audit logging for hostkeeper
//!
//! Records every lifecycle, backup and restore operation in an append-only
//! audit log, including collaborator diagnostics and key-level diffs.
//!
//! # Architecture
//!
//! - `AuditEntry`: a single audit record with timestamp, operation, subject
//!   and outcome.
//! - `AuditLogger`: writes entries to the audit log file as JSON lines.
//! - `diff_entries`: produces human-readable diffs between two sets of
//!   configuration entries.

mod diff;
mod entry;
mod logger;

pub use diff::{diff_entries, generate_diff};
pub use entry::{AuditEntry, Operation, Outcome};
pub use logger::AuditLogger;
