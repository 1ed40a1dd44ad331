//! Audit entry data structures
//!
//! Defines the structure of audit log entries: which operation ran against
//! which artifact or backup, and how it ended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of operations that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Artifact content written to the available store
    Write,
    /// Artifact validated and linked into the active store
    Activate,
    /// Activation marker removed
    Deactivate,
    /// Artifact deleted from the available store
    Remove,
    /// Artifact content patched in place
    Mutate,
    /// Backup archive created
    Backup,
    /// Old backups deleted by retention
    Prune,
    /// Backup applied to live state
    Restore,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Write => write!(f, "WRITE"),
            Operation::Activate => write!(f, "ACTIVATE"),
            Operation::Deactivate => write!(f, "DEACTIVATE"),
            Operation::Remove => write!(f, "REMOVE"),
            Operation::Mutate => write!(f, "MUTATE"),
            Operation::Backup => write!(f, "BACKUP"),
            Operation::Prune => write!(f, "PRUNE"),
            Operation::Restore => write!(f, "RESTORE"),
        }
    }
}

/// How an audited operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    /// The service rejected the change and prior state was kept or restored
    RolledBack,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "ok"),
            Outcome::RolledBack => write!(f, "rolled back"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// Type of operation performed
    pub operation: Operation,

    /// Artifact category the operation applied to
    pub category: String,

    /// Artifact identifier or backup name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// How the operation ended
    pub outcome: Outcome,

    /// Collaborator diagnostics or other detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Human-readable diff summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<String>,
}

impl AuditEntry {
    /// Create a new audit entry
    pub fn new(
        operation: Operation,
        category: impl Into<String>,
        subject: Option<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            category: category.into(),
            subject,
            outcome,
            detail: None,
            diff_summary: None,
        }
    }

    /// Entry for a successful operation on a named subject
    pub fn success(operation: Operation, category: impl Into<String>, subject: impl Into<String>) -> Self {
        Self::new(operation, category, Some(subject.into()), Outcome::Success)
    }

    /// Attach detail text
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach a diff summary
    pub fn with_diff(mut self, diff: Option<String>) -> Self {
        self.diff_summary = diff;
        self
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.category,
        );

        if let Some(subject) = &self.subject {
            output.push_str(&format!("/{}", subject));
        }

        output.push_str(&format!(" ({})", self.outcome));

        if let Some(detail) = &self.detail {
            output.push_str(&format!("\n  Detail: {}", detail));
        }

        if let Some(diff) = &self.diff_summary {
            output.push_str(&format!("\n  Changes: {}", diff));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Activate.to_string(), "ACTIVATE");
        assert_eq!(Operation::Restore.to_string(), "RESTORE");
    }

    #[test]
    fn test_success_entry() {
        let entry = AuditEntry::success(Operation::Write, "vhost", "a.test");

        assert_eq!(entry.operation, Operation::Write);
        assert_eq!(entry.outcome, Outcome::Success);
        assert_eq!(entry.subject.as_deref(), Some("a.test"));
        assert!(entry.detail.is_none());
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let entry = AuditEntry::new(Operation::Prune, "jail", None, Outcome::Success);
        let json = serde_json::to_string(&entry).unwrap();

        assert!(json.contains("\"operation\":\"prune\""));
        assert!(!json.contains("subject"));
        assert!(!json.contains("diff_summary"));

        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.category, "jail");
    }

    #[test]
    fn test_human_readable_format() {
        let entry = AuditEntry::new(
            Operation::Activate,
            "vhost",
            Some("a.test".into()),
            Outcome::RolledBack,
        )
        .with_detail("nginx: [emerg] unexpected end of file")
        .with_diff(Some("listen: \"80\" -> \"8080\"".into()));

        let output = entry.format_human_readable();
        assert!(output.contains("ACTIVATE vhost/a.test (rolled back)"));
        assert!(output.contains("Detail: nginx"));
        assert!(output.contains("Changes: listen"));
    }
}
