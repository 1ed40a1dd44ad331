//! Custom error types for hostkeeper
//!
//! This module defines the error hierarchy for the engine using thiserror.
//! Every variant carries enough context (category, identifier, collaborator
//! diagnostics) to be shown to an operator as-is.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::models::Component;

/// The main error type for hostkeeper operations
#[derive(Error, Debug)]
pub enum KeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Caller supplied a malformed name, parameter or plan
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A template placeholder had no value
    #[error("Template '{template}' is missing values for: {}", missing.join(", "))]
    Template {
        template: String,
        missing: Vec<String>,
    },

    /// Artifact already exists and overwrite was not requested
    #[error("{category} artifact already exists: {identifier}")]
    Conflict {
        category: String,
        identifier: String,
    },

    /// The owning service rejected the candidate configuration
    #[error("{category} artifact '{identifier}' failed validation: {diagnostic}")]
    Validation {
        category: String,
        identifier: String,
        diagnostic: String,
    },

    /// The service failed to apply the configuration; activation was rolled back
    #[error("{category} artifact '{identifier}' could not be applied (rolled back): {diagnostic}")]
    Activation {
        category: String,
        identifier: String,
        diagnostic: String,
    },

    /// A restore referenced a component the backup does not contain
    #[error("Backup '{backup}' does not contain component '{component}'")]
    ManifestMismatch { backup: String, component: Component },

    /// Backup archive unreadable, truncated or with a malformed manifest
    #[error("Archive error: {0}")]
    Archive(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Caller lacks privilege for a filesystem or service operation
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Another invocation holds the lock for this scope
    #[error("{scope} is locked by another hostkeeper process")]
    Locked { scope: String },

    /// One or more components could not be staged; no archive was written
    #[error("Backup '{backup}' failed for component(s) {components:?}: {details}")]
    BackupIncomplete {
        backup: String,
        components: Vec<Component>,
        details: String,
    },

    /// A restore ran but at least one component failed
    #[error("Restore from '{backup}' failed for component(s) {components:?}")]
    RestoreIncomplete {
        backup: String,
        components: Vec<Component>,
    },

    /// The pre-restore safety backup failed, nothing was restored
    #[error("Safety backup failed, restore aborted: {0}")]
    SafetyBackup(Box<KeeperError>),
}

impl KeeperError {
    /// Build an I/O error that names the offending path, classifying
    /// permission problems separately.
    pub fn io_at(action: &str, path: &Path, err: io::Error) -> Self {
        let message = format!("Failed to {} {}: {}", action, path.display(), err);
        if err.kind() == io::ErrorKind::PermissionDenied {
            Self::Permission(message)
        } else {
            Self::Io(message)
        }
    }

    /// Create a "not found" error for artifacts
    pub fn artifact_not_found(category: &str, identifier: &str) -> Self {
        Self::NotFound {
            entity_type: "Artifact",
            identifier: format!("{}/{}", category, identifier),
        }
    }

    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if the service rejected or failed to apply a configuration
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Activation { .. })
    }
}

impl From<io::Error> for KeeperError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Self::Permission(err.to_string())
        } else {
            Self::Io(err.to_string())
        }
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for hostkeeper operations
pub type KeeperResult<T> = Result<T, KeeperError>;
