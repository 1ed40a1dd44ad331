//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the service layer.

pub mod artifact;
pub mod backup;
pub mod template;

pub use artifact::{handle_artifact_command, ArtifactCommands};
pub use backup::{handle_backup_command, BackupCommands};
pub use template::{handle_template_command, TemplateCommands};
