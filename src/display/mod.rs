//! Display formatting for terminal output
//!
//! Provides utilities for formatting artifacts, templates, backups and
//! restore reports for terminal display.

pub mod artifact;
pub mod backup;
pub mod template;

pub use artifact::{format_artifact_details, format_artifact_list};
pub use backup::{
    format_backup_details, format_backup_list, format_duration, format_restore_report, format_size,
};
pub use template::{format_template_details, format_template_list};
