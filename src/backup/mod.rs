//! Backup system for hostkeeper
//!
//! Point-in-time snapshots of a category's configuration and auxiliary state,
//! with retention pruning and mode-driven restore.
//!
//! # Architecture
//!
//! - `BackupManager`: stages components, writes archives, applies retention
//! - `RestoreEngine`: verifies an archive and applies it under a `RestorePlan`
//!
//! # Backup Format
//!
//! Each backup is one `<name>.tar.gz` under `<home>/backups/<category>/`:
//! - `manifest.json`: name, timestamp, format version and one presence flag
//!   per component, plus checksums of every file
//! - one top-level directory per component flagged present
//!
//! # Retention Policy
//!
//! Regular backups and pre-restore safety backups are capped separately
//! (7 and 3 by default); the oldest beyond the cap are deleted.
//!
//! # Example
//!
//! ```rust,ignore
//! use hostkeeper::backup::{BackupManager, RestoreEngine, RestorePlan};
//!
//! let manager = BackupManager::new(&store, &controller);
//! let outcome = manager.create_backup(&category, None, &components)?;
//!
//! // Later, restore from backup
//! let engine = RestoreEngine::new(&store, &controller);
//! let report = engine.restore(&category, "latest", &RestorePlan::full(), true)?;
//! println!("{}", report.summary());
//! ```

pub mod archive;
mod manager;
pub mod manifest;
mod restore;

pub use manager::{BackupManager, BackupOutcome, LATEST};
pub use manifest::{Backup, BackupKind, Manifest, SourceLayout};
pub use restore::{
    ComponentOutcome, ComponentStatus, ItemOutcome, RestoreEngine, RestoreMode, RestorePlan,
    RestoreReport,
};
