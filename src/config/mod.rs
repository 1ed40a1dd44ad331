//! Configuration module for hostkeeper
//!
//! This module provides configuration management including:
//! - Home directory resolution
//! - Settings persistence (per-category layout, service commands, retention)

pub mod paths;
pub mod settings;

pub use paths::HostPaths;
pub use settings::{
    AuxiliaryPaths, BackupRetention, CategoryLayout, CategorySettings, MarkerKind,
    Settings,
};
