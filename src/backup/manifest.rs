//! Backup manifest
//!
//! The manifest is the only authoritative description of an archive's
//! contents: a component is present iff its flag is true.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Category, Component};

/// Current archive format version
pub const FORMAT_VERSION: u32 = 1;

/// Manifest file name at the archive root
pub const MANIFEST_FILE: &str = "manifest.json";

/// Why a backup was taken; each kind has its own retention scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackupKind {
    #[default]
    Regular,
    /// Automatic snapshot taken right before a restore
    PreRestore,
}

impl BackupKind {
    /// Prefix of generated names
    pub fn name_prefix(&self) -> &'static str {
        match self {
            BackupKind::Regular => "",
            BackupKind::PreRestore => "pre-restore_",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupKind::Regular => write!(f, "regular"),
            BackupKind::PreRestore => write!(f, "pre-restore"),
        }
    }
}

/// Shape of an auxiliary source at backup time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLayout {
    /// A single file, restored to the configured path itself
    File,
    /// A directory tree, restored below the configured path
    Directory,
}

/// Archive metadata stored as `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub format_version: u32,
    pub category: String,
    #[serde(default)]
    pub kind: BackupKind,
    /// Presence flag for every component
    pub components: BTreeMap<Component, bool>,
    /// Identifiers that were active when the backup was taken
    #[serde(default)]
    pub active_artifacts: Vec<String>,
    #[serde(default)]
    pub layouts: BTreeMap<Component, SourceLayout>,
    /// SHA-256 of every staged file, keyed by archive path
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl Manifest {
    /// Start a manifest with every component flagged absent
    pub fn new(name: &str, category: &Category, kind: BackupKind) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            format_version: FORMAT_VERSION,
            category: category.to_string(),
            kind,
            components: Component::all().into_iter().map(|c| (c, false)).collect(),
            active_artifacts: Vec::new(),
            layouts: BTreeMap::new(),
            checksums: BTreeMap::new(),
        }
    }

    /// Whether the archive contains a component
    pub fn includes(&self, component: Component) -> bool {
        self.components.get(&component).copied().unwrap_or(false)
    }

    /// Components flagged present, in archive order
    pub fn included(&self) -> Vec<Component> {
        Component::all()
            .into_iter()
            .filter(|c| self.includes(*c))
            .collect()
    }

    /// Reject manifests this version cannot interpret
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("manifest has an empty name".into());
        }
        if self.format_version == 0 || self.format_version > FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (supported: {})",
                self.format_version, FORMAT_VERSION
            ));
        }
        Ok(())
    }

    /// Archive path of a staged file
    pub fn entry_path(component: Component, relative: &std::path::Path) -> String {
        let relative = relative.to_string_lossy().replace('\\', "/");
        if relative.is_empty() {
            component.dir_name().to_string()
        } else {
            format!("{}/{}", component.dir_name(), relative)
        }
    }
}

/// A stored backup archive with its manifest
#[derive(Debug, Clone)]
pub struct Backup {
    pub manifest: Manifest,
    pub archive_path: PathBuf,
    pub size_bytes: u64,
}

impl Backup {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.manifest.created_at
    }

    pub fn kind(&self) -> BackupKind {
        self.manifest.kind
    }
}
