//! Settings for hostkeeper
//!
//! Manages per-category store layout, service commands, auxiliary backup
//! sources and backup retention.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::HostPaths;
use crate::error::KeeperError;
use crate::models::{Category, Component};
use crate::storage::file_io::{read_json, write_json_atomic};
use crate::storage::patch::KeySyntax;

/// Backup retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRetention {
    /// Number of regular backups to keep per category
    #[serde(default = "default_max_per_target")]
    pub max_per_target: u32,
    /// Number of pre-restore safety backups to keep per category
    #[serde(default = "default_max_safety_backups")]
    pub max_safety_backups: u32,
}

fn default_max_per_target() -> u32 {
    7
}

fn default_max_safety_backups() -> u32 {
    3
}

impl Default for BackupRetention {
    fn default() -> Self {
        Self {
            max_per_target: default_max_per_target(),
            max_safety_backups: default_max_safety_backups(),
        }
    }
}

/// How activation markers are represented in the active directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    /// Symbolic link pointing into the available directory
    #[default]
    Symlink,
    /// Plain file whose content is the target path
    File,
}

/// Live locations of the auxiliary backup components
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuxiliaryPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<PathBuf>,
}

impl AuxiliaryPaths {
    /// Live path for an auxiliary component, if configured
    pub fn get(&self, component: Component) -> Option<&PathBuf> {
        match component {
            Component::Filters => self.filters.as_ref(),
            Component::Data => self.data.as_ref(),
            Component::History => self.history.as_ref(),
            Component::Configuration | Component::BannedState => None,
        }
    }
}

/// Settings for one artifact category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorySettings {
    /// Directory holding one file per identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_dir: Option<PathBuf>,

    /// Directory holding one activation marker per enabled identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_dir: Option<PathBuf>,

    /// File extension appended to identifiers (e.g. "conf", "local")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    /// Line syntax used when mutating artifacts
    #[serde(default)]
    pub key_syntax: KeySyntax,

    /// Command that tests a candidate configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_command: Option<String>,

    /// Command that reloads/applies the service configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_command: Option<String>,

    /// Command printing the current runtime state (one item per line)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_command: Option<String>,

    /// Command re-applying runtime state read from stdin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_state_command: Option<String>,

    /// Kill service commands that run longer than this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    /// Per-category override of `BackupRetention::max_per_target`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<u32>,

    /// Live paths of auxiliary backup components
    #[serde(default)]
    pub auxiliary: AuxiliaryPaths,
}

impl CategorySettings {
    fn with_extension(extension: &str, key_syntax: KeySyntax) -> Self {
        Self {
            extension: Some(extension.to_string()),
            key_syntax,
            ..Self::default()
        }
    }
}

/// Resolved available/active directories for a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLayout {
    pub available_dir: PathBuf,
    pub active_dir: PathBuf,
    pub extension: Option<String>,
}

/// Settings for hostkeeper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Backup retention policy
    #[serde(default)]
    pub backup_retention: BackupRetention,

    /// Activation marker representation
    #[serde(default)]
    pub activation_marker: MarkerKind,

    /// Override for the template blueprint directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,

    /// Per-category settings
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, CategorySettings>,
}

fn default_schema_version() -> u32 {
    1
}

fn default_categories() -> BTreeMap<String, CategorySettings> {
    let mut categories = BTreeMap::new();
    categories.insert(
        Category::VIRTUAL_HOST.to_string(),
        CategorySettings::with_extension("conf", KeySyntax::Space),
    );
    categories.insert(
        Category::PROCESS_POOL.to_string(),
        CategorySettings::with_extension("conf", KeySyntax::Equals),
    );
    categories.insert(
        Category::JAIL.to_string(),
        CategorySettings::with_extension("local", KeySyntax::Equals),
    );
    categories.insert(
        Category::FIREWALL.to_string(),
        CategorySettings::with_extension("rules", KeySyntax::Space),
    );
    categories
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            backup_retention: BackupRetention::default(),
            activation_marker: MarkerKind::default(),
            templates_dir: None,
            categories: default_categories(),
        }
    }
}

impl Settings {
    /// Settings for a category; unknown categories get defaults
    pub fn category(&self, category: &Category) -> CategorySettings {
        self.categories
            .get(category.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// Resolve the store directories for a category
    pub fn layout(&self, paths: &HostPaths, category: &Category) -> CategoryLayout {
        let settings = self.category(category);
        CategoryLayout {
            available_dir: settings
                .available_dir
                .unwrap_or_else(|| paths.default_available_dir(category)),
            active_dir: settings
                .active_dir
                .unwrap_or_else(|| paths.default_active_dir(category)),
            extension: settings.extension.filter(|ext| !ext.is_empty()),
        }
    }

    /// Retention cap for regular backups of a category
    pub fn retention_for(&self, category: &Category) -> u32 {
        self.category(category)
            .retention
            .unwrap_or(self.backup_retention.max_per_target)
    }

    /// Directory holding template blueprints
    pub fn templates_dir(&self, paths: &HostPaths) -> PathBuf {
        self.templates_dir
            .clone()
            .unwrap_or_else(|| paths.templates_dir())
    }

    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &HostPaths) -> Result<Self, KeeperError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            read_json::<Settings, _>(&settings_path).map_err(|e| {
                KeeperError::Config(format!("Failed to load settings file: {}", e))
            })
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &HostPaths) -> Result<(), KeeperError> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }
}
