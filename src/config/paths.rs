//! Path management for hostkeeper
//!
//! Provides path resolution for settings, the default artifact store,
//! backups, locks and the audit log.
//!
//! ## Path Resolution Order
//!
//! 1. `HOSTKEEPER_HOME` environment variable (if set)
//! 2. The platform data directory (`~/.local/share/hostkeeper` on Linux)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::KeeperError;
use crate::models::Category;

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "HOSTKEEPER_HOME";

/// Manages all paths used by hostkeeper
#[derive(Debug, Clone)]
pub struct HostPaths {
    /// Base directory for all hostkeeper state
    base_dir: PathBuf,
}

impl HostPaths {
    /// Create a new HostPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, KeeperError> {
        let base_dir = if let Ok(custom) = std::env::var(HOME_ENV) {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create HostPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Root of the default artifact store
    pub fn store_dir(&self) -> PathBuf {
        self.base_dir.join("store")
    }

    /// Default "available" directory for a category
    pub fn default_available_dir(&self, category: &Category) -> PathBuf {
        self.store_dir().join(category.as_str()).join("available")
    }

    /// Default "active" directory for a category
    pub fn default_active_dir(&self, category: &Category) -> PathBuf {
        self.store_dir().join(category.as_str()).join("active")
    }

    /// Get the backup directory
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Backups for one category
    pub fn category_backup_dir(&self, category: &Category) -> PathBuf {
        self.backup_dir().join(category.as_str())
    }

    /// Directory holding advisory lock files
    pub fn locks_dir(&self) -> PathBuf {
        self.base_dir.join("locks")
    }

    /// Default directory for user template blueprints
    pub fn templates_dir(&self) -> PathBuf {
        self.base_dir.join("templates")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), KeeperError> {
        for dir in [
            self.base_dir.clone(),
            self.store_dir(),
            self.backup_dir(),
            self.locks_dir(),
            self.templates_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| KeeperError::io_at("create directory", &dir, e))?;
        }

        Ok(())
    }

    /// Check if hostkeeper has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

/// Resolve the default home directory from the platform conventions
fn resolve_default_path() -> Result<PathBuf, KeeperError> {
    ProjectDirs::from("", "", "hostkeeper")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| KeeperError::Config("Could not determine a home directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = HostPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.backup_dir(), temp_dir.path().join("backups"));
        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
    }

    #[test]
    fn test_category_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = HostPaths::with_base_dir(temp_dir.path().to_path_buf());
        let jail = Category::parse("jail").unwrap();

        assert_eq!(
            paths.default_available_dir(&jail),
            temp_dir.path().join("store/jail/available")
        );
        assert_eq!(
            paths.default_active_dir(&jail),
            temp_dir.path().join("store/jail/active")
        );
        assert_eq!(
            paths.category_backup_dir(&jail),
            temp_dir.path().join("backups/jail")
        );
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = HostPaths::with_base_dir(temp_dir.path().to_path_buf());

        paths.ensure_directories().unwrap();

        assert!(paths.store_dir().exists());
        assert!(paths.backup_dir().exists());
        assert!(paths.locks_dir().exists());
        assert!(!paths.is_initialized());
    }
}
