//! Storage layer for hostkeeper
//!
//! The `ArtifactStore` owns the available/active directory pair of every
//! category. Available files are written atomically; activation is an
//! `ActivationMarker` in the active directory pointing at the available file.

pub mod file_io;
pub mod lock;
pub mod marker;
pub mod patch;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub use file_io::{read_json, write_json_atomic};
pub use lock::StoreLock;
pub use marker::{marker_for, ActivationMarker, FileMarker, SymlinkMarker};
pub use patch::{ConfigDocument, ConfigPatch, KeySyntax};

use crate::audit::{AuditEntry, AuditLogger, Operation};
use crate::config::{CategoryLayout, HostPaths, Settings};
use crate::error::{KeeperError, KeeperResult};
use crate::models::{Category, ConfigArtifact, Identifier};

/// The available/active artifact store
pub struct ArtifactStore {
    paths: HostPaths,
    settings: Settings,
    marker: Box<dyn ActivationMarker>,
    audit: AuditLogger,
}

impl ArtifactStore {
    /// Open the store rooted at `paths`, creating its directories
    pub fn new(paths: HostPaths, settings: Settings) -> KeeperResult<Self> {
        paths.ensure_directories()?;

        Ok(Self {
            marker: marker_for(settings.activation_marker),
            audit: AuditLogger::new(paths.audit_log()),
            paths,
            settings,
        })
    }

    /// Get the paths configuration
    pub fn paths(&self) -> &HostPaths {
        &self.paths
    }

    /// Get the loaded settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get the audit logger
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Resolved directories of a category
    pub fn layout(&self, category: &Category) -> CategoryLayout {
        self.settings.layout(&self.paths, category)
    }

    /// Path of the available file for an identifier
    pub fn location(&self, category: &Category, identifier: &Identifier) -> PathBuf {
        let layout = self.layout(category);
        layout.available_dir.join(file_name(&layout, identifier))
    }

    /// Path of the activation marker for an identifier
    pub fn marker_path(&self, category: &Category, identifier: &Identifier) -> PathBuf {
        let layout = self.layout(category);
        layout.active_dir.join(file_name(&layout, identifier))
    }

    /// Whether an available artifact exists
    pub fn exists(&self, category: &Category, identifier: &Identifier) -> bool {
        self.location(category, identifier).is_file()
    }

    /// Read the content of an available artifact
    pub fn read(&self, category: &Category, identifier: &Identifier) -> KeeperResult<String> {
        let location = self.location(category, identifier);
        if !location.is_file() {
            return Err(KeeperError::artifact_not_found(
                category.as_str(),
                identifier.as_str(),
            ));
        }
        file_io::read_text(&location)
    }

    /// Load one artifact with its activation flag
    pub fn get(&self, category: &Category, identifier: &Identifier) -> KeeperResult<ConfigArtifact> {
        let content = self.read(category, identifier)?;
        Ok(ConfigArtifact {
            identifier: identifier.clone(),
            category: category.clone(),
            content,
            location: self.location(category, identifier),
            active: self.is_active(category, identifier)?,
        })
    }

    /// Whether the marker for `identifier` points at its available file
    ///
    /// A marker pointing anywhere else (or at a missing file) does not count.
    pub fn is_active(&self, category: &Category, identifier: &Identifier) -> KeeperResult<bool> {
        let location = self.location(category, identifier);
        let marker_path = self.marker_path(category, identifier);

        match self.marker.target(&marker_path)? {
            Some(target) => Ok(location.is_file() && points_at(&marker_path, &target, &location)),
            None => Ok(false),
        }
    }

    /// Every available identifier of a category, sorted
    pub fn identifiers(&self, category: &Category) -> KeeperResult<Vec<Identifier>> {
        let layout = self.layout(category);
        let dir = &layout.available_dir;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut identifiers = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| KeeperError::io_at("read directory", dir, e))? {
            let entry = entry.map_err(|e| KeeperError::io_at("read directory", dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();

            // Hidden entries are temp files from in-flight atomic writes
            if name.starts_with('.') || !entry.path().is_file() {
                continue;
            }

            match identifier_from_file_name(&layout, &name) {
                Some(identifier) => identifiers.push(identifier),
                None => debug!("Ignoring foreign file {} in {}", name, dir.display()),
            }
        }

        identifiers.sort();
        Ok(identifiers)
    }

    /// Identifier stored under `file_name` in the available directory
    pub fn identifier_for_file(&self, category: &Category, file_name: &str) -> Option<Identifier> {
        identifier_from_file_name(&self.layout(category), file_name)
    }

    /// Every available artifact of a category with its activation flag
    pub fn list(&self, category: &Category) -> KeeperResult<Vec<ConfigArtifact>> {
        self.identifiers(category)?
            .iter()
            .map(|identifier| self.get(category, identifier))
            .collect()
    }

    /// Identifiers whose marker currently points at their available file
    pub fn active_identifiers(&self, category: &Category) -> KeeperResult<Vec<Identifier>> {
        let mut active = Vec::new();
        for identifier in self.identifiers(category)? {
            if self.is_active(category, &identifier)? {
                active.push(identifier);
            }
        }
        Ok(active)
    }

    /// Write content to the available location
    ///
    /// Fails with `Conflict` if the artifact exists and `overwrite` is false.
    /// Writing never touches the activation marker.
    pub fn write(
        &self,
        category: &Category,
        identifier: &Identifier,
        content: &str,
        overwrite: bool,
    ) -> KeeperResult<ConfigArtifact> {
        let _lock = self.lock(category, identifier)?;
        self.write_unlocked(category, identifier, content, overwrite)?;

        self.log(&AuditEntry::success(
            Operation::Write,
            category.as_str(),
            identifier.as_str(),
        ));

        self.get(category, identifier)
    }

    /// Write without taking the artifact lock; the caller must hold it
    pub(crate) fn write_unlocked(
        &self,
        category: &Category,
        identifier: &Identifier,
        content: &str,
        overwrite: bool,
    ) -> KeeperResult<()> {
        let location = self.location(category, identifier);
        if !overwrite && location.exists() {
            return Err(KeeperError::Conflict {
                category: category.to_string(),
                identifier: identifier.to_string(),
            });
        }

        file_io::write_bytes_atomic(&location, content.as_bytes())?;
        debug!("Wrote {} ({} bytes)", location.display(), content.len());
        Ok(())
    }

    /// Acquire the advisory lock for one artifact
    pub fn lock(&self, category: &Category, identifier: &Identifier) -> KeeperResult<StoreLock> {
        StoreLock::artifact(&self.paths.locks_dir(), category, identifier)
    }

    /// Acquire the advisory lock for a category's backups
    pub fn lock_backups(&self, category: &Category) -> KeeperResult<StoreLock> {
        StoreLock::backups(&self.paths.locks_dir(), category)
    }

    /// Raw marker target, used to restore the exact prior state on rollback
    pub(crate) fn marker_target(
        &self,
        category: &Category,
        identifier: &Identifier,
    ) -> KeeperResult<Option<PathBuf>> {
        self.marker.target(&self.marker_path(category, identifier))
    }

    /// Point the marker at the available file
    pub(crate) fn place_marker(&self, category: &Category, identifier: &Identifier) -> KeeperResult<()> {
        let marker_path = self.marker_path(category, identifier);
        let location = self.location(category, identifier);
        self.marker.place(&marker_path, &location)?;
        debug!("Marker {} -> {}", marker_path.display(), location.display());
        Ok(())
    }

    /// Put the marker back to a previously observed state
    pub(crate) fn restore_marker(
        &self,
        category: &Category,
        identifier: &Identifier,
        previous: Option<&Path>,
    ) -> KeeperResult<()> {
        let marker_path = self.marker_path(category, identifier);
        match previous {
            Some(target) => self.marker.place(&marker_path, target),
            None => self.marker.clear(&marker_path).map(|_| ()),
        }
    }

    /// Remove the marker, returning whether one existed
    pub(crate) fn clear_marker(&self, category: &Category, identifier: &Identifier) -> KeeperResult<bool> {
        self.marker.clear(&self.marker_path(category, identifier))
    }

    /// Delete the available file
    pub(crate) fn delete_available(&self, category: &Category, identifier: &Identifier) -> KeeperResult<()> {
        let location = self.location(category, identifier);
        fs::remove_file(&location).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KeeperError::artifact_not_found(category.as_str(), identifier.as_str())
            } else {
                KeeperError::io_at("remove", &location, e)
            }
        })
    }

    /// Append to the audit log; failures are reported but never fatal
    pub fn log(&self, entry: &AuditEntry) {
        if let Err(e) = self.audit.log(entry) {
            warn!("Failed to write audit entry: {}", e);
        }
    }
}

fn file_name(layout: &CategoryLayout, identifier: &Identifier) -> String {
    match &layout.extension {
        Some(ext) => format!("{}.{}", identifier, ext),
        None => identifier.to_string(),
    }
}

fn identifier_from_file_name(layout: &CategoryLayout, name: &str) -> Option<Identifier> {
    let stem = match &layout.extension {
        Some(ext) => name.strip_suffix(&format!(".{}", ext))?,
        None => name,
    };
    Identifier::parse(stem).ok()
}

/// Compare a marker target with the expected location
///
/// Relative targets are resolved against the marker's directory, as the
/// filesystem does for relative links.
fn points_at(marker_path: &Path, target: &Path, location: &Path) -> bool {
    let resolved = if target.is_relative() {
        marker_path
            .parent()
            .map(|dir| dir.join(target))
            .unwrap_or_else(|| target.to_path_buf())
    } else {
        target.to_path_buf()
    };

    if resolved == location {
        return true;
    }

    match (fs::canonicalize(&resolved), fs::canonicalize(location)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkerKind;
    use tempfile::TempDir;

    fn create_store(marker: MarkerKind) -> (ArtifactStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = HostPaths::with_base_dir(temp_dir.path().to_path_buf());
        let settings = Settings {
            activation_marker: marker,
            ..Settings::default()
        };
        (ArtifactStore::new(paths, settings).unwrap(), temp_dir)
    }

    fn names(category: &str, identifier: &str) -> (Category, Identifier) {
        (
            Category::parse(category).unwrap(),
            Identifier::parse(identifier).unwrap(),
        )
    }

    #[test]
    fn test_write_and_read() {
        let (store, _temp) = create_store(MarkerKind::Symlink);
        let (vhost, site) = names("vhost", "a.test");

        let artifact = store.write(&vhost, &site, "server {}\n", false).unwrap();
        assert_eq!(artifact.content, "server {}\n");
        assert!(!artifact.active);
        assert!(artifact.location.ends_with("store/vhost/available/a.test.conf"));
        assert_eq!(store.read(&vhost, &site).unwrap(), "server {}\n");
    }

    #[test]
    fn test_write_conflict_without_overwrite() {
        let (store, _temp) = create_store(MarkerKind::Symlink);
        let (vhost, site) = names("vhost", "a.test");

        store.write(&vhost, &site, "one", false).unwrap();
        let err = store.write(&vhost, &site, "two", false).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.read(&vhost, &site).unwrap(), "one");

        store.write(&vhost, &site, "two", true).unwrap();
        assert_eq!(store.read(&vhost, &site).unwrap(), "two");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (store, _temp) = create_store(MarkerKind::Symlink);
        let (jail, sshd) = names("jail", "sshd");
        assert!(store.read(&jail, &sshd).unwrap_err().is_not_found());
        assert!(store.get(&jail, &sshd).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_skips_foreign_and_temp_files() {
        let (store, _temp) = create_store(MarkerKind::Symlink);
        let jail = Category::parse("jail").unwrap();

        for id in ["sshd", "nginx-http-auth"] {
            store
                .write(&jail, &Identifier::parse(id).unwrap(), "[x]\n", false)
                .unwrap();
        }
        let dir = store.layout(&jail).available_dir;
        fs::write(dir.join(".sshd.local.tmp"), "partial").unwrap();
        fs::write(dir.join("README"), "not a jail").unwrap();

        let ids: Vec<String> = store
            .identifiers(&jail)
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, vec!["nginx-http-auth", "sshd"]);
    }

    #[test]
    fn test_marker_controls_activation() {
        for kind in [MarkerKind::Symlink, MarkerKind::File] {
            let (store, _temp) = create_store(kind);
            let (pool, www) = names("pool", "www");
            store.write(&pool, &www, "[www]\n", false).unwrap();

            store.place_marker(&pool, &www).unwrap();
            assert!(store.is_active(&pool, &www).unwrap());
            assert_eq!(store.active_identifiers(&pool).unwrap(), vec![www.clone()]);

            assert!(store.clear_marker(&pool, &www).unwrap());
            assert!(!store.is_active(&pool, &www).unwrap());
            assert!(!store.clear_marker(&pool, &www).unwrap());
        }
    }

    #[test]
    fn test_marker_to_elsewhere_is_not_active() {
        let (store, temp) = create_store(MarkerKind::File);
        let (pool, www) = names("pool", "www");
        store.write(&pool, &www, "[www]\n", false).unwrap();

        let elsewhere = temp.path().join("other.conf");
        fs::write(&elsewhere, "x").unwrap();
        store
            .restore_marker(&pool, &www, Some(elsewhere.as_path()))
            .unwrap();
        assert!(!store.is_active(&pool, &www).unwrap());

        store.restore_marker(&pool, &www, None).unwrap();
        assert_eq!(store.marker_target(&pool, &www).unwrap(), None);
    }

    #[test]
    fn test_write_is_audited() {
        let (store, _temp) = create_store(MarkerKind::Symlink);
        let (vhost, site) = names("vhost", "a.test");
        store.write(&vhost, &site, "server {}", false).unwrap();

        let entries = store.audit().read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, Operation::Write);
        assert_eq!(entries[0].subject.as_deref(), Some("a.test"));
    }

    #[test]
    fn test_write_while_locked_fails() {
        let (store, _temp) = create_store(MarkerKind::Symlink);
        let (vhost, site) = names("vhost", "a.test");

        let _held = store.lock(&vhost, &site).unwrap();
        let err = store.write(&vhost, &site, "x", false).unwrap_err();
        assert!(matches!(err, KeeperError::Locked { .. }));
        assert!(!store.exists(&vhost, &site));
    }
}
