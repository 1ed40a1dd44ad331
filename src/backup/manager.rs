//! Backup manager for hostkeeper
//!
//! Snapshots a category's artifacts and auxiliary state into manifest-described
//! archives under `<home>/backups/<category>/`, with retention pruning.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::archive::{self, ScratchDir, ARCHIVE_EXTENSION};
use super::manifest::{Backup, BackupKind, Manifest, SourceLayout, MANIFEST_FILE};
use crate::audit::{AuditEntry, Operation, Outcome};
use crate::error::{KeeperError, KeeperResult};
use crate::models::{Category, Component, Identifier};
use crate::services::ServiceController;
use crate::storage::file_io::{copy_tree, write_bytes_atomic, write_json_atomic};
use crate::storage::ArtifactStore;

/// File name of the staged runtime state
pub(crate) const STATE_FILE: &str = "state.txt";

/// Name accepted by `get_backup` for the newest regular backup
pub const LATEST: &str = "latest";

/// A freshly created backup and what retention removed afterwards
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub backup: Backup,
    pub pruned: Vec<Backup>,
}

/// What one component contributed to the staging area
struct Staged {
    files: Vec<PathBuf>,
    layout: Option<SourceLayout>,
}

/// Manages backup creation and retention
pub struct BackupManager<'a> {
    store: &'a ArtifactStore,
    controller: &'a dyn ServiceController,
}

impl<'a> BackupManager<'a> {
    /// Create a new BackupManager
    pub fn new(store: &'a ArtifactStore, controller: &'a dyn ServiceController) -> Self {
        Self { store, controller }
    }

    /// Directory holding a category's archives
    pub fn backup_dir(&self, category: &Category) -> PathBuf {
        self.store.paths().category_backup_dir(category)
    }

    /// Create a backup of the requested components, then apply retention
    ///
    /// `name` defaults to a `YYYYMMDD_HHMMSS` timestamp. If any component
    /// cannot be staged, nothing is written and the error names every
    /// failed component.
    pub fn create_backup(
        &self,
        category: &Category,
        name: Option<&str>,
        components: &BTreeSet<Component>,
    ) -> KeeperResult<BackupOutcome> {
        let _lock = self.store.lock_backups(category)?;

        let backup = match self.create_unlocked(category, name, components, BackupKind::Regular) {
            Ok(backup) => backup,
            Err(e) => {
                self.store.log(
                    &AuditEntry::new(
                        Operation::Backup,
                        category.as_str(),
                        name.map(str::to_string),
                        Outcome::Failed,
                    )
                    .with_detail(e.to_string()),
                );
                return Err(e);
            }
        };

        self.store.log(
            &AuditEntry::success(Operation::Backup, category.as_str(), backup.name())
                .with_detail(component_list(&backup.manifest.included())),
        );

        let pruned = self.prune_scope(category, BackupKind::Regular)?;
        Ok(BackupOutcome { backup, pruned })
    }

    pub(crate) fn create_unlocked(
        &self,
        category: &Category,
        name: Option<&str>,
        components: &BTreeSet<Component>,
        kind: BackupKind,
    ) -> KeeperResult<Backup> {
        if components.is_empty() {
            return Err(KeeperError::InvalidInput(
                "A backup needs at least one component".into(),
            ));
        }

        let dir = self.backup_dir(category);
        fs::create_dir_all(&dir).map_err(|e| KeeperError::io_at("create directory", &dir, e))?;

        let name = self.resolve_name(&dir, name, kind)?;
        let staging = ScratchDir::create(&dir, "staging")?;
        let mut manifest = Manifest::new(&name, category, kind);

        let mut failures = Vec::new();
        for component in components {
            let target = staging.path().join(component.dir_name());
            match self.stage(category, *component, &target, kind) {
                Ok(staged) => {
                    for relative in &staged.files {
                        let checksum = archive::sha256_file(&target.join(relative))?;
                        manifest
                            .checksums
                            .insert(Manifest::entry_path(*component, relative), checksum);
                    }
                    if let Some(layout) = staged.layout {
                        manifest.layouts.insert(*component, layout);
                    }
                    manifest
                        .components
                        .insert(*component, !staged.files.is_empty());
                    debug!("Staged {} file(s) for {}", staged.files.len(), component);
                }
                Err(e) => failures.push((*component, e.to_string())),
            }
        }

        if !failures.is_empty() {
            return Err(KeeperError::BackupIncomplete {
                backup: name,
                components: failures.iter().map(|(c, _)| *c).collect(),
                details: failures
                    .iter()
                    .map(|(c, e)| format!("{}: {}", c, e))
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }

        if components.contains(&Component::Configuration) {
            manifest.active_artifacts = self
                .store
                .active_identifiers(category)?
                .into_iter()
                .map(String::from)
                .collect();
        }

        write_json_atomic(staging.path().join(MANIFEST_FILE), &manifest)?;

        let archive_path = dir.join(archive_file_name(&name));
        let size_bytes = archive::write_archive(staging.path(), &manifest.included(), &archive_path)?;

        info!("Created {} backup {} of {}", kind, name, category);
        Ok(Backup {
            manifest,
            archive_path,
            size_bytes,
        })
    }

    /// Copy one component's live state into `target`
    ///
    /// Safety backups treat a missing live source as empty so that a restore
    /// can bring back state that was deleted.
    fn stage(
        &self,
        category: &Category,
        component: Component,
        target: &Path,
        kind: BackupKind,
    ) -> KeeperResult<Staged> {
        let lenient = kind == BackupKind::PreRestore;

        match component {
            Component::Configuration => {
                let mut files = Vec::new();
                for identifier in self.store.identifiers(category)? {
                    let location = self.store.location(category, &identifier);
                    let Some(file_name) = location.file_name() else {
                        continue;
                    };
                    copy_tree(&location, &target.join(file_name))?;
                    files.push(PathBuf::from(file_name));
                }
                Ok(Staged {
                    files,
                    layout: None,
                })
            }
            Component::Filters | Component::Data | Component::History => {
                let settings = self.store.settings().category(category);
                let source = match settings.auxiliary.get(component) {
                    Some(source) => source.clone(),
                    None if lenient => return Ok(empty()),
                    None => {
                        return Err(KeeperError::Config(format!(
                            "no live path configured for {} of {}",
                            component, category
                        )))
                    }
                };

                if !source.exists() {
                    if lenient {
                        return Ok(empty());
                    }
                    return Err(KeeperError::io_at(
                        "read",
                        &source,
                        std::io::ErrorKind::NotFound.into(),
                    ));
                }

                if source.is_dir() {
                    Ok(Staged {
                        files: copy_tree(&source, target)?,
                        layout: Some(SourceLayout::Directory),
                    })
                } else {
                    let file_name = source.file_name().map(PathBuf::from).unwrap_or_default();
                    copy_tree(&source, &target.join(&file_name))?;
                    Ok(Staged {
                        files: vec![file_name],
                        layout: Some(SourceLayout::File),
                    })
                }
            }
            Component::BannedState => match self.controller.snapshot_state(category) {
                Ok(Some(state)) if state.trim().is_empty() => Ok(empty()),
                Ok(Some(state)) => {
                    write_bytes_atomic(target.join(STATE_FILE), state.as_bytes())?;
                    Ok(Staged {
                        files: vec![PathBuf::from(STATE_FILE)],
                        layout: None,
                    })
                }
                Ok(None) if lenient => Ok(empty()),
                Ok(None) => Err(KeeperError::Config(format!(
                    "{} has no runtime state command",
                    category
                ))),
                Err(diagnostic) => Err(KeeperError::Io(format!(
                    "runtime state query failed: {}",
                    diagnostic
                ))),
            },
        }
    }

    /// Pick the archive name, suffixing generated names on collision
    fn resolve_name(&self, dir: &Path, name: Option<&str>, kind: BackupKind) -> KeeperResult<String> {
        if let Some(name) = name {
            let name = Identifier::parse(name)
                .map_err(|_| KeeperError::InvalidInput(format!("Invalid backup name '{}'", name)))?;
            if dir.join(archive_file_name(name.as_str())).exists() {
                return Err(KeeperError::InvalidInput(format!(
                    "Backup '{}' already exists",
                    name
                )));
            }
            return Ok(name.to_string());
        }

        let base = format!(
            "{}{}",
            kind.name_prefix(),
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let mut candidate = base.clone();
        let mut suffix = 1;
        while dir.join(archive_file_name(&candidate)).exists() {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        Ok(candidate)
    }

    /// List all backups of a category, newest first
    ///
    /// Unreadable archives are skipped with a warning.
    pub fn list_backups(&self, category: &Category) -> KeeperResult<Vec<Backup>> {
        let dir = self.backup_dir(category);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        let suffix = format!(".{}", ARCHIVE_EXTENSION);

        for entry in fs::read_dir(&dir).map_err(|e| KeeperError::io_at("read directory", &dir, e))? {
            let entry = entry.map_err(|e| KeeperError::io_at("read directory", &dir, e))?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') || !file_name.ends_with(&suffix) {
                continue;
            }

            let path = entry.path();
            match self.load(&path) {
                Ok(backup) => backups.push(backup),
                Err(e) => warn!("Skipping unreadable backup {}: {}", path.display(), e),
            }
        }

        backups.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.name().cmp(a.name()))
        });
        Ok(backups)
    }

    /// Get a backup by name, or the newest regular backup for `"latest"`
    pub fn get_backup(&self, category: &Category, name: &str) -> KeeperResult<Backup> {
        if name == LATEST {
            return self
                .list_backups(category)?
                .into_iter()
                .find(|b| b.kind() == BackupKind::Regular)
                .ok_or_else(|| KeeperError::backup_not_found(format!("{}/{}", category, LATEST)));
        }

        let name = name
            .strip_suffix(&format!(".{}", ARCHIVE_EXTENSION))
            .unwrap_or(name);
        let path = self.backup_dir(category).join(archive_file_name(name));
        if !path.is_file() {
            return Err(KeeperError::backup_not_found(format!("{}/{}", category, name)));
        }
        self.load(&path)
    }

    fn load(&self, path: &Path) -> KeeperResult<Backup> {
        let manifest = archive::read_manifest(path)?;
        let size_bytes = fs::metadata(path)
            .map_err(|e| KeeperError::io_at("stat", path, e))?
            .len();
        Ok(Backup {
            manifest,
            archive_path: path.to_path_buf(),
            size_bytes,
        })
    }

    /// Backups retention would delete right now, oldest first
    pub fn prune_preview(&self, category: &Category) -> KeeperResult<Vec<Backup>> {
        let backups = self.list_backups(category)?;
        let mut excess = Vec::new();
        for kind in [BackupKind::Regular, BackupKind::PreRestore] {
            excess.extend(self.excess(&backups, category, kind));
        }
        Ok(excess)
    }

    /// Enforce retention for both scopes of a category
    pub fn enforce_retention(&self, category: &Category) -> KeeperResult<Vec<Backup>> {
        let _lock = self.store.lock_backups(category)?;
        let mut deleted = self.prune_scope(category, BackupKind::Regular)?;
        deleted.extend(self.prune_scope(category, BackupKind::PreRestore)?);
        Ok(deleted)
    }

    pub(crate) fn prune_scope(&self, category: &Category, kind: BackupKind) -> KeeperResult<Vec<Backup>> {
        let backups = self.list_backups(category)?;
        let excess = self.excess(&backups, category, kind);

        for backup in &excess {
            fs::remove_file(&backup.archive_path)
                .map_err(|e| KeeperError::io_at("delete old backup", &backup.archive_path, e))?;
            info!("Pruned backup {}", backup.name());
            self.store.log(&AuditEntry::success(
                Operation::Prune,
                category.as_str(),
                backup.name(),
            ));
        }
        Ok(excess)
    }

    /// Oldest backups of one scope beyond its cap
    fn excess(&self, backups: &[Backup], category: &Category, kind: BackupKind) -> Vec<Backup> {
        let retention = &self.store.settings().backup_retention;
        let cap = match kind {
            BackupKind::Regular => self.store.settings().retention_for(category),
            BackupKind::PreRestore => retention.max_safety_backups,
        };
        // The backup just written always survives
        let cap = cap.max(1) as usize;

        let mut scope: Vec<&Backup> = backups.iter().filter(|b| b.kind() == kind).collect();
        scope.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.name().cmp(b.name()))
        });

        let excess = scope.len().saturating_sub(cap);
        scope.into_iter().take(excess).cloned().collect()
    }

    /// Delete one backup
    pub fn delete_backup(&self, category: &Category, name: &str) -> KeeperResult<Backup> {
        let _lock = self.store.lock_backups(category)?;
        let backup = self.get_backup(category, name)?;
        fs::remove_file(&backup.archive_path)
            .map_err(|e| KeeperError::io_at("delete backup", &backup.archive_path, e))?;
        self.store.log(&AuditEntry::success(
            Operation::Prune,
            category.as_str(),
            backup.name(),
        ));
        Ok(backup)
    }
}

fn empty() -> Staged {
    Staged {
        files: Vec::new(),
        layout: None,
    }
}

fn archive_file_name(name: &str) -> String {
    format!("{}.{}", name, ARCHIVE_EXTENSION)
}

fn component_list(components: &[Component]) -> String {
    components
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
