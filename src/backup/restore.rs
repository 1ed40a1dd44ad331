//! Backup restoration for hostkeeper
//!
//! Applies a backup to the live store under a restore mode, after verifying
//! the archive and (by default) taking a pre-restore safety backup.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::archive::{self, ScratchDir};
use super::manager::{BackupManager, STATE_FILE};
use super::manifest::{Backup, BackupKind, Manifest, SourceLayout};
use crate::audit::{AuditEntry, Operation, Outcome};
use crate::error::{KeeperError, KeeperResult};
use crate::models::{Category, Component, Identifier};
use crate::services::{Lifecycle, ServiceController};
use crate::storage::file_io::{list_files, read_text, write_bytes_atomic};
use crate::storage::ArtifactStore;

/// How backed-up components are combined with live state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestoreMode {
    /// Overwrite every restored item unconditionally
    #[default]
    Full,
    /// Only add items missing from live state
    Merge,
    /// Full restore of an explicit component subset
    Selective,
}

impl fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreMode::Full => write!(f, "full"),
            RestoreMode::Merge => write!(f, "merge"),
            RestoreMode::Selective => write!(f, "selective"),
        }
    }
}

impl FromStr for RestoreMode {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "merge" => Ok(Self::Merge),
            "selective" => Ok(Self::Selective),
            other => Err(KeeperError::InvalidInput(format!(
                "Unknown restore mode '{}' (expected full, merge or selective)",
                other
            ))),
        }
    }
}

/// A restore request; never persisted
#[derive(Debug, Clone, Default)]
pub struct RestorePlan {
    pub mode: RestoreMode,
    /// Required for selective; narrows full and merge when non-empty
    pub selected_components: BTreeSet<Component>,
}

impl RestorePlan {
    pub fn full() -> Self {
        Self {
            mode: RestoreMode::Full,
            selected_components: BTreeSet::new(),
        }
    }

    pub fn merge() -> Self {
        Self {
            mode: RestoreMode::Merge,
            selected_components: BTreeSet::new(),
        }
    }

    pub fn selective(components: impl IntoIterator<Item = Component>) -> Self {
        Self {
            mode: RestoreMode::Selective,
            selected_components: components.into_iter().collect(),
        }
    }

    /// Components this plan touches in a backup
    ///
    /// Every selected component must be flagged present in the manifest.
    pub fn resolve(&self, manifest: &Manifest) -> KeeperResult<Vec<Component>> {
        if self.mode == RestoreMode::Selective && self.selected_components.is_empty() {
            return Err(KeeperError::InvalidInput(
                "A selective restore needs at least one component".into(),
            ));
        }

        for component in &self.selected_components {
            if !manifest.includes(*component) {
                return Err(KeeperError::ManifestMismatch {
                    backup: manifest.name.clone(),
                    component: *component,
                });
            }
        }

        if self.selected_components.is_empty() {
            Ok(manifest.included())
        } else {
            Ok(manifest
                .included()
                .into_iter()
                .filter(|c| self.selected_components.contains(c))
                .collect())
        }
    }

    fn overwrites(&self) -> bool {
        self.mode != RestoreMode::Merge
    }
}

/// Result of restoring one component or item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Restored,
    /// Already present live (merge mode)
    Skipped,
    Failed,
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentStatus::Restored => write!(f, "restored"),
            ComponentStatus::Skipped => write!(f, "skipped"),
            ComponentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome for a single artifact, file or state batch
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub item: String,
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ItemOutcome {
    fn restored(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            status: ComponentStatus::Restored,
            detail: None,
        }
    }

    fn skipped(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            status: ComponentStatus::Skipped,
            detail: Some("already present".into()),
        }
    }

    fn failed(item: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self {
            item: item.into(),
            status: ComponentStatus::Failed,
            detail: Some(detail.to_string()),
        }
    }
}

/// Outcome for one component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentOutcome {
    pub component: Component,
    pub status: ComponentStatus,
    pub items: Vec<ItemOutcome>,
}

impl ComponentOutcome {
    /// Failed if any item failed, skipped if every item was skipped
    fn from_items(component: Component, items: Vec<ItemOutcome>) -> Self {
        let status = if items.iter().any(|i| i.status == ComponentStatus::Failed) {
            ComponentStatus::Failed
        } else if !items.is_empty() && items.iter().all(|i| i.status == ComponentStatus::Skipped) {
            ComponentStatus::Skipped
        } else {
            ComponentStatus::Restored
        };
        Self {
            component,
            status,
            items,
        }
    }

    fn failed(component: Component, detail: impl fmt::Display) -> Self {
        Self {
            component,
            status: ComponentStatus::Failed,
            items: vec![ItemOutcome::failed(component.dir_name(), detail)],
        }
    }

    /// Number of items with a status
    pub fn count(&self, status: ComponentStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

/// Result of a restore operation
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub backup: String,
    pub category: Category,
    pub mode: RestoreMode,
    /// Name of the pre-restore snapshot, if one was taken
    pub safety_backup: Option<String>,
    pub components: Vec<ComponentOutcome>,
}

impl RestoreReport {
    /// Check if every component was restored
    pub fn all_restored(&self) -> bool {
        self.components
            .iter()
            .all(|c| c.status == ComponentStatus::Restored)
    }

    /// Check if any component failed
    pub fn has_failures(&self) -> bool {
        self.components
            .iter()
            .any(|c| c.status == ComponentStatus::Failed)
    }

    /// Outcome of one component, if the restore touched it
    pub fn component(&self, component: Component) -> Option<&ComponentOutcome> {
        self.components.iter().find(|c| c.component == component)
    }

    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        if self.components.is_empty() {
            return "Nothing to restore".to_string();
        }

        self.components
            .iter()
            .map(|c| {
                let mut parts = Vec::new();
                for status in [
                    ComponentStatus::Restored,
                    ComponentStatus::Skipped,
                    ComponentStatus::Failed,
                ] {
                    let n = c.count(status);
                    if n > 0 {
                        parts.push(format!("{} {}", n, status));
                    }
                }
                format!("{}: {} ({})", c.component, c.status, parts.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Restores backups into the live store
pub struct RestoreEngine<'a> {
    store: &'a ArtifactStore,
    controller: &'a dyn ServiceController,
}

impl<'a> RestoreEngine<'a> {
    /// Create a new RestoreEngine
    pub fn new(store: &'a ArtifactStore, controller: &'a dyn ServiceController) -> Self {
        Self { store, controller }
    }

    /// Restore a backup (by name or `"latest"`) into the live store
    ///
    /// The plan is checked against the manifest and the archive is verified
    /// before anything else happens. With `safety_backup`, the live state of
    /// every touched component is archived first; if that fails nothing is
    /// restored.
    pub fn restore(
        &self,
        category: &Category,
        name: &str,
        plan: &RestorePlan,
        safety_backup: bool,
    ) -> KeeperResult<RestoreReport> {
        let _lock = self.store.lock_backups(category)?;
        let manager = BackupManager::new(self.store, self.controller);

        let backup = manager.get_backup(category, name)?;
        let components = plan.resolve(&backup.manifest)?;

        let mut report = RestoreReport {
            backup: backup.name().to_string(),
            category: category.clone(),
            mode: plan.mode,
            safety_backup: None,
            components: Vec::new(),
        };
        if components.is_empty() {
            info!("Backup {} holds nothing to restore", backup.name());
            return Ok(report);
        }

        let scratch = ScratchDir::create(&manager.backup_dir(category), "restore")?;
        archive::extract(&backup.archive_path, scratch.path())?;
        archive::verify_extracted(&backup.manifest, scratch.path())?;

        if safety_backup {
            let touched: BTreeSet<Component> = components.iter().copied().collect();
            let snapshot = manager
                .create_unlocked(category, None, &touched, BackupKind::PreRestore)
                .map_err(|e| KeeperError::SafetyBackup(Box::new(e)))?;
            info!("Safety backup {} taken", snapshot.name());
            self.store.log(&AuditEntry::success(
                Operation::Backup,
                category.as_str(),
                snapshot.name(),
            ));
            report.safety_backup = Some(snapshot.name().to_string());

            if let Err(e) = manager.prune_scope(category, BackupKind::PreRestore) {
                warn!("Could not prune safety backups of {}: {}", category, e);
            }
        }

        for component in components {
            let root = scratch.path().join(component.dir_name());
            let outcome = match component {
                Component::Configuration => self.restore_configuration(category, &backup, &root, plan),
                Component::Filters | Component::Data | Component::History => {
                    self.restore_auxiliary(category, &backup, component, &root, plan)
                }
                Component::BannedState => self.restore_state(category, &root, plan),
            };
            info!("Restore of {} {}: {}", category, component, outcome.status);
            report.components.push(outcome);
        }

        let outcome = if report.has_failures() {
            Outcome::Failed
        } else {
            Outcome::Success
        };
        self.store.log(
            &AuditEntry::new(
                Operation::Restore,
                category.as_str(),
                Some(backup.name().to_string()),
                outcome,
            )
            .with_detail(format!("{} restore: {}", plan.mode, report.summary())),
        );

        Ok(report)
    }

    /// Restore artifacts and the activation state they had at backup time
    fn restore_configuration(
        &self,
        category: &Category,
        backup: &Backup,
        root: &Path,
        plan: &RestorePlan,
    ) -> ComponentOutcome {
        let files = match list_files(root) {
            Ok(files) => files,
            Err(e) => return ComponentOutcome::failed(Component::Configuration, e),
        };

        let lifecycle = Lifecycle::new(self.store, self.controller);
        let mut items = Vec::new();

        for relative in files {
            let file_name = relative.to_string_lossy().to_string();
            let Some(identifier) = self.store.identifier_for_file(category, &file_name) else {
                items.push(ItemOutcome::failed(
                    file_name,
                    "file name does not map to an identifier",
                ));
                continue;
            };

            let was_active = backup
                .manifest
                .active_artifacts
                .iter()
                .any(|id| id == identifier.as_str());

            let item = match self.restore_artifact(
                &lifecycle,
                category,
                &identifier,
                &root.join(&relative),
                was_active,
                plan,
            ) {
                Ok(item) => item,
                Err(e) => ItemOutcome::failed(identifier.as_str(), e),
            };
            items.push(item);
        }

        ComponentOutcome::from_items(Component::Configuration, items)
    }

    fn restore_artifact(
        &self,
        lifecycle: &Lifecycle<'_>,
        category: &Category,
        identifier: &Identifier,
        source: &Path,
        was_active: bool,
        plan: &RestorePlan,
    ) -> KeeperResult<ItemOutcome> {
        let _lock = self.store.lock(category, identifier)?;

        if !plan.overwrites() && self.store.exists(category, identifier) {
            return Ok(ItemOutcome::skipped(identifier.as_str()));
        }

        let content = read_text(source)?;

        if !was_active {
            lifecycle.deactivate_unlocked(category, identifier)?;
            self.store
                .write_unlocked(category, identifier, &content, true)?;
            return Ok(ItemOutcome::restored(identifier.as_str()));
        }

        let previous = if self.store.exists(category, identifier) {
            Some(self.store.read(category, identifier)?)
        } else {
            None
        };

        // Re-activates already-active artifacts and rolls back on failure
        let reactivated = lifecycle.replace_content_unlocked(category, identifier, &content, true)?;
        if reactivated {
            return Ok(ItemOutcome::restored(identifier.as_str()));
        }

        if let Err(e) = lifecycle.activate_unlocked(category, identifier) {
            let rollback = match previous {
                Some(previous) => self
                    .store
                    .write_unlocked(category, identifier, &previous, true),
                None => self.store.delete_available(category, identifier),
            };
            if let Err(rollback_err) = rollback {
                error!(
                    "Failed to roll back {}/{} after rejected restore: {}",
                    category, identifier, rollback_err
                );
            }
            return Err(e);
        }

        Ok(ItemOutcome::restored(identifier.as_str()))
    }

    /// Restore filters, data or history to the configured live path
    fn restore_auxiliary(
        &self,
        category: &Category,
        backup: &Backup,
        component: Component,
        root: &Path,
        plan: &RestorePlan,
    ) -> ComponentOutcome {
        let settings = self.store.settings().category(category);
        let Some(target) = settings.auxiliary.get(component).cloned() else {
            return ComponentOutcome::failed(
                component,
                format!("no live path configured for {} of {}", component, category),
            );
        };

        let files = match list_files(root) {
            Ok(files) => files,
            Err(e) => return ComponentOutcome::failed(component, e),
        };

        let layout = backup
            .manifest
            .layouts
            .get(&component)
            .copied()
            .unwrap_or(SourceLayout::Directory);

        let placements: Vec<_> = match layout {
            SourceLayout::File => files
                .into_iter()
                .take(1)
                .map(|relative| (root.join(&relative), target.clone(), relative))
                .collect(),
            SourceLayout::Directory => files
                .into_iter()
                .map(|relative| (root.join(&relative), target.join(&relative), relative))
                .collect(),
        };

        let items = placements
            .into_iter()
            .map(|(source, dest, relative)| {
                let item = relative.to_string_lossy().to_string();
                if !plan.overwrites() && dest.exists() {
                    return ItemOutcome::skipped(item);
                }
                match copy_file(&source, &dest) {
                    Ok(()) => ItemOutcome::restored(item),
                    Err(e) => ItemOutcome::failed(item, e),
                }
            })
            .collect();

        ComponentOutcome::from_items(component, items)
    }

    /// Re-apply runtime state; merge only submits entries missing live
    fn restore_state(&self, category: &Category, root: &Path, plan: &RestorePlan) -> ComponentOutcome {
        let state = match read_text(root.join(STATE_FILE)) {
            Ok(state) => state,
            Err(e) => return ComponentOutcome::failed(Component::BannedState, e),
        };

        let to_submit = if plan.overwrites() {
            state
        } else {
            let live = match self.controller.snapshot_state(category) {
                Ok(live) => live.unwrap_or_default(),
                Err(e) => return ComponentOutcome::failed(Component::BannedState, e),
            };
            let live: BTreeSet<&str> = live.lines().map(str::trim).collect();
            let missing: Vec<&str> = state
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !live.contains(line))
                .collect();

            if missing.is_empty() {
                return ComponentOutcome::from_items(
                    Component::BannedState,
                    vec![ItemOutcome::skipped(STATE_FILE)],
                );
            }
            let mut text = missing.join("\n");
            text.push('\n');
            text
        };

        let entries = to_submit.lines().filter(|l| !l.trim().is_empty()).count();
        let item = match self.controller.restore_state(category, &to_submit) {
            Ok(()) => ItemOutcome {
                item: STATE_FILE.to_string(),
                status: ComponentStatus::Restored,
                detail: Some(format!("{} entries", entries)),
            },
            Err(diagnostic) => ItemOutcome::failed(STATE_FILE, diagnostic),
        };
        ComponentOutcome::from_items(Component::BannedState, vec![item])
    }
}

fn copy_file(source: &Path, dest: &Path) -> KeeperResult<()> {
    let data = fs::read(source).map_err(|e| KeeperError::io_at("read", source, e))?;
    write_bytes_atomic(dest, &data)
}
