//! Backup CLI commands
//!
//! Implements CLI commands for backup management and restore.

use std::collections::BTreeSet;

use clap::Subcommand;

use crate::backup::{
    BackupManager, ComponentStatus, RestoreEngine, RestoreMode, RestorePlan,
};
use crate::config::CategorySettings;
use crate::display::{format_backup_details, format_backup_list, format_restore_report};
use crate::error::{KeeperError, KeeperResult};
use crate::models::{Category, Component};
use crate::services::ServiceController;
use crate::storage::ArtifactStore;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        category: Category,
        /// Backup name (default: timestamp)
        #[arg(short, long)]
        name: Option<String>,
        /// Component to include, repeatable (default: every configured one)
        #[arg(short, long = "component")]
        components: Vec<Component>,
    },

    /// List all backups of a category
    List { category: Category },

    /// Show information about a specific backup
    Info {
        category: Category,
        /// Backup name (use 'latest' for most recent)
        backup: String,
    },

    /// Restore from a backup
    Restore {
        category: Category,
        /// Backup name (use 'latest' for most recent)
        backup: String,
        /// full, merge or selective
        #[arg(short, long, default_value = "full")]
        mode: RestoreMode,
        /// Component to restore, repeatable (required for selective)
        #[arg(short, long = "component")]
        components: Vec<Component>,
        /// Do not snapshot live state before restoring
        #[arg(long)]
        no_safety_backup: bool,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Delete old backups according to retention policy
    Prune {
        category: Category,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Delete one backup
    Delete {
        category: Category,
        backup: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a backup command
pub fn handle_backup_command(
    store: &ArtifactStore,
    controller: &dyn ServiceController,
    cmd: BackupCommands,
) -> KeeperResult<()> {
    let manager = BackupManager::new(store, controller);

    match cmd {
        BackupCommands::Create {
            category,
            name,
            components,
        } => {
            let components: BTreeSet<Component> = if components.is_empty() {
                default_components(&store.settings().category(&category))
            } else {
                components.into_iter().collect()
            };

            println!("Creating backup of {}...", category);
            let outcome = manager.create_backup(&category, name.as_deref(), &components)?;
            println!("Backup created: {}", outcome.backup.name());
            println!("Location: {}", outcome.backup.archive_path.display());
            for pruned in &outcome.pruned {
                println!("Pruned old backup: {}", pruned.name());
            }
        }

        BackupCommands::List { category } => {
            let backups = manager.list_backups(&category)?;
            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: hostkeeper backup create {}", category);
                return Ok(());
            }
            print!("{}", format_backup_list(&backups));
        }

        BackupCommands::Info { category, backup } => {
            let backup = manager.get_backup(&category, &backup)?;
            print!("{}", format_backup_details(&backup));
        }

        BackupCommands::Restore {
            category,
            backup,
            mode,
            components,
            no_safety_backup,
            force,
        } => {
            let plan = RestorePlan {
                mode,
                selected_components: components.into_iter().collect(),
            };

            if !force {
                let details = manager.get_backup(&category, &backup)?;
                let touched = plan.resolve(&details.manifest)?;
                print!("{}", format_backup_details(&details));
                println!();
                println!(
                    "A {} restore will touch: {}",
                    mode,
                    touched
                        .iter()
                        .map(|c| c.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                if mode != RestoreMode::Merge {
                    println!("WARNING: live items present in the backup will be overwritten!");
                }
                println!("To proceed, run again with --force flag:");
                println!("  hostkeeper backup restore {} {} --force", category, backup);
                return Ok(());
            }

            let engine = RestoreEngine::new(store, controller);
            let report = engine.restore(&category, &backup, &plan, !no_safety_backup)?;
            print!("{}", format_restore_report(&report));
            println!();
            println!("{}", report.summary());

            if report.has_failures() {
                return Err(KeeperError::RestoreIncomplete {
                    backup: report.backup.clone(),
                    components: report
                        .components
                        .iter()
                        .filter(|c| c.status == ComponentStatus::Failed)
                        .map(|c| c.component)
                        .collect(),
                });
            }
        }

        BackupCommands::Prune { category, force } => {
            let candidates = manager.prune_preview(&category)?;
            let retention = &store.settings().backup_retention;

            if candidates.is_empty() {
                println!("No backups to prune.");
                println!(
                    "Current retention policy: {} regular, {} pre-restore",
                    store.settings().retention_for(&category),
                    retention.max_safety_backups
                );
                return Ok(());
            }

            println!("To be deleted:");
            for backup in &candidates {
                println!("  {} ({})", backup.name(), backup.kind());
            }
            println!();

            if !force {
                println!("To delete old backups, run again with --force flag:");
                println!("  hostkeeper backup prune {} --force", category);
                return Ok(());
            }

            let deleted = manager.enforce_retention(&category)?;
            println!("Deleted {} backup(s).", deleted.len());
        }

        BackupCommands::Delete {
            category,
            backup,
            force,
        } => {
            if !force {
                let details = manager.get_backup(&category, &backup)?;
                println!("This will delete {}", details.archive_path.display());
                println!("To proceed, run again with --force flag:");
                println!("  hostkeeper backup delete {} {} --force", category, backup);
                return Ok(());
            }

            let deleted = manager.delete_backup(&category, &backup)?;
            println!("Deleted backup {}", deleted.name());
        }
    }

    Ok(())
}

/// Configuration plus every auxiliary source the category has configured
fn default_components(settings: &CategorySettings) -> BTreeSet<Component> {
    Component::all()
        .into_iter()
        .filter(|component| match component {
            Component::Configuration => true,
            Component::BannedState => settings.state_command.is_some(),
            auxiliary => settings.auxiliary.get(*auxiliary).is_some(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_components() {
        let mut settings = CategorySettings::default();
        assert_eq!(
            default_components(&settings).into_iter().collect::<Vec<_>>(),
            vec![Component::Configuration]
        );

        settings.auxiliary.filters = Some(PathBuf::from("/etc/fail2ban/filter.d"));
        settings.state_command = Some("fail2ban-client banned".into());
        assert_eq!(
            default_components(&settings).into_iter().collect::<Vec<_>>(),
            vec![
                Component::Configuration,
                Component::Filters,
                Component::BannedState
            ]
        );
    }
}
