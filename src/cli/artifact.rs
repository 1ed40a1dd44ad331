//! Artifact CLI commands
//!
//! Implements CLI commands for provisioning, activating and editing
//! configuration artifacts.

use std::path::PathBuf;

use clap::Subcommand;

use crate::display::{format_artifact_details, format_artifact_list};
use crate::error::{KeeperError, KeeperResult};
use crate::models::{Category, Identifier};
use crate::services::{Lifecycle, ServiceController};
use crate::storage::file_io::read_text;
use crate::storage::{ArtifactStore, ConfigPatch};
use crate::template::{self, TemplateLibrary};

/// Artifact subcommands
#[derive(Subcommand)]
pub enum ArtifactCommands {
    /// List artifacts of a category
    List {
        /// Category (vhost, pool, jail, firewall, ...)
        category: Category,
    },

    /// Show an artifact's state and content
    Show {
        category: Category,
        identifier: Identifier,
    },

    /// Render a template into a new artifact
    Create {
        category: Category,
        identifier: Identifier,
        /// Template name
        #[arg(short, long)]
        template: String,
        /// Parameter value (key=value), repeatable
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
        /// Replace an existing artifact
        #[arg(long)]
        overwrite: bool,
        /// Validate and activate after writing
        #[arg(long)]
        enable: bool,
    },

    /// Write an artifact from a file
    Write {
        category: Category,
        identifier: Identifier,
        /// File holding the content
        #[arg(short, long)]
        file: PathBuf,
        /// Replace an existing artifact
        #[arg(long)]
        overwrite: bool,
    },

    /// Validate and activate an artifact
    Enable {
        category: Category,
        identifier: Identifier,
    },

    /// Deactivate an artifact
    Disable {
        category: Category,
        identifier: Identifier,
    },

    /// Deactivate and delete an artifact
    Remove {
        category: Category,
        identifier: Identifier,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Set or unset keys in an artifact
    Set {
        category: Category,
        identifier: Identifier,
        /// Assignments (key=value)
        assignments: Vec<String>,
        /// Keys to remove, repeatable
        #[arg(long)]
        unset: Vec<String>,
    },
}

/// Handle an artifact command
pub fn handle_artifact_command(
    store: &ArtifactStore,
    controller: &dyn ServiceController,
    library: &TemplateLibrary,
    cmd: ArtifactCommands,
) -> KeeperResult<()> {
    let lifecycle = Lifecycle::new(store, controller);

    match cmd {
        ArtifactCommands::List { category } => {
            let artifacts = store.list(&category)?;
            println!("{}", format_artifact_list(&artifacts));
        }

        ArtifactCommands::Show {
            category,
            identifier,
        } => {
            let artifact = store.get(&category, &identifier)?;
            print!("{}", format_artifact_details(&artifact));
        }

        ArtifactCommands::Create {
            category,
            identifier,
            template,
            params,
            overwrite,
            enable,
        } => {
            let template = library.get(&template)?;
            let parameters = template::parse_parameters(&params)?;
            let outcome = lifecycle.provision(
                &category,
                &identifier,
                template,
                &parameters,
                overwrite,
                enable,
            )?;

            println!("Created {}/{}", category, identifier);
            println!("  Location: {}", outcome.artifact.location.display());
            if let Some(activation) = outcome.activation {
                println!(
                    "  Activated: {}",
                    activation
                        .transitions
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>()
                        .join(" -> ")
                );
            } else if outcome.artifact.active {
                println!("  Re-validated and re-applied (already active)");
            }
        }

        ArtifactCommands::Write {
            category,
            identifier,
            file,
            overwrite,
        } => {
            let content = read_text(&file)?;
            let artifact = lifecycle.write(&category, &identifier, &content, overwrite)?;
            println!(
                "Wrote {}/{} ({} bytes)",
                category,
                identifier,
                artifact.size_bytes()
            );
        }

        ArtifactCommands::Enable {
            category,
            identifier,
        } => {
            let report = lifecycle.activate(&category, &identifier)?;
            if report.was_active(&store.location(&category, &identifier)) {
                println!("Re-applied {}/{} (already active)", category, identifier);
            } else {
                println!("Enabled {}/{}", category, identifier);
            }
        }

        ArtifactCommands::Disable {
            category,
            identifier,
        } => {
            if lifecycle.deactivate(&category, &identifier)? {
                println!("Disabled {}/{}", category, identifier);
            } else {
                println!("{}/{} is not active", category, identifier);
            }
        }

        ArtifactCommands::Remove {
            category,
            identifier,
            force,
        } => {
            let artifact = store.get(&category, &identifier)?;

            if !force {
                println!(
                    "This will {}delete {}",
                    if artifact.active { "deactivate and " } else { "" },
                    artifact.location.display()
                );
                println!("To proceed, run again with --force flag:");
                println!(
                    "  hostkeeper artifact remove {} {} --force",
                    category, identifier
                );
                return Ok(());
            }

            lifecycle.remove(&category, &identifier)?;
            println!("Removed {}/{}", category, identifier);
        }

        ArtifactCommands::Set {
            category,
            identifier,
            assignments,
            unset,
        } => {
            if assignments.is_empty() && unset.is_empty() {
                return Err(KeeperError::InvalidInput(
                    "Nothing to change: give key=value pairs or --unset keys".into(),
                ));
            }

            let patch =
                ConfigPatch::from_assignments(&assignments, &unset).map_err(KeeperError::InvalidInput)?;
            let report = lifecycle.apply_patch(&category, &identifier, &patch)?;

            match report.diff {
                Some(diff) => {
                    println!("Updated {}/{}: {}", category, identifier, diff);
                    if report.reactivated {
                        println!("  Re-validated and re-applied");
                    }
                }
                None => println!("{}/{} unchanged", category, identifier),
            }
        }
    }

    Ok(())
}
