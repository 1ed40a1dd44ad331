//! Artifact lifecycle service
//!
//! Validates and activates artifacts against their service, rolling back
//! the activation marker (and, for content changes, the content) whenever
//! the service rejects or fails to apply a change.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, error, info};

use super::controller::ServiceController;
use crate::audit::{diff_entries, AuditEntry, Operation, Outcome};
use crate::error::{KeeperError, KeeperResult};
use crate::models::{Category, ConfigArtifact, Identifier};
use crate::storage::{ArtifactStore, ConfigDocument, ConfigPatch};
use crate::template::{render, Template};

/// States of the activation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Available,
    PendingValidation,
    Active,
    RolledBack,
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationState::Available => write!(f, "available"),
            ActivationState::PendingValidation => write!(f, "pending validation"),
            ActivationState::Active => write!(f, "active"),
            ActivationState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Result of a successful activation
#[derive(Debug, Clone)]
pub struct ActivationReport {
    pub category: Category,
    pub identifier: Identifier,
    /// States passed through, ending in `Active`
    pub transitions: Vec<ActivationState>,
    /// Marker target before the call, if there was a marker
    pub previous_target: Option<PathBuf>,
}

impl ActivationReport {
    /// Whether the artifact was already active before the call
    pub fn was_active(&self, location: &std::path::Path) -> bool {
        self.previous_target.as_deref() == Some(location)
    }
}

/// Result of a content change
#[derive(Debug, Clone)]
pub struct MutationReport {
    /// Key-level diff of recognized entries, `None` if nothing changed
    pub diff: Option<String>,
    /// Whether the artifact was re-validated and re-applied
    pub reactivated: bool,
}

/// Result of provisioning an artifact from a template
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub artifact: ConfigArtifact,
    pub activation: Option<ActivationReport>,
}

/// Service for artifact lifecycle operations
pub struct Lifecycle<'a> {
    store: &'a ArtifactStore,
    controller: &'a dyn ServiceController,
}

impl<'a> Lifecycle<'a> {
    /// Create a new lifecycle service
    pub fn new(store: &'a ArtifactStore, controller: &'a dyn ServiceController) -> Self {
        Self { store, controller }
    }

    /// Get the underlying store
    pub fn store(&self) -> &ArtifactStore {
        self.store
    }

    /// Validate an available artifact and make it live
    ///
    /// On validation failure the marker is untouched. On apply failure the
    /// marker is put back exactly as it was before the call.
    pub fn activate(
        &self,
        category: &Category,
        identifier: &Identifier,
    ) -> KeeperResult<ActivationReport> {
        let _lock = self.store.lock(category, identifier)?;
        self.activate_unlocked(category, identifier)
    }

    pub(crate) fn activate_unlocked(
        &self,
        category: &Category,
        identifier: &Identifier,
    ) -> KeeperResult<ActivationReport> {
        let artifact = self.store.get(category, identifier)?;
        let mut transitions = vec![ActivationState::Available];

        transitions.push(ActivationState::PendingValidation);
        debug!("{}/{}: {}", category, identifier, ActivationState::PendingValidation);

        if let Err(diagnostic) = self.controller.check(&artifact) {
            self.audit_rollback(Operation::Activate, category, identifier, &diagnostic);
            return Err(KeeperError::Validation {
                category: category.to_string(),
                identifier: identifier.to_string(),
                diagnostic,
            });
        }

        let previous_target = self.store.marker_target(category, identifier)?;
        self.store.place_marker(category, identifier)?;

        if let Err(diagnostic) = self.controller.apply(category) {
            let diagnostic = self.rollback_marker(category, identifier, previous_target, diagnostic);
            self.audit_rollback(Operation::Activate, category, identifier, &diagnostic);
            return Err(KeeperError::Activation {
                category: category.to_string(),
                identifier: identifier.to_string(),
                diagnostic,
            });
        }

        transitions.push(ActivationState::Active);
        info!("Activated {}/{}", category, identifier);
        self.store.log(&AuditEntry::success(
            Operation::Activate,
            category.as_str(),
            identifier.as_str(),
        ));

        Ok(ActivationReport {
            category: category.clone(),
            identifier: identifier.clone(),
            transitions,
            previous_target,
        })
    }

    /// Remove the activation marker and apply
    ///
    /// Returns `false` without touching the service if there was no marker.
    pub fn deactivate(&self, category: &Category, identifier: &Identifier) -> KeeperResult<bool> {
        let _lock = self.store.lock(category, identifier)?;
        self.deactivate_unlocked(category, identifier)
    }

    pub(crate) fn deactivate_unlocked(
        &self,
        category: &Category,
        identifier: &Identifier,
    ) -> KeeperResult<bool> {
        let Some(previous) = self.store.marker_target(category, identifier)? else {
            debug!("{}/{} already inactive", category, identifier);
            return Ok(false);
        };

        self.store.clear_marker(category, identifier)?;

        if let Err(diagnostic) = self.controller.apply(category) {
            let diagnostic = self.rollback_marker(category, identifier, Some(previous), diagnostic);
            self.audit_rollback(Operation::Deactivate, category, identifier, &diagnostic);
            return Err(KeeperError::Activation {
                category: category.to_string(),
                identifier: identifier.to_string(),
                diagnostic,
            });
        }

        info!("Deactivated {}/{}", category, identifier);
        self.store.log(&AuditEntry::success(
            Operation::Deactivate,
            category.as_str(),
            identifier.as_str(),
        ));
        Ok(true)
    }

    /// Deactivate if active, then delete the available artifact
    pub fn remove(&self, category: &Category, identifier: &Identifier) -> KeeperResult<()> {
        let _lock = self.store.lock(category, identifier)?;

        if !self.store.exists(category, identifier) {
            return Err(KeeperError::artifact_not_found(
                category.as_str(),
                identifier.as_str(),
            ));
        }

        self.deactivate_unlocked(category, identifier)?;
        self.store.delete_available(category, identifier)?;

        info!("Removed {}/{}", category, identifier);
        self.store.log(&AuditEntry::success(
            Operation::Remove,
            category.as_str(),
            identifier.as_str(),
        ));
        Ok(())
    }

    /// Write artifact content, re-validating it if the artifact is active
    ///
    /// If re-activation fails the previous content is written back, so the
    /// marker never points at rejected content.
    pub fn write(
        &self,
        category: &Category,
        identifier: &Identifier,
        content: &str,
        overwrite: bool,
    ) -> KeeperResult<ConfigArtifact> {
        let _lock = self.store.lock(category, identifier)?;
        self.replace_content_unlocked(category, identifier, content, overwrite)?;
        self.store.log(&AuditEntry::success(
            Operation::Write,
            category.as_str(),
            identifier.as_str(),
        ));
        self.store.get(category, identifier)
    }

    /// Returns whether the artifact was re-activated
    pub(crate) fn replace_content_unlocked(
        &self,
        category: &Category,
        identifier: &Identifier,
        content: &str,
        overwrite: bool,
    ) -> KeeperResult<bool> {
        let previous = if self.store.exists(category, identifier) {
            Some(self.store.read(category, identifier)?)
        } else {
            None
        };
        let was_active = self.store.is_active(category, identifier)?;

        self.store
            .write_unlocked(category, identifier, content, overwrite)?;

        if !was_active {
            return Ok(false);
        }

        if let Err(e) = self.activate_unlocked(category, identifier) {
            if let Some(previous) = previous {
                if let Err(restore_err) =
                    self.store
                        .write_unlocked(category, identifier, &previous, true)
                {
                    error!(
                        "Failed to restore previous content of {}/{}: {}",
                        category, identifier, restore_err
                    );
                }
            }
            return Err(e);
        }

        Ok(true)
    }

    /// Apply a line-oriented transformation to an artifact
    ///
    /// Unrecognized lines are preserved verbatim. An active artifact is
    /// re-validated and re-applied; on failure the old content is restored.
    pub fn mutate<F>(
        &self,
        category: &Category,
        identifier: &Identifier,
        patch_fn: F,
    ) -> KeeperResult<MutationReport>
    where
        F: FnOnce(&mut ConfigDocument),
    {
        let _lock = self.store.lock(category, identifier)?;

        let before = self.store.read(category, identifier)?;
        let syntax = self.store.settings().category(category).key_syntax;
        let mut document = ConfigDocument::parse(&before, syntax);
        let before_entries = document.entry_map();

        patch_fn(&mut document);
        let after = document.render();
        if after == before {
            debug!("{}/{} unchanged", category, identifier);
            return Ok(MutationReport {
                diff: None,
                reactivated: false,
            });
        }

        let diff = diff_entries(&before_entries, &document.entry_map());

        match self.replace_content_unlocked(category, identifier, &after, true) {
            Ok(reactivated) => {
                self.store.log(
                    &AuditEntry::success(Operation::Mutate, category.as_str(), identifier.as_str())
                        .with_diff(diff.clone()),
                );
                Ok(MutationReport { diff, reactivated })
            }
            Err(e) => {
                self.store.log(
                    &AuditEntry::new(
                        Operation::Mutate,
                        category.as_str(),
                        Some(identifier.to_string()),
                        Outcome::RolledBack,
                    )
                    .with_detail(e.to_string())
                    .with_diff(diff),
                );
                Err(e)
            }
        }
    }

    /// Apply a declarative key patch
    pub fn apply_patch(
        &self,
        category: &Category,
        identifier: &Identifier,
        patch: &ConfigPatch,
    ) -> KeeperResult<MutationReport> {
        self.mutate(category, identifier, |document| patch.apply(document))
    }

    /// Render a template, write the result and optionally activate it
    ///
    /// Nothing is written if rendering fails. If activation fails the
    /// artifact stays available and the error is returned.
    pub fn provision(
        &self,
        category: &Category,
        identifier: &Identifier,
        template: &Template,
        parameters: &BTreeMap<String, String>,
        overwrite: bool,
        enable: bool,
    ) -> KeeperResult<ProvisionOutcome> {
        if let Some(expected) = &template.category {
            if expected != category.as_str() {
                return Err(KeeperError::InvalidInput(format!(
                    "Template '{}' produces {} artifacts, not {}",
                    template.name, expected, category
                )));
            }
        }

        let content = render(template, parameters)?;

        let _lock = self.store.lock(category, identifier)?;
        let reactivated =
            self.replace_content_unlocked(category, identifier, &content, overwrite)?;
        self.store.log(
            &AuditEntry::success(Operation::Write, category.as_str(), identifier.as_str())
                .with_detail(format!("rendered from template '{}'", template.name)),
        );

        let activation = if enable && !reactivated {
            Some(self.activate_unlocked(category, identifier)?)
        } else {
            None
        };

        Ok(ProvisionOutcome {
            artifact: self.store.get(category, identifier)?,
            activation,
        })
    }

    /// Put the marker back after a failed apply, folding any failure into the diagnostic
    fn rollback_marker(
        &self,
        category: &Category,
        identifier: &Identifier,
        previous: Option<PathBuf>,
        diagnostic: String,
    ) -> String {
        debug!("{}/{}: {}", category, identifier, ActivationState::RolledBack);
        match self
            .store
            .restore_marker(category, identifier, previous.as_deref())
        {
            Ok(()) => diagnostic,
            Err(e) => {
                error!(
                    "Failed to roll back marker for {}/{}: {}",
                    category, identifier, e
                );
                format!("{}; marker rollback also failed: {}", diagnostic, e)
            }
        }
    }

    fn audit_rollback(
        &self,
        operation: Operation,
        category: &Category,
        identifier: &Identifier,
        diagnostic: &str,
    ) {
        self.store.log(
            &AuditEntry::new(
                operation,
                category.as_str(),
                Some(identifier.to_string()),
                Outcome::RolledBack,
            )
            .with_detail(diagnostic),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostPaths, Settings};
    use crate::services::ScriptedController;
    use tempfile::TempDir;

    struct Fixture {
        store: ArtifactStore,
        controller: ScriptedController,
        _temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let paths = HostPaths::with_base_dir(temp.path().to_path_buf());
            Self {
                store: ArtifactStore::new(paths, Settings::default()).unwrap(),
                controller: ScriptedController::new(),
                _temp: temp,
            }
        }

        fn lifecycle(&self) -> Lifecycle<'_> {
            Lifecycle::new(&self.store, &self.controller)
        }
    }

    fn jail_sshd() -> (Category, Identifier) {
        (
            Category::parse("jail").unwrap(),
            Identifier::parse("sshd").unwrap(),
        )
    }

    #[test]
    fn test_activate_success() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.store.write(&jail, &sshd, "[sshd]\n", false).unwrap();

        let report = fx.lifecycle().activate(&jail, &sshd).unwrap();
        assert_eq!(
            report.transitions,
            vec![
                ActivationState::Available,
                ActivationState::PendingValidation,
                ActivationState::Active
            ]
        );
        assert!(fx.store.is_active(&jail, &sshd).unwrap());
        assert_eq!(fx.controller.calls(), vec!["check jail/sshd", "apply jail"]);
    }

    #[test]
    fn test_validation_failure_leaves_marker_untouched() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.store.write(&jail, &sshd, "X", false).unwrap();
        fx.controller.fail_check("unknown option 'bogus'");

        let err = fx.lifecycle().activate(&jail, &sshd).unwrap_err();
        assert!(matches!(err, KeeperError::Validation { .. }));
        assert!(err.to_string().contains("bogus"));
        assert!(!fx.store.is_active(&jail, &sshd).unwrap());
        assert_eq!(fx.store.marker_target(&jail, &sshd).unwrap(), None);
        assert_eq!(fx.store.read(&jail, &sshd).unwrap(), "X");
        assert_eq!(fx.controller.count("apply"), 0);
    }

    #[test]
    fn test_apply_failure_removes_new_marker() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.store.write(&jail, &sshd, "X", false).unwrap();
        fx.controller.fail_apply("reload failed");

        let err = fx.lifecycle().activate(&jail, &sshd).unwrap_err();
        assert!(matches!(err, KeeperError::Activation { .. }));
        assert!(!fx.store.is_active(&jail, &sshd).unwrap());
        assert_eq!(fx.store.marker_target(&jail, &sshd).unwrap(), None);
    }

    #[test]
    fn test_apply_failure_keeps_existing_marker() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.store.write(&jail, &sshd, "X", false).unwrap();
        fx.lifecycle().activate(&jail, &sshd).unwrap();

        fx.controller.fail_apply("reload failed");
        assert!(fx.lifecycle().activate(&jail, &sshd).is_err());
        assert!(fx.store.is_active(&jail, &sshd).unwrap());
    }

    #[test]
    fn test_activate_missing_artifact() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        assert!(fx.lifecycle().activate(&jail, &sshd).unwrap_err().is_not_found());
        assert!(fx.controller.calls().is_empty());
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.store.write(&jail, &sshd, "X", false).unwrap();
        fx.lifecycle().activate(&jail, &sshd).unwrap();

        assert!(fx.lifecycle().deactivate(&jail, &sshd).unwrap());
        assert!(!fx.lifecycle().deactivate(&jail, &sshd).unwrap());
        assert!(!fx.store.is_active(&jail, &sshd).unwrap());
        // Only the first deactivate reloads the service
        assert_eq!(fx.controller.count("apply"), 2);
    }

    #[test]
    fn test_deactivate_apply_failure_restores_marker() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.store.write(&jail, &sshd, "X", false).unwrap();
        fx.lifecycle().activate(&jail, &sshd).unwrap();

        fx.controller.fail_apply("reload failed");
        let err = fx.lifecycle().deactivate(&jail, &sshd).unwrap_err();
        assert!(err.is_rollback());
        assert!(fx.store.is_active(&jail, &sshd).unwrap());
    }

    #[test]
    fn test_remove_active_artifact() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.store.write(&jail, &sshd, "X", false).unwrap();
        fx.lifecycle().activate(&jail, &sshd).unwrap();

        fx.lifecycle().remove(&jail, &sshd).unwrap();
        assert!(!fx.store.exists(&jail, &sshd));
        assert_eq!(fx.store.marker_target(&jail, &sshd).unwrap(), None);
        assert!(fx.lifecycle().remove(&jail, &sshd).unwrap_err().is_not_found());
    }

    #[test]
    fn test_mutate_preserves_unknown_lines_and_reactivates() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        let original = "# managed\n[sshd]\nenabled = true\nmaxretry = 5\n";
        fx.store.write(&jail, &sshd, original, false).unwrap();
        fx.lifecycle().activate(&jail, &sshd).unwrap();

        let report = fx
            .lifecycle()
            .mutate(&jail, &sshd, |doc| {
                doc.set("maxretry", "3");
                doc.set("bantime", "3600");
            })
            .unwrap();

        assert!(report.reactivated);
        assert_eq!(
            fx.store.read(&jail, &sshd).unwrap(),
            "# managed\n[sshd]\nenabled = true\nmaxretry = 3\nbantime = 3600\n"
        );
        let diff = report.diff.unwrap();
        assert!(diff.contains("maxretry: \"5\" -> \"3\""));
        assert_eq!(fx.controller.count("check"), 2);

        let last = fx.store.audit().read_recent(1).unwrap().remove(0);
        assert_eq!(last.operation, Operation::Mutate);
        assert!(last.diff_summary.is_some());
    }

    #[test]
    fn test_mutate_rejected_restores_previous_content() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        let original = "[sshd]\nmaxretry = 5\n";
        fx.store.write(&jail, &sshd, original, false).unwrap();
        fx.lifecycle().activate(&jail, &sshd).unwrap();

        fx.controller.fail_check("maxretry must be positive");
        let err = fx
            .lifecycle()
            .mutate(&jail, &sshd, |doc| doc.set("maxretry", "-1"))
            .unwrap_err();

        assert!(matches!(err, KeeperError::Validation { .. }));
        assert_eq!(fx.store.read(&jail, &sshd).unwrap(), original);
        assert!(fx.store.is_active(&jail, &sshd).unwrap());
    }

    #[test]
    fn test_mutate_inactive_does_not_validate() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.store.write(&jail, &sshd, "[sshd]\n", false).unwrap();

        let patch = ConfigPatch::from_assignments(&["enabled=false".to_string()], &[]).unwrap();
        let report = fx.lifecycle().apply_patch(&jail, &sshd, &patch).unwrap();
        assert!(!report.reactivated);
        assert_eq!(fx.store.read(&jail, &sshd).unwrap(), "[sshd]\nenabled = false\n");
        assert!(fx.controller.calls().is_empty());
    }

    #[test]
    fn test_mutate_without_change_writes_nothing() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.store.write(&jail, &sshd, "maxretry = 5\n", false).unwrap();

        let report = fx
            .lifecycle()
            .mutate(&jail, &sshd, |doc| doc.set("maxretry", "5"))
            .unwrap();
        assert!(report.diff.is_none());
    }

    #[test]
    fn test_mutate_crlf_without_change_skips_reload() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        let original = "[sshd]\r\nmaxretry = 5\r\n";
        fx.store.write(&jail, &sshd, original, false).unwrap();
        fx.lifecycle().activate(&jail, &sshd).unwrap();
        let calls = fx.controller.calls().len();

        let report = fx
            .lifecycle()
            .mutate(&jail, &sshd, |doc| doc.set("maxretry", "5"))
            .unwrap();

        assert!(report.diff.is_none());
        assert!(!report.reactivated);
        assert_eq!(fx.controller.calls().len(), calls);
        assert_eq!(fx.store.read(&jail, &sshd).unwrap(), original);
    }

    #[test]
    fn test_write_over_active_artifact_revalidates() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        fx.lifecycle().write(&jail, &sshd, "good", false).unwrap();
        fx.lifecycle().activate(&jail, &sshd).unwrap();

        fx.controller.fail_check("bad");
        assert!(fx.lifecycle().write(&jail, &sshd, "bad", true).is_err());
        assert_eq!(fx.store.read(&jail, &sshd).unwrap(), "good");
        assert!(fx.store.is_active(&jail, &sshd).unwrap());
    }

    #[test]
    fn test_provision_from_template() {
        let fx = Fixture::new();
        let vhost = Category::parse("vhost").unwrap();
        let site = Identifier::parse("a.test").unwrap();
        let template = Template::new("site", "listen {{port}}; name {{host}};").with_category("vhost");
        let params: BTreeMap<String, String> = [("port", "80"), ("host", "a.test")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let outcome = fx
            .lifecycle()
            .provision(&vhost, &site, &template, &params, false, true)
            .unwrap();
        assert_eq!(outcome.artifact.content, "listen 80; name a.test;");
        assert!(outcome.artifact.active);
        assert!(outcome.activation.is_some());
    }

    #[test]
    fn test_provision_render_failure_writes_nothing() {
        let fx = Fixture::new();
        let vhost = Category::parse("vhost").unwrap();
        let site = Identifier::parse("a.test").unwrap();
        let template = Template::new("site", "listen {{port}}; name {{host}};");

        let err = fx
            .lifecycle()
            .provision(&vhost, &site, &template, &BTreeMap::new(), false, true)
            .unwrap_err();
        assert!(matches!(err, KeeperError::Template { .. }));
        assert!(!fx.store.exists(&vhost, &site));
    }

    #[test]
    fn test_provision_rejects_wrong_category() {
        let fx = Fixture::new();
        let (jail, sshd) = jail_sshd();
        let template = Template::new("site", "x").with_category("vhost");

        let err = fx
            .lifecycle()
            .provision(&jail, &sshd, &template, &BTreeMap::new(), false, false)
            .unwrap_err();
        assert!(matches!(err, KeeperError::InvalidInput(_)));
    }
}
