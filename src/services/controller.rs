//! Service controllers
//!
//! The lifecycle only talks to a service through `ServiceController`:
//! `check` a candidate artifact, `apply` the category's live configuration,
//! and optionally snapshot/restore runtime state. Outcomes are pass/fail with
//! diagnostic text.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Settings;
use crate::models::{Category, ConfigArtifact};

/// Validation/reload collaborator for a service category
pub trait ServiceController {
    /// Test a candidate artifact; `Err` carries the service's diagnostic
    fn check(&self, artifact: &ConfigArtifact) -> Result<(), String>;

    /// Reload/apply the category's active configuration
    fn apply(&self, category: &Category) -> Result<(), String>;

    /// Current runtime state as text, `None` if the category has none
    fn snapshot_state(&self, category: &Category) -> Result<Option<String>, String> {
        let _ = category;
        Ok(None)
    }

    /// Re-apply previously captured runtime state
    fn restore_state(&self, category: &Category, state: &str) -> Result<(), String> {
        let _ = state;
        Err(format!("{} has no runtime state to restore", category))
    }
}

/// Controller that runs the shell commands configured per category
///
/// A command that is not configured counts as success. Commands run under
/// `sh -c` with `HOSTKEEPER_CATEGORY` (and, for checks,
/// `HOSTKEEPER_IDENTIFIER`/`HOSTKEEPER_ARTIFACT`) in the environment.
#[derive(Debug, Clone)]
pub struct CommandController {
    settings: Settings,
}

impl CommandController {
    pub fn new(settings: &Settings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    fn timeout(&self, category: &Category) -> Option<Duration> {
        self.settings
            .category(category)
            .command_timeout_secs
            .map(Duration::from_secs)
    }
}

impl ServiceController for CommandController {
    fn check(&self, artifact: &ConfigArtifact) -> Result<(), String> {
        let settings = self.settings.category(&artifact.category);
        let Some(command) = settings.check_command else {
            debug!("No check command for {}, accepting", artifact.category);
            return Ok(());
        };

        let env = [
            ("HOSTKEEPER_CATEGORY", artifact.category.to_string()),
            ("HOSTKEEPER_IDENTIFIER", artifact.identifier.to_string()),
            (
                "HOSTKEEPER_ARTIFACT",
                artifact.location.display().to_string(),
            ),
        ];
        run_command(
            &command,
            &env,
            Some(&artifact.content),
            self.timeout(&artifact.category),
        )
        .map(|_| ())
    }

    fn apply(&self, category: &Category) -> Result<(), String> {
        let Some(command) = self.settings.category(category).apply_command else {
            debug!("No apply command for {}, nothing to reload", category);
            return Ok(());
        };

        let env = [("HOSTKEEPER_CATEGORY", category.to_string())];
        run_command(&command, &env, None, self.timeout(category)).map(|_| ())
    }

    fn snapshot_state(&self, category: &Category) -> Result<Option<String>, String> {
        let Some(command) = self.settings.category(category).state_command else {
            return Ok(None);
        };

        let env = [("HOSTKEEPER_CATEGORY", category.to_string())];
        run_command(&command, &env, None, self.timeout(category)).map(Some)
    }

    fn restore_state(&self, category: &Category, state: &str) -> Result<(), String> {
        let Some(command) = self.settings.category(category).restore_state_command else {
            return Err(format!(
                "no restore_state_command configured for {}",
                category
            ));
        };

        let env = [("HOSTKEEPER_CATEGORY", category.to_string())];
        run_command(&command, &env, Some(state), self.timeout(category)).map(|_| ())
    }
}

/// Run a shell command, returning stdout on success or a diagnostic on failure
fn run_command(
    command: &str,
    env: &[(&str, String)],
    input: Option<&str>,
    timeout: Option<Duration>,
) -> Result<String, String> {
    debug!("Running `{}`", command);

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("failed to run `{}`: {}", command, e))?;

    if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
        let text = text.to_string();
        // The command may exit without reading; a broken pipe is not a failure here
        thread::spawn(move || {
            let _ = stdin.write_all(text.as_bytes());
        });
    }
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let waited = match timeout {
        Some(duration) => wait_with_timeout(&mut child, duration),
        None => child.wait().map(Some),
    }
    .map_err(|e| format!("failed while waiting for `{}`: {}", command, e))?;

    let Some(status) = waited else {
        warn!("`{}` timed out, terminating it", command);
        let _ = child.kill();
        let _ = child.wait();
        return Err(format!(
            "`{}` timed out after {}s",
            command,
            timeout.map(|d| d.as_secs()).unwrap_or_default()
        ));
    };

    let out = stdout.map(join_reader).unwrap_or_default();
    let err = stderr.map(join_reader).unwrap_or_default();

    if status.success() {
        Ok(out)
    } else {
        let detail = if !err.trim().is_empty() {
            err.trim().to_string()
        } else {
            out.trim().to_string()
        };
        let status_text = match status.code() {
            Some(code) => format!("exited with status {}", code),
            None => "was terminated by a signal".to_string(),
        };
        if detail.is_empty() {
            Err(format!("`{}` {}", command, status_text))
        } else {
            Err(format!("`{}` {}: {}", command, status_text, detail))
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();
        let _ = reader.read_to_string(&mut buffer);
        buffer
    })
}

fn join_reader(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    check_all: Option<String>,
    check_for: BTreeMap<String, String>,
    apply: Option<String>,
    state: Option<String>,
    calls: Vec<String>,
}

/// Deterministic controller with scripted outcomes
///
/// Everything passes until told otherwise. Every call is recorded as
/// `"check <category>/<identifier>"`, `"apply <category>"`,
/// `"snapshot <category>"` or `"restore-state <category>"`.
#[derive(Debug, Default)]
pub struct ScriptedController {
    script: RefCell<Script>,
}

impl ScriptedController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every check with `diagnostic`
    pub fn fail_check(&self, diagnostic: &str) {
        self.script.borrow_mut().check_all = Some(diagnostic.to_string());
    }

    /// Reject checks of one identifier
    pub fn fail_check_for(&self, identifier: &str, diagnostic: &str) {
        self.script
            .borrow_mut()
            .check_for
            .insert(identifier.to_string(), diagnostic.to_string());
    }

    /// Fail every apply with `diagnostic`
    pub fn fail_apply(&self, diagnostic: &str) {
        self.script.borrow_mut().apply = Some(diagnostic.to_string());
    }

    /// Clear every scripted failure
    pub fn pass_all(&self) {
        let mut script = self.script.borrow_mut();
        script.check_all = None;
        script.check_for.clear();
        script.apply = None;
    }

    /// Set the live runtime state returned by `snapshot_state`
    pub fn set_state(&self, state: &str) {
        self.script.borrow_mut().state = Some(state.to_string());
    }

    /// Current live runtime state
    pub fn state(&self) -> Option<String> {
        self.script.borrow().state.clone()
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<String> {
        self.script.borrow().calls.clone()
    }

    /// Number of recorded calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.script
            .borrow()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

impl ServiceController for ScriptedController {
    fn check(&self, artifact: &ConfigArtifact) -> Result<(), String> {
        let mut script = self.script.borrow_mut();
        script
            .calls
            .push(format!("check {}/{}", artifact.category, artifact.identifier));

        if let Some(diagnostic) = script.check_for.get(artifact.identifier.as_str()) {
            return Err(diagnostic.clone());
        }
        match &script.check_all {
            Some(diagnostic) => Err(diagnostic.clone()),
            None => Ok(()),
        }
    }

    fn apply(&self, category: &Category) -> Result<(), String> {
        let mut script = self.script.borrow_mut();
        script.calls.push(format!("apply {}", category));
        match &script.apply {
            Some(diagnostic) => Err(diagnostic.clone()),
            None => Ok(()),
        }
    }

    fn snapshot_state(&self, category: &Category) -> Result<Option<String>, String> {
        let mut script = self.script.borrow_mut();
        script.calls.push(format!("snapshot {}", category));
        Ok(script.state.clone())
    }

    /// Adds every line of `state` not already present
    fn restore_state(&self, category: &Category, state: &str) -> Result<(), String> {
        let mut script = self.script.borrow_mut();
        script.calls.push(format!("restore-state {}", category));

        let mut lines: Vec<String> = script
            .state
            .as_deref()
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect();
        for line in state.lines() {
            if !line.trim().is_empty() && !lines.iter().any(|l| l == line) {
                lines.push(line.to_string());
            }
        }

        let mut joined = lines.join("\n");
        if !joined.is_empty() {
            joined.push('\n');
        }
        script.state = Some(joined);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategorySettings;
    use crate::models::Identifier;
    use std::path::PathBuf;

    fn artifact(content: &str) -> ConfigArtifact {
        ConfigArtifact {
            identifier: Identifier::parse("sshd").unwrap(),
            category: Category::parse("jail").unwrap(),
            content: content.to_string(),
            location: PathBuf::from("/tmp/sshd.local"),
            active: false,
        }
    }

    fn controller_with(category: CategorySettings) -> CommandController {
        let mut settings = Settings::default();
        settings.categories.insert("jail".into(), category);
        CommandController::new(&settings)
    }

    #[test]
    fn test_unconfigured_commands_pass() {
        let controller = controller_with(CategorySettings::default());
        let jail = Category::parse("jail").unwrap();

        assert!(controller.check(&artifact("[sshd]")).is_ok());
        assert!(controller.apply(&jail).is_ok());
        assert_eq!(controller.snapshot_state(&jail).unwrap(), None);
        assert!(controller.restore_state(&jail, "1.2.3.4").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_check_reads_content_and_env() {
        let controller = controller_with(CategorySettings {
            check_command: Some(
                "grep -q enabled && test \"$HOSTKEEPER_IDENTIFIER\" = sshd".into(),
            ),
            ..CategorySettings::default()
        });

        assert!(controller.check(&artifact("[sshd]\nenabled = true\n")).is_ok());
        assert!(controller.check(&artifact("[sshd]\n")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_check_exports_artifact_path() {
        let controller = controller_with(CategorySettings {
            check_command: Some(
                "test \"$HOSTKEEPER_ARTIFACT\" = /tmp/sshd.local && test \"$HOSTKEEPER_CATEGORY\" = jail"
                    .into(),
            ),
            ..CategorySettings::default()
        });

        assert!(controller.check(&artifact("[sshd]\n")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_stderr() {
        let controller = controller_with(CategorySettings {
            apply_command: Some("echo 'reload failed: bad jail' >&2; exit 3".into()),
            ..CategorySettings::default()
        });

        let err = controller
            .apply(&Category::parse("jail").unwrap())
            .unwrap_err();
        assert!(err.contains("status 3"));
        assert!(err.contains("reload failed: bad jail"));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_command() {
        let controller = controller_with(CategorySettings {
            apply_command: Some("sleep 5".into()),
            command_timeout_secs: Some(0),
            ..CategorySettings::default()
        });

        let err = controller
            .apply(&Category::parse("jail").unwrap())
            .unwrap_err();
        assert!(err.contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn test_state_round_trip_through_commands() {
        let controller = controller_with(CategorySettings {
            state_command: Some("printf '10.0.0.1\\n10.0.0.2\\n'".into()),
            restore_state_command: Some("grep -q 10.0.0.9".into()),
            ..CategorySettings::default()
        });
        let jail = Category::parse("jail").unwrap();

        assert_eq!(
            controller.snapshot_state(&jail).unwrap().as_deref(),
            Some("10.0.0.1\n10.0.0.2\n")
        );
        assert!(controller.restore_state(&jail, "10.0.0.9\n").is_ok());
        assert!(controller.restore_state(&jail, "10.0.0.1\n").is_err());
    }

    #[test]
    fn test_scripted_controller() {
        let controller = ScriptedController::new();
        let jail = Category::parse("jail").unwrap();

        assert!(controller.check(&artifact("x")).is_ok());
        controller.fail_check_for("sshd", "syntax error");
        assert_eq!(controller.check(&artifact("x")).unwrap_err(), "syntax error");

        controller.fail_apply("reload failed");
        assert!(controller.apply(&jail).is_err());
        controller.pass_all();
        assert!(controller.apply(&jail).is_ok());

        assert_eq!(controller.count("check"), 2);
        assert_eq!(controller.count("apply"), 2);
    }

    #[test]
    fn test_scripted_state_restore_adds_missing_lines() {
        let controller = ScriptedController::new();
        let jail = Category::parse("jail").unwrap();
        controller.set_state("1.1.1.1\n");

        controller.restore_state(&jail, "1.1.1.1\n2.2.2.2\n").unwrap();
        assert_eq!(controller.state().as_deref(), Some("1.1.1.1\n2.2.2.2\n"));
    }
}
