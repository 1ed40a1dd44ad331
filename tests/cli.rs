use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn hostkeeper(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hostkeeper").expect("binary should build");
    cmd.env("HOSTKEEPER_HOME", home)
        .env("HOSTKEEPER_LOG", "warn")
        .env_remove("RUST_LOG");
    cmd
}

fn create_sshd_jail(home: &Path) {
    hostkeeper(home)
        .args(["artifact", "create", "jail", "sshd", "--template", "fail2ban-jail"])
        .args(["-p", "jail=sshd", "-p", "port=ssh", "-p", "filter=sshd"])
        .args(["-p", "logpath=/var/log/auth.log", "-p", "maxretry=3", "-p", "bantime=600"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created jail/sshd"));
}

#[test]
fn init_writes_settings() {
    let temp = TempDir::new().unwrap();

    hostkeeper(temp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialization complete"));

    assert!(temp.path().join("config.json").is_file());

    hostkeeper(temp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("firewall, jail, pool, vhost"));
}

#[test]
fn template_list_and_render() {
    let temp = TempDir::new().unwrap();

    hostkeeper(temp.path())
        .args(["template", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nginx-site"))
        .stdout(predicate::str::contains("fail2ban-jail"));

    hostkeeper(temp.path())
        .args(["template", "render", "firewall-rules"])
        .args(["-p", "name=web", "-p", "port=443", "-p", "protocol=tcp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("allow 443/tcp;"));
}

#[test]
fn render_with_missing_parameter_fails() {
    let temp = TempDir::new().unwrap();

    hostkeeper(temp.path())
        .args(["template", "render", "firewall-rules", "-p", "port=443"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing values for"))
        .stderr(predicate::str::contains("protocol"));
}

#[test]
fn create_enable_and_list_artifact() {
    let temp = TempDir::new().unwrap();
    create_sshd_jail(temp.path());

    hostkeeper(temp.path())
        .args(["artifact", "enable", "jail", "sshd"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Enabled jail/sshd"));

    hostkeeper(temp.path())
        .args(["artifact", "list", "jail"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 artifact(s), 1 active"));

    hostkeeper(temp.path())
        .args(["artifact", "show", "jail", "sshd"])
        .assert()
        .success()
        .stdout(predicate::str::contains("maxretry = 3"));
}

#[test]
fn invalid_identifier_rejected() {
    let temp = TempDir::new().unwrap();

    hostkeeper(temp.path())
        .args(["artifact", "show", "jail", "../etc"])
        .assert()
        .failure();
}

#[test]
fn rejected_check_keeps_artifact_inactive() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("config.json"),
        r#"{"categories": {"jail": {"extension": "local",
            "check_command": "echo 'bad config' >&2; exit 1"}}}"#,
    )
    .unwrap();
    create_sshd_jail(temp.path());

    hostkeeper(temp.path())
        .args(["artifact", "enable", "jail", "sshd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed validation"))
        .stderr(predicate::str::contains("bad config"));

    hostkeeper(temp.path())
        .args(["artifact", "list", "jail"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 active"));
}

#[test]
fn set_reports_diff() {
    let temp = TempDir::new().unwrap();
    create_sshd_jail(temp.path());

    hostkeeper(temp.path())
        .args(["artifact", "set", "jail", "sshd", "maxretry=5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("maxretry"));

    hostkeeper(temp.path())
        .args(["artifact", "show", "jail", "sshd"])
        .assert()
        .success()
        .stdout(predicate::str::contains("maxretry = 5"));
}

#[test]
fn remove_requires_force() {
    let temp = TempDir::new().unwrap();
    create_sshd_jail(temp.path());

    hostkeeper(temp.path())
        .args(["artifact", "remove", "jail", "sshd"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));

    hostkeeper(temp.path())
        .args(["artifact", "remove", "jail", "sshd", "--force"])
        .assert()
        .success();

    hostkeeper(temp.path())
        .args(["artifact", "show", "jail", "sshd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn backup_and_restore_round_trip() {
    let temp = TempDir::new().unwrap();
    create_sshd_jail(temp.path());

    hostkeeper(temp.path())
        .args(["backup", "create", "jail", "--name", "before-change"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created: before-change"));

    hostkeeper(temp.path())
        .args(["artifact", "set", "jail", "sshd", "maxretry=9"])
        .assert()
        .success();

    hostkeeper(temp.path())
        .args(["backup", "list", "jail"])
        .assert()
        .success()
        .stdout(predicate::str::contains("before-change"));

    // Without --force nothing changes
    hostkeeper(temp.path())
        .args(["backup", "restore", "jail", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));

    hostkeeper(temp.path())
        .args(["backup", "restore", "jail", "latest", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Safety backup: pre-restore_"))
        .stdout(predicate::str::contains("configuration: restored"));

    hostkeeper(temp.path())
        .args(["artifact", "show", "jail", "sshd"])
        .assert()
        .success()
        .stdout(predicate::str::contains("maxretry = 3"));
}

#[test]
fn restore_of_missing_component_fails() {
    let temp = TempDir::new().unwrap();
    create_sshd_jail(temp.path());

    hostkeeper(temp.path())
        .args(["backup", "create", "jail", "--name", "b1"])
        .assert()
        .success();

    hostkeeper(temp.path())
        .args(["backup", "restore", "jail", "b1", "--mode", "selective"])
        .args(["--component", "data", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not contain component 'data'"));
}

#[test]
fn backup_of_unconfigured_component_fails() {
    let temp = TempDir::new().unwrap();
    create_sshd_jail(temp.path());

    hostkeeper(temp.path())
        .args(["backup", "create", "jail", "--component", "history"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("history"));

    hostkeeper(temp.path())
        .args(["backup", "list", "jail"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found"));
}

#[test]
fn audit_lists_operations() {
    let temp = TempDir::new().unwrap();
    create_sshd_jail(temp.path());

    hostkeeper(temp.path())
        .args(["artifact", "enable", "jail", "sshd"])
        .assert()
        .success();

    hostkeeper(temp.path())
        .args(["audit", "--limit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sshd"));
}
