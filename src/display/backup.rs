//! Backup display formatting
//!
//! Backup listings, manifest details and per-component restore reports.

use chrono::Utc;

use crate::backup::{Backup, ComponentStatus, RestoreReport};
use crate::models::Component;

/// Format a category's backups, newest first
pub fn format_backup_list(backups: &[Backup]) -> String {
    if backups.is_empty() {
        return "No backups found.".to_string();
    }

    let name_width = backups
        .iter()
        .map(|b| b.name().len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<name_width$}  {:<11}  {:>6}  {:>10}  {}\n",
        "Name",
        "Kind",
        "Age",
        "Size",
        "Components",
        name_width = name_width,
    ));
    output.push_str(&format!(
        "{:-<name_width$}  {:-<11}  {:->6}  {:->10}  {:-<10}\n",
        "",
        "",
        "",
        "",
        "",
        name_width = name_width,
    ));

    for backup in backups {
        let age = Utc::now().signed_duration_since(backup.created_at());
        output.push_str(&format!(
            "{:<name_width$}  {:<11}  {:>6}  {:>10}  {}\n",
            backup.name(),
            backup.kind().to_string(),
            format_duration(age),
            format_size(backup.size_bytes),
            component_names(&backup.manifest.included()),
            name_width = name_width,
        ));
    }

    output.push_str(&format!("\nTotal: {} backup(s)\n", backups.len()));
    output
}

/// Format one backup's manifest
pub fn format_backup_details(backup: &Backup) -> String {
    let manifest = &backup.manifest;
    let mut output = String::new();

    output.push_str(&format!("Backup: {}\n", manifest.name));
    output.push_str(&format!("  Category: {}\n", manifest.category));
    output.push_str(&format!("  Kind:     {}\n", manifest.kind));
    output.push_str(&format!(
        "  Created:  {}\n",
        manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("  Format:   v{}\n", manifest.format_version));
    output.push_str(&format!("  File:     {}\n", backup.archive_path.display()));
    output.push_str(&format!("  Size:     {}\n", format_size(backup.size_bytes)));
    output.push('\n');
    output.push_str("Contents:\n");

    for component in Component::all() {
        let files = manifest
            .checksums
            .keys()
            .filter(|key| key.starts_with(&format!("{}/", component.dir_name())))
            .count();
        let present = if manifest.includes(component) {
            format!("Yes ({} file(s))", files)
        } else {
            "No".to_string()
        };
        output.push_str(&format!("  {:<15} {}\n", format!("{}:", component), present));
    }

    if !manifest.active_artifacts.is_empty() {
        output.push('\n');
        output.push_str(&format!(
            "Active at backup time: {}\n",
            manifest.active_artifacts.join(", ")
        ));
    }

    output
}

/// Format a restore report, one line per component and item
pub fn format_restore_report(report: &RestoreReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Restore of {} from '{}' ({} mode)\n",
        report.category, report.backup, report.mode
    ));
    if let Some(safety) = &report.safety_backup {
        output.push_str(&format!("Safety backup: {}\n", safety));
    }
    output.push('\n');

    if report.components.is_empty() {
        output.push_str("Nothing to restore.\n");
        return output;
    }

    for component in &report.components {
        output.push_str(&format!(
            "{:<14} {}\n",
            format!("{}:", component.component),
            component.status
        ));
        for item in &component.items {
            let marker = match item.status {
                ComponentStatus::Restored => "+",
                ComponentStatus::Skipped => "=",
                ComponentStatus::Failed => "!",
            };
            match &item.detail {
                Some(detail) => output.push_str(&format!("  {} {} ({})\n", marker, item.item, detail)),
                None => output.push_str(&format!("  {} {}\n", marker, item.item)),
            }
        }
    }

    output
}

fn component_names(components: &[Component]) -> String {
    if components.is_empty() {
        return "-".to_string();
    }
    components
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Format a duration in human-readable form
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
