//! Artifact display formatting
//!
//! Formats configuration artifacts for terminal output in table and detail views.

use crate::models::ConfigArtifact;

/// Format a category's artifacts as a table
pub fn format_artifact_list(artifacts: &[ConfigArtifact]) -> String {
    if artifacts.is_empty() {
        return "No artifacts found.".to_string();
    }

    let name_width = artifacts
        .iter()
        .map(|a| a.identifier.as_str().len())
        .max()
        .unwrap_or(4)
        .max(10);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<name_width$}  {:<8}  {:>8}  {}\n",
        "Identifier",
        "State",
        "Size",
        "Location",
        name_width = name_width,
    ));
    output.push_str(&format!(
        "{:-<name_width$}  {:-<8}  {:->8}  {:-<8}\n",
        "",
        "",
        "",
        "",
        name_width = name_width,
    ));

    for artifact in artifacts {
        output.push_str(&format!(
            "{:<name_width$}  {:<8}  {:>8}  {}\n",
            artifact.identifier,
            state_label(artifact),
            artifact.size_bytes(),
            artifact.location.display(),
            name_width = name_width,
        ));
    }

    let active = artifacts.iter().filter(|a| a.active).count();
    output.push_str(&format!(
        "\n{} artifact(s), {} active\n",
        artifacts.len(),
        active
    ));
    output
}

/// Format a single artifact with its content
pub fn format_artifact_details(artifact: &ConfigArtifact) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Artifact: {}/{}\n",
        artifact.category, artifact.identifier
    ));
    output.push_str(&format!("  State:    {}\n", state_label(artifact)));
    output.push_str(&format!("  Location: {}\n", artifact.location.display()));
    output.push_str(&format!("  Size:     {} bytes\n", artifact.size_bytes()));
    output.push('\n');
    output.push_str(&artifact.content);
    if !artifact.content.ends_with('\n') {
        output.push('\n');
    }

    output
}

fn state_label(artifact: &ConfigArtifact) -> &'static str {
    if artifact.active {
        "active"
    } else {
        "inactive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Identifier};
    use std::path::PathBuf;

    fn artifact(id: &str, active: bool) -> ConfigArtifact {
        ConfigArtifact {
            identifier: Identifier::parse(id).unwrap(),
            category: Category::parse("vhost").unwrap(),
            content: "server {\n}\n".into(),
            location: PathBuf::from(format!("/etc/nginx/sites-available/{}.conf", id)),
            active,
        }
    }

    #[test]
    fn test_format_artifact_list() {
        let output = format_artifact_list(&[artifact("example.com", true), artifact("blog", false)]);
        assert!(output.contains("example.com"));
        assert!(output.contains("inactive"));
        assert!(output.contains("2 artifact(s), 1 active"));
    }

    #[test]
    fn test_format_empty_list() {
        assert!(format_artifact_list(&[]).contains("No artifacts found"));
    }

    #[test]
    fn test_format_artifact_details() {
        let output = format_artifact_details(&artifact("example.com", true));
        assert!(output.contains("Artifact: vhost/example.com"));
        assert!(output.contains("server {"));
    }
}
