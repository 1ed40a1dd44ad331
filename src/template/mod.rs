//! Template rendering
//!
//! A template is a text blueprint with `{{name}}` placeholders. Rendering is
//! literal substitution: every declared parameter must be supplied, values
//! are inserted verbatim, and nothing is produced unless all of them resolve.

pub mod library;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{KeeperError, KeeperResult};

pub use library::TemplateLibrary;

const PLACEHOLDER: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}";

fn placeholder_pattern() -> KeeperResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PLACEHOLDER))
        .as_ref()
        .map_err(|e| KeeperError::InvalidInput(format!("Bad placeholder pattern: {}", e)))
}

/// A parameterized text blueprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Name the template is looked up by
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Category the rendered artifact belongs to, if fixed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Explicitly declared parameters; placeholders in `body` are added
    #[serde(default)]
    pub parameters: Vec<String>,

    pub body: String,
}

impl Template {
    /// Create a template whose parameters are the placeholders in `body`
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: None,
            parameters: Vec::new(),
            body: body.into(),
        }
    }

    /// Builder: set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: fix the target category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Ordered set of parameter names required to render
    ///
    /// Explicit parameters come first, then body placeholders in first-seen order.
    pub fn required_parameters(&self) -> KeeperResult<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        let pattern = placeholder_pattern()?;

        let found = pattern
            .captures_iter(&self.body)
            .map(|caps| caps[1].to_string());

        for name in self.parameters.iter().cloned().chain(found) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Fill a template with parameter values
///
/// Fails with `KeeperError::Template` listing every unresolved parameter.
/// Parameters the template does not use are ignored.
pub fn render(template: &Template, parameters: &BTreeMap<String, String>) -> KeeperResult<String> {
    let missing: Vec<String> = template
        .required_parameters()?
        .into_iter()
        .filter(|name| !parameters.contains_key(name))
        .collect();

    if !missing.is_empty() {
        return Err(KeeperError::Template {
            template: template.name.clone(),
            missing,
        });
    }

    let rendered = placeholder_pattern()?.replace_all(&template.body, |caps: &Captures| {
        // Every placeholder was checked above
        parameters.get(&caps[1]).cloned().unwrap_or_default()
    });

    Ok(rendered.into_owned())
}

/// Parse `key=value` pairs given on the command line
pub fn parse_parameters(pairs: &[String]) -> KeeperResult<BTreeMap<String, String>> {
    let mut parameters = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            KeeperError::InvalidInput(format!("Expected key=value, got '{}'", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(KeeperError::InvalidInput(format!(
                "Empty parameter name in '{}'",
                pair
            )));
        }
        parameters.insert(key.to_string(), value.to_string());
    }
    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_listen_line() {
        let template = Template::new("site", "listen {{port}}; name {{host}};");
        let output = render(&template, &params(&[("port", "80"), ("host", "a.test")])).unwrap();
        assert_eq!(output, "listen 80; name a.test;");
    }

    #[test]
    fn test_missing_parameter_fails() {
        let template = Template::new("site", "listen {{port}}; name {{host}};");
        let err = render(&template, &params(&[("port", "80")])).unwrap_err();

        match err {
            KeeperError::Template { template, missing } => {
                assert_eq!(template, "site");
                assert_eq!(missing, vec!["host".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_explicit_parameter_is_required_even_if_unused() {
        let mut template = Template::new("jail", "[{{ jail }}]\nenabled = true\n");
        template.parameters = vec!["logpath".into()];

        assert_eq!(
            template.required_parameters().unwrap(),
            vec!["logpath".to_string(), "jail".to_string()]
        );
        assert!(render(&template, &params(&[("jail", "sshd")])).is_err());
    }

    #[test]
    fn test_repeated_placeholder_and_whitespace() {
        let template = Template::new("pool", "[{{pool}}]\nlisten = /run/{{ pool }}.sock\n");
        assert_eq!(template.required_parameters().unwrap(), vec!["pool".to_string()]);

        let output = render(&template, &params(&[("pool", "www")])).unwrap();
        assert_eq!(output, "[www]\nlisten = /run/www.sock\n");
    }

    #[test]
    fn test_values_inserted_verbatim() {
        let template = Template::new("t", "root {{root}};");
        let output = render(&template, &params(&[("root", "/srv/{{x}} $1")])).unwrap();
        assert_eq!(output, "root /srv/{{x}} $1;");
    }

    #[test]
    fn test_parse_parameters() {
        let parsed =
            parse_parameters(&["port=80".to_string(), "root=/srv/a=b".to_string()]).unwrap();
        assert_eq!(parsed["port"], "80");
        assert_eq!(parsed["root"], "/srv/a=b");
        assert!(parse_parameters(&["port".to_string()]).is_err());
        assert!(parse_parameters(&["=80".to_string()]).is_err());
    }
}
