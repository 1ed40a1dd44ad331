//! Structured key/value patching of configuration text
//!
//! A document is parsed into an ordered list of lines, each either a
//! recognized `key`/`value` entry or an opaque line kept verbatim. Patches
//! only touch recognized entries; untouched lines, including untouched
//! entries, re-render byte for byte.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Syntax of recognized key/value lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeySyntax {
    /// `key = value` (ini style: php-fpm pools, fail2ban jails)
    #[default]
    Equals,
    /// `key value;` (directive style: nginx, rule files)
    Space,
}

impl KeySyntax {
    fn parse_line(&self, line: &str) -> Option<(String, String, String)> {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            return None;
        }
        let indent = line[..line.len() - trimmed.len()].to_string();

        match self {
            KeySyntax::Equals => {
                if is_section_header(trimmed) {
                    return None;
                }
                let (key, value) = trimmed.split_once('=')?;
                let key = key.trim();
                if key.is_empty() || !key.chars().all(is_key_char) {
                    return None;
                }
                Some((indent, key.to_string(), value.trim().to_string()))
            }
            KeySyntax::Space => {
                let body = trimmed.trim_end();
                if body.contains('{') || body.contains('}') {
                    return None;
                }
                let body = body.strip_suffix(';').unwrap_or(body);
                let (key, value) = match body.split_once(char::is_whitespace) {
                    Some((key, value)) => (key, value.trim()),
                    None => (body, ""),
                };
                if key.is_empty() || !key.chars().all(is_key_char) {
                    return None;
                }
                Some((indent, key.to_string(), value.to_string()))
            }
        }
    }

    fn render(&self, indent: &str, key: &str, value: &str) -> String {
        match self {
            KeySyntax::Equals => format!("{}{} = {}", indent, key, value),
            KeySyntax::Space if value.is_empty() => format!("{}{};", indent, key),
            KeySyntax::Space => format!("{}{} {};", indent, key, value),
        }
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '[' | ']')
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry {
        indent: String,
        key: String,
        value: String,
        /// Original text, dropped once the entry is modified
        raw: Option<String>,
        eol: String,
    },
    Other { text: String, eol: String },
}

impl Line {
    fn eol(&self) -> &str {
        match self {
            Line::Entry { eol, .. } | Line::Other { eol, .. } => eol,
        }
    }

    fn set_eol(&mut self, ending: &str) {
        match self {
            Line::Entry { eol, .. } | Line::Other { eol, .. } => *eol = ending.to_string(),
        }
    }
}

/// A parsed configuration document
///
/// Every line keeps its own terminator, so CRLF and mixed files re-render
/// unchanged. Lines written by a patch use the document's dominant ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    syntax: KeySyntax,
    lines: Vec<Line>,
    newline: &'static str,
}

impl ConfigDocument {
    /// Parse text using the given line syntax
    pub fn parse(text: &str, syntax: KeySyntax) -> Self {
        let mut crlf = 0usize;
        let mut lf = 0usize;

        let lines = text
            .split_inclusive('\n')
            .map(|chunk| {
                let (line, eol) = if let Some(line) = chunk.strip_suffix("\r\n") {
                    crlf += 1;
                    (line, "\r\n")
                } else if let Some(line) = chunk.strip_suffix('\n') {
                    lf += 1;
                    (line, "\n")
                } else {
                    (chunk, "")
                };

                match syntax.parse_line(line) {
                    Some((indent, key, value)) => Line::Entry {
                        indent,
                        key,
                        value,
                        raw: Some(line.to_string()),
                        eol: eol.to_string(),
                    },
                    None => Line::Other {
                        text: line.to_string(),
                        eol: eol.to_string(),
                    },
                }
            })
            .collect();

        Self {
            syntax,
            lines,
            newline: if crlf > lf { "\r\n" } else { "\n" },
        }
    }

    /// Value of the first entry with this key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set a key in the last section, replacing its entries or appending one
    ///
    /// For `Equals` syntax only entries after the last `[section]` header are
    /// considered, so `[DEFAULT]` values above a jail section are left alone.
    /// Without section headers the whole document is in scope.
    pub fn set(&mut self, key: &str, value: &str) {
        let scope = self.section_start();
        let mut found = false;
        for line in &mut self.lines[scope..] {
            if let Line::Entry {
                key: k,
                value: v,
                raw,
                ..
            } = line
            {
                if k == key {
                    found = true;
                    if v != value {
                        *v = value.to_string();
                        *raw = None;
                    }
                }
            }
        }

        if !found {
            let indent = self.append_indent();
            // The new line takes over the old last line's terminator
            let eol = match self.lines.last_mut() {
                Some(last) => {
                    let eol = last.eol().to_string();
                    last.set_eol(self.newline);
                    eol
                }
                None => self.newline.to_string(),
            };
            self.lines.push(Line::Entry {
                indent,
                key: key.to_string(),
                value: value.to_string(),
                raw: None,
                eol,
            });
        }
    }

    /// Remove entries with this key from the last section, returning whether any existed
    pub fn remove(&mut self, key: &str) -> bool {
        let scope = self.section_start();
        let before = self.lines.len();
        let mut index = 0;
        self.lines.retain(|line| {
            let keep = index < scope || !matches!(line, Line::Entry { key: k, .. } if k == key);
            index += 1;
            keep
        });
        self.lines.len() != before
    }

    /// Recognized entries in document order
    pub fn entries(&self) -> Vec<(&str, &str)> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { key, value, .. } => Some((key.as_str(), value.as_str())),
                Line::Other { .. } => None,
            })
            .collect()
    }

    /// Recognized entries as a map (last occurrence wins), used for audit diffs
    pub fn entry_map(&self) -> BTreeMap<String, String> {
        self.entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Re-serialize the document
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry {
                    raw: Some(raw),
                    eol,
                    ..
                } => {
                    out.push_str(raw);
                    out.push_str(eol);
                }
                Line::Entry {
                    indent,
                    key,
                    value,
                    eol,
                    ..
                } => {
                    out.push_str(&self.syntax.render(indent, key, value));
                    out.push_str(eol);
                }
                Line::Other { text, eol } => {
                    out.push_str(text);
                    out.push_str(eol);
                }
            }
        }
        out
    }

    // Index of the first line after the last section header
    fn section_start(&self) -> usize {
        if self.syntax != KeySyntax::Equals {
            return 0;
        }
        self.lines
            .iter()
            .rposition(|line| match line {
                Line::Other { text, .. } => is_section_header(text),
                Line::Entry { .. } => false,
            })
            .map_or(0, |i| i + 1)
    }

    // New entries follow the indentation of the last existing entry
    fn append_indent(&self) -> String {
        self.lines
            .iter()
            .rev()
            .find_map(|line| match line {
                Line::Entry { indent, .. } => Some(indent.clone()),
                Line::Other { .. } => None,
            })
            .unwrap_or_default()
    }
}

fn is_section_header(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('[') && trimmed.ends_with(']')
}

/// A declarative list of key changes, as accepted from the CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    /// Keys to set, in order
    pub set: Vec<(String, String)>,
    /// Keys to remove
    pub unset: Vec<String>,
}

impl ConfigPatch {
    /// Parse `key=value` assignments
    pub fn from_assignments(assignments: &[String], unset: &[String]) -> Result<Self, String> {
        let mut set = Vec::new();
        for assignment in assignments {
            let (key, value) = assignment
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{}'", assignment))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("empty key in '{}'", assignment));
            }
            set.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self {
            set,
            unset: unset.to_vec(),
        })
    }

    /// Apply the patch to a document
    pub fn apply(&self, doc: &mut ConfigDocument) {
        for key in &self.unset {
            doc.remove(key);
        }
        for (key, value) in &self.set {
            doc.set(key, value);
        }
    }
}
