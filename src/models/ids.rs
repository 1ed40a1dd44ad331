//! Strongly-typed name wrappers for categories and artifact identifiers
//!
//! Both end up as path components on disk, so they are validated once at the
//! boundary and can be trusted everywhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KeeperError;

/// Longest name accepted, matching common filesystem limits
const MAX_NAME_LEN: usize = 255;

/// Macro to generate validated name newtype wrappers
macro_rules! define_name {
    ($name:ident, $label:literal, $allowed:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a name
            pub fn parse(s: &str) -> Result<Self, KeeperError> {
                validate(s, $label, $allowed)?;
                Ok(Self(s.to_string()))
            }

            /// Get the underlying string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = KeeperError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = KeeperError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                validate(&s, $label, $allowed)?;
                Ok(Self(s))
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> Self {
                name.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

fn category_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'
}

fn identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

fn validate(s: &str, label: &str, allowed: fn(char) -> bool) -> Result<(), KeeperError> {
    if s.is_empty() {
        return Err(KeeperError::InvalidInput(format!("{} cannot be empty", label)));
    }
    if s.len() > MAX_NAME_LEN {
        return Err(KeeperError::InvalidInput(format!(
            "{} is longer than {} bytes",
            label, MAX_NAME_LEN
        )));
    }
    if s.starts_with('.') {
        return Err(KeeperError::InvalidInput(format!(
            "{} '{}' cannot start with '.'",
            label, s
        )));
    }
    if let Some(bad) = s.chars().find(|c| !allowed(*c)) {
        return Err(KeeperError::InvalidInput(format!(
            "{} '{}' contains invalid character '{}'",
            label, s, bad
        )));
    }
    Ok(())
}

define_name!(Category, "Category", category_char);
define_name!(Identifier, "Identifier", identifier_char);

impl Category {
    /// Web server virtual hosts
    pub const VIRTUAL_HOST: &'static str = "vhost";
    /// Process-pool definitions
    pub const PROCESS_POOL: &'static str = "pool";
    /// Intrusion-prevention jails
    pub const JAIL: &'static str = "jail";
    /// Firewall rule sets
    pub const FIREWALL: &'static str = "firewall";

    /// The categories configured out of the box
    pub fn builtin() -> Vec<Category> {
        [
            Self::VIRTUAL_HOST,
            Self::PROCESS_POOL,
            Self::JAIL,
            Self::FIREWALL,
        ]
        .iter()
        .map(|name| Category(name.to_string()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_accepts_host_names() {
        let id = Identifier::parse("www.example-site.test").unwrap();
        assert_eq!(id.as_str(), "www.example-site.test");
        assert_eq!(id.to_string(), "www.example-site.test");
    }

    #[test]
    fn test_identifier_rejects_paths() {
        assert!(Identifier::parse("../etc/passwd").is_err());
        assert!(Identifier::parse("a/b").is_err());
        assert!(Identifier::parse(".hidden").is_err());
        assert!(Identifier::parse("").is_err());
    }

    #[test]
    fn test_category_is_lowercase() {
        assert!(Category::parse("vhost").is_ok());
        assert!(Category::parse("VHost").is_err());
        assert!(Category::parse("site.conf").is_err());
    }

    #[test]
    fn test_builtin_categories() {
        let names: Vec<String> = Category::builtin().into_iter().map(String::from).collect();
        assert_eq!(names, vec!["vhost", "pool", "jail", "firewall"]);
    }

    #[test]
    fn test_serde_validates() {
        let ok: Identifier = serde_json::from_str("\"sshd\"").unwrap();
        assert_eq!(ok.as_str(), "sshd");

        let bad: Result<Identifier, _> = serde_json::from_str("\"a/b\"");
        assert!(bad.is_err());
    }
}
