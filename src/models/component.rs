//! Backup component categories
//!
//! A backup is made of optional components; the manifest flags which ones
//! an archive actually contains.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KeeperError;

/// A part of a category's state that can be backed up and restored
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    /// Available-store artifacts
    Configuration,
    /// Auxiliary filter definitions
    Filters,
    /// Auxiliary side-channel data
    Data,
    /// Historical log/database snapshot
    History,
    /// Point-in-time runtime state (e.g. currently banned addresses)
    BannedState,
}

impl Component {
    /// All components in archive order
    pub fn all() -> [Component; 5] {
        [
            Self::Configuration,
            Self::Filters,
            Self::Data,
            Self::History,
            Self::BannedState,
        ]
    }

    /// Name of the archive subdirectory holding this component
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Filters => "filters",
            Self::Data => "data",
            Self::History => "history",
            Self::BannedState => "banned-state",
        }
    }

    /// Whether the component is copied from an auxiliary live path
    pub fn is_auxiliary(&self) -> bool {
        matches!(self, Self::Filters | Self::Data | Self::History)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Component {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "configuration" | "config" | "conf" => Ok(Self::Configuration),
            "filters" | "filter" => Ok(Self::Filters),
            "data" => Ok(Self::Data),
            "history" | "db" => Ok(Self::History),
            "banned-state" | "banned" | "state" => Ok(Self::BannedState),
            other => Err(KeeperError::InvalidInput(format!(
                "Unknown backup component '{}'",
                other
            ))),
        }
    }
}
