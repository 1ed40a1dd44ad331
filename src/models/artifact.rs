//! Configuration artifact model
//!
//! One named unit of service configuration (a virtual host, a jail, a pool).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ids::{Category, Identifier};

/// A configuration artifact as it exists in the available store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigArtifact {
    /// Unique name within its category
    pub identifier: Identifier,
    /// Which kind of artifact this is
    pub category: Category,
    /// Opaque text payload
    pub content: String,
    /// Path in the available store
    pub location: PathBuf,
    /// Whether an activation marker points at `location`
    pub active: bool,
}

impl ConfigArtifact {
    /// Size of the payload in bytes
    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }
}
