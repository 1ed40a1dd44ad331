//! Activation markers
//!
//! An activation marker lives in a category's active directory and names
//! the available artifact it enables. The store only talks to the
//! `ActivationMarker` trait, so storage without native links can use
//! `FileMarker`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::MarkerKind;
use crate::error::KeeperError;

use super::file_io::{temp_sibling, write_bytes_atomic};

/// Places, inspects and removes activation markers
pub trait ActivationMarker {
    /// Where the marker at `marker` points, or `None` if there is no marker
    fn target(&self, marker: &Path) -> Result<Option<PathBuf>, KeeperError>;

    /// Create or atomically replace the marker so it points at `target`
    fn place(&self, marker: &Path, target: &Path) -> Result<(), KeeperError>;

    /// Remove the marker, returning whether one existed
    fn clear(&self, marker: &Path) -> Result<bool, KeeperError> {
        match fs::symlink_metadata(marker) {
            Ok(_) => {
                fs::remove_file(marker).map_err(|e| KeeperError::io_at("remove", marker, e))?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(KeeperError::io_at("stat", marker, e)),
        }
    }
}

/// Build the marker implementation selected in settings
pub fn marker_for(kind: MarkerKind) -> Box<dyn ActivationMarker> {
    match kind {
        MarkerKind::Symlink => Box::new(SymlinkMarker),
        MarkerKind::File => Box::new(FileMarker),
    }
}

/// Symbolic link marker, the layout most service packages expect
#[derive(Debug, Default, Clone, Copy)]
pub struct SymlinkMarker;

impl ActivationMarker for SymlinkMarker {
    fn target(&self, marker: &Path) -> Result<Option<PathBuf>, KeeperError> {
        match fs::read_link(marker) {
            Ok(target) => Ok(Some(target)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            // A regular file where a link is expected counts as foreign, not as ours
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(None),
            Err(e) => Err(KeeperError::io_at("read link", marker, e)),
        }
    }

    #[cfg(unix)]
    fn place(&self, marker: &Path, target: &Path) -> Result<(), KeeperError> {
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KeeperError::io_at("create directory", parent, e))?;
        }

        let temp = temp_sibling(marker);
        let _ = fs::remove_file(&temp);
        std::os::unix::fs::symlink(target, &temp)
            .map_err(|e| KeeperError::io_at("create link", &temp, e))?;
        fs::rename(&temp, marker).map_err(|e| {
            let _ = fs::remove_file(&temp);
            KeeperError::io_at("activate link", marker, e)
        })
    }

    #[cfg(not(unix))]
    fn place(&self, marker: &Path, target: &Path) -> Result<(), KeeperError> {
        FileMarker.place(marker, target)
    }
}

/// Marker file holding the target path as text
#[derive(Debug, Default, Clone, Copy)]
pub struct FileMarker;

impl ActivationMarker for FileMarker {
    fn target(&self, marker: &Path) -> Result<Option<PathBuf>, KeeperError> {
        match fs::read_to_string(marker) {
            Ok(text) => Ok(Some(PathBuf::from(text.trim_end()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeeperError::io_at("read marker", marker, e)),
        }
    }

    fn place(&self, marker: &Path, target: &Path) -> Result<(), KeeperError> {
        let text = format!("{}\n", target.display());
        write_bytes_atomic(marker, text.as_bytes())
    }
}
