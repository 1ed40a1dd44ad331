//! Compressed backup archives
//!
//! An archive is a gzip-compressed tar holding `manifest.json` first, then
//! one top-level directory per included component.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::manifest::{Manifest, MANIFEST_FILE};
use crate::error::{KeeperError, KeeperResult};
use crate::models::Component;
use crate::storage::file_io::{list_files, temp_sibling};

/// File extension of backup archives
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// A private working directory removed on drop
pub(crate) struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn create(parent: &Path, prefix: &str) -> KeeperResult<Self> {
        let path = parent.join(format!(".{}-{}", prefix, Uuid::new_v4()));
        fs::create_dir_all(&path).map_err(|e| KeeperError::io_at("create directory", &path, e))?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            debug!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

/// SHA-256 of a file as lowercase hex
pub fn sha256_file(path: &Path) -> KeeperResult<String> {
    let data = fs::read(path).map_err(|e| KeeperError::io_at("read", path, e))?;
    Ok(format!("{:x}", Sha256::digest(&data)))
}

/// Pack a staging directory into `dest`
///
/// The archive is built under a temporary name and renamed into place, so
/// readers never see a partial archive. Returns the archive size.
pub fn write_archive(staging: &Path, components: &[Component], dest: &Path) -> KeeperResult<u64> {
    let temp = temp_sibling(dest);

    if let Err(e) = build_archive(staging, components, &temp) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    fs::rename(&temp, dest).map_err(|e| {
        let _ = fs::remove_file(&temp);
        KeeperError::io_at("rename into place", dest, e)
    })?;

    let size = fs::metadata(dest)
        .map_err(|e| KeeperError::io_at("stat", dest, e))?
        .len();
    debug!("Wrote archive {} ({} bytes)", dest.display(), size);
    Ok(size)
}

fn build_archive(staging: &Path, components: &[Component], temp: &Path) -> KeeperResult<()> {
    let file = File::create(temp).map_err(|e| KeeperError::io_at("create", temp, e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    builder
        .append_path_with_name(staging.join(MANIFEST_FILE), MANIFEST_FILE)
        .map_err(|e| KeeperError::io_at("archive", &staging.join(MANIFEST_FILE), e))?;

    for component in components {
        let dir = staging.join(component.dir_name());
        for relative in list_files(&dir)? {
            let source = dir.join(&relative);
            builder
                .append_path_with_name(&source, Path::new(component.dir_name()).join(&relative))
                .map_err(|e| KeeperError::io_at("archive", &source, e))?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| KeeperError::io_at("finish archive", temp, e))?;
    let file = encoder
        .finish()
        .map_err(|e| KeeperError::io_at("compress archive", temp, e))?;
    file.sync_all()
        .map_err(|e| KeeperError::io_at("sync", temp, e))?;
    Ok(())
}

/// Read only the manifest of an archive
pub fn read_manifest(archive_path: &Path) -> KeeperResult<Manifest> {
    let corrupt = |e: std::io::Error| {
        KeeperError::Archive(format!("{} is unreadable: {}", archive_path.display(), e))
    };

    let file = File::open(archive_path).map_err(|e| KeeperError::io_at("open", archive_path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let path = entry.path().map_err(corrupt)?.into_owned();
        if path != Path::new(MANIFEST_FILE) {
            continue;
        }

        let mut text = String::new();
        entry.read_to_string(&mut text).map_err(corrupt)?;

        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| {
            KeeperError::Archive(format!(
                "Malformed manifest in {}: {}",
                archive_path.display(),
                e
            ))
        })?;
        manifest.validate().map_err(|e| {
            KeeperError::Archive(format!("{}: {}", archive_path.display(), e))
        })?;
        return Ok(manifest);
    }

    Err(KeeperError::Archive(format!(
        "{} has no {}",
        archive_path.display(),
        MANIFEST_FILE
    )))
}

/// Unpack an archive into `dest`
pub fn extract(archive_path: &Path, dest: &Path) -> KeeperResult<()> {
    let file = File::open(archive_path).map_err(|e| KeeperError::io_at("open", archive_path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.unpack(dest).map_err(|e| {
        KeeperError::Archive(format!(
            "Failed to extract {}: {}",
            archive_path.display(),
            e
        ))
    })
}

/// Check an extracted archive against its manifest
///
/// Every flag must match a non-empty (or absent) component directory and
/// every file must carry a matching checksum.
pub fn verify_extracted(manifest: &Manifest, root: &Path) -> KeeperResult<()> {
    let fail = |detail: String| KeeperError::Archive(format!("Backup '{}': {}", manifest.name, detail));
    let mut seen = 0usize;

    for component in Component::all() {
        let files = list_files(&root.join(component.dir_name()))?;
        let flagged = manifest.includes(component);

        if flagged == files.is_empty() {
            return Err(fail(format!(
                "component '{}' is flagged {} but the archive holds {} file(s)",
                component,
                flagged,
                files.len()
            )));
        }

        for relative in files {
            let key = Manifest::entry_path(component, &relative);
            let expected = manifest
                .checksums
                .get(&key)
                .ok_or_else(|| fail(format!("no checksum recorded for {}", key)))?;
            let actual = sha256_file(&root.join(component.dir_name()).join(&relative))?;
            if &actual != expected {
                return Err(fail(format!("checksum mismatch for {}", key)));
            }
            seen += 1;
        }
    }

    if seen != manifest.checksums.len() {
        return Err(fail(format!(
            "manifest lists {} file(s) but the archive holds {}",
            manifest.checksums.len(),
            seen
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::manifest::BackupKind;
    use crate::models::Category;
    use crate::storage::file_io::write_json_atomic;
    use tempfile::TempDir;

    /// Stage one configuration file and write the archive
    fn build(temp: &TempDir) -> (PathBuf, Manifest) {
        let staging = temp.path().join("staging");
        fs::create_dir_all(staging.join("configuration")).unwrap();
        fs::write(staging.join("configuration/sshd.local"), "[sshd]\n").unwrap();

        let mut manifest =
            Manifest::new("b1", &Category::parse("jail").unwrap(), BackupKind::Regular);
        manifest.components.insert(Component::Configuration, true);
        manifest.checksums.insert(
            "configuration/sshd.local".into(),
            sha256_file(&staging.join("configuration/sshd.local")).unwrap(),
        );
        write_json_atomic(staging.join(MANIFEST_FILE), &manifest).unwrap();

        let dest = temp.path().join("b1.tar.gz");
        write_archive(&staging, &[Component::Configuration], &dest).unwrap();
        (dest, manifest)
    }

    #[test]
    fn test_manifest_readable_without_extracting() {
        let temp = TempDir::new().unwrap();
        let (dest, manifest) = build(&temp);

        assert_eq!(read_manifest(&dest).unwrap(), manifest);
        assert!(!temp_sibling(&dest).exists());
    }

    #[test]
    fn test_extract_and_verify() {
        let temp = TempDir::new().unwrap();
        let (dest, manifest) = build(&temp);

        let out = temp.path().join("out");
        extract(&dest, &out).unwrap();
        assert_eq!(
            fs::read_to_string(out.join("configuration/sshd.local")).unwrap(),
            "[sshd]\n"
        );
        verify_extracted(&manifest, &out).unwrap();

        fs::write(out.join("configuration/sshd.local"), "tampered").unwrap();
        assert!(matches!(
            verify_extracted(&manifest, &out),
            Err(KeeperError::Archive(_))
        ));
    }

    #[test]
    fn test_flag_without_directory_fails_verification() {
        let temp = TempDir::new().unwrap();
        let (dest, mut manifest) = build(&temp);
        manifest.components.insert(Component::Data, true);

        let out = temp.path().join("out");
        extract(&dest, &out).unwrap();
        let err = verify_extracted(&manifest, &out).unwrap_err();
        assert!(err.to_string().contains("'data' is flagged true"));
    }

    #[test]
    fn test_truncated_archive_is_archive_error() {
        let temp = TempDir::new().unwrap();
        let (dest, _) = build(&temp);
        let bytes = fs::read(&dest).unwrap();
        fs::write(&dest, &bytes[..bytes.len() / 3]).unwrap();

        let err = extract(&dest, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, KeeperError::Archive(_)));
    }

    #[test]
    fn test_not_an_archive() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("junk.tar.gz");
        fs::write(&dest, "not gzip").unwrap();
        assert!(matches!(read_manifest(&dest), Err(KeeperError::Archive(_))));
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchDir::create(temp.path(), "staging").unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.is_dir());
        drop(scratch);
        assert!(!path.exists());
    }
}
