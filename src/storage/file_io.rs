//! File I/O utilities with atomic writes
//!
//! Provides safe file operations that won't corrupt data on failure.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::KeeperError;

/// Read JSON from a file, returning a default value if file doesn't exist
pub fn read_json<T, P>(path: P) -> Result<T, KeeperError>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(T::default());
    }

    read_json_required(path)
}

/// Read JSON from a file, returning an error if file doesn't exist
pub fn read_json_required<T, P>(path: P) -> Result<T, KeeperError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let file = File::open(path).map_err(|e| KeeperError::io_at("open", path, e))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| KeeperError::Json(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (write to temp, then rename)
pub fn write_json_atomic<T, P>(path: P, data: &T) -> Result<(), KeeperError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let json = serde_json::to_vec_pretty(data)
        .map_err(|e| KeeperError::Json(format!("Failed to serialize data: {}", e)))?;
    write_bytes_atomic(path, &json)
}

/// Write bytes to a file atomically (write to temp, then rename)
///
/// The file is either completely written or not modified at all, so readers
/// never observe a half-written artifact.
pub fn write_bytes_atomic<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<(), KeeperError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| KeeperError::io_at("create directory", parent, e))?;
    }

    // Temp file in the same directory so the rename stays on one filesystem
    let temp_path = temp_sibling(path);

    let file = File::create(&temp_path).map_err(|e| KeeperError::io_at("create", &temp_path, e))?;

    let mut writer = BufWriter::new(file);
    let written = writer
        .write_all(data)
        .and_then(|_| writer.flush())
        .and_then(|_| writer.get_ref().sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(KeeperError::io_at("write", &temp_path, e));
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        KeeperError::io_at("rename into place", path, e)
    })?;

    Ok(())
}

/// Temporary name next to `path`, hidden from directory listings
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Read a text file
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String, KeeperError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|e| KeeperError::io_at("read", path, e))
}

/// Copy a file or directory tree into `dest`, returning the copied file
/// paths relative to `dest`.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<Vec<PathBuf>, KeeperError> {
    let mut copied = Vec::new();
    copy_tree_inner(src, dest, Path::new(""), &mut copied)?;
    copied.sort();
    Ok(copied)
}

fn copy_tree_inner(
    src: &Path,
    dest: &Path,
    relative: &Path,
    copied: &mut Vec<PathBuf>,
) -> Result<(), KeeperError> {
    let metadata = fs::metadata(src).map_err(|e| KeeperError::io_at("stat", src, e))?;

    if metadata.is_dir() {
        fs::create_dir_all(dest).map_err(|e| KeeperError::io_at("create directory", dest, e))?;
        for entry in fs::read_dir(src).map_err(|e| KeeperError::io_at("read directory", src, e))? {
            let entry = entry.map_err(|e| KeeperError::io_at("read directory", src, e))?;
            let name = entry.file_name();
            copy_tree_inner(
                &entry.path(),
                &dest.join(&name),
                &relative.join(&name),
                copied,
            )?;
        }
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KeeperError::io_at("create directory", parent, e))?;
        }
        fs::copy(src, dest).map_err(|e| KeeperError::io_at("copy", src, e))?;
        copied.push(relative.to_path_buf());
    }

    Ok(())
}

/// List every regular file below `dir`, relative to it, sorted
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, KeeperError> {
    let mut files = Vec::new();
    if dir.is_dir() {
        list_files_inner(dir, Path::new(""), &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn list_files_inner(dir: &Path, relative: &Path, files: &mut Vec<PathBuf>) -> Result<(), KeeperError> {
    for entry in fs::read_dir(dir).map_err(|e| KeeperError::io_at("read directory", dir, e))? {
        let entry = entry.map_err(|e| KeeperError::io_at("read directory", dir, e))?;
        let path = entry.path();
        let rel = relative.join(entry.file_name());
        if path.is_dir() {
            list_files_inner(&path, &rel, files)?;
        } else {
            files.push(rel);
        }
    }
    Ok(())
}
