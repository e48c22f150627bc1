//! Capability-scoped helpers for reading local files and directories.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Splits `path` into its parent directory and file name.
fn split(path: &Utf8Path) -> io::Result<(&Utf8Path, &str)> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {path}"),
        )
    })?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    Ok((parent, file_name))
}

/// Returns whether `path` exists. A missing parent directory counts as absent.
///
/// # Errors
///
/// Returns the underlying I/O error when the parent cannot be opened for a
/// reason other than absence.
pub fn path_exists(path: &Utf8Path) -> io::Result<bool> {
    let (parent, file_name) = split(path)?;
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir.try_exists(file_name),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Reads `path` to a string.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be read.
pub fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read_to_string(file_name)
}

/// Writes `contents` to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns the underlying I/O error when the parent directory cannot be
/// opened or the file cannot be written.
pub fn write_string(path: &Utf8Path, contents: &str) -> io::Result<()> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.write(file_name, contents)
}

/// Returns whether `path` names a directory. A missing path or parent counts
/// as not a directory.
///
/// # Errors
///
/// Returns the underlying I/O error when the parent cannot be opened or the
/// entry cannot be inspected for a reason other than absence.
pub fn is_dir(path: &Utf8Path) -> io::Result<bool> {
    if path.file_name().is_none() {
        return match Dir::open_ambient_dir(path, ambient_authority()) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        };
    }
    let (parent, file_name) = split(path)?;
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    match dir.metadata(file_name) {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Lists the regular files directly inside `dir`, sorted by name.
///
/// # Errors
///
/// Returns the underlying I/O error when the directory cannot be listed.
pub fn list_files(dir: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
    list(dir, true)
}

/// Lists every entry directly inside `dir` (files, directories and links),
/// sorted by name.
///
/// # Errors
///
/// Returns the underlying I/O error when the directory cannot be listed.
pub fn list_entries(dir: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
    list(dir, false)
}

fn list(dir: &Utf8Path, files_only: bool) -> io::Result<Vec<Utf8PathBuf>> {
    let handle = Dir::open_ambient_dir(dir, ambient_authority())?;
    let mut entries = Vec::new();
    for listed in handle.entries()? {
        let entry = listed?;
        if !files_only || entry.file_type()?.is_file() {
            entries.push(dir.join(entry.file_name()?));
        }
    }
    entries.sort();
    Ok(entries)
}
