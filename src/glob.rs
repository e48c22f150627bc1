//! Filename pattern matching over a single directory.
//!
//! Patterns use [`glob::Pattern`] syntax (`*`, `?`, `[...]`) and match file
//! names only; there is no recursion and no path separators.

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use thiserror::Error;

use crate::local_fs;

/// Raised when a directory cannot be listed or the pattern does not compile.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to list {dir}: {message}")]
pub struct GlobError {
    /// Directory that was being listed.
    pub dir: Utf8PathBuf,
    /// Underlying error text.
    pub message: String,
}

/// Lists files in a directory whose names match a pattern.
pub trait Globber {
    /// Returns matching paths in `dir`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`GlobError`] when `dir` cannot be listed or `pattern` is
    /// malformed.
    fn glob(&self, dir: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>, GlobError>;

    /// Like [`Globber::glob`], but directories and links match as well.
    ///
    /// # Errors
    ///
    /// Returns [`GlobError`] when `dir` cannot be listed or `pattern` is
    /// malformed.
    fn glob_entries(&self, dir: &Utf8Path, pattern: &str)
    -> Result<Vec<Utf8PathBuf>, GlobError>;
}

/// [`Globber`] backed by the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirGlobber;

impl DirGlobber {
    fn filtered(
        dir: &Utf8Path,
        pattern: &str,
        list: fn(&Utf8Path) -> std::io::Result<Vec<Utf8PathBuf>>,
    ) -> Result<Vec<Utf8PathBuf>, GlobError> {
        let fail = |message: String| GlobError {
            dir: dir.to_path_buf(),
            message,
        };
        let compiled = Pattern::new(pattern)
            .map_err(|err| fail(format!("invalid pattern {pattern:?}: {err}")))?;
        let listed = list(dir).map_err(|err| fail(err.to_string()))?;

        Ok(listed
            .into_iter()
            .filter(|path| path.file_name().is_some_and(|name| compiled.matches(name)))
            .collect())
    }
}

impl Globber for DirGlobber {
    fn glob(&self, dir: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>, GlobError> {
        Self::filtered(dir, pattern, local_fs::list_files)
    }

    fn glob_entries(
        &self,
        dir: &Utf8Path,
        pattern: &str,
    ) -> Result<Vec<Utf8PathBuf>, GlobError> {
        Self::filtered(dir, pattern, local_fs::list_entries)
    }
}
