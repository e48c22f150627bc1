//! Build-service credentials forwarded to the fetch tool.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::HostConfig;
use crate::local_fs;
use crate::ssh::expand_tilde;

/// Credentials handed to the fetch step and to client construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Credentials {
    /// Cached credential file, when one is configured.
    pub cache_file: Option<Utf8PathBuf>,
}

impl Credentials {
    /// Credentials that carry no cache file; the fetch tool falls back to its
    /// own defaults.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { cache_file: None }
    }
}

/// Errors raised while resolving credentials.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CredentialError {
    /// Raised when the configured cache file does not exist.
    #[error("credential cache file {path} does not exist")]
    MissingCacheFile {
        /// Configured path after `~/` expansion.
        path: Utf8PathBuf,
    },
    /// Raised when the cache file cannot be inspected.
    #[error("failed to inspect credential cache file {path}: {message}")]
    Io {
        /// Configured path after `~/` expansion.
        path: Utf8PathBuf,
        /// Underlying I/O error text.
        message: String,
    },
}

/// Produces [`Credentials`] for a factory run.
pub trait CredentialProvider {
    /// Resolves credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when configured credentials are unusable.
    fn create_credentials(&self) -> Result<Credentials, CredentialError>;
}

/// Resolves credentials from `creds_cache_file` in [`HostConfig`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheFileCredentials {
    cache_file: Option<Utf8PathBuf>,
}

impl CacheFileCredentials {
    /// Reads the cache file location from `config`.
    #[must_use]
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            cache_file: config
                .creds_cache_file
                .as_deref()
                .map(|path| Utf8PathBuf::from(expand_tilde(path))),
        }
    }
}

impl CredentialProvider for CacheFileCredentials {
    fn create_credentials(&self) -> Result<Credentials, CredentialError> {
        let Some(ref path) = self.cache_file else {
            return Ok(Credentials::anonymous());
        };

        let exists = local_fs::path_exists(path).map_err(|err| CredentialError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
        if !exists {
            return Err(CredentialError::MissingCacheFile { path: path.clone() });
        }

        Ok(Credentials {
            cache_file: Some(path.clone()),
        })
    }
}
