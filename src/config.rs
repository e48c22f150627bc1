//! Configuration loading via `ortho-config`.
//!
//! [`HostConfig`] carries the defaults every device specification inherits:
//! SSH credentials and options, the extra data disk size, the fetch tool, and
//! the retry policy for streamed transfers.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default SSH client binary.
pub const DEFAULT_SSH_BIN: &str = "ssh";

/// Default fetch tool binary used to stage remote builds locally.
pub const DEFAULT_FETCH_CVD_BIN: &str = "fetch_cvd";

/// Host-level defaults derived from configuration files, environment
/// variables, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CUTTLEHOST",
    discovery(
        app_name = "cuttlehost",
        env_var = "CUTTLEHOST_CONFIG_PATH",
        config_file_name = "cuttlehost.toml",
        dotfile_name = ".cuttlehost.toml",
        project_file_name = "cuttlehost.toml"
    )
)]
pub struct HostConfig {
    /// Private key used for SSH when the device spec names no host-specific
    /// key. Supports `~/` expansion.
    pub ssh_private_key_path: Option<String>,
    /// Size of the blank data image attached to the device, in gigabytes.
    /// Zero disables the extra disk.
    #[ortho_config(default = 0)]
    pub extra_data_disk_size_gb: u32,
    /// Additional SSH arguments (for example `-o ProxyJump=bastion`), split on
    /// whitespace.
    pub extra_args_ssh_tunnel: Option<String>,
    /// Fetch tool build the staging step is expected to run.
    pub fetch_cvd_version: Option<String>,
    /// Cached build-service credentials forwarded to the fetch tool.
    pub creds_cache_file: Option<String>,
    /// Path to the `ssh` executable.
    #[ortho_config(default = DEFAULT_SSH_BIN.to_owned())]
    pub ssh_bin: String,
    /// Path to the fetch tool executable.
    #[ortho_config(default = DEFAULT_FETCH_CVD_BIN.to_owned())]
    pub fetch_cvd_bin: String,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Attempts made by the streamed image transfer before giving up.
    #[ortho_config(default = 3)]
    pub shell_retry_attempts: u32,
    /// Seconds to wait between streamed transfer attempts.
    #[ortho_config(default = 5)]
    pub shell_retry_delay_secs: u64,
}

impl HostConfig {
    /// Returns the built-in defaults without consulting any configuration
    /// source.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            ssh_private_key_path: None,
            extra_data_disk_size_gb: 0,
            extra_args_ssh_tunnel: None,
            fetch_cvd_version: None,
            creds_cache_file: None,
            ssh_bin: DEFAULT_SSH_BIN.to_owned(),
            fetch_cvd_bin: DEFAULT_FETCH_CVD_BIN.to_owned(),
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: String::from("/dev/null"),
            shell_retry_attempts: 3,
            shell_retry_delay_secs: 5,
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to cuttlehost.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

impl HostConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("cuttlehost")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required value is blank
    /// and [`ConfigError::InvalidRetryAttempts`] when no transfer attempt
    /// would be made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.ssh_bin,
            &FieldMetadata::new("SSH client binary", "CUTTLEHOST_SSH_BIN", "ssh_bin"),
        )?;
        Self::require_field(
            &self.fetch_cvd_bin,
            &FieldMetadata::new(
                "fetch tool binary",
                "CUTTLEHOST_FETCH_CVD_BIN",
                "fetch_cvd_bin",
            ),
        )?;
        Self::require_optional_field(
            self.ssh_private_key_path.as_deref(),
            &FieldMetadata::new(
                "SSH private key path",
                "CUTTLEHOST_SSH_PRIVATE_KEY_PATH",
                "ssh_private_key_path",
            ),
        )?;
        Self::require_optional_field(
            self.creds_cache_file.as_deref(),
            &FieldMetadata::new(
                "credential cache file",
                "CUTTLEHOST_CREDS_CACHE_FILE",
                "creds_cache_file",
            ),
        )?;
        if self.shell_retry_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts);
        }
        Ok(())
    }

    /// Splits the extra SSH tunnel arguments into individual arguments.
    #[must_use]
    pub fn extra_ssh_args(&self) -> Vec<String> {
        self.extra_args_ssh_tunnel
            .as_deref()
            .map(|args| args.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Delay between streamed transfer attempts.
    #[must_use]
    pub const fn shell_retry_delay(&self) -> Duration {
        Duration::from_secs(self.shell_retry_delay_secs)
    }

    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    fn require_optional_field(
        value: Option<&str>,
        metadata: &FieldMetadata,
    ) -> Result<(), ConfigError> {
        match value {
            None => Ok(()),
            Some(present) => Self::require_field(present, metadata),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Raised when the retry policy would never attempt a transfer.
    #[error("shell_retry_attempts must be at least 1")]
    InvalidRetryAttempts,
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
