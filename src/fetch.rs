//! Stages a remote build into a local directory with the fetch tool.

use std::ffi::OsString;

use camino::Utf8Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::HostConfig;
use crate::credentials::Credentials;
use crate::device::{ExtraBuilds, RemoteBuild};
use crate::process::{CommandError, CommandRunner};

/// What to fetch and where to put it.
#[derive(Clone, Copy, Debug)]
pub struct FetchRequest<'a> {
    /// Local directory receiving the artifacts.
    pub directory: &'a Utf8Path,
    /// Default build coordinates.
    pub build: &'a RemoteBuild,
    /// Optional component overrides.
    pub extra_builds: &'a ExtraBuilds,
    /// Credentials forwarded to the tool.
    pub credentials: &'a Credentials,
}

/// Raised when the fetch tool fails.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FetchError {
    /// The tool could not be spawned or exited non-zero.
    #[error("fetching build artifacts failed: {0}")]
    Command(#[from] CommandError),
}

/// Downloads build artifacts into a local directory.
pub trait BuildFetcher {
    /// Runs the fetch once for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the fetch does not complete successfully.
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<(), FetchError>;
}

/// [`BuildFetcher`] that runs the local `fetch_cvd` binary.
#[derive(Clone, Debug)]
pub struct LocalFetcher<R: CommandRunner> {
    fetch_cvd_bin: String,
    fetch_cvd_version: Option<String>,
    runner: R,
}

impl<R: CommandRunner> LocalFetcher<R> {
    /// Creates a fetcher using the binary named in `config`.
    #[must_use]
    pub fn new(config: &HostConfig, runner: R) -> Self {
        Self {
            fetch_cvd_bin: config.fetch_cvd_bin.clone(),
            fetch_cvd_version: config.fetch_cvd_version.clone(),
            runner,
        }
    }

    /// Renders the argument list for `request`.
    #[must_use]
    pub fn fetch_args(request: &FetchRequest<'_>) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(format!("-directory={}", request.directory)),
            OsString::from(format!(
                "-default_build={}",
                default_build(request.build)
            )),
        ];

        let overrides = [
            ("-system_build", request.extra_builds.system.as_ref()),
            ("-kernel_build", request.extra_builds.kernel.as_ref()),
            ("-bootloader_build", request.extra_builds.bootloader.as_ref()),
            ("-otatools_build", request.extra_builds.ota.as_ref()),
        ];
        for (flag, selector) in overrides {
            if let Some(build) = selector {
                args.push(OsString::from(format!("{flag}={build}")));
            }
        }

        if let Some(ref cache) = request.credentials.cache_file {
            args.push(OsString::from(format!("-credential_source={cache}")));
        }
        args
    }
}

impl<R: CommandRunner> BuildFetcher for LocalFetcher<R> {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<(), FetchError> {
        let args = Self::fetch_args(request);
        info!(
            directory = %request.directory,
            build = %default_build(request.build),
            fetch_cvd_version = self.fetch_cvd_version.as_deref().unwrap_or("unspecified"),
            "fetching build artifacts"
        );
        debug!(program = %self.fetch_cvd_bin, ?args, "running fetch tool");

        self.runner
            .run(&self.fetch_cvd_bin, &args)?
            .check(&self.fetch_cvd_bin)?;
        Ok(())
    }
}

/// `<id-or-branch>/<target>`, or the bare target when neither is set.
fn default_build(build: &RemoteBuild) -> String {
    build.selector().map_or_else(
        || build.build_target.clone(),
        |selector| format!("{selector}/{}", build.build_target),
    )
}
