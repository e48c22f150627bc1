//! Moves device images onto the remote host according to an [`ImagePlan`].
//!
//! Exactly one image transfer runs per plan. The host package, when supplied,
//! is uploaded after the images into the same remote directory.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::info;

use crate::credentials::Credentials;
use crate::cvd_utils::{ArtifactUploader, UploadError, archive_pipe_command};
use crate::device::{ExtraBuilds, RemoteBuild};
use crate::fetch::{BuildFetcher, FetchError, FetchRequest};
use crate::glob::{GlobError, Globber};
use crate::image::ImagePlan;
use crate::ssh::{RemoteShell, SshError};

/// Prefix of the temporary directory holding fetched artifacts.
pub const FETCH_DIR_PREFIX: &str = "cuttlehost-fetch-";

/// Errors raised while moving artifacts to the host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransferError {
    /// The temporary fetch directory could not be prepared.
    #[error("failed to prepare fetch directory: {message}")]
    Workspace {
        /// Underlying error text.
        message: String,
    },
    /// The fetch tool failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Fetched artifacts could not be listed.
    #[error("failed to discover fetched artifacts: {0}")]
    Discovery(#[from] GlobError),
    /// The fetch produced nothing to upload.
    #[error("fetch produced no artifacts in {dir}")]
    NoArtifacts {
        /// Fetch directory.
        dir: Utf8PathBuf,
    },
    /// Streaming the fetched artifacts failed after all retries.
    #[error("streaming fetched artifacts failed: {0}")]
    Pipe(#[source] SshError),
    /// A directory, archive, or host package upload failed.
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Record of what was transferred.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transport {
    /// Plan that was executed.
    pub plan: ImagePlan,
    /// Entry names streamed from the fetch directory, including directories
    /// such as `bin`; empty for local plans.
    pub streamed_artifacts: Vec<String>,
    /// Host package uploaded alongside the images.
    pub host_package: Option<Utf8PathBuf>,
}

/// Collaborators used to execute an [`ImagePlan`].
pub struct UploadStrategy<'a> {
    /// Session to the remote host.
    pub shell: &'a dyn RemoteShell,
    /// Uploader for local directories, archives and the host package.
    pub uploader: &'a dyn ArtifactUploader,
    /// Fetch step for remote builds.
    pub fetcher: &'a dyn BuildFetcher,
    /// Discovery of fetched artifacts.
    pub globber: &'a dyn Globber,
    /// Credentials forwarded to the fetch step.
    pub credentials: &'a Credentials,
    /// Component overrides forwarded to the fetch step.
    pub extra_builds: &'a ExtraBuilds,
    /// Host package to upload, if any.
    pub cvd_host_package: Option<&'a Utf8Path>,
}

impl UploadStrategy<'_> {
    /// Transfers the images described by `plan`, then the host package.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] when any step fails; later steps do not run.
    pub async fn execute(&self, plan: &ImagePlan) -> Result<Transport, TransferError> {
        info!(plan = plan.label(), host = %self.shell.target().host, "transferring images");
        let streamed_artifacts = match plan {
            ImagePlan::RemoteFetch(build) => self.fetch_and_stream(build).await?,
            ImagePlan::LocalDirectory(dir) => {
                self.uploader.upload_image_dir(self.shell, dir).await?;
                Vec::new()
            }
            ImagePlan::LocalArchive(archive) => {
                self.uploader.upload_image_zip(self.shell, archive).await?;
                Vec::new()
            }
        };

        if let Some(package) = self.cvd_host_package {
            self.uploader
                .upload_cvd_host_package(self.shell, package)
                .await?;
        }

        Ok(Transport {
            plan: plan.clone(),
            streamed_artifacts,
            host_package: self.cvd_host_package.map(Utf8Path::to_path_buf),
        })
    }

    async fn fetch_and_stream(&self, build: &RemoteBuild) -> Result<Vec<String>, TransferError> {
        let workspace = tempfile::Builder::new()
            .prefix(FETCH_DIR_PREFIX)
            .tempdir()
            .map_err(|err| TransferError::Workspace {
                message: err.to_string(),
            })?;
        let dir = Utf8Path::from_path(workspace.path()).ok_or_else(|| {
            TransferError::Workspace {
                message: format!(
                    "temporary path is not valid UTF-8: {}",
                    workspace.path().display()
                ),
            }
        })?;

        self.fetcher.fetch(&FetchRequest {
            directory: dir,
            build,
            extra_builds: self.extra_builds,
            credentials: self.credentials,
        })?;

        let artifacts: Vec<String> = self
            .globber
            .glob_entries(dir, "*")?
            .iter()
            .filter_map(|path| path.file_name().map(str::to_owned))
            .collect();
        if artifacts.is_empty() {
            return Err(TransferError::NoArtifacts {
                dir: dir.to_path_buf(),
            });
        }

        let command = archive_pipe_command(dir, &artifacts, &self.shell.base_cmd());
        self.shell
            .shell_cmd_with_retry(&command)
            .await
            .map_err(TransferError::Pipe)?;
        Ok(artifacts)
    }
}
