//! Uploads device images and the host package to a remote host.
//!
//! Image directories are streamed as an lzop-compressed tar through the SSH
//! client; archives and host packages are fed to the remote side on stdin.

use std::future::Future;
use std::pin::Pin;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::info;

use crate::glob::{DirGlobber, GlobError, Globber};
use crate::local_fs;
use crate::ssh::{RemoteShell, SshError};

/// Manifest listing the images a local directory should contribute.
pub const REQUIRED_IMAGES_MANIFEST: &str = "required_images";

/// Remote helper that unpacks an image archive into the working directory.
pub const INSTALL_ZIP_SCRIPT: &str = "/usr/bin/install_zip.sh";

/// Future returned by [`ArtifactUploader`] operations.
pub type UploadFuture<'a> = Pin<Box<dyn Future<Output = Result<(), UploadError>> + 'a>>;

/// Errors raised while uploading artifacts.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum UploadError {
    /// The `required_images` manifest exists but cannot be read.
    #[error("failed to read image manifest {path}: {message}")]
    Manifest {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying I/O error text.
        message: String,
    },
    /// The image directory cannot be listed.
    #[error(transparent)]
    Discovery(#[from] GlobError),
    /// Neither the manifest nor the `*.img` pattern named any file.
    #[error("no images found in {dir}")]
    NoImages {
        /// Directory that was searched.
        dir: Utf8PathBuf,
    },
    /// The transfer command failed.
    #[error("upload over SSH failed: {0}")]
    Ssh(#[from] SshError),
}

/// Operations that move local artifacts onto the remote host.
pub trait ArtifactUploader {
    /// Uploads and unpacks an image archive.
    fn upload_image_zip<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        archive: &'a Utf8Path,
    ) -> UploadFuture<'a>;

    /// Streams the images found in a local directory.
    fn upload_image_dir<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        dir: &'a Utf8Path,
    ) -> UploadFuture<'a>;

    /// Uploads and unpacks the CVD host package.
    fn upload_cvd_host_package<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        package: &'a Utf8Path,
    ) -> UploadFuture<'a>;
}

/// Renders the compress-and-pipe command that streams `files` from `dir` into
/// the remote working directory.
#[must_use]
pub fn archive_pipe_command(dir: &Utf8Path, files: &[String], base_cmd: &str) -> String {
    let escaped: Vec<String> = files
        .iter()
        .map(|file| escape(file.as_str().into()).into_owned())
        .collect();
    format!(
        "tar -cf - --lzop -S -C {} {} | {base_cmd} -- tar -xf - --lzop -S",
        escape(dir.as_str().into()),
        escaped.join(" ")
    )
}

/// Default [`ArtifactUploader`].
#[derive(Clone, Debug, Default)]
pub struct CvdUtils<G: Globber = DirGlobber> {
    globber: G,
}

impl<G: Globber> CvdUtils<G> {
    /// Creates an uploader that discovers images with `globber`.
    #[must_use]
    pub const fn new(globber: G) -> Self {
        Self { globber }
    }

    /// Lists the image file names to upload from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] when the manifest or directory cannot be read,
    /// or when the resulting list is empty.
    pub fn image_files(&self, dir: &Utf8Path) -> Result<Vec<String>, UploadError> {
        let manifest = dir.join(REQUIRED_IMAGES_MANIFEST);
        let manifest_error = |err: std::io::Error| UploadError::Manifest {
            path: manifest.clone(),
            message: err.to_string(),
        };

        let files: Vec<String> = if local_fs::path_exists(&manifest).map_err(manifest_error)? {
            local_fs::read_to_string(&manifest)
                .map_err(manifest_error)?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect()
        } else {
            self.globber
                .glob(dir, "*.img")?
                .iter()
                .filter_map(|path| path.file_name().map(str::to_owned))
                .collect()
        };

        if files.is_empty() {
            return Err(UploadError::NoImages {
                dir: dir.to_path_buf(),
            });
        }
        Ok(files)
    }
}

fn stdin_upload_command(base_cmd: &str, remote: &str, local: &Utf8Path) -> String {
    format!("{base_cmd} -- {remote} < {}", escape(local.as_str().into()))
}

impl<G: Globber> ArtifactUploader for CvdUtils<G> {
    fn upload_image_zip<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        archive: &'a Utf8Path,
    ) -> UploadFuture<'a> {
        Box::pin(async move {
            info!(archive = %archive, host = %shell.target().host, "uploading image archive");
            let command = stdin_upload_command(
                &shell.base_cmd(),
                &format!("{INSTALL_ZIP_SCRIPT} ."),
                archive,
            );
            shell.shell_cmd(&command)?;
            Ok(())
        })
    }

    fn upload_image_dir<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        dir: &'a Utf8Path,
    ) -> UploadFuture<'a> {
        Box::pin(async move {
            let files = self.image_files(dir)?;
            info!(dir = %dir, images = files.len(), host = %shell.target().host, "uploading image directory");
            let command = archive_pipe_command(dir, &files, &shell.base_cmd());
            shell.shell_cmd_with_retry(&command).await?;
            Ok(())
        })
    }

    fn upload_cvd_host_package<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        package: &'a Utf8Path,
    ) -> UploadFuture<'a> {
        Box::pin(async move {
            info!(package = %package, host = %shell.target().host, "uploading host package");
            let command = stdin_upload_command(&shell.base_cmd(), "tar -x -z -f -", package);
            shell.shell_cmd(&command)?;
            Ok(())
        })
    }
}
