//! Classifies a device specification into a single image transfer plan.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::device::{DeviceSpec, ImageSource, RemoteBuild};

/// How the device images reach the remote host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImagePlan {
    /// Fetch the build locally, then stream it to the host.
    RemoteFetch(RemoteBuild),
    /// Upload the images found in a local directory.
    LocalDirectory(Utf8PathBuf),
    /// Upload a local image archive.
    LocalArchive(Utf8PathBuf),
}

impl ImagePlan {
    /// Short label used in logs and reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::RemoteFetch(_) => "remote-fetch",
            Self::LocalDirectory(_) => "local-directory",
            Self::LocalArchive(_) => "local-archive",
        }
    }
}

/// Raised when the selected image source lacks the data it needs.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ImageError {
    /// A remote source was selected without build coordinates.
    #[error("remote image source requires a build target")]
    MissingRemoteBuild,
    /// A local source was selected without a directory or archive.
    #[error("local image source requires an image directory or an image archive")]
    MissingLocalImage,
}

/// Resolves the transfer plan for `spec`.
///
/// A local directory takes precedence over `local_image_artifact`, matching
/// how callers pass either `--local-image <dir>` or an archive.
///
/// # Errors
///
/// Returns [`ImageError`] when the selected source has no usable location.
pub fn locate(
    spec: &DeviceSpec,
    local_image_artifact: Option<&Utf8Path>,
) -> Result<ImagePlan, ImageError> {
    match spec.image_source {
        ImageSource::Remote => spec
            .remote_build
            .clone()
            .filter(|build| !build.build_target.trim().is_empty())
            .map(ImagePlan::RemoteFetch)
            .ok_or(ImageError::MissingRemoteBuild),
        ImageSource::Local => {
            if let Some(dir) = &spec.local_image_dir {
                return Ok(ImagePlan::LocalDirectory(dir.clone()));
            }
            local_image_artifact
                .map(|archive| ImagePlan::LocalArchive(archive.to_path_buf()))
                .ok_or(ImageError::MissingLocalImage)
        }
    }
}
