//! Device specification describing the Cuttlefish device to create.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::HostConfig;

/// Default login user on Cuttlefish remote hosts.
pub const DEFAULT_HOST_USER: &str = "vsoc-01";

/// Default time allowed for the device to boot.
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(450);

/// Default time allowed for remote host initialisation.
pub const DEFAULT_INS_TIMEOUT: Duration = Duration::from_secs(360);

/// Where the device images come from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageSource {
    /// Images are fetched from the build service.
    Remote,
    /// Images are supplied as a local directory or archive.
    Local,
}

/// Build service coordinates of the default device build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteBuild {
    /// Branch used when no build id is pinned.
    pub branch: Option<String>,
    /// Build id, if pinned.
    pub build_id: Option<String>,
    /// Build target, for example `aosp_cf_x86_64_phone-userdebug`.
    pub build_target: String,
}

impl RemoteBuild {
    /// Identifier used to select the build: the pinned id, else the branch.
    #[must_use]
    pub fn selector(&self) -> Option<&str> {
        self.build_id.as_deref().or(self.branch.as_deref())
    }
}

/// An additional build in `<build id or branch>/<target>` form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildSelector {
    /// Build id or branch.
    pub id: String,
    /// Build target.
    pub target: String,
}

impl fmt::Display for BuildSelector {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.id, self.target)
    }
}

impl FromStr for BuildSelector {
    type Err = DeviceSpecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || DeviceSpecError::InvalidBuildSelector(value.to_owned());
        let (id, target) = value.trim().split_once('/').ok_or_else(invalid)?;
        if id.is_empty() || target.is_empty() || target.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            id: id.to_owned(),
            target: target.to_owned(),
        })
    }
}

/// Optional component builds layered over the default build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtraBuilds {
    /// System image build.
    pub system: Option<BuildSelector>,
    /// Kernel build.
    pub kernel: Option<BuildSelector>,
    /// Bootloader build.
    pub bootloader: Option<BuildSelector>,
    /// OTA tools build.
    pub ota: Option<BuildSelector>,
}

/// Immutable description of the device to create.
///
/// Only the fields selected by [`DeviceSpec::image_source`] are meaningful;
/// the remaining image fields are ignored rather than rejected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceSpec {
    /// Where the images come from.
    pub image_source: ImageSource,
    /// Default build coordinates for remote sources.
    pub remote_build: Option<RemoteBuild>,
    /// Component builds forwarded to the fetch tool.
    pub extra_builds: ExtraBuilds,
    /// Local image directory for local sources.
    pub local_image_dir: Option<Utf8PathBuf>,
    /// Address of the remote host.
    pub remote_host: String,
    /// Login user on the remote host.
    pub host_user: String,
    /// Host-specific SSH key overriding [`HostConfig::ssh_private_key_path`].
    pub host_ssh_private_key_path: Option<String>,
    /// Time allowed for remote host initialisation.
    pub ins_timeout: Duration,
    /// Time allowed for the device to boot.
    pub boot_timeout: Duration,
    /// GPU mode passed to the launcher.
    pub gpu: Option<String>,
    /// Whether reports should prefer the host's internal address.
    pub report_internal_ip: bool,
    /// Host-level defaults.
    pub config: HostConfig,
}

impl DeviceSpec {
    /// Starts a builder for a [`DeviceSpec`].
    #[must_use]
    pub fn builder() -> DeviceSpecBuilder {
        DeviceSpecBuilder::new()
    }

    /// SSH key to use: the host-specific key when set, else the configured one.
    #[must_use]
    pub fn ssh_private_key_path(&self) -> Option<&str> {
        self.host_ssh_private_key_path
            .as_deref()
            .or(self.config.ssh_private_key_path.as_deref())
    }
}

/// Builder for [`DeviceSpec`] that trims inputs and validates on build.
#[derive(Clone, Debug)]
pub struct DeviceSpecBuilder {
    image_source: ImageSource,
    remote_build: Option<RemoteBuild>,
    extra_builds: ExtraBuilds,
    local_image_dir: Option<Utf8PathBuf>,
    remote_host: String,
    host_user: String,
    host_ssh_private_key_path: Option<String>,
    ins_timeout: Duration,
    boot_timeout: Duration,
    gpu: Option<String>,
    report_internal_ip: bool,
    config: HostConfig,
}

impl Default for DeviceSpecBuilder {
    fn default() -> Self {
        Self {
            image_source: ImageSource::Remote,
            remote_build: None,
            extra_builds: ExtraBuilds::default(),
            local_image_dir: None,
            remote_host: String::new(),
            host_user: DEFAULT_HOST_USER.to_owned(),
            host_ssh_private_key_path: None,
            ins_timeout: DEFAULT_INS_TIMEOUT,
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
            gpu: None,
            report_internal_ip: false,
            config: HostConfig::with_defaults(),
        }
    }
}

impl DeviceSpecBuilder {
    /// Creates a builder for a remote-source device with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image source.
    #[must_use]
    pub const fn image_source(mut self, value: ImageSource) -> Self {
        self.image_source = value;
        self
    }

    /// Sets the default build coordinates.
    #[must_use]
    pub fn remote_build(mut self, value: RemoteBuild) -> Self {
        self.remote_build = Some(value);
        self
    }

    /// Sets the component builds.
    #[must_use]
    pub fn extra_builds(mut self, value: ExtraBuilds) -> Self {
        self.extra_builds = value;
        self
    }

    /// Sets the local image directory.
    #[must_use]
    pub fn local_image_dir(mut self, value: Option<Utf8PathBuf>) -> Self {
        self.local_image_dir = value;
        self
    }

    /// Sets the remote host address.
    #[must_use]
    pub fn remote_host(mut self, value: impl Into<String>) -> Self {
        self.remote_host = value.into();
        self
    }

    /// Sets the login user.
    #[must_use]
    pub fn host_user(mut self, value: impl Into<String>) -> Self {
        self.host_user = value.into();
        self
    }

    /// Sets the host-specific SSH key.
    #[must_use]
    pub fn host_ssh_private_key_path(mut self, value: Option<String>) -> Self {
        self.host_ssh_private_key_path = value;
        self
    }

    /// Sets the host initialisation timeout.
    #[must_use]
    pub const fn ins_timeout(mut self, value: Duration) -> Self {
        self.ins_timeout = value;
        self
    }

    /// Sets the boot timeout.
    #[must_use]
    pub const fn boot_timeout(mut self, value: Duration) -> Self {
        self.boot_timeout = value;
        self
    }

    /// Sets the GPU mode.
    #[must_use]
    pub fn gpu(mut self, value: Option<String>) -> Self {
        self.gpu = value;
        self
    }

    /// Sets whether reports prefer the internal address.
    #[must_use]
    pub const fn report_internal_ip(mut self, value: bool) -> Self {
        self.report_internal_ip = value;
        self
    }

    /// Sets the host-level configuration.
    #[must_use]
    pub fn config(mut self, value: HostConfig) -> Self {
        self.config = value;
        self
    }

    /// Builds and validates the [`DeviceSpec`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceSpecError::MissingField`] when the host or user is
    /// empty.
    pub fn build(self) -> Result<DeviceSpec, DeviceSpecError> {
        let remote_host = self.remote_host.trim().to_owned();
        if remote_host.is_empty() {
            return Err(DeviceSpecError::MissingField("remote_host"));
        }
        let host_user = self.host_user.trim().to_owned();
        if host_user.is_empty() {
            return Err(DeviceSpecError::MissingField("host_user"));
        }

        Ok(DeviceSpec {
            image_source: self.image_source,
            remote_build: self.remote_build,
            extra_builds: self.extra_builds,
            local_image_dir: self.local_image_dir,
            remote_host,
            host_user,
            host_ssh_private_key_path: self
                .host_ssh_private_key_path
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            ins_timeout: self.ins_timeout,
            boot_timeout: self.boot_timeout,
            gpu: self
                .gpu
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            report_internal_ip: self.report_internal_ip,
            config: self.config,
        })
    }
}

/// Errors raised while building a [`DeviceSpec`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeviceSpecError {
    /// Raised when a required field is empty.
    #[error("missing or empty field: {0}")]
    MissingField(&'static str),
    /// Raised when a build selector is not `<id or branch>/<target>`.
    #[error("invalid build selector {0:?}: expected <build id or branch>/<target>")]
    InvalidBuildSelector(String),
}
