//! Issues the launch request and captures boot failures as data.

use thiserror::Error;
use tracing::info;

use crate::client::{LaunchFailures, RemoteClient};
use crate::device::DeviceSpec;
use crate::ssh::RemoteShell;

/// Outcome of a launch request that was successfully issued.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LaunchReport {
    /// Name of the launched instance.
    pub instance_name: String,
    /// Boot failures keyed by instance name; empty when the device booted.
    pub failures: LaunchFailures,
}

impl LaunchReport {
    /// Returns `true` when no instance reported a boot failure.
    #[must_use]
    pub fn booted(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Raised when the launch request could not be issued.
#[derive(Debug, Error)]
#[error("failed to issue launch request for {instance_name}: {source}")]
pub struct LaunchError<E>
where
    E: std::error::Error + 'static,
{
    /// Instance the request was for.
    pub instance_name: String,
    /// Client error.
    #[source]
    pub source: E,
}

/// Names the instance and boots it with the spec's disk and timeout settings.
///
/// # Errors
///
/// Returns [`LaunchError`] when the client cannot issue the request. Devices
/// that fail to boot are reported in [`LaunchReport::failures`].
pub async fn launch_device<C: RemoteClient>(
    client: &C,
    shell: &dyn RemoteShell,
    spec: &DeviceSpec,
) -> Result<LaunchReport, LaunchError<C::Error>> {
    let instance_name = client.format_instance_name(spec);
    info!(instance = %instance_name, host = %spec.remote_host, "requesting device launch");

    match client
        .launch_cvd(
            shell,
            &instance_name,
            spec,
            spec.config.extra_data_disk_size_gb,
            spec.boot_timeout,
        )
        .await
    {
        Ok(failures) => Ok(LaunchReport {
            instance_name,
            failures,
        }),
        Err(source) => Err(LaunchError {
            instance_name,
            source,
        }),
    }
}
