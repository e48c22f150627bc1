//! Default client driving the host's `launch_cvd` tooling over SSH.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::{ClientFuture, LaunchFailures, RemoteClient};
use crate::device::{DeviceSpec, ImageSource};
use crate::ssh::{RemoteShell, SshError};

/// Exit status the remote `timeout` utility reports when the deadline passes.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit status the `ssh` client reports when the connection itself fails.
pub const SSH_TRANSPORT_EXIT_CODE: i32 = 255;

/// Errors raised when a request cannot be issued to the host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClientError {
    /// The SSH client could not run the command.
    #[error(transparent)]
    Ssh(#[from] SshError),
    /// Host initialisation exited non-zero.
    #[error("host initialisation exited with status {status_text}: {stderr}")]
    InitFailed {
        /// Human readable exit status.
        status_text: String,
        /// Trimmed stderr from the remote command.
        stderr: String,
    },
    /// The SSH connection failed, so the request never reached the host.
    #[error("request did not reach the host (ssh status {status_text}): {stderr}")]
    Transport {
        /// Human readable exit status.
        status_text: String,
        /// Trimmed stderr from the SSH client.
        stderr: String,
    },
}

/// [`RemoteClient`] that runs the device tooling found in the login user's
/// home directory.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SshCvdClient;

impl SshCvdClient {
    /// Remote command that stops any running device and empties the working
    /// directory.
    #[must_use]
    pub fn init_command(ins_timeout: Duration) -> String {
        format!(
            "timeout {} sh -c '(./bin/stop_cvd >/dev/null 2>&1 || true) && rm -rf ./*'",
            ins_timeout.as_secs()
        )
    }

    /// Remote command that boots the device in the background.
    #[must_use]
    pub fn launch_command(
        spec: &DeviceSpec,
        extra_data_disk_size_gb: u32,
        boot_timeout: Duration,
    ) -> String {
        let mut command = format!(
            "timeout {} ./bin/launch_cvd -daemon -report_anonymous_usage_stats=y",
            boot_timeout.as_secs()
        );
        if extra_data_disk_size_gb > 0 {
            command.push_str(&format!(
                " -data_policy=always_create -blank_data_image_mb={}",
                u64::from(extra_data_disk_size_gb) * 1024
            ));
        }
        if let Some(ref gpu) = spec.gpu {
            command.push_str(&format!(" -gpu_mode={gpu}"));
        }
        command
    }
}

fn status_text(code: Option<i32>) -> String {
    code.map_or_else(|| String::from("unknown"), |value| value.to_string())
}

impl RemoteClient for SshCvdClient {
    type Error = ClientError;

    fn init_remote_host<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        spec: &'a DeviceSpec,
    ) -> ClientFuture<'a, (), Self::Error> {
        Box::pin(async move {
            info!(host = %shell.target().host, user = %shell.target().user, "initialising remote host");
            let output = shell.run(&Self::init_command(spec.ins_timeout))?;
            if output.exit_code == Some(0) {
                return Ok(());
            }
            Err(ClientError::InitFailed {
                status_text: status_text(output.exit_code),
                stderr: output.stderr.trim().to_owned(),
            })
        })
    }

    fn format_instance_name(&self, spec: &DeviceSpec) -> String {
        let build = match spec.image_source {
            ImageSource::Local => None,
            ImageSource::Remote => spec.remote_build.as_ref(),
        };
        match build {
            Some(remote) => match remote.selector() {
                Some(selector) => format!(
                    "host-{}-{selector}-{}",
                    spec.remote_host, remote.build_target
                ),
                None => format!("host-{}-{}", spec.remote_host, remote.build_target),
            },
            None => format!("host-{}-local-cuttlefish", spec.remote_host),
        }
    }

    fn launch_cvd<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        instance_name: &'a str,
        spec: &'a DeviceSpec,
        extra_data_disk_size_gb: u32,
        boot_timeout: Duration,
    ) -> ClientFuture<'a, LaunchFailures, Self::Error> {
        Box::pin(async move {
            let command = Self::launch_command(spec, extra_data_disk_size_gb, boot_timeout);
            info!(instance = instance_name, boot_timeout_secs = boot_timeout.as_secs(), "launching device");
            let output = shell.run(&command)?;

            let mut failures = LaunchFailures::new();
            match output.exit_code {
                Some(0) => {}
                Some(SSH_TRANSPORT_EXIT_CODE) => {
                    return Err(ClientError::Transport {
                        status_text: status_text(output.exit_code),
                        stderr: output.stderr.trim().to_owned(),
                    });
                }
                Some(TIMEOUT_EXIT_CODE) => {
                    failures.insert(
                        instance_name.to_owned(),
                        format!(
                            "device did not finish booting within {} secs",
                            boot_timeout.as_secs()
                        ),
                    );
                }
                code => {
                    let stderr = output.stderr.trim();
                    let reason = if stderr.is_empty() {
                        format!("launch_cvd exited with status {}", status_text(code))
                    } else {
                        stderr.to_owned()
                    };
                    failures.insert(instance_name.to_owned(), reason);
                }
            }

            if let Some(reason) = failures.get(instance_name) {
                warn!(instance = instance_name, %reason, "device failed to boot");
            }
            Ok(failures)
        })
    }
}
