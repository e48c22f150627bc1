//! JSON report describing the outcome of a creation attempt.

use std::fmt::Display;

use serde::Serialize;

use crate::client::LaunchFailures;
use crate::device::DeviceSpec;

/// Overall outcome of a creation attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    /// The device booted.
    Success,
    /// The launch request was issued but the device did not boot.
    BootFail,
    /// The attempt stopped on an error.
    Fail,
}

/// A device that was launched.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DeviceEntry {
    /// Instance name.
    pub instance_name: String,
    /// Address of the host running the device.
    pub ip: String,
    /// Whether `ip` was requested as the host's internal address.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub internal_ip: bool,
    /// Login user on the host.
    pub host_user: String,
}

/// A device that was launched but failed to boot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FailedDevice {
    /// Device details.
    #[serde(flatten)]
    pub device: DeviceEntry,
    /// Reason reported by the client.
    pub fail_reason: String,
}

/// Creation report written by the `create` command.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateReport {
    /// Command that produced the report.
    pub command: &'static str,
    /// Overall outcome.
    pub status: ReportStatus,
    /// Devices that booted.
    pub devices: Vec<DeviceEntry>,
    /// Devices that failed to boot.
    pub devices_failing_boot: Vec<FailedDevice>,
    /// Errors that stopped the attempt.
    pub errors: Vec<String>,
}

impl CreateReport {
    /// Builds the report for `spec` from the attempt outcome and the failure
    /// registry.
    #[must_use]
    pub fn from_outcome<E: Display>(
        spec: &DeviceSpec,
        outcome: &Result<String, E>,
        failures: &LaunchFailures,
    ) -> Self {
        let entry = |instance_name: &str| DeviceEntry {
            instance_name: instance_name.to_owned(),
            ip: spec.remote_host.clone(),
            internal_ip: spec.report_internal_ip,
            host_user: spec.host_user.clone(),
        };

        match outcome {
            Err(err) => Self {
                command: "create",
                status: ReportStatus::Fail,
                devices: Vec::new(),
                devices_failing_boot: Vec::new(),
                errors: vec![err.to_string()],
            },
            Ok(instance_name) => {
                let devices_failing_boot: Vec<FailedDevice> = failures
                    .iter()
                    .map(|(name, reason)| FailedDevice {
                        device: entry(name),
                        fail_reason: reason.clone(),
                    })
                    .collect();
                let booted = !failures.contains_key(instance_name);
                Self {
                    command: "create",
                    status: if devices_failing_boot.is_empty() {
                        ReportStatus::Success
                    } else {
                        ReportStatus::BootFail
                    },
                    devices: if booted {
                        vec![entry(instance_name)]
                    } else {
                        Vec::new()
                    },
                    devices_failing_boot,
                    errors: Vec::new(),
                }
            }
        }
    }

    /// Process exit code matching the status.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self.status {
            ReportStatus::Success => 0,
            ReportStatus::BootFail | ReportStatus::Fail => 1,
        }
    }

    /// Renders the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which only occurs for non-string map keys.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
