//! Command-line interface definitions for the `cuttlehost` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `cuttlehost` binary.
#[derive(Debug, Parser)]
#[command(
    name = "cuttlehost",
    about = "Create Cuttlefish virtual devices on remote hosts over SSH",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Prepare a remote host, upload images, and boot a device.
    #[command(
        name = "create",
        about = "Prepare a remote host, upload images, and boot a device"
    )]
    Create(CreateCommand),
}

/// Arguments for the `cuttlehost create` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct CreateCommand {
    /// Address of the remote host.
    #[arg(long, value_name = "ADDR")]
    pub(crate) host: String,
    /// Login user on the remote host.
    #[arg(long, value_name = "USER", default_value = "vsoc-01")]
    pub(crate) host_user: String,
    /// Private key for this host, overriding `ssh_private_key_path`.
    #[arg(long, value_name = "PATH")]
    pub(crate) host_ssh_private_key_path: Option<String>,
    /// Local image directory or image archive.
    ///
    /// Selects a local image source. A directory is streamed file by file; a
    /// file is treated as an archive and unpacked on the host. Without this
    /// flag the images are fetched from the build service.
    #[arg(long, value_name = "PATH")]
    pub(crate) local_image: Option<String>,
    /// CVD host package uploaded alongside the images.
    #[arg(long, value_name = "PATH")]
    pub(crate) cvd_host_package: Option<String>,
    /// Branch of the default build.
    #[arg(long, value_name = "BRANCH")]
    pub(crate) branch: Option<String>,
    /// Build id of the default build; takes precedence over the branch.
    #[arg(long, value_name = "ID")]
    pub(crate) build_id: Option<String>,
    /// Target of the default build.
    #[arg(long, value_name = "TARGET")]
    pub(crate) build_target: Option<String>,
    /// System image build as `<id or branch>/<target>`.
    #[arg(long, value_name = "BUILD")]
    pub(crate) system_build: Option<String>,
    /// Kernel build as `<id or branch>/<target>`.
    #[arg(long, value_name = "BUILD")]
    pub(crate) kernel_build: Option<String>,
    /// Bootloader build as `<id or branch>/<target>`.
    #[arg(long, value_name = "BUILD")]
    pub(crate) bootloader_build: Option<String>,
    /// OTA tools build as `<id or branch>/<target>`.
    #[arg(long, value_name = "BUILD")]
    pub(crate) ota_build: Option<String>,
    /// GPU mode passed to the device launcher.
    #[arg(long, value_name = "MODE")]
    pub(crate) gpu: Option<String>,
    /// Seconds allowed for the device to boot.
    #[arg(long, value_name = "SECS", default_value_t = 450)]
    pub(crate) boot_timeout_secs: u64,
    /// Seconds allowed for remote host initialisation.
    #[arg(long, value_name = "SECS", default_value_t = 360)]
    pub(crate) ins_timeout_secs: u64,
    /// Report the host's internal address.
    #[arg(long)]
    pub(crate) report_internal_ip: bool,
    /// Write the JSON report to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub(crate) report_file: Option<String>,
}
