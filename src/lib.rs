//! Core library for the cuttlehost device factory.
//!
//! The crate creates a single Cuttlefish virtual device on a remote host that
//! is already running: it classifies where the images come from, prepares the
//! host over SSH, transfers the images and host package, launches the device,
//! and records boot failures as data rather than errors.

pub mod client;
pub mod config;
pub mod credentials;
pub mod cvd_utils;
pub mod device;
pub mod factory;
pub mod fetch;
pub mod glob;
pub mod image;
pub mod launch;
pub mod local_fs;
pub mod process;
pub mod report;
pub mod ssh;
pub mod test_support;
pub mod upload;

pub use client::{ClientProvider, LaunchFailures, RemoteClient, SshCvdClient};
pub use config::{ConfigError, HostConfig};
pub use credentials::{CacheFileCredentials, CredentialProvider, Credentials};
pub use cvd_utils::{ArtifactUploader, CvdUtils};
pub use device::{DeviceSpec, DeviceSpecBuilder, ImageSource};
pub use factory::{DeviceFactory, ErrorKind, FactoryArtifacts, FactoryError, FactoryState};
pub use image::{ImagePlan, locate};
pub use launch::{LaunchReport, launch_device};
pub use process::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use report::{CreateReport, ReportStatus};
pub use ssh::{RemoteShell, Ssh, SshError};
pub use upload::{TransferError, Transport, UploadStrategy};
