//! Remote device client seam.
//!
//! [`RemoteClient`] prepares the host and issues the launch request over an
//! existing [`RemoteShell`]. [`ClientProvider`] builds a client from the
//! resolved credentials so the factory can create it lazily.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::credentials::Credentials;
use crate::device::DeviceSpec;
use crate::ssh::RemoteShell;

mod ssh_client;

pub use ssh_client::{ClientError, SshCvdClient};

/// Future returned by [`RemoteClient`] operations.
pub type ClientFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + 'a>>;

/// Instance name to boot failure description.
pub type LaunchFailures = BTreeMap<String, String>;

/// Operations needed to prepare a host and boot a device on it.
pub trait RemoteClient {
    /// Error raised when a request cannot be issued.
    type Error: std::error::Error + 'static;

    /// Brings the remote working directory into a clean state.
    fn init_remote_host<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        spec: &'a DeviceSpec,
    ) -> ClientFuture<'a, (), Self::Error>;

    /// Derives the instance name for `spec`.
    fn format_instance_name(&self, spec: &DeviceSpec) -> String;

    /// Boots the device and returns per-instance boot failures. An empty map
    /// means the device booted.
    fn launch_cvd<'a>(
        &'a self,
        shell: &'a dyn RemoteShell,
        instance_name: &'a str,
        spec: &'a DeviceSpec,
        extra_data_disk_size_gb: u32,
        boot_timeout: Duration,
    ) -> ClientFuture<'a, LaunchFailures, Self::Error>;
}

/// Builds a [`RemoteClient`] once credentials are known.
pub trait ClientProvider {
    /// Client produced by this provider.
    type Client: RemoteClient;

    /// Creates the client.
    fn create_client(&self, spec: &DeviceSpec, credentials: &Credentials) -> Self::Client;
}

impl<F, C> ClientProvider for F
where
    F: Fn(&DeviceSpec, &Credentials) -> C,
    C: RemoteClient,
{
    type Client = C;

    fn create_client(&self, spec: &DeviceSpec, credentials: &Credentials) -> Self::Client {
        self(spec, credentials)
    }
}
