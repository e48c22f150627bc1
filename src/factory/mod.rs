//! Device factory: one creation attempt for one device on one remote host.
//!
//! [`DeviceFactory::create_instance`] runs the fixed sequence locate → connect
//! → initialise host → upload → launch, stopping at the first error. Boot
//! failures are not errors; they accumulate in the failure registry returned
//! by [`DeviceFactory::failures`].

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;

use camino::Utf8PathBuf;
use tracing::{info, warn};

use crate::client::{ClientProvider, LaunchFailures, RemoteClient, SshCvdClient};
use crate::credentials::{CacheFileCredentials, CredentialProvider, Credentials};
use crate::cvd_utils::{ArtifactUploader, CvdUtils};
use crate::device::DeviceSpec;
use crate::fetch::LocalFetcher;
use crate::glob::{DirGlobber, Globber};
use crate::image::{self, ImagePlan};
use crate::launch::launch_device;
use crate::process::{CommandRunner, ProcessCommandRunner};
use crate::ssh::{Ssh, SshSettings, SshTarget};
use crate::upload::UploadStrategy;

mod error;

pub use error::{ErrorKind, FactoryError};

/// Error type of the client built by provider `P`.
pub type ClientErrorOf<P> = <<P as ClientProvider>::Client as RemoteClient>::Error;

/// Provider used by [`DeviceFactory::with_process_runner`].
pub type SshClientProvider = fn(&DeviceSpec, &Credentials) -> SshCvdClient;

/// Progress of the factory's single creation attempt.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FactoryState {
    /// Nothing has run yet.
    #[default]
    Unprepared,
    /// The host was reached and cleaned.
    HostInitialized,
    /// Images and the host package are on the host.
    Uploaded,
    /// The launch request was issued.
    Launched,
    /// The attempt stopped on an error.
    Failed,
}

impl fmt::Display for FactoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unprepared => "unprepared",
            Self::HostInitialized => "host-initialized",
            Self::Uploaded => "uploaded",
            Self::Launched => "launched",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Local artifacts supplied alongside the device spec.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FactoryArtifacts {
    /// Local image archive, used when the spec names no image directory.
    pub local_image: Option<Utf8PathBuf>,
    /// CVD host package uploaded with the images.
    pub cvd_host_package: Option<Utf8PathBuf>,
}

struct ClientSlot<C> {
    credentials: Credentials,
    client: C,
}

/// Creates one device on one remote host.
pub struct DeviceFactory<R, P, U>
where
    R: CommandRunner + Clone,
    P: ClientProvider,
    U: ArtifactUploader,
{
    spec: DeviceSpec,
    artifacts: FactoryArtifacts,
    runner: R,
    provider: P,
    uploader: U,
    credentials: Box<dyn CredentialProvider>,
    globber: Box<dyn Globber>,
    client: OnceCell<ClientSlot<P::Client>>,
    state: Cell<FactoryState>,
    failures: RefCell<LaunchFailures>,
}

fn ssh_client(_spec: &DeviceSpec, _credentials: &Credentials) -> SshCvdClient {
    SshCvdClient
}

impl DeviceFactory<ProcessCommandRunner, SshClientProvider, CvdUtils> {
    /// Creates a factory that runs real local processes and drives the host
    /// with [`SshCvdClient`].
    #[must_use]
    pub fn with_process_runner(spec: DeviceSpec, artifacts: FactoryArtifacts) -> Self {
        Self::new(
            spec,
            artifacts,
            ProcessCommandRunner,
            ssh_client as SshClientProvider,
            CvdUtils::default(),
        )
    }
}

impl<R, P, U> DeviceFactory<R, P, U>
where
    R: CommandRunner + Clone,
    P: ClientProvider,
    U: ArtifactUploader,
{
    /// Creates a factory. Credentials come from the spec's configuration and
    /// fetched artifacts are discovered on the local filesystem unless
    /// overridden.
    #[must_use]
    pub fn new(
        spec: DeviceSpec,
        artifacts: FactoryArtifacts,
        runner: R,
        provider: P,
        uploader: U,
    ) -> Self {
        let credentials = Box::new(CacheFileCredentials::from_config(&spec.config));
        Self {
            spec,
            artifacts,
            runner,
            provider,
            uploader,
            credentials,
            globber: Box::new(DirGlobber),
            client: OnceCell::new(),
            state: Cell::new(FactoryState::Unprepared),
            failures: RefCell::new(LaunchFailures::new()),
        }
    }

    /// Replaces the credential provider.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Box<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Replaces the globber used to discover fetched artifacts.
    #[must_use]
    pub fn with_globber(mut self, globber: Box<dyn Globber>) -> Self {
        self.globber = globber;
        self
    }

    /// Device specification this factory creates.
    #[must_use]
    pub const fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    /// Current progress of the creation attempt.
    #[must_use]
    pub fn state(&self) -> FactoryState {
        self.state.get()
    }

    /// Boot failures recorded so far, keyed by instance name.
    #[must_use]
    pub fn failures(&self) -> LaunchFailures {
        self.failures.borrow().clone()
    }

    /// Returns the remote client, creating credentials and the client on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Credentials`] when credentials cannot be
    /// resolved; a later call retries the resolution.
    pub fn compute_client(&self) -> Result<&P::Client, FactoryError<ClientErrorOf<P>>> {
        Ok(&self.client_slot()?.client)
    }

    fn client_slot(&self) -> Result<&ClientSlot<P::Client>, FactoryError<ClientErrorOf<P>>> {
        if let Some(slot) = self.client.get() {
            return Ok(slot);
        }
        let credentials = self.credentials.create_credentials()?;
        let client = self.provider.create_client(&self.spec, &credentials);
        Ok(self.client.get_or_init(|| ClientSlot {
            credentials,
            client,
        }))
    }

    /// Runs the creation attempt and returns the instance name.
    ///
    /// The attempt runs once per factory; boot failures are recorded in
    /// [`Self::failures`] and still return the name.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError`] for configuration, connectivity, transfer or
    /// launch request failures, leaving the state at
    /// [`FactoryState::Failed`], and [`FactoryError::AlreadyAttempted`] when
    /// called again.
    pub async fn create_instance(&self) -> Result<String, FactoryError<ClientErrorOf<P>>> {
        let state = self.state.get();
        if state != FactoryState::Unprepared {
            return Err(FactoryError::AlreadyAttempted { state });
        }

        let outcome = self.attempt().await;
        if let Err(ref err) = outcome {
            warn!(host = %self.spec.remote_host, kind = %err.kind(), error = %err, "device creation failed");
            self.state.set(FactoryState::Failed);
        }
        outcome
    }

    async fn attempt(&self) -> Result<String, FactoryError<ClientErrorOf<P>>> {
        let plan = image::locate(&self.spec, self.artifacts.local_image.as_deref())?;
        let slot = self.client_slot()?;
        let host = self.spec.remote_host.clone();

        let shell = Ssh::connect(
            SshTarget::from_spec(&self.spec),
            SshSettings::from_config(&self.spec.config),
            self.runner.clone(),
        )
        .map_err(|source| FactoryError::Connectivity {
            host: host.clone(),
            source,
        })?;

        slot.client
            .init_remote_host(&shell, &self.spec)
            .await
            .map_err(|source| FactoryError::HostInit { host, source })?;
        self.state.set(FactoryState::HostInitialized);

        self.upload(&shell, &slot.credentials, &plan).await?;
        self.state.set(FactoryState::Uploaded);

        let report = launch_device(&slot.client, &shell, &self.spec).await?;
        self.state.set(FactoryState::Launched);
        if report.booted() {
            info!(instance = %report.instance_name, "device launched");
        }
        self.failures.borrow_mut().extend(report.failures);
        Ok(report.instance_name)
    }

    async fn upload(
        &self,
        shell: &Ssh<R>,
        credentials: &Credentials,
        plan: &ImagePlan,
    ) -> Result<(), FactoryError<ClientErrorOf<P>>> {
        let fetcher = LocalFetcher::new(&self.spec.config, self.runner.clone());
        let strategy = UploadStrategy {
            shell,
            uploader: &self.uploader,
            fetcher: &fetcher,
            globber: self.globber.as_ref(),
            credentials,
            extra_builds: &self.spec.extra_builds,
            cvd_host_package: self.artifacts.cvd_host_package.as_deref(),
        };
        strategy.execute(plan).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
