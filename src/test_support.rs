//! Test support utilities shared across unit and integration tests.
//!
//! Every double records how it was called through shared state, so a clone
//! handed to the code under test can be inspected through the original.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::client::{ClientFuture, ClientProvider, LaunchFailures, RemoteClient};
use crate::credentials::{CredentialError, CredentialProvider, Credentials};
use crate::cvd_utils::{ArtifactUploader, UploadError, UploadFuture};
use crate::device::DeviceSpec;
use crate::glob::{GlobError, Globber};
use crate::process::{CommandError, CommandOutput, CommandRunner};
use crate::ssh::{RemoteCommandOutput, RemoteShell, ShellFuture, SshError, SshTarget};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Running out of responses is reported as a spawn failure.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// [`RemoteShell`] that accepts every command without running anything.
#[derive(Clone, Debug)]
pub struct FakeShell {
    target: SshTarget,
    commands: Rc<RefCell<Vec<String>>>,
}

impl Default for FakeShell {
    fn default() -> Self {
        Self {
            target: SshTarget {
                host: String::from("fake-host"),
                user: String::from("vsoc-01"),
                private_key_path: None,
                extra_args: Vec::new(),
            },
            commands: Rc::default(),
        }
    }
}

impl FakeShell {
    /// Commands received so far, remote and local alike.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl RemoteShell for FakeShell {
    fn target(&self) -> &SshTarget {
        &self.target
    }

    fn base_cmd(&self) -> String {
        format!("ssh -l {} {}", self.target.user, self.target.host)
    }

    fn run(&self, command: &str) -> Result<RemoteCommandOutput, SshError> {
        self.commands.borrow_mut().push(command.to_owned());
        Ok(RemoteCommandOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn shell_cmd(&self, command: &str) -> Result<(), SshError> {
        self.commands.borrow_mut().push(command.to_owned());
        Ok(())
    }

    fn shell_cmd_with_retry<'a>(&'a self, command: &'a str) -> ShellFuture<'a> {
        Box::pin(async move { self.shell_cmd(command) })
    }
}

/// Arguments captured from a [`RemoteClient::launch_cvd`] call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchCall {
    /// Instance name passed to the client.
    pub instance_name: String,
    /// Extra data disk size, in gigabytes.
    pub extra_data_disk_size_gb: u32,
    /// Boot timeout.
    pub boot_timeout: Duration,
}

/// Failures injected by [`ScriptedClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedClientError {
    /// Injected host initialisation failure.
    #[error("scripted host initialisation failure")]
    Init,
    /// Injected launch request failure.
    #[error("scripted launch request failure")]
    Launch,
}

#[derive(Debug, Default)]
struct ClientRecord {
    created: usize,
    init_calls: usize,
    launch_calls: Vec<LaunchCall>,
}

/// Scripted [`RemoteClient`] that also acts as its own [`ClientProvider`].
#[derive(Clone, Debug)]
pub struct ScriptedClient {
    instance_name: String,
    launch_failures: LaunchFailures,
    fail_init: bool,
    fail_launch: bool,
    record: Rc<RefCell<ClientRecord>>,
}

impl ScriptedClient {
    /// Creates a client that names every instance `instance_name` and boots
    /// it successfully.
    #[must_use]
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            launch_failures: LaunchFailures::new(),
            fail_init: false,
            fail_launch: false,
            record: Rc::default(),
        }
    }

    /// Reports `reason` as a boot failure for `instance`.
    #[must_use]
    pub fn with_launch_failure(
        mut self,
        instance: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.launch_failures.insert(instance.into(), reason.into());
        self
    }

    /// Fails host initialisation.
    #[must_use]
    pub const fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Fails the launch request.
    #[must_use]
    pub const fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// Number of times a provider created this client.
    #[must_use]
    pub fn created(&self) -> usize {
        self.record.borrow().created
    }

    /// Number of host initialisation calls.
    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.record.borrow().init_calls
    }

    /// Launch calls received so far.
    #[must_use]
    pub fn launch_calls(&self) -> Vec<LaunchCall> {
        self.record.borrow().launch_calls.clone()
    }
}

impl RemoteClient for ScriptedClient {
    type Error = ScriptedClientError;

    fn init_remote_host<'a>(
        &'a self,
        _shell: &'a dyn RemoteShell,
        _spec: &'a DeviceSpec,
    ) -> ClientFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record.borrow_mut().init_calls += 1;
            if self.fail_init {
                return Err(ScriptedClientError::Init);
            }
            Ok(())
        })
    }

    fn format_instance_name(&self, _spec: &DeviceSpec) -> String {
        self.instance_name.clone()
    }

    fn launch_cvd<'a>(
        &'a self,
        _shell: &'a dyn RemoteShell,
        instance_name: &'a str,
        _spec: &'a DeviceSpec,
        extra_data_disk_size_gb: u32,
        boot_timeout: Duration,
    ) -> ClientFuture<'a, LaunchFailures, Self::Error> {
        Box::pin(async move {
            self.record.borrow_mut().launch_calls.push(LaunchCall {
                instance_name: instance_name.to_owned(),
                extra_data_disk_size_gb,
                boot_timeout,
            });
            if self.fail_launch {
                return Err(ScriptedClientError::Launch);
            }
            Ok(self.launch_failures.clone())
        })
    }
}

impl ClientProvider for ScriptedClient {
    type Client = Self;

    fn create_client(&self, _spec: &DeviceSpec, _credentials: &Credentials) -> Self::Client {
        self.record.borrow_mut().created += 1;
        self.clone()
    }
}

/// Upload recorded by [`RecordingUploader`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UploadCall {
    /// [`ArtifactUploader::upload_image_zip`].
    ImageZip(Utf8PathBuf),
    /// [`ArtifactUploader::upload_image_dir`].
    ImageDir(Utf8PathBuf),
    /// [`ArtifactUploader::upload_cvd_host_package`].
    HostPackage(Utf8PathBuf),
}

/// [`ArtifactUploader`] that records calls and optionally fails them.
#[derive(Clone, Debug, Default)]
pub struct RecordingUploader {
    calls: Rc<RefCell<Vec<UploadCall>>>,
    failure: Option<UploadError>,
}

impl RecordingUploader {
    /// Creates an uploader whose calls succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every upload with `error`.
    #[must_use]
    pub fn failing(mut self, error: UploadError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Uploads recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<UploadCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: UploadCall) -> UploadFuture<'_> {
        self.calls.borrow_mut().push(call);
        let outcome = self.failure.clone().map_or(Ok(()), Err);
        Box::pin(async move { outcome })
    }
}

impl ArtifactUploader for RecordingUploader {
    fn upload_image_zip<'a>(
        &'a self,
        _shell: &'a dyn RemoteShell,
        archive: &'a Utf8Path,
    ) -> UploadFuture<'a> {
        self.record(UploadCall::ImageZip(archive.to_path_buf()))
    }

    fn upload_image_dir<'a>(
        &'a self,
        _shell: &'a dyn RemoteShell,
        dir: &'a Utf8Path,
    ) -> UploadFuture<'a> {
        self.record(UploadCall::ImageDir(dir.to_path_buf()))
    }

    fn upload_cvd_host_package<'a>(
        &'a self,
        _shell: &'a dyn RemoteShell,
        package: &'a Utf8Path,
    ) -> UploadFuture<'a> {
        self.record(UploadCall::HostPackage(package.to_path_buf()))
    }
}

/// [`Globber`] returning fixed file names inside whichever directory is asked.
#[derive(Clone, Debug, Default)]
pub struct StaticGlobber {
    names: Vec<String>,
    calls: Rc<Cell<usize>>,
}

impl StaticGlobber {
    /// Creates a globber that reports `names` for every query.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            calls: Rc::default(),
        }
    }

    /// Creates a globber that never matches.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of queries made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Globber for StaticGlobber {
    fn glob(&self, dir: &Utf8Path, _pattern: &str) -> Result<Vec<Utf8PathBuf>, GlobError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.names.iter().map(|name| dir.join(name)).collect())
    }

    fn glob_entries(
        &self,
        dir: &Utf8Path,
        pattern: &str,
    ) -> Result<Vec<Utf8PathBuf>, GlobError> {
        self.glob(dir, pattern)
    }
}

/// [`CredentialProvider`] returning a fixed outcome.
#[derive(Clone, Debug)]
pub struct StaticCredentials {
    outcome: Result<Credentials, CredentialError>,
    calls: Rc<Cell<usize>>,
}

impl StaticCredentials {
    /// Always returns `credentials`.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            outcome: Ok(credentials),
            calls: Rc::default(),
        }
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: CredentialError) -> Self {
        Self {
            outcome: Err(error),
            calls: Rc::default(),
        }
    }

    /// Number of resolutions requested.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl CredentialProvider for StaticCredentials {
    fn create_credentials(&self) -> Result<Credentials, CredentialError> {
        self.calls.set(self.calls.get() + 1);
        self.outcome.clone()
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
