//! SSH primitive built on the system `ssh` client.
//!
//! [`Ssh`] renders the client options once per session and exposes them both
//! as an argument vector (for remote commands) and as a shell string (for
//! local pipelines such as `tar ... | ssh ... -- tar ...`). Local pipelines run
//! through `sh -o pipefail -c`, so a failure on either side of a pipe fails the
//! whole command; only [`RemoteShell::shell_cmd_with_retry`] retries.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use shell_escape::unix::escape;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::HostConfig;
use crate::device::DeviceSpec;
use crate::process::CommandRunner;

mod error;
mod util;

pub use error::SshError;
pub use util::expand_tilde;

/// Shell used to run local pipelines.
pub const LOCAL_SHELL: &str = "sh";

/// Options passed to [`LOCAL_SHELL`] before `-c`.
pub const LOCAL_SHELL_OPTIONS: [&str; 2] = ["-o", "pipefail"];

/// Future returned by [`RemoteShell::shell_cmd_with_retry`].
pub type ShellFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SshError>> + 'a>>;

/// Output captured from a command executed on the remote host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteCommandOutput {
    /// Exit code reported by the remote command.
    pub exit_code: Option<i32>,
    /// Captured standard output stream.
    pub stdout: String,
    /// Captured standard error stream.
    pub stderr: String,
}

/// Who to connect to and how to authenticate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshTarget {
    /// Hostname or address.
    pub host: String,
    /// Login user.
    pub user: String,
    /// Private key passed with `-i`.
    pub private_key_path: Option<String>,
    /// Extra client arguments appended after the standard options.
    pub extra_args: Vec<String>,
}

impl SshTarget {
    /// Builds the target for the host named in `spec`.
    #[must_use]
    pub fn from_spec(spec: &DeviceSpec) -> Self {
        Self {
            host: spec.remote_host.clone(),
            user: spec.host_user.clone(),
            private_key_path: spec.ssh_private_key_path().map(str::to_owned),
            extra_args: spec.config.extra_ssh_args(),
        }
    }
}

/// Bounded retry applied to streamed transfers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

/// Client-side SSH options.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshSettings {
    /// Path to the `ssh` executable.
    pub ssh_bin: String,
    /// Whether to pass `BatchMode=yes`.
    pub batch_mode: bool,
    /// Whether to keep host key checking enabled.
    pub strict_host_key_checking: bool,
    /// Known hosts file; blank leaves the client default.
    pub known_hosts_file: String,
    /// Retry policy for [`RemoteShell::shell_cmd_with_retry`].
    pub retry: RetryPolicy,
}

impl SshSettings {
    /// Derives settings from host configuration.
    #[must_use]
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            ssh_bin: config.ssh_bin.clone(),
            batch_mode: config.ssh_batch_mode,
            strict_host_key_checking: config.ssh_strict_host_key_checking,
            known_hosts_file: config.ssh_known_hosts_file.clone(),
            retry: RetryPolicy {
                attempts: config.shell_retry_attempts.max(1),
                delay: config.shell_retry_delay(),
            },
        }
    }
}

/// Operations the factory and its collaborators need from an SSH session.
pub trait RemoteShell {
    /// Host and user this session talks to.
    fn target(&self) -> &SshTarget;

    /// Client invocation as a shell string, without the remote command.
    fn base_cmd(&self) -> String;

    /// Runs `command` on the remote host and returns its output, whatever the
    /// exit code.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Command`] when the client cannot be spawned.
    fn run(&self, command: &str) -> Result<RemoteCommandOutput, SshError>;

    /// Runs a local shell pipeline once, requiring a zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Command`] when the pipeline fails.
    fn shell_cmd(&self, command: &str) -> Result<(), SshError>;

    /// Runs a local shell pipeline, retrying the whole pipeline on failure.
    ///
    /// Resolves to [`SshError::RetriesExhausted`] when every attempt fails.
    fn shell_cmd_with_retry<'a>(&'a self, command: &'a str) -> ShellFuture<'a>;
}

/// SSH session backed by the system client.
#[derive(Clone, Debug)]
pub struct Ssh<R: CommandRunner> {
    target: SshTarget,
    settings: SshSettings,
    runner: R,
}

impl<R: CommandRunner> Ssh<R> {
    /// Creates a session and checks it by running `true` on the host.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Unreachable`] when the check exits non-zero
    /// (authentication or network failure) and [`SshError::Command`] when the
    /// client cannot be spawned.
    pub fn connect(target: SshTarget, settings: SshSettings, runner: R) -> Result<Self, SshError> {
        let session = Self {
            target,
            settings,
            runner,
        };
        let check = session.run("true")?;
        if check.exit_code == Some(0) {
            return Ok(session);
        }

        Err(SshError::Unreachable {
            host: session.target.host.clone(),
            status: check.exit_code,
            status_text: check
                .exit_code
                .map_or_else(|| String::from("unknown"), |code| code.to_string()),
            stderr: check.stderr.trim().to_owned(),
        })
    }

    /// Returns the client settings.
    #[must_use]
    pub const fn settings(&self) -> &SshSettings {
        &self.settings
    }

    fn ssh_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(ref key) = self.target.private_key_path {
            args.push(String::from("-i"));
            args.push(expand_tilde(key));
        }

        if self.settings.batch_mode {
            args.push(String::from("-o"));
            args.push(String::from("BatchMode=yes"));
        }

        if !self.settings.strict_host_key_checking {
            args.push(String::from("-o"));
            args.push(String::from("StrictHostKeyChecking=no"));
        }

        if !self.settings.known_hosts_file.trim().is_empty() {
            args.push(String::from("-o"));
            args.push(format!(
                "UserKnownHostsFile={}",
                self.settings.known_hosts_file
            ));
        }

        args.extend(self.target.extra_args.iter().cloned());
        args.push(String::from("-l"));
        args.push(self.target.user.clone());
        args.push(self.target.host.clone());
        args
    }
}

impl<R: CommandRunner> RemoteShell for Ssh<R> {
    fn target(&self) -> &SshTarget {
        &self.target
    }

    fn base_cmd(&self) -> String {
        let mut parts = vec![escape(self.settings.ssh_bin.as_str().into()).into_owned()];
        parts.extend(
            self.ssh_args()
                .into_iter()
                .map(|arg| escape(arg.into()).into_owned()),
        );
        parts.join(" ")
    }

    fn run(&self, command: &str) -> Result<RemoteCommandOutput, SshError> {
        let mut args: Vec<OsString> = self.ssh_args().into_iter().map(OsString::from).collect();
        args.push(OsString::from("--"));
        args.push(OsString::from(command));
        debug!(host = %self.target.host, command, "running remote command");

        let output = self.runner.run(&self.settings.ssh_bin, &args)?;
        Ok(RemoteCommandOutput {
            exit_code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn shell_cmd(&self, command: &str) -> Result<(), SshError> {
        debug!(command, "running local pipeline");
        let mut args: Vec<OsString> = LOCAL_SHELL_OPTIONS
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(OsString::from("-c"));
        args.push(OsString::from(command));
        self.runner
            .run(LOCAL_SHELL, &args)?
            .check(LOCAL_SHELL)
            .map(drop)
            .map_err(SshError::from)
    }

    fn shell_cmd_with_retry<'a>(&'a self, command: &'a str) -> ShellFuture<'a> {
        Box::pin(async move {
            let RetryPolicy { attempts, delay } = self.settings.retry;
            let mut attempt = 1;
            loop {
                let failure = match self.shell_cmd(command) {
                    Ok(()) => return Ok(()),
                    Err(err) => err,
                };
                if attempt >= attempts {
                    return Err(SshError::RetriesExhausted {
                        attempts,
                        last: Box::new(failure),
                    });
                }
                warn!(attempt, attempts, error = %failure, "pipeline failed, retrying");
                sleep(delay).await;
                attempt += 1;
            }
        })
    }
}
