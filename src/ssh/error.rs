//! Errors raised by the SSH primitive.

use thiserror::Error;

use crate::process::CommandError;

/// Errors surfaced while reaching or driving the remote host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SshError {
    /// Raised when the reachability check does not succeed.
    #[error("{host} is unreachable over SSH (status {status_text}): {stderr}")]
    Unreachable {
        /// Host that was checked.
        host: String,
        /// Exit status of the check, if any.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the SSH client.
        stderr: String,
    },
    /// Raised when a local command cannot be spawned or fails.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Raised when a retried shell command fails on every attempt.
    #[error("command failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: Box<SshError>,
    },
}
