//! Error taxonomy for device creation.

use std::fmt;

use thiserror::Error;

use super::FactoryState;
use crate::credentials::CredentialError;
use crate::image::ImageError;
use crate::launch::LaunchError;
use crate::ssh::SshError;
use crate::upload::TransferError;

/// Broad category of a [`FactoryError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Invalid or unusable inputs, detected before any remote action.
    Configuration,
    /// The host could not be reached or prepared.
    Connectivity,
    /// Artifacts could not be fetched or uploaded.
    Transfer,
    /// The launch request could not be issued.
    LaunchRequest,
    /// The factory was used out of order.
    State,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::Connectivity => "connectivity",
            Self::Transfer => "transfer",
            Self::LaunchRequest => "launch-request",
            Self::State => "state",
        };
        f.write_str(label)
    }
}

/// Errors surfaced by [`super::DeviceFactory::create_instance`].
#[derive(Debug, Error)]
pub enum FactoryError<E>
where
    E: std::error::Error + 'static,
{
    /// The spec does not describe a usable image source.
    #[error("invalid image configuration: {0}")]
    Configuration(#[from] ImageError),
    /// Credentials could not be resolved.
    #[error("failed to resolve credentials: {0}")]
    Credentials(#[from] CredentialError),
    /// The SSH session could not be established.
    #[error("failed to connect to {host}: {source}")]
    Connectivity {
        /// Host that was contacted.
        host: String,
        /// SSH error.
        #[source]
        source: SshError,
    },
    /// The host could not be initialised.
    #[error("failed to initialise {host}: {source}")]
    HostInit {
        /// Host that was being prepared.
        host: String,
        /// Client error.
        #[source]
        source: E,
    },
    /// Images or the host package could not be transferred.
    #[error("artifact transfer failed: {0}")]
    Transfer(#[from] TransferError),
    /// The launch request could not be issued.
    #[error("failed to issue launch request for {instance_name}: {source}")]
    LaunchRequest {
        /// Instance the request was for.
        instance_name: String,
        /// Client error.
        #[source]
        source: E,
    },
    /// `create_instance` was already called on this factory.
    #[error("device creation was already attempted (state: {state})")]
    AlreadyAttempted {
        /// State at the time of the repeated call.
        state: FactoryState,
    },
}

impl<E> FactoryError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::Credentials(_) => ErrorKind::Configuration,
            Self::Connectivity { .. } | Self::HostInit { .. } => ErrorKind::Connectivity,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::LaunchRequest { .. } => ErrorKind::LaunchRequest,
            Self::AlreadyAttempted { .. } => ErrorKind::State,
        }
    }
}

impl<E> From<LaunchError<E>> for FactoryError<E>
where
    E: std::error::Error + 'static,
{
    fn from(value: LaunchError<E>) -> Self {
        Self::LaunchRequest {
            instance_name: value.instance_name,
            source: value.source,
        }
    }
}
