// SPDX-License-Identifier: MPL-2.0

//! The public error taxonomy (spec.md §7). Every module defines its own
//! narrow `thiserror` enum; [`Error`] is the aggregate the engine's public
//! operations return, augmenting lower-level failures with an
//! operation-kind prefix rather than swallowing them.

use thiserror::Error;

use crate::{deploy, refs, remote, repository, runner};

/// Engine-visible error kinds (§7).
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid ref: {0}")]
    InvalidRef(#[from] refs::InvalidRef),

    #[error("invalid remote: {0}")]
    InvalidRemote(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0} is already installed")]
    AlreadyInstalled(String),

    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("wrong origin for {ref_}: expected {expected}, deployment records {actual}")]
    WrongOrigin {
        ref_: String,
        expected: String,
        actual: String,
    },

    #[error("remote {0} is disabled")]
    RemoteDisabled(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("operation denied by policy for {0}")]
    AuthDenied(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0} is in use and cannot be undeployed without force")]
    InUse(String),

    #[error("io error ({kind:?}): {source}")]
    Io {
        kind: IoErrorKind,
        #[source]
        source: std::io::Error,
    },

    #[error("not enough space: need {needed} bytes, {available} available")]
    NotEnoughSpace { needed: u64, available: u64 },

    #[error("corrupt repository state: {0}")]
    Corrupt(String),

    #[error("conflicting lock/state: {0}")]
    Conflict(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("deployment store")]
    Deploy(#[from] deploy::Error),

    #[error("remote registry")]
    Remote(#[from] remote::Error),

    #[error("repository adapter")]
    Repository(#[source] repository::Error),

    #[error("app runner")]
    Runner(#[from] runner::Error),

    #[error("signal handling")]
    Signal(#[from] crate::signal::Error),
}

/// Distinguishes transient (retry-worthy) from permanent IO failures (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorKind {
    Transient,
    Permanent,
}

impl Error {
    pub fn io(kind: IoErrorKind, source: std::io::Error) -> Self {
        Error::Io { kind, source }
    }

    pub fn permanent_io(source: std::io::Error) -> Self {
        Self::io(IoErrorKind::Permanent, source)
    }

    pub fn transient_io(source: std::io::Error) -> Self {
        Self::io(IoErrorKind::Transient, source)
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::permanent_io(source)
    }
}

/// A summary/commit fetch that timed out or failed to connect is
/// retry-worthy (§5); everything else the repository adapter surfaces is
/// treated as permanent, matching how filesystem errors are classified.
impl From<repository::Error> for Error {
    fn from(source: repository::Error) -> Self {
        match &source {
            repository::Error::Fetch(e) if e.is_timeout() || e.is_connect() => {
                Error::transient_io(std::io::Error::new(std::io::ErrorKind::TimedOut, source.to_string()))
            }
            repository::Error::Io(e) if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted) => {
                Error::transient_io(std::io::Error::new(e.kind(), source.to_string()))
            }
            _ => Error::Repository(source),
        }
    }
}
