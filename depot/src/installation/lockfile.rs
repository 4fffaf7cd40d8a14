// SPDX-License-Identifier: MPL-2.0

//! Advisory file locking for `.ref-lock` (deploy-exclusive) and
//! `.repo-lock` (repository-shared) (spec.md §4.1).
//!
//! Acquisition polls [`environment::LOCK_POLL_INTERVAL`] rather than
//! blocking indefinitely in the kernel, so a caller's [`CancelToken`] is
//! honored even while waiting on a contended lock.

use std::fmt;
use std::io;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use fs_err::{self as fs, File};
use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};
use thiserror::Error;

use crate::environment::LOCK_POLL_INTERVAL;

/// The two lock intents named in spec.md §4.1: `repo-shared` (readers may
/// overlap) and `deploy-exclusive` (mutators never overlap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Shared,
    Exclusive,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Shared => "shared".fmt(f),
            Mode::Exclusive => "exclusive".fmt(f),
        }
    }
}

/// A cooperative cancellation signal shared between a caller and a blocking
/// lock wait or pull/deploy loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An acquired file lock, released when dropped.
#[derive(Debug)]
pub struct Lock {
    file: File,
    mode: Mode,
}

impl Lock {
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = flock(self.file.as_raw_fd(), FlockArg::Unlock);
    }
}

/// Acquire `path` in `mode`, polling `token` every
/// [`LOCK_POLL_INTERVAL`] while contended.
pub fn acquire(path: impl Into<PathBuf>, mode: Mode, token: &CancelToken) -> Result<Lock, Error> {
    let path = path.into();

    let file = fs::OpenOptions::new().create(true).write(true).truncate(false).open(&path)?;

    let nonblock_arg = match mode {
        Mode::Shared => FlockArg::LockSharedNonblock,
        Mode::Exclusive => FlockArg::LockExclusiveNonblock,
    };

    loop {
        match flock(file.as_raw_fd(), nonblock_arg) {
            Ok(()) => return Ok(Lock { file, mode }),
            Err(Errno::EWOULDBLOCK) => {
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(e) => return Err(Error::Flock(e)),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("acquiring file lock")]
    Flock(#[source] nix::Error),
    #[error("cancelled while waiting for lock")]
    Cancelled,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exclusive_then_shared_same_process_reenters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".repo-lock");
        let token = CancelToken::new();

        let lock = acquire(&path, Mode::Shared, &token).unwrap();
        assert_eq!(lock.mode(), Mode::Shared);
        drop(lock);

        let lock = acquire(&path, Mode::Exclusive, &token).unwrap();
        assert_eq!(lock.mode(), Mode::Exclusive);
    }

    #[test]
    fn cancel_token_observed() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
