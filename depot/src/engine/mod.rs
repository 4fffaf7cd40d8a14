// SPDX-License-Identifier: MPL-2.0

//! The Installation Engine (spec.md §4.6): the public operations a caller
//! drives — `install`, `update`, `install_bundle`, `uninstall`, `launch`,
//! `list_installed_refs_for_update`. Each takes its collaborators
//! ([`Installation`], [`ContentStore`], optionally [`Runner`]) explicitly;
//! the engine itself holds no state across calls (spec.md §9).

mod bundle;
mod install;
mod launch;
mod refresh;
#[cfg(test)]
mod scenarios;
mod uninstall;
mod update;

pub use bundle::install_bundle;
pub use install::install;
pub use launch::launch;
pub use refresh::list_installed_refs_for_update;
pub use uninstall::uninstall;
pub use update::update;

use crate::installation::lockfile;
use crate::Error;

bitflags::bitflags! {
    /// Per-call behavior flags (§4.6 `update`, `uninstall`). `REINSTALL` and
    /// `UNTRUSTED_BUNDLE` also apply to `install`/`install_bundle`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        /// Skip the network pull; act only on already-cached commits.
        const NO_PULL = 1 << 0;
        /// Pull but do not move the deploy/active pointers.
        const NO_DEPLOY = 1 << 1;
        /// Disable delta-transport negotiation (no-op: [`crate::repository::LocalStore`]
        /// has no delta machinery).
        const NO_STATIC_DELTAS = 1 << 2;
        /// Skip the post-deploy prune.
        const NO_PRUNE = 1 << 3;
        /// Skip running post-deploy triggers.
        const NO_TRIGGERS = 1 << 4;
        /// Overwrite an existing deployment instead of failing with `AlreadyInstalled`.
        const REINSTALL = 1 << 5;
        /// Accept a bundle whose origin is not yet a configured, trusted remote.
        const UNTRUSTED_BUNDLE = 1 << 6;
    }
}

/// Sum of file sizes under `path`, used to report `installed_size` for a
/// deployment that already exists on disk (no checkout performed).
fn dir_size(path: &std::path::Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| match entry.file_type() {
            Ok(t) if t.is_dir() => dir_size(&entry.path()),
            Ok(_) => entry.metadata().map(|m| m.len()).unwrap_or(0),
            Err(_) => 0,
        })
        .sum()
}

fn map_lock_error(e: lockfile::Error) -> Error {
    match e {
        lockfile::Error::Cancelled => Error::Cancelled,
        other => Error::permanent_io(io_from_lock(other)),
    }
}

fn io_from_lock(e: lockfile::Error) -> std::io::Error {
    match e {
        lockfile::Error::Io(e) => e,
        lockfile::Error::Flock(errno) => std::io::Error::from_raw_os_error(errno as i32),
        lockfile::Error::Cancelled => std::io::Error::new(std::io::ErrorKind::Interrupted, "cancelled"),
    }
}
