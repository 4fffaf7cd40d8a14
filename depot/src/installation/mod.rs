// SPDX-License-Identifier: MPL-2.0

//! The on-disk installation root (spec.md §6.1): layout helpers, the two
//! lock files, `.changed`, and `repo/config`.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use nix::unistd::{access, AccessFlags, Uid};

pub mod lockfile;

pub use lockfile::{CancelToken, Lock, Mode as LockMode};

use crate::remote::ini;

/// Do we have read-write access to this installation's root?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for Mutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutability::ReadOnly => "read-only".fmt(f),
            Mutability::ReadWrite => "read-write".fmt(f),
        }
    }
}

/// A handle to an installation root. Constructed once and passed into the
/// engine; there is no module-level mutable state (spec.md §9).
#[derive(Debug, Clone)]
pub struct Installation {
    pub root: PathBuf,
    pub mutability: Mutability,
}

impl Installation {
    /// Open `root`, creating the directory skeleton if writable.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, io::Error> {
        let root: PathBuf = root.into();

        let mutability = if Uid::effective().is_root() {
            Mutability::ReadWrite
        } else if access(&root, AccessFlags::W_OK).is_ok() {
            Mutability::ReadWrite
        } else {
            Mutability::ReadOnly
        };

        let installation = Self { root, mutability };

        if matches!(installation.mutability, Mutability::ReadWrite) {
            installation.ensure_dirs_exist()?;
        }

        Ok(installation)
    }

    pub fn read_only(&self) -> bool {
        matches!(self.mutability, Mutability::ReadOnly)
    }

    fn ensure_dirs_exist(&self) -> Result<(), io::Error> {
        for path in [
            self.repo_path(""),
            self.app_path(""),
            self.runtime_path(""),
            self.deploy_path(""),
            self.exports_path(""),
            self.appstream_path(""),
            self.removed_path(""),
        ] {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    /// `repo/` — the opaque content-addressed object store.
    pub fn repo_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join("repo").join(path)
    }

    /// `app/<name>/<arch>/<branch>/active` and `app/<name>/current`.
    pub fn app_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join("app").join(path)
    }

    /// Same shape as `app/`, with no `current` pointer.
    pub fn runtime_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join("runtime").join(path)
    }

    /// `deploy/<kind>/<name>/<arch>/<branch>/<commit>/`.
    pub fn deploy_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join("deploy").join(path)
    }

    /// `exports/share/{applications,icons}/…`.
    pub fn exports_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join("exports").join(path)
    }

    /// `appstream/<remote>/<arch>/{active, <timestamp>/, .timestamp}`.
    pub fn appstream_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join("appstream").join(path)
    }

    /// The undeploy graveyard.
    pub fn removed_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join("removed").join(path)
    }

    pub fn ref_lock_path(&self) -> PathBuf {
        self.root.join(".ref-lock")
    }

    pub fn repo_lock_path(&self) -> PathBuf {
        self.root.join(".repo-lock")
    }

    pub fn changed_path(&self) -> PathBuf {
        self.root.join(".changed")
    }

    pub fn remotes_conf_path(&self) -> PathBuf {
        self.root.join("remotes.conf")
    }

    /// Per-installation key/value store, `languages` lives here (§6.4).
    pub fn config_path(&self) -> PathBuf {
        self.repo_path("config")
    }

    /// The remote summary/ref-commit cache database (§4.4).
    pub fn summary_cache_path(&self) -> PathBuf {
        self.repo_path("summary-cache.db")
    }

    /// Acquire `.ref-lock` (deploy-exclusive).
    pub fn lock_ref(&self, token: &CancelToken) -> Result<Lock, lockfile::Error> {
        lockfile::acquire(self.ref_lock_path(), LockMode::Exclusive, token)
    }

    /// Acquire `.repo-lock` shared-with-readers.
    pub fn lock_repo_shared(&self, token: &CancelToken) -> Result<Lock, lockfile::Error> {
        lockfile::acquire(self.repo_lock_path(), LockMode::Shared, token)
    }

    /// Acquire `.repo-lock` exclusive, for `prune` (§4.1).
    pub fn lock_repo_exclusive(&self, token: &CancelToken) -> Result<Lock, lockfile::Error> {
        lockfile::acquire(self.repo_lock_path(), LockMode::Exclusive, token)
    }

    /// Touch `.changed`, announcing a mutation to watchers (spec.md §4.6
    /// step 7).
    pub fn touch_changed(&self) -> Result<(), io::Error> {
        fs::File::create(self.changed_path())?;
        Ok(())
    }

    pub fn changed_mtime(&self) -> Result<SystemTime, io::Error> {
        fs::metadata(self.changed_path())?.modified()
    }

    /// The `languages` key from `repo/config`, defaulting to
    /// [`crate::environment::DEFAULT_LANGUAGES`] when unset (§6.4).
    pub fn languages(&self) -> Vec<String> {
        let Ok(doc) = ini::load(&self.config_path()) else {
            return default_languages();
        };

        doc.get("system", "languages")
            .map(|raw| raw.split(',').map(str::trim).map(str::to_string).collect())
            .unwrap_or_else(default_languages)
    }

    /// Persist `languages` to `repo/config` (Configure method, §6.3).
    pub fn set_languages(&self, languages: &[String]) -> Result<(), ini::Error> {
        let mut doc = ini::load(&self.config_path()).unwrap_or_default();
        doc.set("system", "languages", languages.join(","));
        ini::save(&self.config_path(), &doc)
    }
}

fn default_languages() -> Vec<String> {
    crate::environment::DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect()
}
