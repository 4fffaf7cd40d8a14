// SPDX-License-Identifier: MPL-2.0

//! The Repository Adapter (spec.md §4.4, §6.5): a thin, typed facade over
//! the content-addressed object store embedded in an installation's
//! `repo/` directory. All network I/O and signature verification live
//! behind [`ContentStore`].
//!
//! `remote_add`/`modify`/`remove`/`list`/`get_url`/`get_gpg_verify` from
//! §6.5 are not repeated here: [`crate::remote::Registry`] already owns
//! that state, and each [`ContentStore`] method takes the resolved
//! [`crate::remote::Remote`] it needs directly.

pub mod bundle;
pub mod store;
pub mod summary;

use std::collections::HashMap;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use thiserror::Error;

pub use self::store::LocalStore;
pub use self::summary::{CommitMetadata, Summary};

use crate::installation::CancelToken;
use crate::progress::ProgressSink;
use crate::refs::Ref;
use crate::remote::Remote;

/// Shared client for connection reuse across fetches.
pub(crate) static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::ClientBuilder::new()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(crate::environment::SUMMARY_CONNECT_TIMEOUT)
        .build()
        .expect("build reqwest client")
});

/// The content-addressed object store API an installation is built on
/// (§6.5). Implementations own signature verification: the engine treats
/// any verification failure surfaced here as [`crate::Error::SignatureInvalid`].
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// `ensure(path) → Repo | Err` — create the store if absent.
    async fn ensure(&self) -> Result<(), Error>;

    /// `pull(remote, refs, subpaths?, progress) → Err`, returning the
    /// commit each ref resolved to. Polls `cancel` between fetch units
    /// (spec.md §5 Cancellation).
    async fn pull(
        &self,
        remote: &Remote,
        refs: &[Ref],
        subpaths: Option<&[String]>,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<HashMap<Ref, String>, Error>;

    async fn pull_from_bundle(&self, file: &Path, remote: &str, ref_: &Ref) -> Result<String, Error>;

    async fn pull_untrusted_local(
        &self,
        src_path: &Path,
        remote: &str,
        ref_: &Ref,
        subpaths: Option<&[String]>,
    ) -> Result<String, Error>;

    /// `checkout(commit, dst_dir, subpaths?) → Err`, returning the
    /// installed size in bytes.
    fn checkout(&self, commit: &str, dst_dir: &Path, subpaths: Option<&[String]>) -> Result<u64, Error>;

    fn list_refs(&self, prefix: &str) -> Result<Vec<Ref>, Error>;

    async fn list_remote_refs(&self, remote: &Remote) -> Result<HashMap<Ref, String>, Error>;

    fn read_commit_metadata(&self, commit: &str) -> Result<CommitMetadata, Error>;

    fn prune(&self) -> Result<(), Error>;

    /// `load_summary(bytes, sig_bytes?) → (refs, metadata)` (§6.5).
    fn load_summary(&self, bytes: &[u8], sig_bytes: Option<&[u8]>) -> Result<Summary, Error>;

    /// Replace the trusted ed25519 keys for `remote` (§4.3 `modify`,
    /// §6.3 `ConfigureRemote`). Trust storage is the adapter's
    /// responsibility per §6.5.
    fn set_trusted_keys(&self, remote: &str, key_bytes: &[u8]) -> Result<(), Error>;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("fetch failed")]
    Fetch(#[from] reqwest::Error),
    #[error("object {0} not found")]
    NotFound(String),
    #[error("commit {0} failed integrity verification")]
    Integrity(String),
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),
    #[error("malformed summary: {0}")]
    MalformedSummary(String),
    #[error("malformed bundle: {0}")]
    MalformedBundle(String),
    #[error("ref not found in remote {remote}: {ref_}")]
    RefNotFound { remote: String, ref_: String },
    #[error("operation cancelled")]
    Cancelled,
}
