// SPDX-License-Identifier: MPL-2.0

//! `depot` is the installation engine for a local, content-addressed
//! application store: discovery, fetch, verification, deployment, update,
//! uninstall and launch of self-contained application/runtime bundles
//! pulled from one or more configured remotes.
//!
//! The crate does not implement a sandboxed launcher or a CLI. Those are
//! external collaborators; see [`repository::ContentStore`] and [`runner`]
//! for the seams they plug into.

pub mod appstream;
pub mod db;
pub mod deploy;
pub mod engine;
pub mod environment;
pub mod error;
pub mod helper;
pub mod installation;
pub mod progress;
pub mod refs;
pub mod related;
pub mod remote;
pub mod repository;
pub mod runner;
pub mod signal;

pub use error::Error;
pub use installation::Installation;
pub use progress::{Progress, ProgressSink};
pub use refs::{BundleRef, InstalledRef, Kind, Ref, RelatedRef, RemoteRef};
pub use remote::{Remote, Registry as RemoteRegistry};
