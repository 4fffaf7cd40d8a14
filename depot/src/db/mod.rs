// SPDX-License-Identifier: MPL-2.0

//! Sqlite-backed caches. The only table depot keeps is the remote
//! summary/ref-commit cache in [`summary`] — per spec.md §4.4 this cache
//! MUST be re-validated on every fetch-remote operation, so it is an
//! optimization for read-mostly listings (`list_installed_refs_for_update`)
//! rather than a source of truth. There is no package-metadata database:
//! the filesystem layout of §6.1 is authoritative for installed state.

use std::fmt;
use std::sync::{Arc, Mutex};

use diesel::SqliteConnection;
use thiserror::Error;

pub mod summary;

#[derive(Clone)]
struct Connection(Arc<Mutex<SqliteConnection>>);

impl Connection {
    fn new(connection: SqliteConnection) -> Self {
        Self(Arc::new(Mutex::new(connection)))
    }

    fn exec<T>(&self, f: impl FnOnce(&mut SqliteConnection) -> T) -> T {
        let mut guard = self.0.lock().expect("mutex guard");
        f(&mut guard)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("diesel")]
    Diesel(#[from] diesel::result::Error),
    #[error("diesel connection")]
    Connection(#[from] diesel::ConnectionError),
    #[error("diesel migration")]
    Migration(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("invalid cached ref {0:?}")]
    InvalidRef(String),
}
