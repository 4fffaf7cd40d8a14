// SPDX-License-Identifier: MPL-2.0

//! Cache of the most recently fetched `(remote, ref) -> commit` table
//! (spec.md §4.4). Always re-validated against a live fetch before being
//! trusted for a mutating operation; read by `list_installed_refs_for_update`
//! for a best-effort, non-blocking view.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel::{Connection as _, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use super::{Connection, Error};
use crate::refs::Ref;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/summary/migrations");

mod schema;

#[derive(Debug, Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(url: &str) -> Result<Self, Error> {
        let mut conn = SqliteConnection::establish(url)?;
        conn.run_pending_migrations(MIGRATIONS).map_err(Error::Migration)?;

        Ok(Database {
            conn: Connection::new(conn),
        })
    }

    /// Replace the cached ref table for `remote` wholesale — summaries are
    /// not diffed, only wholly superseded (§4.4).
    pub fn replace_for_remote(&self, remote: &str, refs: &HashMap<Ref, String>, fetched_at: i64) -> Result<(), Error> {
        self.conn.exec(|conn| {
            conn.transaction(|tx| {
                diesel::delete(schema::remote_refs::table.filter(schema::remote_refs::remote.eq(remote)))
                    .execute(tx)?;

                let rows: Vec<_> = refs
                    .iter()
                    .map(|(ref_, commit)| model::NewRemoteRef {
                        remote: remote.to_string(),
                        ref_full: ref_.format(),
                        commit_hash: commit.clone(),
                        fetched_at,
                    })
                    .collect();

                if !rows.is_empty() {
                    diesel::insert_into(schema::remote_refs::table).values(rows).execute(tx)?;
                }

                Ok(())
            })
        })
    }

    pub fn refs_for_remote(&self, remote: &str) -> Result<HashMap<Ref, String>, Error> {
        self.conn.exec(|conn| {
            let rows = schema::remote_refs::table
                .select(model::RemoteRef::as_select())
                .filter(schema::remote_refs::remote.eq(remote))
                .load(conn)?;

            rows.into_iter()
                .map(|row| {
                    Ref::parse(&row.ref_full)
                        .map(|ref_| (ref_, row.commit_hash))
                        .map_err(|_| Error::InvalidRef(row.ref_full))
                })
                .collect()
        })
    }

    pub fn all(&self) -> Result<Vec<(String, Ref, String)>, Error> {
        self.conn.exec(|conn| {
            let rows = schema::remote_refs::table.select(model::RemoteRef::as_select()).load(conn)?;

            rows.into_iter()
                .map(|row| {
                    Ref::parse(&row.ref_full)
                        .map(|ref_| (row.remote, ref_, row.commit_hash))
                        .map_err(|_| Error::InvalidRef(row.ref_full))
                })
                .collect()
        })
    }
}

mod model {
    use diesel::prelude::*;

    pub use super::schema::remote_refs;

    #[derive(Queryable, Selectable)]
    #[diesel(table_name = remote_refs)]
    pub struct RemoteRef {
        pub remote: String,
        pub ref_full: String,
        pub commit_hash: String,
        pub fetched_at: i64,
    }

    #[derive(Insertable)]
    #[diesel(table_name = remote_refs)]
    pub struct NewRemoteRef {
        pub remote: String,
        pub ref_full: String,
        pub commit_hash: String,
        pub fetched_at: i64,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::refs::Kind;

    #[test]
    fn replace_and_read_back() {
        let db = Database::new(":memory:").unwrap();

        let mut refs = HashMap::new();
        let ref_ = Ref::compose(Kind::App, "org.example.Editor", Some("x86_64".into()), Some("stable".into())).unwrap();
        refs.insert(ref_.clone(), "a".repeat(64));

        db.replace_for_remote("origin", &refs, 1_700_000_000).unwrap();

        let cached = db.refs_for_remote("origin").unwrap();
        assert_eq!(cached.get(&ref_), Some(&"a".repeat(64)));
    }

    #[test]
    fn replace_supersedes_previous_rows() {
        let db = Database::new(":memory:").unwrap();
        let ref_ = Ref::compose(Kind::App, "org.example.Editor", Some("x86_64".into()), Some("stable".into())).unwrap();

        let mut first = HashMap::new();
        first.insert(ref_.clone(), "a".repeat(64));
        db.replace_for_remote("origin", &first, 1).unwrap();

        db.replace_for_remote("origin", &HashMap::new(), 2).unwrap();

        assert!(db.refs_for_remote("origin").unwrap().is_empty());
    }
}
