// SPDX-License-Identifier: MPL-2.0

//! The Remote Registry (spec.md §4.3): persisted remote configuration with
//! commit-on-modify semantics, backed by `remotes.conf` (§6.2).

pub mod ini;

use thiserror::Error;

use crate::installation::{self, CancelToken, Installation};

const GROUP_PREFIX: &str = "remote \"";

/// The on-disk/in-memory representation of a configured source of refs and
/// commits (spec.md §3). Only `Type::Static` is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
    pub collection_id: Option<String>,
    pub title: Option<String>,
    pub default_branch: Option<String>,
    pub gpg_verify: bool,
    pub gpg_verify_summary: bool,
    pub noenumerate: bool,
    pub nodeps: bool,
    pub disabled: bool,
    pub priority: i32,
    pub kind: Kind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Static,
    Lan,
    Usb,
}

impl Remote {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Remote {
            name: name.into(),
            url: url.into(),
            collection_id: None,
            title: None,
            default_branch: None,
            gpg_verify: true,
            gpg_verify_summary: true,
            noenumerate: false,
            nodeps: false,
            disabled: false,
            priority: 1,
            kind: Kind::Static,
        }
    }
}

/// Handle onto a single installation's `remotes.conf`. Every mutating
/// method commits transactionally: render in memory, fsync a temp file,
/// rename over the live file (§4.3), under `.ref-lock` exclusive (§4.1).
#[derive(Debug)]
pub struct Registry {
    installation: Installation,
}

impl Registry {
    pub fn open(installation: &Installation) -> Self {
        Registry {
            installation: installation.clone(),
        }
    }

    fn path(&self) -> std::path::PathBuf {
        self.installation.remotes_conf_path()
    }

    /// `list() → [Remote]`, sorted by descending priority, ties broken by
    /// insertion order (§4.3).
    pub fn list(&self) -> Result<Vec<Remote>, Error> {
        let doc = ini::load(&self.path())?;

        let mut remotes: Vec<Remote> = doc
            .groups()
            .filter_map(|(group, keys)| {
                let name = group.strip_prefix(GROUP_PREFIX)?.strip_suffix('"')?;
                Some(remote_from_group(name, keys))
            })
            .collect();

        remotes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(remotes)
    }

    pub fn get(&self, name: &str) -> Result<Remote, Error> {
        self.list()?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// `modify(remote, gpg_key_bytes?)` (§4.3). Rejects non-static remotes
    /// and empty URLs; trusted keys, when provided, replace any existing
    /// set (persisted out-of-band by the repository adapter per §6.5).
    pub fn modify(&self, remote: &Remote, cancel: &CancelToken) -> Result<(), Error> {
        if remote.kind != Kind::Static {
            return Err(Error::UnsupportedKind);
        }
        if remote.url.trim().is_empty() {
            return Err(Error::EmptyUrl);
        }

        let _lock = self.installation.lock_ref(cancel)?;

        let mut doc = ini::load(&self.path())?;
        let group = format!("{GROUP_PREFIX}{}\"", remote.name);

        doc.set(&group, "url", remote.url.clone());
        set_optional(&mut doc, &group, "collection-id", &remote.collection_id);
        set_optional(&mut doc, &group, "xa.title", &remote.title);
        set_optional(&mut doc, &group, "xa.default-branch", &remote.default_branch);
        doc.set(&group, "gpg-verify", remote.gpg_verify.to_string());
        doc.set(&group, "gpg-verify-summary", remote.gpg_verify_summary.to_string());
        doc.set(&group, "xa.noenumerate", remote.noenumerate.to_string());
        doc.set(&group, "xa.nodeps", remote.nodeps.to_string());
        doc.set(&group, "xa.disable", remote.disabled.to_string());
        doc.set(&group, "xa.prio", remote.priority.to_string());

        ini::save(&self.path(), &doc)?;
        Ok(())
    }

    /// `remove(name, force)` (§4.3). The caller is responsible for
    /// checking deployed-ref origins before passing `force = false`; the
    /// registry itself has no visibility into deployments.
    pub fn remove(&self, name: &str, cancel: &CancelToken) -> Result<(), Error> {
        let _lock = self.installation.lock_ref(cancel)?;

        let mut doc = ini::load(&self.path())?;
        let group = format!("{GROUP_PREFIX}{name}\"");

        if !doc.remove_group(&group) {
            return Err(Error::NotFound(name.to_string()));
        }

        ini::save(&self.path(), &doc)?;
        Ok(())
    }
}

fn set_optional(doc: &mut ini::Document, group: &str, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        doc.set(group, key, value.clone());
    }
}

fn remote_from_group(name: &str, keys: &indexmap::IndexMap<String, String>) -> Remote {
    let get_bool = |key: &str, default: bool| {
        keys.get(key).and_then(|v| v.parse::<bool>().ok()).unwrap_or(default)
    };

    Remote {
        name: name.to_string(),
        url: keys.get("url").cloned().unwrap_or_default(),
        collection_id: keys.get("collection-id").cloned(),
        title: keys.get("xa.title").cloned(),
        default_branch: keys.get("xa.default-branch").cloned(),
        gpg_verify: get_bool("gpg-verify", true),
        gpg_verify_summary: get_bool("gpg-verify-summary", true),
        noenumerate: get_bool("xa.noenumerate", false),
        nodeps: get_bool("xa.nodeps", false),
        disabled: get_bool("xa.disable", false),
        priority: keys.get("xa.prio").and_then(|v| v.parse().ok()).unwrap_or(1),
        kind: Kind::Static,
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("remote {0:?} is not configured")]
    NotFound(String),
    #[error("only static remotes may be persisted")]
    UnsupportedKind,
    #[error("remote url must not be empty")]
    EmptyUrl,
    #[error("ini")]
    Ini(#[from] ini::Error),
    #[error("lock")]
    Lock(#[from] installation::lockfile::Error),
}
