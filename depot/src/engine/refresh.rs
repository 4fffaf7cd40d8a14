// SPDX-License-Identifier: MPL-2.0

use std::collections::HashMap;

use log::warn;

use crate::db::summary::Database;
use crate::deploy;
use crate::installation::Installation;
use crate::refs::{InstalledRef, Ref};
use crate::remote::Registry;
use crate::repository::ContentStore;

/// The summary cache is a best-effort optimization (§4.4): open it once per
/// call and fall back to doing without if it cannot be opened at all (e.g.
/// a read-only installation).
fn open_cache(installation: &Installation) -> Option<Database> {
    let url = installation.summary_cache_path();
    match Database::new(&url.to_string_lossy()) {
        Ok(db) => Some(db),
        Err(e) => {
            warn!("summary cache unavailable, continuing without it: {e}");
            None
        }
    }
}

/// `list_installed_refs_for_update()` (§4.6). Fetches each configured
/// remote's summary best-effort — a single remote's failure is logged and
/// skipped rather than failing the whole call (§4.6 Error semantics) — then
/// returns installed refs whose origin's remote commit has moved on. A
/// remote that fails to respond falls back to its last cached summary
/// (§4.4) rather than being dropped from the comparison outright.
pub async fn list_installed_refs_for_update(installation: &Installation, store: &dyn ContentStore) -> Vec<InstalledRef> {
    let registry = Registry::open(installation);
    let remotes = registry.list().unwrap_or_default();
    let cache = open_cache(installation);

    let mut remote_commits: HashMap<(String, Ref), String> = HashMap::new();
    for remote in remotes.iter().filter(|r| !r.disabled) {
        match store.list_remote_refs(remote).await {
            Ok(refs) => {
                if let Some(cache) = &cache {
                    let fetched_at = chrono::Utc::now().timestamp();
                    if let Err(e) = cache.replace_for_remote(&remote.name, &refs, fetched_at) {
                        warn!("failed to update summary cache for remote {}: {e}", remote.name);
                    }
                }
                for (ref_, commit) in refs {
                    remote_commits.insert((remote.name.clone(), ref_), commit);
                }
            }
            Err(e) => {
                warn!("skipping remote {} while checking for updates: {e}", remote.name);
                if let Some(cached) = cache.as_ref().and_then(|cache| cache.refs_for_remote(&remote.name).ok()) {
                    for (ref_, commit) in cached {
                        remote_commits.insert((remote.name.clone(), ref_), commit);
                    }
                }
            }
        }
    }

    let installed = deploy::list_installed(installation).unwrap_or_default();

    installed
        .into_iter()
        .filter(|installed_ref| {
            remote_commits
                .get(&(installed_ref.origin.clone(), installed_ref.ref_.clone()))
                .is_some_and(|remote_commit| *remote_commit != installed_ref.latest_known_commit)
        })
        .collect()
}
