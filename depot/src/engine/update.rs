// SPDX-License-Identifier: MPL-2.0

use crate::deploy::{self, Deployment};
use crate::installation::{CancelToken, Installation};
use crate::progress::ProgressSink;
use crate::refs::{InstalledRef, Kind, Ref};
use crate::remote::Remote;
use crate::repository::ContentStore;
use crate::signal::{self, Signal};
use crate::Error;

use super::{dir_size, map_lock_error, Flags};

/// `update(flags, kind, name, arch?, branch?, subpaths?, progress?)` (§4.6).
/// Idempotent: if the remote's commit matches the active one, returns the
/// existing [`InstalledRef`] unchanged.
#[allow(clippy::too_many_arguments)]
pub async fn update(
    installation: &Installation,
    store: &dyn ContentStore,
    remote: &Remote,
    kind: Kind,
    name: &str,
    arch: Option<String>,
    branch: Option<String>,
    subpaths: Option<&[String]>,
    flags: Flags,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<InstalledRef, Error> {
    let ref_ = Ref::compose(kind, name, arch, branch)?;

    let repo_lock = installation.lock_repo_shared(cancel).map_err(map_lock_error)?;

    let active = deploy::active_commit(installation, &ref_).ok_or_else(|| Error::NotInstalled(ref_.format()))?;

    let target_commit = if flags.contains(Flags::NO_PULL) {
        active.clone()
    } else {
        store.ensure().await?;
        let resolved = store
            .pull(remote, std::slice::from_ref(&ref_), subpaths, progress, cancel)
            .await?;
        resolved
            .get(&ref_)
            .ok_or_else(|| Error::NotInstalled(ref_.format()))?
            .clone()
    };

    if target_commit == active || flags.contains(Flags::NO_DEPLOY) {
        drop(repo_lock);
        let existing_subpaths = deploy::read_deployment(installation, &ref_, &active)?.subpaths;
        let subpaths = subpaths.unwrap_or(&existing_subpaths);
        return Ok(installed_ref(installation, &ref_, &remote.name, &active, subpaths));
    }

    let existing_subpaths = deploy::read_deployment(installation, &ref_, &active)?.subpaths;
    let subpaths_owned: &[String] = subpaths.unwrap_or(&existing_subpaths);

    let _guard = signal::ignore([Signal::SIGINT, Signal::SIGTERM])?;
    let _deploy_lock = installation.lock_ref(cancel).map_err(map_lock_error)?;
    let lock_start = std::time::SystemTime::now();

    let deployment: Deployment = deploy::deploy(installation, store, &ref_, &target_commit, &remote.name, subpaths_owned, true)?;

    // `active` now points at the freshly deployed commit; graveyard the
    // commit it replaced rather than leaving it live under `deploy/` (§4.6,
    // scenario S3). `force = true`: a running instance keeps its open file
    // handles valid across the rename, so it need not block the update.
    deploy::undeploy(installation, &ref_, &active, true, false)?;

    drop(_deploy_lock);
    drop(repo_lock);

    installation.touch_changed()?;

    if !flags.contains(Flags::NO_PRUNE) {
        let _prune_lock = installation.lock_repo_exclusive(cancel).map_err(map_lock_error)?;
        store.prune()?;
    }
    deploy::cleanup_removed(installation, lock_start)?;

    Ok(InstalledRef {
        ref_,
        origin: remote.name.clone(),
        latest_known_commit: deployment.commit,
        deploy_path: deployment.path,
        subpaths: deployment.subpaths,
        installed_size: deployment.installed_size,
        is_current: kind == Kind::App,
    })
}

fn installed_ref(installation: &Installation, ref_: &Ref, origin: &str, commit: &str, subpaths: &[String]) -> InstalledRef {
    let deploy_path = deploy::deployment_path(installation, ref_, commit);
    let installed_size = dir_size(&deploy_path.join("files"));

    InstalledRef {
        ref_: ref_.clone(),
        origin: origin.to_string(),
        latest_known_commit: commit.to_string(),
        deploy_path,
        subpaths: subpaths.to_vec(),
        installed_size,
        is_current: ref_.kind == Kind::App,
    }
}
