// SPDX-License-Identifier: MPL-2.0

use crate::deploy::{self, Deployment};
use crate::installation::{CancelToken, Installation};
use crate::progress::ProgressSink;
use crate::refs::{InstalledRef, Kind, Ref};
use crate::remote::Remote;
use crate::repository::ContentStore;
use crate::signal::{self, Signal};
use crate::Error;

use super::{map_lock_error, Flags};

/// `install(remote, kind, name, arch?, branch?, subpaths?, flags, progress?)` (§4.6).
#[allow(clippy::too_many_arguments)]
pub async fn install(
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

    if remote.disabled {
        return Err(Error::RemoteDisabled(remote.name.clone()));
    }

    if deploy::active_commit(installation, &ref_).is_some() && !flags.contains(Flags::REINSTALL) {
        return Err(Error::AlreadyInstalled(ref_.format()));
    }

    store.ensure().await?;

    let repo_lock = installation.lock_repo_shared(cancel).map_err(map_lock_error)?;

    let resolved = store
        .pull(remote, std::slice::from_ref(&ref_), subpaths, progress, cancel)
        .await?;
    let commit = resolved
        .get(&ref_)
        .ok_or_else(|| Error::NotInstalled(ref_.format()))?
        .clone();

    let _guard = signal::ignore([Signal::SIGINT, Signal::SIGTERM])?;
    let _deploy_lock = installation.lock_ref(cancel).map_err(map_lock_error)?;
    let lock_start = std::time::SystemTime::now();

    let subpaths = subpaths.unwrap_or(&[]);
    let deployment: Deployment = deploy::deploy(
        installation,
        store,
        &ref_,
        &commit,
        &remote.name,
        subpaths,
        flags.contains(Flags::REINSTALL),
    )?;

    drop(_deploy_lock);
    drop(repo_lock);

    installation.touch_changed()?;
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
