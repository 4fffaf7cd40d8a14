// SPDX-License-Identifier: MPL-2.0

use crate::deploy;
use crate::installation::{CancelToken, Installation};
use crate::refs::{Kind, Ref};
use crate::repository::ContentStore;
use crate::runner::Runner;
use crate::signal::{self, Signal};
use crate::Error;

use super::{map_lock_error, Flags};

/// `uninstall(flags, kind, name, arch?, branch?)` (§4.6). Undeploys every
/// commit of `ref`, removes it from the repository, then prunes.
pub fn uninstall(
    installation: &Installation,
    store: &dyn ContentStore,
    runner: &dyn Runner,
    kind: Kind,
    name: &str,
    arch: Option<String>,
    branch: Option<String>,
    flags: Flags,
    cancel: &CancelToken,
) -> Result<(), Error> {
    let ref_ = Ref::compose(kind, name, arch, branch)?;

    let repo_lock = installation.lock_repo_shared(cancel).map_err(map_lock_error)?;
    let _guard = signal::ignore([Signal::SIGINT, Signal::SIGTERM])?;
    let _deploy_lock = installation.lock_ref(cancel).map_err(map_lock_error)?;
    let lock_start = std::time::SystemTime::now();

    let commits = deploy::deployed_commits(installation, &ref_)?;
    if commits.is_empty() {
        return Err(Error::NotInstalled(ref_.format()));
    }

    for commit in &commits {
        let deployment = deploy::read_deployment(installation, &ref_, commit)?;
        let in_use = runner.is_running(&ref_, &deployment);
        deploy::undeploy(installation, &ref_, commit, false, in_use)?;
    }

    drop(_deploy_lock);
    drop(repo_lock);

    installation.touch_changed()?;

    if !flags.contains(Flags::NO_PRUNE) {
        let _prune_lock = installation.lock_repo_exclusive(cancel).map_err(map_lock_error)?;
        store.prune()?;
    }

    deploy::cleanup_removed(installation, lock_start)?;

    Ok(())
}
