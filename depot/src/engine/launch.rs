// SPDX-License-Identifier: MPL-2.0

use std::process::ExitStatus;

use crate::deploy;
use crate::installation::{CancelToken, Installation};
use crate::refs::Ref;
use crate::runner::{RunFlags, Runner};
use crate::Error;

/// `launch(name, arch?, branch?, commit?)` (§4.6) [repo-shared]. Loads the
/// deployed record for the resolved ref and hands it to the external
/// launcher; the outcome is returned unchanged (§6.6).
pub fn launch(
    installation: &Installation,
    runner: &dyn Runner,
    name: &str,
    arch: Option<String>,
    branch: Option<String>,
    commit: Option<&str>,
    cancel: &CancelToken,
) -> Result<ExitStatus, Error> {
    let ref_ = Ref::compose(crate::refs::Kind::App, name, arch, branch)?;

    let _repo_lock = installation.lock_repo_shared(cancel).map_err(super::map_lock_error)?;

    let commit = match commit {
        Some(commit) => commit.to_string(),
        None => deploy::active_commit(installation, &ref_).ok_or_else(|| Error::NotInstalled(ref_.format()))?,
    };

    let deployment = deploy::read_deployment(installation, &ref_, &commit)?;

    Ok(runner.run_app(&ref_, &deployment, RunFlags::empty())?)
}
