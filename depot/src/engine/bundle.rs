// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use crate::deploy;
use crate::installation::{CancelToken, Installation};
use crate::progress::{ProgressSink, Scheduler};
use crate::refs::{InstalledRef, Kind};
use crate::remote::{self, Remote, Registry};
use crate::repository::{bundle, ContentStore};
use crate::signal::{self, Signal};
use crate::Error;

use super::Flags;

/// `install_bundle(file, progress?)` (§4.6). Opens a self-contained bundle,
/// materializes (or reuses) a dedicated origin remote named after it, pulls
/// from the bundle, then deploys exactly as `install` would.
pub async fn install_bundle(
    installation: &Installation,
    store: &dyn ContentStore,
    file: &Path,
    flags: Flags,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<InstalledRef, Error> {
    let opened = bundle::open(file)?;
    let ref_ = opened.bundle_ref.ref_.clone();

    let registry = Registry::open(installation);
    let remote_name = bundle_remote_name(&opened.origin_url);

    match registry.get(&remote_name) {
        Ok(existing) if existing.url != opened.origin_url.as_str() && !flags.contains(Flags::UNTRUSTED_BUNDLE) => {
            return Err(Error::WrongOrigin {
                ref_: ref_.format(),
                expected: existing.url,
                actual: opened.origin_url.to_string(),
            });
        }
        Ok(_) => {}
        Err(remote::Error::NotFound(_)) => {
            let mut new_remote = Remote::new(&remote_name, opened.origin_url.to_string());
            new_remote.noenumerate = true;
            registry.modify(&new_remote, cancel)?;
        }
        Err(e) => return Err(Error::Remote(e)),
    }

    if let Some(key) = &opened.gpg_key {
        store.set_trusted_keys(&remote_name, key)?;
    }

    store.ensure().await?;

    let repo_lock = installation.lock_repo_shared(cancel).map_err(super::map_lock_error)?;
    let commit = store.pull_from_bundle(file, &remote_name, &ref_).await?;

    let deploy_path = deploy::deployment_path(installation, &ref_, &commit);
    if deploy_path.exists() && !flags.contains(Flags::REINSTALL) {
        return Err(Error::AlreadyInstalled(ref_.format()));
    }

    let _guard = signal::ignore([Signal::SIGINT, Signal::SIGTERM])?;
    let _deploy_lock = installation.lock_ref(cancel).map_err(super::map_lock_error)?;
    let lock_start = std::time::SystemTime::now();

    let deployment = deploy::deploy(installation, store, &ref_, &commit, &remote_name, &[], flags.contains(Flags::REINSTALL))?;

    drop(_deploy_lock);
    drop(repo_lock);

    installation.touch_changed()?;
    deploy::cleanup_removed(installation, lock_start)?;

    let mut scheduler = Scheduler::new(progress);
    scheduler.report(format!("installed {}", ref_.format()), 100, false, true);

    Ok(InstalledRef {
        ref_: ref_.clone(),
        origin: remote_name,
        latest_known_commit: deployment.commit,
        deploy_path: deployment.path,
        subpaths: deployment.subpaths,
        installed_size: deployment.installed_size,
        is_current: ref_.kind == Kind::App,
    })
}

fn bundle_remote_name(origin_url: &url::Url) -> String {
    origin_url.host_str().map(|h| format!("bundle-{h}")).unwrap_or_else(|| "bundle-local".to_string())
}
