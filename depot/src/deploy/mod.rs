// SPDX-License-Identifier: MPL-2.0

//! The Deployment Store (spec.md §4.5): checkout a pulled commit into
//! `deploy/<ref>/<commit>`, maintain the `active`/`current` pointers,
//! mirror an app's export subtree into the shared `exports/` tree, and
//! run the `removed/` graveyard.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::REMOVED_SUFFIX_LEN;
use crate::installation::Installation;
use crate::refs::{InstalledRef, Kind, Ref};
use crate::repository::ContentStore;

/// A checked-out copy of a commit on disk (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub ref_: Ref,
    pub commit: String,
    pub origin: String,
    pub subpaths: Vec<String>,
    pub timestamp: i64,
    pub path: PathBuf,
    pub installed_size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    origin: String,
    subpaths: Vec<String>,
    timestamp: i64,
}

fn kind_tree(installation: &Installation, kind: Kind) -> PathBuf {
    match kind {
        Kind::App => installation.app_path(""),
        Kind::Runtime => installation.runtime_path(""),
    }
}

fn ref_dir(root: &Path, ref_: &Ref) -> PathBuf {
    root.join(&ref_.name).join(&ref_.arch).join(&ref_.branch)
}

fn deploy_dir(installation: &Installation, ref_: &Ref, commit: &str) -> PathBuf {
    installation
        .deploy_path(ref_.kind.to_string())
        .join(&ref_.name)
        .join(&ref_.arch)
        .join(&ref_.branch)
        .join(commit)
}

fn active_link(installation: &Installation, ref_: &Ref) -> PathBuf {
    ref_dir(&kind_tree(installation, ref_.kind), ref_).join("active")
}

fn current_link(installation: &Installation, name: &str) -> PathBuf {
    installation.app_path(name).join("current")
}

/// Where `Deploy(ref, commit, ..)` would check out to. Exposed so callers
/// can cheaply test "already deployed" before acquiring locks or pulling
/// (spec.md §4.6 `install` step 2).
pub fn deployment_path(installation: &Installation, ref_: &Ref, commit: &str) -> PathBuf {
    deploy_dir(installation, ref_, commit)
}

/// Every commit of `ref_` still sitting under `deploy/` (spec.md §4.6
/// `uninstall`: "undeploys all commits for ref").
pub fn deployed_commits(installation: &Installation, ref_: &Ref) -> Result<Vec<String>, Error> {
    let dir = ref_dir(&installation.deploy_path(ref_.kind.to_string()), ref_);
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let mut commits = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            commits.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(commits)
}

/// Load the `deploy` record written by [`deploy`] for an already-deployed
/// commit, e.g. to hand the running-process check in [`crate::runner::Runner`]
/// a fully formed [`Deployment`].
pub fn read_deployment(installation: &Installation, ref_: &Ref, commit: &str) -> Result<Deployment, Error> {
    let path = deploy_dir(installation, ref_, commit);
    let record: Record = serde_json::from_slice(&fs::read(path.join("deploy"))?)?;

    Ok(Deployment {
        ref_: ref_.clone(),
        commit: commit.to_string(),
        origin: record.origin,
        subpaths: record.subpaths,
        timestamp: record.timestamp,
        installed_size: 0, // not recomputed on read; callers needing it should re-derive from `files/`
        path,
    })
}

/// The commit `active` currently points at, if any.
pub fn active_commit(installation: &Installation, ref_: &Ref) -> Option<String> {
    let link = active_link(installation, ref_);
    fs::read_link(&link)
        .ok()?
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Every [`InstalledRef`] currently deployed under `app/` and `runtime/`,
/// derived from each `<name>/<arch>/<branch>/active` pointer (§6.1).
pub fn list_installed(installation: &Installation) -> Result<Vec<InstalledRef>, Error> {
    let mut out = Vec::new();
    for kind in [Kind::App, Kind::Runtime] {
        walk_kind_tree(installation, kind, &kind_tree(installation, kind), &mut out)?;
    }
    Ok(out)
}

fn walk_kind_tree(installation: &Installation, kind: Kind, tree: &Path, out: &mut Vec<InstalledRef>) -> Result<(), Error> {
    if !tree.is_dir() {
        return Ok(());
    }

    for name_entry in fs::read_dir(tree)? {
        let name_entry = name_entry?;
        if !name_entry.file_type()?.is_dir() {
            continue;
        }
        let name = name_entry.file_name().to_string_lossy().into_owned();

        for arch_entry in fs::read_dir(name_entry.path())? {
            let arch_entry = arch_entry?;
            if !arch_entry.file_type()?.is_dir() {
                continue;
            }
            let arch = arch_entry.file_name().to_string_lossy().into_owned();

            for branch_entry in fs::read_dir(arch_entry.path())? {
                let branch_entry = branch_entry?;
                if !branch_entry.file_type()?.is_dir() {
                    continue;
                }
                let branch = branch_entry.file_name().to_string_lossy().into_owned();

                let Ok(ref_) = Ref::compose(kind, name.clone(), Some(arch.clone()), Some(branch.clone())) else {
                    continue;
                };
                let Some(commit) = active_commit(installation, &ref_) else {
                    continue;
                };
                let Ok(deployment) = read_deployment(installation, &ref_, &commit) else {
                    continue;
                };

                let is_current = kind == Kind::App
                    && fs::read_link(current_link(installation, &name))
                        .map(|target| target == Path::new(&arch).join(&branch))
                        .unwrap_or(false);

                out.push(InstalledRef {
                    ref_,
                    origin: deployment.origin,
                    latest_known_commit: commit,
                    deploy_path: deployment.path,
                    subpaths: deployment.subpaths,
                    installed_size: 0,
                    is_current,
                });
            }
        }
    }

    Ok(())
}

/// `Deploy(ref, commit, origin, subpaths)` (§4.5).
pub fn deploy(
    installation: &Installation,
    store: &dyn ContentStore,
    ref_: &Ref,
    commit: &str,
    origin: &str,
    subpaths: &[String],
    reinstall: bool,
) -> Result<Deployment, Error> {
    let path = deploy_dir(installation, ref_, commit);

    if path.exists() && !reinstall {
        return Err(Error::AlreadyInstalled(ref_.format()));
    }

    let rand_suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REMOVED_SUFFIX_LEN)
        .map(char::from)
        .collect();
    let tmp_path = path.with_extension(format!("tmp-{rand_suffix}"));

    if tmp_path.exists() {
        fs::remove_dir_all(&tmp_path)?;
    }
    fs::create_dir_all(&tmp_path)?;

    let checkout_subpaths = (!subpaths.is_empty()).then_some(subpaths);
    let installed_size = store.checkout(commit, &tmp_path.join("files"), checkout_subpaths)?;

    let timestamp = chrono::Utc::now().timestamp();
    let record = Record {
        origin: origin.to_string(),
        subpaths: subpaths.to_vec(),
        timestamp,
    };
    fs::write(tmp_path.join("deploy"), serde_json::to_vec(&record)?)?;

    if let Ok(metadata_bytes) = fs::read(tmp_path.join("files").join("metadata")) {
        fs::write(tmp_path.join("metadata"), metadata_bytes)?;
    }

    if path.exists() {
        fs::remove_dir_all(&path)?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&tmp_path, &path)?;

    point_active(installation, ref_, commit)?;

    if ref_.kind == Kind::App {
        make_current(installation, ref_)?;
        update_exports(installation, &ref_.name)?;
    }

    Ok(Deployment {
        ref_: ref_.clone(),
        commit: commit.to_string(),
        origin: origin.to_string(),
        subpaths: subpaths.to_vec(),
        timestamp,
        path,
        installed_size,
    })
}

fn point_active(installation: &Installation, ref_: &Ref, commit: &str) -> Result<(), Error> {
    let link = active_link(installation, ref_);
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }

    let target = deploy_dir(installation, ref_, commit);
    let relative = pathdiff(&target, link.parent().expect("active link has a parent"));

    atomic_symlink(&relative, &link)
}

fn make_current(installation: &Installation, ref_: &Ref) -> Result<(), Error> {
    let link = current_link(installation, &ref_.name);
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    let target = PathBuf::from(&ref_.arch).join(&ref_.branch);
    atomic_symlink(&target, &link)
}

/// `Update_exports(name)` (§4.5). Idempotent: safe to call unconditionally
/// after any app mutation.
pub fn update_exports(installation: &Installation, name: &str) -> Result<(), Error> {
    let current = current_link(installation, name);
    let Ok(arch_branch) = fs::read_link(&current) else {
        return prune_dangling_exports(installation);
    };

    let active = installation.app_path(name).join(&arch_branch).join("active");
    let Ok(commit_target) = fs::read_link(&active) else {
        return prune_dangling_exports(installation);
    };

    let deploy_path = active
        .parent()
        .expect("active has a parent")
        .join(commit_target)
        .canonicalize()
        .unwrap_or_else(|_| installation.root.clone());

    let export_root = deploy_path.join("files").join("export");
    if export_root.is_dir() {
        mirror_exports(installation, &export_root, &export_root)?;
    }

    prune_dangling_exports(installation)
}

fn mirror_exports(installation: &Installation, export_root: &Path, dir: &Path) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type()?.is_dir() {
            mirror_exports(installation, export_root, &path)?;
            continue;
        }

        let relative = path.strip_prefix(export_root).expect("entry under export root");
        let dst = installation.exports_path(relative);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }

        let relative_target = pathdiff(&path, dst.parent().expect("export entry has a parent"));
        atomic_symlink(&relative_target, &dst)?;
    }
    Ok(())
}

fn prune_dangling_exports(installation: &Installation) -> Result<(), Error> {
    let root = installation.exports_path("");
    if root.is_dir() {
        remove_dangling(&root)?;
    }
    Ok(())
}

fn remove_dangling(dir: &Path) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            remove_dangling(&path)?;
        } else if file_type.is_symlink() && fs::metadata(&path).is_err() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// `Undeploy(ref, commit, force)` (§4.5).
pub fn undeploy(installation: &Installation, ref_: &Ref, commit: &str, force: bool, in_use: bool) -> Result<(), Error> {
    if in_use && !force {
        return Err(Error::InUse(ref_.format()));
    }

    let path = deploy_dir(installation, ref_, commit);
    if !path.is_dir() {
        return Err(Error::NotInstalled(ref_.format()));
    }

    let rand_suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REMOVED_SUFFIX_LEN)
        .map(char::from)
        .collect();
    let graveyard = installation.removed_path(format!("{}-{rand_suffix}", ref_.format().replace('/', "_")));
    if let Some(parent) = graveyard.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&path, &graveyard)?;

    let link = active_link(installation, ref_);
    if let Ok(active_target) = fs::read_link(&link) {
        let active_is_commit = active_target.to_string_lossy().ends_with(commit);
        if active_is_commit {
            fs::remove_file(&link)?;
            if let Some(newest) = newest_remaining_commit(installation, ref_)? {
                point_active(installation, ref_, &newest)?;
            } else if ref_.kind == Kind::App {
                let current = current_link(installation, &ref_.name);
                let _ = fs::remove_file(current);
            }
        }
    }

    if ref_.kind == Kind::App {
        update_exports(installation, &ref_.name)?;
    }

    Ok(())
}

fn newest_remaining_commit(installation: &Installation, ref_: &Ref) -> Result<Option<String>, Error> {
    let dir = ref_dir(&installation.deploy_path(ref_.kind.to_string()), ref_);
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut newest: Option<(SystemTime, String)> = None;
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        let commit = entry.file_name().to_string_lossy().into_owned();
        let is_newer = match &newest {
            Some((t, _)) => modified > *t,
            None => true,
        };
        if is_newer {
            newest = Some((modified, commit));
        }
    }

    Ok(newest.map(|(_, commit)| commit))
}

/// `Cleanup_removed()` (§4.5): delete graveyard entries older than the
/// oldest active lock holder's start time.
pub fn cleanup_removed(installation: &Installation, oldest_lock_start: SystemTime) -> Result<(), Error> {
    let root = installation.removed_path("");
    if !root.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(&root)? {
        let entry = entry?;
        let modified = entry.metadata()?.modified()?;
        if modified < oldest_lock_start {
            fs::remove_dir_all(entry.path())?;
        }
    }

    Ok(())
}

pub(crate) fn atomic_symlink(target: &Path, link: &Path) -> Result<(), Error> {
    let tmp = link.with_extension(format!("tmp-{}", rand::thread_rng().gen::<u32>()));
    symlink(target, &tmp)?;
    fs::rename(&tmp, link)?;
    Ok(())
}

fn pathdiff(target: &Path, from: &Path) -> PathBuf {
    let target_components: Vec<_> = target.components().collect();
    let from_components: Vec<_> = from.components().collect();

    let common = target_components
        .iter()
        .zip(from_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component);
    }
    result
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("serde")]
    Serde(#[from] serde_json::Error),
    #[error("repository")]
    Repository(#[from] crate::repository::Error),
    #[error("{0} is already installed")]
    AlreadyInstalled(String),
    #[error("{0} is not installed")]
    NotInstalled(String),
    #[error("{0} is in use")]
    InUse(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pathdiff_climbs_to_common_ancestor() {
        let target = Path::new("/root/deploy/app/org.Ed/x86_64/stable/abc123");
        let from = Path::new("/root/app/org.Ed/x86_64/stable");

        let relative = pathdiff(target, from);
        assert_eq!(relative, Path::new("../../../../deploy/app/org.Ed/x86_64/stable/abc123"));
    }
}
