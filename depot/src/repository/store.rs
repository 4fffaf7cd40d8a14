// SPDX-License-Identifier: MPL-2.0

//! [`LocalStore`]: the default [`ContentStore`] backing an installation's
//! `repo/` directory (spec.md §6.1, §6.5).
//!
//! Commits are content-addressed tarballs: a commit's checksum is the
//! SHA-256 of the tar stream the remote serves for it. `objects/<commit>/`
//! holds the unpacked tree plus a `metadata` file; `refs/<full-ref>` is a
//! text pointer recording the object store's own notion of "what commit
//! does this ref currently name", independent of the Deployment Store's
//! `deploy/`/`app/` pointers.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use url::Url;

use super::{bundle, summary, ContentStore, Error, Summary, CLIENT};
use crate::installation::CancelToken;
use crate::progress::{ProgressSink, Scheduler};
use crate::refs::Ref;
use crate::remote::Remote;

#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    fn object_dir(&self, commit: &str) -> PathBuf {
        self.objects_dir().join(commit)
    }

    fn trusted_keys_dir(&self) -> PathBuf {
        self.root.join("trusted-keys")
    }

    fn local_ref_path(&self, ref_: &Ref) -> PathBuf {
        self.root.join("refs").join(ref_.format())
    }

    fn trusted_key(&self, remote: &str) -> Option<VerifyingKey> {
        let bytes = fs::read(self.trusted_keys_dir().join(remote)).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        VerifyingKey::from_bytes(&bytes).ok()
    }

    fn remote_url(&self, remote: &Remote) -> Result<Url, Error> {
        Url::parse(&remote.url).map_err(|e| Error::MalformedSummary(format!("invalid remote url: {e}")))
    }

    async fn fetch_commit_tar(&self, url: &Url, commit: &str) -> Result<Vec<u8>, Error> {
        let commit_url = url
            .join(&format!("commits/{commit}.tar"))
            .map_err(|e| Error::MalformedSummary(e.to_string()))?;

        let response = CLIENT.get(commit_url).send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();

        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        let digest = hex::encode(Sha256::digest(&bytes));
        if digest != commit {
            return Err(Error::Integrity(commit.to_string()));
        }

        Ok(bytes)
    }

    /// Unpack a downloaded commit tarball into `objects/<commit>/`,
    /// restricted to `subpaths` when given (partial-checkout rule, §3).
    fn store_commit_tar(&self, commit: &str, bytes: &[u8], subpaths: Option<&[String]>) -> Result<(), Error> {
        let dir = self.object_dir(commit);
        fs::create_dir_all(&dir)?;

        let mut archive = tar::Archive::new(bytes);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();

            if !wanted(&path, subpaths) {
                continue;
            }

            let dst = dir.join(&path);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&dst)?;
        }

        self.write_commit_meta(commit)?;
        Ok(())
    }

    fn write_commit_meta(&self, commit: &str) -> Result<(), Error> {
        let subject = fs::read_to_string(self.object_dir(commit).join("metadata"))
            .ok()
            .and_then(|s| s.lines().next().map(str::to_string))
            .unwrap_or_default();

        let meta = serde_json::json!({
            "subject": subject,
            "timestamp": chrono::Utc::now().timestamp(),
            "parent": serde_json::Value::Null,
        });

        fs::write(self.object_dir(commit).join("commitmeta.json"), meta.to_string())?;
        Ok(())
    }

    fn set_local_ref(&self, ref_: &Ref, commit: &str) -> Result<(), Error> {
        let path = self.local_ref_path(ref_);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(commit.as_bytes())?;
        Ok(())
    }
}

/// `path` is wanted if it is at or under a subpath, or an ancestor
/// directory a subpath lives inside (so `copy_tree`'s recursion can reach
/// a nested subpath at all).
fn wanted(path: &Path, subpaths: Option<&[String]>) -> bool {
    let Some(subpaths) = subpaths else { return true };
    if subpaths.is_empty() {
        return true;
    }
    if path.as_os_str() == "metadata" {
        return true;
    }
    subpaths.iter().any(|subpath| {
        let subpath = Path::new(subpath.trim_start_matches('/'));
        path.starts_with(subpath) || subpath.starts_with(path)
    })
}

#[async_trait]
impl ContentStore for LocalStore {
    async fn ensure(&self) -> Result<(), Error> {
        for dir in [self.objects_dir(), self.trusted_keys_dir(), self.root.join("refs")] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    async fn pull(
        &self,
        remote: &Remote,
        refs: &[Ref],
        subpaths: Option<&[String]>,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<HashMap<Ref, String>, Error> {
        let url = self.remote_url(remote)?;
        let key = remote.gpg_verify_summary.then(|| self.trusted_key(&remote.name)).flatten();

        let remote_summary = summary::fetch(&url, key.as_ref()).await?;

        let mut resolved = HashMap::new();
        let total = refs.len().max(1);
        let mut scheduler = Scheduler::new(progress);

        for (index, ref_) in refs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let commit = remote_summary
                .refs
                .get(ref_)
                .cloned()
                .ok_or_else(|| Error::RefNotFound {
                    remote: remote.name.clone(),
                    ref_: ref_.format(),
                })?;

            if !self.object_dir(&commit).is_dir() {
                let bytes = self.fetch_commit_tar(&url, &commit).await?;
                self.store_commit_tar(&commit, &bytes, subpaths)?;
            }

            self.set_local_ref(ref_, &commit)?;
            resolved.insert(ref_.clone(), commit);

            let percent = (((index + 1) * 100) / total) as u8;
            let is_last = index + 1 == refs.len();
            scheduler.report(format!("pulled {}", ref_.format()), percent, false, is_last);
        }

        Ok(resolved)
    }

    async fn pull_from_bundle(&self, file: &Path, remote: &str, ref_: &Ref) -> Result<String, Error> {
        let opened = bundle::open(file)?;
        if opened.bundle_ref.ref_ != *ref_ {
            return Err(Error::MalformedBundle("bundle ref does not match requested ref".into()));
        }

        let dir = self.object_dir(&opened.commit);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("metadata"), &opened.bundle_ref.metadata_bytes)?;
        bundle::extract_files(file, &dir.join("files"))?;
        self.write_commit_meta(&opened.commit)?;

        self.set_local_ref(ref_, &opened.commit)?;
        let _ = remote;
        Ok(opened.commit)
    }

    async fn pull_untrusted_local(
        &self,
        src_path: &Path,
        _remote: &str,
        ref_: &Ref,
        subpaths: Option<&[String]>,
    ) -> Result<String, Error> {
        let bytes = tokio::fs::read(src_path).await?;
        let commit = hex::encode(Sha256::digest(&bytes));

        self.store_commit_tar(&commit, &bytes, subpaths)?;
        self.set_local_ref(ref_, &commit)?;

        Ok(commit)
    }

    fn checkout(&self, commit: &str, dst_dir: &Path, subpaths: Option<&[String]>) -> Result<u64, Error> {
        let src = self.object_dir(commit);
        if !src.is_dir() {
            return Err(Error::NotFound(commit.to_string()));
        }

        fs::create_dir_all(dst_dir)?;
        let mut total = 0u64;
        copy_tree(&src, dst_dir, &src, subpaths, &mut total)?;
        Ok(total)
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<Ref>, Error> {
        let root = self.root.join("refs");
        let mut refs = Vec::new();
        walk_refs(&root, &root, &mut refs)?;
        Ok(refs.into_iter().filter(|r| r.format().starts_with(prefix)).collect())
    }

    async fn list_remote_refs(&self, remote: &Remote) -> Result<HashMap<Ref, String>, Error> {
        let url = self.remote_url(remote)?;
        let key = remote.gpg_verify_summary.then(|| self.trusted_key(&remote.name)).flatten();
        let summary = summary::fetch(&url, key.as_ref()).await?;
        Ok(summary.refs)
    }

    fn read_commit_metadata(&self, commit: &str) -> Result<super::CommitMetadata, Error> {
        let path = self.object_dir(commit).join("commitmeta.json");
        let bytes = fs::read(&path).map_err(|_| Error::NotFound(commit.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| Error::MalformedSummary(e.to_string()))?;

        Ok(super::CommitMetadata {
            subject: value["subject"].as_str().unwrap_or_default().to_string(),
            timestamp: value["timestamp"].as_i64().unwrap_or_default(),
            parent: value["parent"].as_str().map(str::to_string),
        })
    }

    fn prune(&self) -> Result<(), Error> {
        let mut live = std::collections::HashSet::new();
        walk_commits(&self.root.join("refs"), &mut live)?;

        let objects = self.objects_dir();
        if !objects.is_dir() {
            return Ok(());
        }

        for entry in fs::read_dir(&objects)? {
            let entry = entry?;
            let commit = entry.file_name().to_string_lossy().into_owned();
            if !live.contains(&commit) {
                fs::remove_dir_all(entry.path())?;
            }
        }

        Ok(())
    }

    fn load_summary(&self, bytes: &[u8], sig_bytes: Option<&[u8]>) -> Result<Summary, Error> {
        summary::parse(bytes, sig_bytes, None)
    }

    fn set_trusted_keys(&self, remote: &str, key_bytes: &[u8]) -> Result<(), Error> {
        fs::create_dir_all(self.trusted_keys_dir())?;
        fs::write(self.trusted_keys_dir().join(remote), key_bytes)?;
        Ok(())
    }
}

fn copy_tree(base: &Path, dst_base: &Path, dir: &Path, subpaths: Option<&[String]>, total: &mut u64) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(base).expect("entry under base");

        if !wanted(relative, subpaths) {
            continue;
        }

        let dst = dst_base.join(relative);

        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&dst)?;
            copy_tree(base, dst_base, &path, subpaths, total)?;
        } else {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            match fs::hard_link(&path, &dst) {
                Ok(()) => {}
                Err(_) => {
                    fs::copy(&path, &dst)?;
                }
            }
            *total += entry.metadata()?.len();
        }
    }
    Ok(())
}

fn walk_refs(base: &Path, dir: &Path, out: &mut Vec<Ref>) -> Result<(), Error> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_refs(base, &path, out)?;
        } else if let Some(relative) = path.strip_prefix(base).ok().and_then(|p| p.to_str()) {
            if let Ok(ref_) = Ref::parse(relative) {
                out.push(ref_);
            }
        }
    }
    Ok(())
}

fn walk_commits(dir: &Path, out: &mut std::collections::HashSet<String>) -> Result<(), Error> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_commits(&path, out)?;
        } else if let Ok(commit) = fs::read_to_string(&path) {
            out.insert(commit.trim().to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::refs::Kind;

    #[tokio::test]
    async fn pull_untrusted_local_then_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("repo"));
        store.ensure().await.unwrap();

        let src_dir = tempfile::tempdir().unwrap();
        let tar_path = src_dir.path().join("commit.tar");
        {
            let file = fs::File::create(&tar_path).unwrap();
            let mut builder = tar::Builder::new(file);
            let mut header = tar::Header::new_gnu();
            header.set_size(5);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "metadata", "hello".as_bytes()).unwrap();
            builder.finish().unwrap();
        }

        let ref_ = Ref::compose(Kind::App, "org.example.Editor", Some("x86_64".into()), Some("stable".into())).unwrap();

        let commit = store
            .pull_untrusted_local(&tar_path, "origin", &ref_, None)
            .await
            .unwrap();

        let dst = dir.path().join("checkout");
        let size = store.checkout(&commit, &dst, None).unwrap();

        assert!(size > 0);
        assert_eq!(fs::read_to_string(dst.join("metadata")).unwrap(), "hello");

        let refs = store.list_refs("app/").unwrap();
        assert_eq!(refs, vec![ref_]);
    }

    #[tokio::test]
    async fn prune_removes_unreferenced_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("repo"));
        store.ensure().await.unwrap();

        fs::create_dir_all(store.object_dir("deadbeef")).unwrap();
        store.prune().unwrap();

        assert!(!store.object_dir("deadbeef").exists());
    }
}
