// SPDX-License-Identifier: MPL-2.0

//! End-to-end scenarios against a fake in-memory [`ContentStore`], covering
//! the install/update/uninstall/concurrent-install lifecycle a caller
//! actually drives.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::*;
use crate::deploy::{self, Deployment};
use crate::installation::{CancelToken, Installation};
use crate::refs::{Kind, Ref};
use crate::remote::Remote;
use crate::repository::{CommitMetadata, ContentStore, Error as RepoError, Summary};

/// An in-memory stand-in for the on-disk content-addressed store: `pull`
/// resolves to whatever commit [`FakeStore::set_commit`] last recorded for
/// a ref, and `checkout` writes a single marker file so `installed_size`
/// is non-zero without needing a real object database.
struct FakeStore {
    commits: Mutex<HashMap<Ref, String>>,
    pull_calls: AtomicUsize,
}

impl FakeStore {
    fn new() -> Self {
        FakeStore {
            commits: Mutex::new(HashMap::new()),
            pull_calls: AtomicUsize::new(0),
        }
    }

    fn set_commit(&self, ref_: &Ref, commit: &str) {
        self.commits.lock().unwrap().insert(ref_.clone(), commit.to_string());
    }
}

#[async_trait]
impl ContentStore for FakeStore {
    async fn ensure(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn pull(
        &self,
        _remote: &Remote,
        refs: &[Ref],
        _subpaths: Option<&[String]>,
        progress: &mut dyn crate::progress::ProgressSink,
        _cancel: &CancelToken,
    ) -> Result<HashMap<Ref, String>, RepoError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        let commits = self.commits.lock().unwrap();

        let mut resolved = HashMap::new();
        for ref_ in refs {
            if let Some(commit) = commits.get(ref_) {
                resolved.insert(ref_.clone(), commit.clone());
            }
        }

        progress.on_progress(&crate::progress::Progress {
            status: "pulled".into(),
            percent: 100,
            estimating: false,
        });

        Ok(resolved)
    }

    async fn pull_from_bundle(&self, _file: &Path, _remote: &str, _ref_: &Ref) -> Result<String, RepoError> {
        unimplemented!("not exercised by these scenarios")
    }

    async fn pull_untrusted_local(
        &self,
        _src_path: &Path,
        _remote: &str,
        _ref_: &Ref,
        _subpaths: Option<&[String]>,
    ) -> Result<String, RepoError> {
        unimplemented!("not exercised by these scenarios")
    }

    fn checkout(&self, commit: &str, dst_dir: &Path, _subpaths: Option<&[String]>) -> Result<u64, RepoError> {
        std::fs::create_dir_all(dst_dir)?;
        std::fs::write(dst_dir.join("payload"), commit.as_bytes())?;
        Ok(commit.len() as u64)
    }

    fn list_refs(&self, _prefix: &str) -> Result<Vec<Ref>, RepoError> {
        Ok(self.commits.lock().unwrap().keys().cloned().collect())
    }

    async fn list_remote_refs(&self, _remote: &Remote) -> Result<HashMap<Ref, String>, RepoError> {
        Ok(self.commits.lock().unwrap().clone())
    }

    fn read_commit_metadata(&self, commit: &str) -> Result<CommitMetadata, RepoError> {
        Ok(CommitMetadata {
            subject: format!("commit {commit}"),
            timestamp: 0,
            parent: None,
        })
    }

    fn prune(&self) -> Result<(), RepoError> {
        Ok(())
    }

    fn load_summary(&self, _bytes: &[u8], _sig_bytes: Option<&[u8]>) -> Result<Summary, RepoError> {
        Ok(Summary::default())
    }

    fn set_trusted_keys(&self, _remote: &str, _key_bytes: &[u8]) -> Result<(), RepoError> {
        Ok(())
    }
}

fn app_ref() -> Ref {
    Ref::compose(Kind::App, "org.example.Editor", Some("x86_64".into()), Some("stable".into())).unwrap()
}

fn test_installation() -> (tempfile::TempDir, Installation) {
    let dir = tempfile::tempdir().unwrap();
    let installation = Installation::open(dir.path()).unwrap();
    (dir, installation)
}

/// S1 — install new app.
#[tokio::test]
async fn s1_install_new_app() {
    let (_dir, installation) = test_installation();
    let store = FakeStore::new();
    let ref_ = app_ref();
    store.set_commit(&ref_, "c1");
    let remote = Remote::new("R", "file:///srv/repo");

    let installed = install::install(
        &installation,
        &store,
        &remote,
        Kind::App,
        "org.example.Editor",
        Some("x86_64".into()),
        Some("stable".into()),
        None,
        Flags::empty(),
        &mut (),
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(installed.latest_known_commit, "c1");
    assert_eq!(installed.origin, "R");
    assert!(installed.is_current);

    let before = installation.changed_mtime();
    assert!(before.is_ok());
}

/// S2 — update no-op: remote still reports the active commit.
#[tokio::test]
async fn s2_update_noop_returns_unchanged() {
    let (_dir, installation) = test_installation();
    let store = FakeStore::new();
    let ref_ = app_ref();
    store.set_commit(&ref_, "c1");
    let remote = Remote::new("R", "file:///srv/repo");
    let cancel = CancelToken::new();

    install::install(
        &installation,
        &store,
        &remote,
        Kind::App,
        "org.example.Editor",
        Some("x86_64".into()),
        Some("stable".into()),
        None,
        Flags::empty(),
        &mut (),
        &cancel,
    )
    .await
    .unwrap();

    let before_mtime = installation.changed_mtime().unwrap();
    let before_commits = deploy::deployed_commits(&installation, &ref_).unwrap();

    let mut percents = Vec::new();
    let mut sink = |p: &crate::progress::Progress| percents.push(p.percent);

    let updated = update::update(
        &installation,
        &store,
        &remote,
        Kind::App,
        "org.example.Editor",
        Some("x86_64".into()),
        Some("stable".into()),
        None,
        Flags::empty(),
        &mut sink,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(updated.latest_known_commit, "c1");
    assert_eq!(deploy::deployed_commits(&installation, &ref_).unwrap(), before_commits);
    assert_eq!(installation.changed_mtime().unwrap(), before_mtime);
    assert_eq!(percents, vec![100]);
}

/// S3 — update with a new commit: old commit graveyarded, exports retargeted.
#[tokio::test]
async fn s3_update_with_delta_swaps_active_commit() {
    let (_dir, installation) = test_installation();
    let store = FakeStore::new();
    let ref_ = app_ref();
    store.set_commit(&ref_, "c1");
    let remote = Remote::new("R", "file:///srv/repo");
    let cancel = CancelToken::new();

    install::install(
        &installation,
        &store,
        &remote,
        Kind::App,
        "org.example.Editor",
        Some("x86_64".into()),
        Some("stable".into()),
        None,
        Flags::empty(),
        &mut (),
        &cancel,
    )
    .await
    .unwrap();

    store.set_commit(&ref_, "c2");

    let updated = update::update(
        &installation,
        &store,
        &remote,
        Kind::App,
        "org.example.Editor",
        Some("x86_64".into()),
        Some("stable".into()),
        None,
        Flags::empty(),
        &mut (),
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(updated.latest_known_commit, "c2");
    assert_eq!(deploy::active_commit(&installation, &ref_).unwrap(), "c2");
    assert!(!deploy::deployment_path(&installation, &ref_, "c1").exists(), "old commit moved out of deploy/ entirely");

    let graveyard_entries = std::fs::read_dir(installation.removed_path("")).unwrap().count();
    assert_eq!(graveyard_entries, 1, "old commit graveyarded under removed/");
}

/// S4 — uninstall removes the last remaining commit and all pointers.
#[tokio::test]
async fn s4_uninstall_last_commit_clears_ref() {
    let (_dir, installation) = test_installation();
    let store = FakeStore::new();
    let ref_ = app_ref();
    store.set_commit(&ref_, "c1");
    let remote = Remote::new("R", "file:///srv/repo");
    let cancel = CancelToken::new();

    install::install(
        &installation,
        &store,
        &remote,
        Kind::App,
        "org.example.Editor",
        Some("x86_64".into()),
        Some("stable".into()),
        None,
        Flags::empty(),
        &mut (),
        &cancel,
    )
    .await
    .unwrap();

    struct NeverRunning;
    impl crate::runner::Runner for NeverRunning {
        fn run_app(&self, _: &Ref, _: &Deployment, _: crate::runner::RunFlags) -> Result<std::process::ExitStatus, crate::runner::Error> {
            unimplemented!()
        }
    }

    uninstall::uninstall(
        &installation,
        &store,
        &NeverRunning,
        Kind::App,
        "org.example.Editor",
        Some("x86_64".into()),
        Some("stable".into()),
        Flags::empty(),
        &cancel,
    )
    .unwrap();

    assert!(deploy::active_commit(&installation, &ref_).is_none());
    assert!(deploy::list_installed(&installation).unwrap().is_empty());
}

/// S5 — concurrent installs of the same ref: exactly one succeeds.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s5_concurrent_installs_single_winner() {
    let (_dir, installation) = test_installation();
    let store = FakeStore::new();
    let ref_ = app_ref();
    store.set_commit(&ref_, "c1");
    let remote = Remote::new("R", "file:///srv/repo");
    let cancel = CancelToken::new();

    let mut sink1 = ();
    let mut sink2 = ();
    let (first, second) = tokio::join!(
        install::install(
            &installation,
            &store,
            &remote,
            Kind::App,
            "org.example.Editor",
            Some("x86_64".into()),
            Some("stable".into()),
            None,
            Flags::empty(),
            &mut sink1,
            &cancel,
        ),
        install::install(
            &installation,
            &store,
            &remote,
            Kind::App,
            "org.example.Editor",
            Some("x86_64".into()),
            Some("stable".into()),
            None,
            Flags::empty(),
            &mut sink2,
            &cancel,
        )
    );
    let outcomes = [first, second];

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let already_installed = outcomes
        .iter()
        .filter(|r| matches!(r, Err(Error::AlreadyInstalled(_)) | Err(Error::Deploy(deploy::Error::AlreadyInstalled(_)))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(already_installed, 1);
    assert_eq!(store.pull_calls.load(Ordering::SeqCst), 2, "both attempts pull; only one wins the deploy");
    assert_eq!(deploy::deployed_commits(&installation, &ref_).unwrap(), vec!["c1".to_string()]);
}

/// S6-equivalent: a remote that fails to yield refs (e.g. signature
/// mismatch) is skipped, not surfaced as an engine error.
#[tokio::test]
async fn refresh_skips_failing_remote_without_erroring() {
    struct FailingStore;

    #[async_trait]
    impl ContentStore for FailingStore {
        async fn ensure(&self) -> Result<(), RepoError> {
            Ok(())
        }
        async fn pull(
            &self,
            _: &Remote,
            _: &[Ref],
            _: Option<&[String]>,
            _: &mut dyn crate::progress::ProgressSink,
            _: &CancelToken,
        ) -> Result<HashMap<Ref, String>, RepoError> {
            unimplemented!()
        }
        async fn pull_from_bundle(&self, _: &Path, _: &str, _: &Ref) -> Result<String, RepoError> {
            unimplemented!()
        }
        async fn pull_untrusted_local(&self, _: &Path, _: &str, _: &Ref, _: Option<&[String]>) -> Result<String, RepoError> {
            unimplemented!()
        }
        fn checkout(&self, _: &str, _: &Path, _: Option<&[String]>) -> Result<u64, RepoError> {
            unimplemented!()
        }
        fn list_refs(&self, _: &str) -> Result<Vec<Ref>, RepoError> {
            unimplemented!()
        }
        async fn list_remote_refs(&self, _remote: &Remote) -> Result<HashMap<Ref, String>, RepoError> {
            Err(RepoError::SignatureInvalid("summary signed by unknown key".into()))
        }
        fn read_commit_metadata(&self, _: &str) -> Result<CommitMetadata, RepoError> {
            unimplemented!()
        }
        fn prune(&self) -> Result<(), RepoError> {
            unimplemented!()
        }
        fn load_summary(&self, _: &[u8], _: Option<&[u8]>) -> Result<Summary, RepoError> {
            unimplemented!()
        }
        fn set_trusted_keys(&self, _: &str, _: &[u8]) -> Result<(), RepoError> {
            unimplemented!()
        }
    }

    let (_dir, installation) = test_installation();
    let registry = crate::remote::Registry::open(&installation);
    registry.modify(&Remote::new("R", "https://example.test"), &CancelToken::new()).unwrap();

    let updates = refresh::list_installed_refs_for_update(&installation, &FailingStore).await;
    assert!(updates.is_empty());
}
