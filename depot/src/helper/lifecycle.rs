// SPDX-License-Identifier: MPL-2.0

//! Helper process lifecycle (§4.8): exit after idling, or when the running
//! executable is replaced on disk. Both checks are cheap stat-based polls;
//! the embedding binary is expected to call [`Lifecycle::should_exit`] from
//! its own event loop between requests.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Tracks idle time and name-ownership so the privileged process can
/// decide when it's safe to exit, and the identity of `/proc/self/exe` at
/// startup so a later binary replacement can be detected.
pub struct Lifecycle {
    last_activity: Mutex<Instant>,
    in_flight: AtomicUsize,
    held_names: AtomicUsize,
    exe_path: PathBuf,
    exe_identity: Option<(u64, u64)>,
}

impl Lifecycle {
    /// Snapshot `/proc/self/exe`'s identity (device, inode) for later
    /// comparison. `exe_path` is overridable for tests; production callers
    /// pass `/proc/self/exe`.
    pub fn new(exe_path: impl Into<PathBuf>) -> Self {
        let exe_path = exe_path.into();
        let exe_identity = file_identity(&exe_path);

        Lifecycle {
            last_activity: Mutex::new(Instant::now()),
            in_flight: AtomicUsize::new(0),
            held_names: AtomicUsize::new(0),
            exe_path,
            exe_identity,
        }
    }

    /// Record that a request started or finished; resets the idle clock.
    pub fn note_activity(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn begin_request(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.note_activity();
    }

    pub fn end_request(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.note_activity();
    }

    pub fn acquire_name(&self) {
        self.held_names.fetch_add(1, Ordering::SeqCst);
    }

    pub fn release_name(&self) {
        self.held_names.fetch_sub(1, Ordering::SeqCst);
        self.note_activity();
    }

    /// True once `/proc/self/exe` no longer matches the identity captured
    /// at construction (the running binary was replaced by an upgrade).
    pub fn executable_replaced(&self) -> bool {
        self.exe_identity.is_some() && file_identity(&self.exe_path) != self.exe_identity
    }

    /// True if the process has been idle (no in-flight request, no held
    /// name) for at least `idle_timeout`, or the executable was replaced.
    pub fn should_exit(&self, idle_timeout: std::time::Duration) -> bool {
        if self.executable_replaced() {
            return true;
        }

        if self.in_flight.load(Ordering::SeqCst) > 0 || self.held_names.load(Ordering::SeqCst) > 0 {
            return false;
        }

        self.last_activity.lock().unwrap().elapsed() >= idle_timeout
    }
}

#[cfg(unix)]
fn file_identity(path: &std::path::Path) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    let meta = fs::metadata(path).ok()?;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_path: &std::path::Path) -> Option<(u64, u64)> {
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn idles_out_after_timeout_with_no_activity() {
        let lifecycle = Lifecycle::new("/bin/true");
        assert!(!lifecycle.should_exit(Duration::from_secs(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(lifecycle.should_exit(Duration::from_millis(1)));
    }

    #[test]
    fn in_flight_request_blocks_idle_exit() {
        let lifecycle = Lifecycle::new("/bin/true");
        lifecycle.begin_request();
        std::thread::sleep(Duration::from_millis(5));
        assert!(!lifecycle.should_exit(Duration::from_millis(1)));
        lifecycle.end_request();
        assert!(lifecycle.should_exit(Duration::from_millis(1)));
    }

    #[test]
    fn held_name_blocks_idle_exit() {
        let lifecycle = Lifecycle::new("/bin/true");
        lifecycle.acquire_name();
        assert!(!lifecycle.should_exit(Duration::from_secs(0)));
        lifecycle.release_name();
        assert!(lifecycle.should_exit(Duration::from_secs(0)));
    }

    #[test]
    fn executable_replacement_forces_exit_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("helper");
        fs::write(&exe, b"v1").unwrap();

        let lifecycle = Lifecycle::new(&exe);
        assert!(!lifecycle.should_exit(Duration::from_secs(3600)));

        fs::remove_file(&exe).unwrap();
        fs::write(&exe, b"v2-longer-content").unwrap();

        assert!(lifecycle.should_exit(Duration::from_secs(3600)));
    }
}
