// SPDX-License-Identifier: MPL-2.0

//! Compiled tuning constants. There is no external config file for these;
//! an installation's own runtime configuration lives under `repo/config`
//! (see [`crate::installation::Installation::config_path`]).

use std::time::Duration;

/// Interval at which a blocking lock acquisition checks its cancellation
/// token (§4.1).
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Minimum interval between successive [`crate::progress::ProgressSink`]
/// callbacks within a single operation (§4.9).
pub const PROGRESS_EMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Connect timeout applied to summary fetches (§5).
pub const SUMMARY_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Body timeout applied to summary fetches (§5).
pub const SUMMARY_BODY_TIMEOUT: Duration = Duration::from_secs(60);

/// Languages used by the Related-Refs Resolver when `languages` has never
/// been configured for an installation (§6.4).
pub const DEFAULT_LANGUAGES: &[&str] = &["en"];

/// Length, in hex characters, of a commit checksum (§3 `Ref.commit`).
pub const COMMIT_LEN: usize = 64;

/// Maximum total length of a ref `name` element (§3 `Ref.name`).
pub const MAX_NAME_LEN: usize = 255;

/// Random suffix length used for `removed/<ref>-<random>` graveyard entries
/// (§4.5 `Undeploy`).
pub const REMOVED_SUFFIX_LEN: usize = 8;

/// How long the System-Helper Channel may idle, with no in-flight request
/// and no held name ownership, before it exits (§4.8).
pub const HELPER_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
