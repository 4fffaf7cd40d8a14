// SPDX-License-Identifier: MPL-2.0

//! The System-Helper Channel (spec.md §4.8, §6.3): the fixed request
//! surface a long-running privileged process exposes, transport-agnostic.
//! This module owns request validation, policy-action derivation and the
//! idle/executable-watch lifecycle; dispatch onto the engine is the
//! caller's job (the binary embedding this channel owns the privileged
//! installation handle).

mod lifecycle;
mod policy;

pub use lifecycle::Lifecycle;
pub use policy::{policy_action, PolicyAction};

use thiserror::Error;

use crate::refs::Ref;

/// A ref name reserved for per-remote metadata rather than an installable
/// unit (§6.3); any request naming it escalates to `metadata-update`.
pub const METADATA_REF_NAME: &str = "ostree-metadata";

bitflags::bitflags! {
    /// The published flag mask every request's flag word is checked
    /// against (§4.8 step 1). Bits outside this mask are `InvalidArgs`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequestFlags: u32 {
        /// Forbid the authorization broker from prompting (§6.3).
        const NO_INTERACTION = 1 << 0;
        /// Treat the targeted ref as an app even if its name looks like a
        /// runtime, overriding the `Deploy` install/update heuristic.
        const APP_HINT = 1 << 1;
        /// Force `Deploy`'s derived action to `install` even if a
        /// deployment already exists.
        const INSTALL_HINT = 1 << 2;
        /// Overwrite an existing deployment instead of failing (mirrors
        /// [`crate::engine::Flags::REINSTALL`]).
        const REINSTALL = 1 << 3;
    }
}

/// The fixed request surface a privileged helper exposes (§6.3). Each
/// variant's payload is the method's arguments beyond `flags` and the
/// trailing installation selector, which callers carry alongside the
/// request rather than inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Deploy {
        ref_: Ref,
        origin: String,
        subpaths: Vec<String>,
    },
    DeployAppstream {
        origin: String,
        arch: String,
    },
    Uninstall {
        ref_: Ref,
    },
    InstallBundle {
        bundle_path: String,
        remote: String,
    },
    ConfigureRemote {
        remote: String,
        config_text: String,
        gpg_key_bytes: Option<Vec<u8>>,
    },
    Configure {
        key: String,
        value: String,
    },
    UpdateRemote {
        remote: String,
        summary_path: String,
        summary_sig_path: Option<String>,
    },
    RemoveLocalRef {
        remote: String,
        ref_: Ref,
    },
    PruneLocalRepo,
    EnsureRepo,
    RunTriggers,
    UpdateSummary,
    GenerateOciSummary {
        origin: String,
    },
}

/// A request as received off the wire: the method, its flags, and the
/// installation it targets (empty selects the default system
/// installation, §6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub flags: RequestFlags,
    pub installation: String,
}

/// Validate `raw_flags` against the published mask (§4.8 step 1).
pub fn parse_flags(raw_flags: u32) -> Result<RequestFlags, Error> {
    RequestFlags::from_bits(raw_flags).ok_or(Error::InvalidArgs("unknown flag bits set"))
}

/// Who must authorize a request, and what they're authorizing. The
/// privileged process blocks on this before dispatching (§4.8 step 3).
pub trait AuthBroker: Send + Sync {
    /// Block until `subject` is authorized to perform `action`, or return
    /// an error. `interactive = false` forbids prompting (the caller set
    /// `NO_INTERACTION`); a broker that can only authorize by prompting
    /// must fail rather than silently granting.
    fn authorize(&self, subject: &str, action: PolicyAction, interactive: bool) -> Result<(), Error>;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid arguments: {0}")]
    InvalidArgs(&'static str),
    #[error("operation denied by policy for {0}")]
    AuthDenied(String),
    #[error("engine")]
    Engine(#[from] crate::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_flag_bits_are_rejected() {
        assert!(matches!(parse_flags(1 << 31), Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn known_flags_round_trip() {
        let flags = parse_flags(RequestFlags::NO_INTERACTION.bits() | RequestFlags::REINSTALL.bits()).unwrap();
        assert!(flags.contains(RequestFlags::NO_INTERACTION));
        assert!(flags.contains(RequestFlags::REINSTALL));
    }
}
