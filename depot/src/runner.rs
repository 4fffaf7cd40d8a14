// SPDX-License-Identifier: MPL-2.0

//! The App Runner contract (spec.md §6.6). Opaque to the engine: it only
//! ever sets [`RunFlags::BACKGROUND`] and otherwise treats the outcome as
//! a black box, mirroring how the engine has no sandboxed launcher of its
//! own (spec.md §1 Non-goals).

use std::process::ExitStatus;

use thiserror::Error;

use crate::deploy::Deployment;
use crate::refs::Ref;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RunFlags: u32 {
        const BACKGROUND = 1 << 0;
    }
}

/// Implemented by the external sandboxed launcher. `launch` (§4.6) invokes
/// this and returns its outcome unchanged.
pub trait Runner: Send + Sync {
    fn run_app(&self, ref_: &Ref, deployment: &Deployment, flags: RunFlags) -> Result<ExitStatus, Error>;

    /// Is `deployment` currently running? Consulted by `undeploy` (§4.5) to
    /// decide whether a non-forced uninstall must fail with `InUse`.
    /// Default: assume nothing is running (no sandboxed launcher attached).
    fn is_running(&self, ref_: &Ref, deployment: &Deployment) -> bool {
        let _ = (ref_, deployment);
        false
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("launch failed")]
    Io(#[from] std::io::Error),
}
