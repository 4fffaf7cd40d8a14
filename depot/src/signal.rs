// SPDX-License-Identifier: MPL-2.0

//! Signal handling.
//!
//! Requires `unsafe` to call `sigaction` directly (nix's signal API is
//! unsafe because installing handlers is inherently so); scoped here away
//! from the workspace-wide `unsafe_code = "deny"` lint.
//!
//! Long blocking sections (lock acquisition, checkout) want to ignore
//! `SIGINT`/`SIGTERM` for their duration so a half-written deploy directory
//! is never left behind by an externally delivered signal; the engine's own
//! cancellation token (§5) is the supported way to interrupt an operation.

#![allow(unsafe_code)]

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet};
use thiserror::Error;

pub use nix::sys::signal::Signal;

/// Ignore the provided signals until the returned [`Guard`] is dropped.
pub fn ignore(signals: impl IntoIterator<Item = Signal>) -> Result<Guard, Error> {
    Ok(Guard(
        signals
            .into_iter()
            .map(|signal| unsafe {
                let action = sigaction(
                    signal,
                    &SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty()),
                )
                .map_err(Error::Ignore)?;

                Ok(PrevHandler { signal, action })
            })
            .collect::<Result<_, Error>>()?,
    ))
}

/// Restores the previous signal handlers when dropped.
pub struct Guard(Vec<PrevHandler>);

impl Drop for Guard {
    fn drop(&mut self) {
        for PrevHandler { signal, action } in &self.0 {
            unsafe {
                let _ = sigaction(*signal, action);
            };
        }
    }
}

struct PrevHandler {
    signal: Signal,
    action: SigAction,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("ignore signal")]
    Ignore(#[source] nix::Error),
}
