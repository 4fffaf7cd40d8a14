// SPDX-License-Identifier: MPL-2.0

use super::Ref;

/// A [`Ref`] as advertised by a remote's summary (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub ref_: Ref,
    pub remote_name: String,
    pub commit: String,
}
