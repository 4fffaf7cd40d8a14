// SPDX-License-Identifier: MPL-2.0

use super::Ref;

/// A [`Ref`] derived from another ref's `[Extension "<id>"]` metadata
/// (spec.md §3, §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedRef {
    pub ref_: Ref,
    pub subpaths: Vec<String>,
    pub should_download: bool,
    pub should_delete: bool,
    pub should_autoprune: bool,
}
