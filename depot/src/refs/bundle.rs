// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use super::Ref;

/// A [`Ref`] read out of a self-contained bundle file (spec.md §3, §4.6
/// `install_bundle`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRef {
    pub ref_: Ref,
    pub file_path: PathBuf,
    pub metadata_bytes: Vec<u8>,
    pub appstream_bytes: Option<Vec<u8>>,
    pub icon_bytes: Option<Vec<u8>>,
    pub installed_size: u64,
}
