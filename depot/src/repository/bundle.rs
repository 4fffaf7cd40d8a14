// SPDX-License-Identifier: MPL-2.0

//! Self-contained bundle files (spec.md §4.6 `install_bundle`, §6.3
//! `InstallBundle`).
//!
//! A bundle is a tar archive carrying everything `install_bundle` needs to
//! deploy offline: the ref it names, the commit it contains, the origin
//! it should be attributed to, optional trust material, and the commit's
//! file tree itself under `files/`.

use std::fs;
use std::io::Read;
use std::path::Path;

use url::Url;

use super::Error;
use crate::refs::{BundleRef, Ref};

pub struct OpenedBundle {
    pub bundle_ref: BundleRef,
    pub commit: String,
    pub origin_url: Url,
    pub gpg_key: Option<Vec<u8>>,
}

/// Extract the named entries from `path` without unpacking `files/`
/// (install_bundle step 1: "extracts `(ref, commit, origin-url, gpg-key?,
/// metadata, appstream?)`").
pub fn open(path: &Path) -> Result<OpenedBundle, Error> {
    let mut archive = tar::Archive::new(fs::File::open(path)?);

    let mut ref_text = None;
    let mut commit = None;
    let mut origin_url = None;
    let mut gpg_key = None;
    let mut metadata_bytes = None;
    let mut appstream_bytes = None;
    let mut icon_bytes = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;

        match name.as_str() {
            "ref" => ref_text = Some(String::from_utf8_lossy(&buf).trim().to_string()),
            "commit" => commit = Some(String::from_utf8_lossy(&buf).trim().to_string()),
            "origin" => origin_url = Some(String::from_utf8_lossy(&buf).trim().to_string()),
            "gpg-key" => gpg_key = Some(buf),
            "metadata" => metadata_bytes = Some(buf),
            "appstream.xml.gz" => appstream_bytes = Some(buf),
            "icon.png" => icon_bytes = Some(buf),
            _ => {}
        }
    }

    let ref_text = ref_text.ok_or_else(|| Error::MalformedBundle("missing ref entry".into()))?;
    let ref_ = Ref::parse(&ref_text).map_err(|e| Error::MalformedBundle(e.to_string()))?;
    let commit = commit.ok_or_else(|| Error::MalformedBundle("missing commit entry".into()))?;
    let origin_url = origin_url.ok_or_else(|| Error::MalformedBundle("missing origin entry".into()))?;
    let origin_url =
        Url::parse(&origin_url).map_err(|e| Error::MalformedBundle(format!("invalid origin url: {e}")))?;
    let metadata_bytes = metadata_bytes.ok_or_else(|| Error::MalformedBundle("missing metadata entry".into()))?;

    let installed_size = fs::metadata(path)?.len();

    Ok(OpenedBundle {
        bundle_ref: BundleRef {
            ref_,
            file_path: path.to_path_buf(),
            metadata_bytes,
            appstream_bytes,
            icon_bytes,
            installed_size,
        },
        commit,
        origin_url,
        gpg_key,
    })
}

/// Unpack the `files/` entry prefix of `path` into `dst_dir`, returning the
/// number of bytes written. Used by `pull_from_bundle` to seed the local
/// store without a network round-trip.
pub fn extract_files(path: &Path, dst_dir: &Path) -> Result<u64, Error> {
    fs::create_dir_all(dst_dir)?;

    let mut archive = tar::Archive::new(fs::File::open(path)?);
    let mut total = 0u64;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        let Ok(relative) = entry_path.strip_prefix("files") else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let dst = dst_dir.join(relative);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }

        total += entry.size();
        entry.unpack(&dst)?;
    }

    Ok(total)
}

#[cfg(test)]
mod test {
    use super::*;
    fn write_bundle(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);

        let mut append_text = |name: &str, text: &str| {
            let mut header = tar::Header::new_gnu();
            header.set_size(text.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, text.as_bytes()).unwrap();
        };

        append_text("ref", "app/org.example.Editor/x86_64/stable");
        append_text("commit", &"a".repeat(64));
        append_text("origin", "https://example.test/repo");
        append_text("metadata", "[Application]\nname=org.example.Editor\n");

        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "files/share/hello.txt", "hello".as_bytes()).unwrap();

        builder.finish().unwrap();
        drop(builder);
    }

    #[test]
    fn opens_bundle_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.tar");
        write_bundle(&path);

        let opened = open(&path).unwrap();
        assert_eq!(opened.bundle_ref.ref_.name, "org.example.Editor");
        assert_eq!(opened.commit, "a".repeat(64));
        assert_eq!(opened.origin_url.as_str(), "https://example.test/repo");
    }

    #[test]
    fn extracts_files_prefix_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.tar");
        write_bundle(&path);

        let dst = dir.path().join("out");
        let written = extract_files(&path, &dst).unwrap();

        assert!(written > 0);
        assert_eq!(fs::read_to_string(dst.join("share/hello.txt")).unwrap(), "hello");
    }
}
