// SPDX-License-Identifier: MPL-2.0

//! Summary & Appstream merge (spec.md §4.4 second half): source per-app
//! appstream documents from a remote's `appstream/<arch>/` tree, filter by
//! allow/deny regular expressions, rewrite each component's `<id>` to match
//! the installed ref, and splice the result into a shared `<components>`
//! root. Writes both the plain and gzip-compressed outputs and swings
//! `appstream/<remote>/<arch>/active` atomically.

use std::io::Write as _;
use std::os::unix::fs::symlink;
use std::path::PathBuf;
use std::{fs, io};

use flate2::write::GzEncoder;
use flate2::Compression;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::installation::Installation;
use crate::remote::Remote;
use crate::repository::CLIENT;

/// Outcome of a single `update` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub changed: bool,
    pub path: PathBuf,
}

/// `appstream-update` (§4.4, §6.3 `DeployAppstream`). `names` are the
/// candidate app ref names to source from the remote before filtering.
pub async fn update(
    installation: &Installation,
    remote: &Remote,
    arch: &str,
    allow: Option<&Regex>,
    deny: Option<&Regex>,
    names: &[String],
) -> Result<Outcome, Error> {
    let mut components = Vec::new();

    for name in names {
        if allow.is_some_and(|re| !re.is_match(name)) || deny.is_some_and(|re| re.is_match(name)) {
            continue;
        }

        let Some(bytes) = fetch_component(remote, arch, name).await? else {
            continue;
        };

        let desired_id = if name.ends_with(".desktop") {
            name.clone()
        } else {
            format!("{name}.desktop")
        };
        components.push(rewrite_component_id(&bytes, &desired_id)?);
    }

    let merged = wrap_components(&components);
    let hash = hex::encode(Sha256::digest(&merged));

    let remote_arch_root = installation.appstream_path(format!("{}/{arch}", remote.name));
    let hash_path = remote_arch_root.join(".hash");
    let active_link = remote_arch_root.join("active");

    if fs::read_to_string(&hash_path).ok().as_deref() == Some(hash.as_str()) {
        let existing = fs::read_link(&active_link).unwrap_or_default();
        return Ok(Outcome {
            changed: false,
            path: remote_arch_root.join(existing),
        });
    }

    let timestamp = chrono::Utc::now().timestamp();
    let generation_dir = remote_arch_root.join(timestamp.to_string());
    fs::create_dir_all(&generation_dir)?;

    fs::write(generation_dir.join("appstream.xml"), &merged)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&merged)?;
    fs::write(generation_dir.join("appstream.xml.gz"), encoder.finish()?)?;

    let tmp_link = remote_arch_root.join(".active.tmp");
    if tmp_link.exists() {
        fs::remove_file(&tmp_link)?;
    }
    symlink(timestamp.to_string(), &tmp_link)?;
    fs::rename(&tmp_link, &active_link)?;

    fs::write(&hash_path, &hash)?;
    fs::write(remote_arch_root.join(".timestamp"), timestamp.to_string())?;

    Ok(Outcome {
        changed: true,
        path: generation_dir,
    })
}

async fn fetch_component(remote: &Remote, arch: &str, name: &str) -> Result<Option<Vec<u8>>, Error> {
    let base = url::Url::parse(&remote.url).map_err(|e| Error::Malformed(e.to_string()))?;
    let url = base
        .join(&format!("appstream/{arch}/{name}.xml"))
        .map_err(|e| Error::Malformed(e.to_string()))?;

    let response = CLIENT.get(url).send().await?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let bytes = response.error_for_status()?.bytes().await?;
    Ok(Some(bytes.to_vec()))
}

/// Extract the single `<component>` element from `bytes` (optionally
/// wrapped in a `<components>` root, as per-app appstream caches usually
/// are) and rewrite its first `<id>` text node to `desired_id`.
fn rewrite_component_id(bytes: &[u8], desired_id: &str) -> Result<Vec<u8>, Error> {
    let mut reader = Reader::from_reader(bytes);
    let mut writer = Writer::new(Vec::new());
    let mut in_component = false;
    let mut in_id = false;
    let mut rewrote_id = false;
    let mut found_component = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| Error::Malformed(e.to_string()))? {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"components" && !in_component => {}
            Event::End(e) if e.name().as_ref() == b"components" && !in_component => {}
            Event::Start(e) if e.name().as_ref() == b"component" => {
                in_component = true;
                found_component = true;
                writer.write_event(Event::Start(e)).map_err(|e| Error::Malformed(e.to_string()))?;
            }
            Event::End(e) if e.name().as_ref() == b"component" => {
                writer.write_event(Event::End(e)).map_err(|e| Error::Malformed(e.to_string()))?;
                in_component = false;
                break;
            }
            event if in_component => {
                let event = match event {
                    Event::Start(e) if e.name().as_ref() == b"id" => {
                        in_id = true;
                        Event::Start(e)
                    }
                    Event::End(e) if e.name().as_ref() == b"id" => {
                        in_id = false;
                        Event::End(e)
                    }
                    Event::Text(_) if in_id && !rewrote_id => {
                        rewrote_id = true;
                        Event::Text(BytesText::new(desired_id))
                    }
                    other => other,
                };
                writer.write_event(event).map_err(|e| Error::Malformed(e.to_string()))?;
            }
            _ => {}
        }
        buf.clear();
    }

    if !found_component {
        return Err(Error::Malformed("no <component> element found".into()));
    }

    Ok(writer.into_inner())
}

fn wrap_components(components: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<components version=\"0.14\">\n");
    for component in components {
        out.extend_from_slice(component);
        out.push(b'\n');
    }
    out.extend_from_slice(b"</components>\n");
    out
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
    #[error("fetch failed")]
    Fetch(#[from] reqwest::Error),
    #[error("malformed appstream document: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rewrites_component_id_and_strips_wrapper() {
        let doc = br#"<?xml version="1.0"?><components><component><id>org.example.Editor</id><name>Editor</name></component></components>"#;
        let rewritten = rewrite_component_id(doc, "org.example.Editor.desktop").unwrap();
        let text = String::from_utf8(rewritten).unwrap();

        assert!(text.contains("<id>org.example.Editor.desktop</id>"));
        assert!(!text.contains("<components>"));
    }

    #[test]
    fn rewrites_bare_component_root() {
        let doc = br#"<component><id>org.example.Tool</id></component>"#;
        let rewritten = rewrite_component_id(doc, "org.example.Tool.desktop").unwrap();
        assert!(String::from_utf8(rewritten).unwrap().contains("org.example.Tool.desktop"));
    }

    #[test]
    fn wraps_multiple_components_under_shared_root() {
        let merged = wrap_components(&[b"<component><id>a</id></component>".to_vec(), b"<component><id>b</id></component>".to_vec()]);
        let text = String::from_utf8(merged).unwrap();

        assert_eq!(text.matches("<component>").count(), 2);
        assert!(text.starts_with("<?xml"));
    }

    #[test]
    fn missing_component_element_errors() {
        assert!(rewrite_component_id(b"<notcomponent/>", "x").is_err());
    }
}
