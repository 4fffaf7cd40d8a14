// SPDX-License-Identifier: MPL-2.0

//! A minimal INI reader/writer for `remotes.conf` and `repo/config`
//! (spec.md §6.2, §6.4). Groups are written in insertion order so that
//! `Registry::list`'s insertion-order tie-break (§4.3) falls out of the
//! file's own layout.

use std::fs;
use std::io;
use std::path::Path;

use fs_err as fserr;
use indexmap::IndexMap;
use thiserror::Error;

/// A parsed INI document: ordered groups of ordered key/value pairs.
#[derive(Debug, Clone, Default)]
pub struct Document {
    groups: IndexMap<String, IndexMap<String, String>>,
}

impl Document {
    pub fn parse(text: &str) -> Self {
        let mut groups: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
        let mut current: Option<String> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(stripped) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                let name = stripped.trim().trim_matches('"').to_string();
                groups.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            if let Some(group) = &current {
                groups
                    .entry(group.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Document { groups }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (group, keys) in &self.groups {
            out.push('[');
            out.push_str(group);
            out.push_str("]\n");
            for (key, value) in keys {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(value);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.groups.get(group)?.get(key).map(String::as_str)
    }

    pub fn set(&mut self, group: &str, key: &str, value: impl Into<String>) {
        self.groups.entry(group.to_string()).or_default().insert(key.to_string(), value.into());
    }

    pub fn remove_group(&mut self, group: &str) -> bool {
        self.groups.shift_remove(group).is_some()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &IndexMap<String, String>)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Load and parse `path`; an absent file yields an empty [`Document`].
pub fn load(path: impl AsRef<Path>) -> Result<Document, Error> {
    match fserr::read_to_string(path) {
        Ok(text) => Ok(Document::parse(&text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Document::default()),
        Err(e) => Err(e.into()),
    }
}

/// Commit `doc` transactionally: render to memory, fsync a temp file,
/// rename over the live path (spec.md §4.3).
pub fn save(path: impl AsRef<Path>, doc: &Document) -> Result<(), Error> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        fserr::create_dir_all(parent)?;
    }

    let mut tmp = fserr::File::create(&tmp_path)?;
    use io::Write;
    tmp.write_all(doc.render().as_bytes())?;
    tmp.sync_all()?;
    drop(tmp);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_quoted_group_names() {
        let doc = Document::parse("[remote \"origin\"]\nurl = https://example.test\n");
        assert_eq!(doc.get("origin", "url"), Some("https://example.test"));
    }

    #[test]
    fn round_trips_through_render() {
        let mut doc = Document::default();
        doc.set("remote \"origin\"", "url", "https://example.test");
        let rendered = doc.render();
        let reparsed = Document::parse(&rendered);
        assert_eq!(reparsed.get("remote \"origin\"", "url"), Some("https://example.test"));
    }

    #[test]
    fn save_creates_parent_and_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("remotes.conf");

        let mut doc = Document::default();
        doc.set("remote \"origin\"", "url", "https://example.test");
        save(&path, &doc).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.get("remote \"origin\"", "url"), Some("https://example.test"));
    }
}
