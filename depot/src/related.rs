// SPDX-License-Identifier: MPL-2.0

//! The Related-Refs Resolver (spec.md §4.7). Pure: no network, no locking.
//! Reads a ref's `metadata` file for declared `[Extension "<id>"]` sections
//! and, for `locale-subset` extensions, expands one [`RelatedRef`] per
//! configured language (spec.md §6.4 `languages`).

use crate::refs::{Kind, RelatedRef};
use crate::remote::ini::Document;

const GROUP_PREFIX: &str = "Extension \"";

/// Derive the related refs of a ref from its raw `metadata` file contents.
pub fn resolve(metadata: &[u8], languages: &[String]) -> Vec<RelatedRef> {
    let text = String::from_utf8_lossy(metadata);
    let doc = Document::parse(&text);

    doc.groups()
        .filter_map(|(group, keys)| {
            let id = group.strip_prefix(GROUP_PREFIX)?.strip_suffix('"')?;

            let subdirectories = bool_key(keys, "subdirectories");
            let no_autodownload = bool_key(keys, "no-autodownload");
            let autodelete = bool_key(keys, "autodelete");
            let locale_subset = bool_key(keys, "locale-subset");

            Some((id.to_string(), subdirectories, no_autodownload, autodelete, locale_subset))
        })
        .flat_map(|(id, _subdirectories, no_autodownload, autodelete, locale_subset)| {
            if locale_subset {
                expand_locales(&id, languages, autodelete)
            } else {
                vec![single_extension(&id, no_autodownload, autodelete)]
            }
        })
        .collect()
}

fn bool_key(keys: &indexmap::IndexMap<String, String>, key: &str) -> bool {
    keys.get(key).and_then(|v| v.parse().ok()).unwrap_or(false)
}

fn single_extension(id: &str, no_autodownload: bool, autodelete: bool) -> RelatedRef {
    RelatedRef {
        ref_: extension_ref(id, None),
        subpaths: vec![],
        should_download: !no_autodownload,
        should_delete: autodelete,
        should_autoprune: autodelete,
    }
}

fn expand_locales(id: &str, languages: &[String], autodelete: bool) -> Vec<RelatedRef> {
    languages
        .iter()
        .map(|locale| RelatedRef {
            ref_: extension_ref(id, Some(locale)),
            subpaths: vec![format!("/{locale}")],
            should_download: true,
            should_delete: autodelete,
            should_autoprune: autodelete,
        })
        .collect()
}

fn extension_ref(id: &str, locale: Option<&str>) -> crate::refs::Ref {
    let name = match locale {
        Some(locale) => format!("{id}.{locale}"),
        None => id.to_string(),
    };

    // Extension refs are always runtimes in this model; arch/branch are
    // resolved by the caller against the parent ref before pulling.
    crate::refs::Ref::compose(Kind::Runtime, name, None, None)
        .unwrap_or_else(|_| crate::refs::Ref::compose(Kind::Runtime, format!("{id}.invalid.ref"), None, None).expect("fallback ref is valid"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expands_locale_subset_per_language() {
        let metadata = b"[Extension \"org.example.Editor.Locale\"]\nsubdirectories=true\nlocale-subset=true\n";
        let related = resolve(metadata, &["en".to_string(), "de".to_string()]);

        assert_eq!(related.len(), 2);
        assert!(related.iter().any(|r| r.ref_.name == "org.example.Editor.Locale.en"));
        assert!(related.iter().any(|r| r.ref_.name == "org.example.Editor.Locale.de"));
    }

    #[test]
    fn non_locale_extension_yields_single_related_ref() {
        let metadata = b"[Extension \"org.example.Editor.Plugin\"]\nno-autodownload=true\n";
        let related = resolve(metadata, &["en".to_string()]);

        assert_eq!(related.len(), 1);
        assert!(!related[0].should_download);
        assert!(!related[0].should_autoprune);
    }

    #[test]
    fn no_extensions_yields_empty() {
        assert!(resolve(b"[Application]\nname=org.example.Editor\n", &["en".to_string()]).is_empty());
    }
}
