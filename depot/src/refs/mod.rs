// SPDX-License-Identifier: MPL-2.0

//! The Ref Model (spec.md §3, §4.2). Pure data and parsing; no I/O.
//!
//! [`Ref`] is the immutable value type shared by every ref-shaped entity in
//! the engine. Per-entity extra fields live in the sibling modules
//! ([`installed`], [`remote_ref`], [`related`], [`bundle`]) rather than as a
//! class hierarchy (spec.md §9).

use std::fmt;

use thiserror::Error;

pub use self::bundle::BundleRef;
pub use self::installed::InstalledRef;
pub use self::related::RelatedRef;
pub use self::remote_ref::RemoteRef;

mod bundle;
mod installed;
mod related;
mod remote_ref;

/// What kind of distributable unit a [`Ref`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    App,
    Runtime,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::App => "app".fmt(f),
            Kind::Runtime => "runtime".fmt(f),
        }
    }
}

impl Kind {
    fn parse(s: &str) -> Result<Self, InvalidRef> {
        match s {
            "app" => Ok(Kind::App),
            "runtime" => Ok(Kind::Runtime),
            other => Err(InvalidRef::Element {
                element: "kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A canonical `<kind>/<name>/<arch>/<branch>` identifier for a
/// distributable unit (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ref {
    pub kind: Kind,
    pub name: String,
    pub arch: String,
    pub branch: String,
    pub commit: Option<String>,
}

impl Ref {
    /// Apply defaults and validate, per the grammar in §3.
    ///
    /// `compose(kind, name, arch?, branch?) -> Ref | InvalidRef` (§4.2).
    pub fn compose(
        kind: Kind,
        name: impl Into<String>,
        arch: Option<String>,
        branch: Option<String>,
    ) -> Result<Self, InvalidRef> {
        let name = name.into();
        validate_name(&name)?;

        let arch = arch.unwrap_or_else(host_arch);
        validate_arch(&arch)?;

        let branch = branch.unwrap_or_else(|| "master".to_string());
        validate_branch(&branch)?;

        Ok(Ref {
            kind,
            name,
            arch,
            branch,
            commit: None,
        })
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// `parse(full_ref) -> Ref | InvalidRef` (§4.2). Accepts the wire form
    /// `<kind>/<name>/<arch>/<branch>`; `commit` is left unset.
    pub fn parse(full_ref: &str) -> Result<Self, InvalidRef> {
        let mut parts = full_ref.split('/');

        let kind = parts.next().ok_or(InvalidRef::Malformed)?;
        let name = parts.next().ok_or(InvalidRef::Malformed)?;
        let arch = parts.next().ok_or(InvalidRef::Malformed)?;
        let branch = parts.next().ok_or(InvalidRef::Malformed)?;

        if parts.next().is_some() {
            return Err(InvalidRef::Malformed);
        }

        let kind = Kind::parse(kind)?;
        validate_name(name)?;
        validate_arch(arch)?;
        validate_branch(branch)?;

        Ok(Ref {
            kind,
            name: name.to_string(),
            arch: arch.to_string(),
            branch: branch.to_string(),
            commit: None,
        })
    }

    /// `format(ref) -> string`; total for valid refs (§4.2).
    pub fn format(&self) -> String {
        format!("{}/{}/{}/{}", self.kind, self.name, self.arch, self.branch)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format().fmt(f)
    }
}

/// `has_name_prefix(s, name)`: true iff `s` equals `name` or begins with
/// `name` followed by `.` or a non-name character (§4.2).
pub fn has_name_prefix(s: &str, name: &str) -> bool {
    if s == name {
        return true;
    }

    s.strip_prefix(name)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c == '.' || !is_name_char(c))
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn validate_name(name: &str) -> Result<(), InvalidRef> {
    if name.len() > crate::environment::MAX_NAME_LEN {
        return Err(InvalidRef::Element {
            element: "name",
            value: name.to_string(),
        });
    }

    let elements: Vec<&str> = name.split('.').collect();
    if elements.len() < 3 {
        return Err(InvalidRef::Element {
            element: "name",
            value: name.to_string(),
        });
    }

    for element in elements {
        let mut chars = element.chars();
        let Some(first) = chars.next() else {
            return Err(InvalidRef::Element {
                element: "name",
                value: name.to_string(),
            });
        };
        if !is_name_start(first) || !chars.all(is_name_char) {
            return Err(InvalidRef::Element {
                element: "name",
                value: name.to_string(),
            });
        }
    }

    Ok(())
}

fn validate_arch(arch: &str) -> Result<(), InvalidRef> {
    if arch.is_empty() {
        return Err(InvalidRef::Element {
            element: "arch",
            value: arch.to_string(),
        });
    }
    Ok(())
}

fn validate_branch(branch: &str) -> Result<(), InvalidRef> {
    let mut chars = branch.chars();
    let Some(first) = chars.next() else {
        return Err(InvalidRef::Element {
            element: "branch",
            value: branch.to_string(),
        });
    };

    let first_ok = first.is_ascii_alphanumeric() || first == '_' || first == '-';
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if !first_ok || !rest_ok {
        return Err(InvalidRef::Element {
            element: "branch",
            value: branch.to_string(),
        });
    }

    Ok(())
}

/// The machine tag used when no `arch` is supplied to [`Ref::compose`].
fn host_arch() -> String {
    std::env::consts::ARCH.to_string()
}

/// A [`Ref`] failed validation against the grammar in spec.md §3.
#[derive(Debug, Error)]
pub enum InvalidRef {
    #[error("ref has the wrong number of path elements")]
    Malformed,

    #[error("invalid {element}: {value:?}")]
    Element { element: &'static str, value: String },

    #[error("checksum {0:?} is not 64 lowercase hex characters")]
    Commit(String),
}

/// Validate a commit checksum per §3 (`64-hex checksum`).
pub fn validate_commit(commit: &str) -> Result<(), InvalidRef> {
    let ok = commit.len() == crate::environment::COMMIT_LEN
        && commit.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());

    if ok {
        Ok(())
    } else {
        Err(InvalidRef::Commit(commit.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_format_parse() {
        let full = "app/org.example.Editor/x86_64/stable";
        let parsed = Ref::parse(full).unwrap();
        assert_eq!(parsed.format(), full);
    }

    #[test]
    fn compose_applies_defaults() {
        let r = Ref::compose(Kind::App, "org.example.Editor", None, None).unwrap();
        assert_eq!(r.branch, "master");
        assert_eq!(r.arch, host_arch());
    }

    #[test]
    fn rejects_short_name() {
        assert!(matches!(
            Ref::compose(Kind::App, "org.Example", None, None),
            Err(InvalidRef::Element { element: "name", .. })
        ));
    }

    #[test]
    fn rejects_name_starting_with_digit() {
        assert!(Ref::compose(Kind::App, "org.example.1Editor", None, None).is_err());
    }

    #[test]
    fn rejects_malformed_full_ref() {
        assert!(matches!(Ref::parse("app/org.example.Editor/x86_64"), Err(InvalidRef::Malformed)));
    }

    #[test]
    fn name_prefix_matches_exact_and_dotted() {
        assert!(has_name_prefix("org.example.Editor", "org.example.Editor"));
        assert!(has_name_prefix("org.example.Editor.Locale", "org.example.Editor"));
        assert!(!has_name_prefix("org.example.EditorPro", "org.example.Editor"));
    }

    #[test]
    fn commit_validation() {
        assert!(validate_commit(&"a".repeat(64)).is_ok());
        assert!(validate_commit(&"A".repeat(64)).is_err());
        assert!(validate_commit("deadbeef").is_err());
    }
}
