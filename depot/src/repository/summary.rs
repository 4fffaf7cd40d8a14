// SPDX-License-Identifier: MPL-2.0

//! Summary fetch and parse (spec.md §4.4).

use std::collections::HashMap;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Error, CLIENT};
use crate::refs::Ref;

/// `(refs: map<ref, commit>, metadata: map<string, variant>)` (§6.5).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub refs: HashMap<Ref, String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// `{ subject, timestamp, parent }` (SPEC_FULL §2), read back from a
/// commit's stored metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMetadata {
    pub subject: String,
    pub timestamp: i64,
    pub parent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Wire {
    refs: HashMap<String, String>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

/// Download `<url>/summary` (and, if `verify_signature`, `<url>/summary.sig`)
/// and parse it (§4.4). Caching is the caller's concern; per spec this
/// result MUST be treated as re-validated on every call.
pub async fn fetch(base_url: &Url, verifying_key: Option<&VerifyingKey>) -> Result<Summary, Error> {
    let body = get_bytes(&join(base_url, "summary")?).await?;

    let sig = if verifying_key.is_some() {
        Some(get_bytes(&join(base_url, "summary.sig")?).await?)
    } else {
        None
    };

    parse(&body, sig.as_deref(), verifying_key)
}

/// `load_summary(bytes, sig_bytes?) → (refs, metadata)` (§6.5).
pub fn parse(bytes: &[u8], sig_bytes: Option<&[u8]>, verifying_key: Option<&VerifyingKey>) -> Result<Summary, Error> {
    if let (Some(key), Some(sig_bytes)) = (verifying_key, sig_bytes) {
        let sig_bytes: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| Error::SignatureInvalid("signature is not 64 bytes".into()))?;
        let signature = Signature::from_bytes(&sig_bytes);

        key.verify(bytes, &signature)
            .map_err(|e| Error::SignatureInvalid(e.to_string()))?;
    } else if verifying_key.is_some() {
        return Err(Error::SignatureInvalid("summary signature missing".into()));
    }

    let wire: Wire = serde_json::from_slice(bytes).map_err(|e| Error::MalformedSummary(e.to_string()))?;

    let refs = wire
        .refs
        .into_iter()
        .filter_map(|(full_ref, commit)| Ref::parse(&full_ref).ok().map(|r| (r, commit)))
        .collect();

    Ok(Summary {
        refs,
        metadata: wire.metadata,
    })
}

fn join(base: &Url, segment: &str) -> Result<Url, Error> {
    base.join(segment)
        .map_err(|e| Error::MalformedSummary(format!("invalid summary url: {e}")))
}

async fn get_bytes(url: &Url) -> Result<Vec<u8>, Error> {
    let response = CLIENT.get(url.clone()).send().await?.error_for_status()?;

    let mut stream = response.bytes_stream();
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_refs_and_metadata() {
        let body = serde_json::json!({
            "refs": { "app/org.example.Editor/x86_64/stable": "a".repeat(64) },
            "metadata": { "title": "Example Remote" },
        })
        .to_string();

        let summary = parse(body.as_bytes(), None, None).unwrap();
        assert_eq!(summary.refs.len(), 1);
        assert_eq!(summary.metadata.get("title").unwrap(), "Example Remote");
    }

    #[test]
    fn missing_signature_when_required_errors() {
        let body = serde_json::json!({ "refs": {}, "metadata": {} }).to_string();
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]).verifying_key();

        assert!(matches!(parse(body.as_bytes(), None, Some(&key)), Err(Error::SignatureInvalid(_))));
    }
}
