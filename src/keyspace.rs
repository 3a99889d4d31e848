//! Key-Space Codec
//!
//! Pure functions mapping entity identities onto hierarchical backend paths.
//!
//! ## Layout
//! ```text
//! configs/{config_id}/{version}/
//! groups/{group_id}/{version}/{canonical_labels}/{entry_id}/
//! groups/{group_id}/{version}/{entry_id}/            (no labels)
//! idempotency/{key}/
//! ```
//!
//! Every path ends in `/`, so a prefix listing for `configs/{id}/v1/` never
//! matches `configs/{id}/v10/`. Equal logical inputs always produce identical
//! strings; nothing here touches a backend.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::model::Label;

// =============================================================================
// Namespace Roots
// =============================================================================

pub const CONFIGS: &str = "configs";
pub const GROUPS: &str = "groups";
pub const IDEMPOTENCY: &str = "idempotency";

const SEPARATOR: char = '/';
const LABEL_JOIN: char = '&';
const LABEL_ASSIGN: char = '=';

// =============================================================================
// Identifiers
// =============================================================================

/// Allocate a fresh UUIDv4 for a config, group or group entry.
pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

// =============================================================================
// Path Encoding
// =============================================================================

/// `configs/{id}/` - every version of one config lives below this prefix
pub fn config_root(id: &Uuid) -> String {
    format!("{}/{}/", CONFIGS, id)
}

/// `configs/{id}/{version}/`
pub fn config_path(id: &Uuid, version: &str) -> String {
    format!("{}/{}/{}/", CONFIGS, id, version)
}

/// `groups/{id}/`
pub fn group_root(id: &Uuid) -> String {
    format!("{}/{}/", GROUPS, id)
}

/// `groups/{id}/{version}/{labels}/`, or `groups/{id}/{version}/` when
/// `canonical_labels` is empty.
pub fn group_path(id: &Uuid, version: &str, canonical_labels: &str) -> String {
    if canonical_labels.is_empty() {
        format!("{}/{}/{}/", GROUPS, id, version)
    } else {
        format!("{}/{}/{}/{}/", GROUPS, id, version, canonical_labels)
    }
}

/// Path of a single group member: the group path plus `{entry_id}/`.
pub fn group_member_path(
    id: &Uuid,
    version: &str,
    canonical_labels: &str,
    entry_id: &Uuid,
) -> String {
    let mut path = group_path(id, version, canonical_labels);
    path.push_str(&entry_id.to_string());
    path.push(SEPARATOR);
    path
}

/// `idempotency/`
pub fn idempotency_root() -> String {
    format!("{}/", IDEMPOTENCY)
}

/// `idempotency/{key}/`
pub fn idempotency_path(key: &str) -> String {
    format!("{}/{}/", IDEMPOTENCY, key)
}

// =============================================================================
// Label Canonicalization
// =============================================================================

/// Canonicalize a member's label set: sort by key, format `key=value`, join
/// with `&`. The empty set yields the empty string.
///
/// A label key that appears twice is rejected rather than resolved, since
/// either choice would silently drop a label the caller asked for.
pub fn canonicalize_labels(labels: &[Label]) -> Result<String> {
    let mut sorted: BTreeMap<&str, &str> = BTreeMap::new();

    for label in labels {
        validate_label_part("label key", &label.key)?;
        validate_label_part("label value", &label.value)?;

        if sorted.insert(label.key.as_str(), label.value.as_str()).is_some() {
            return Err(StoreError::BadRequest(format!(
                "duplicate label key '{}'",
                label.key
            )));
        }
    }

    Ok(join_labels(sorted))
}

/// Canonicalize a read-side selector built from a multi-valued query.
///
/// The first value given for a key is used and later ones are ignored, so
/// `env=prod&env=dev` selects `env=prod`.
pub fn canonicalize_selector<I, K, V>(pairs: I) -> Result<String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut sorted: BTreeMap<String, String> = BTreeMap::new();

    for (key, value) in pairs {
        let (key, value) = (key.as_ref(), value.as_ref());
        validate_label_part("label key", key)?;
        validate_label_part("label value", value)?;
        sorted
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    Ok(join_labels(sorted.iter().map(|(k, v)| (k.as_str(), v.as_str()))))
}

fn join_labels<'a>(sorted: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (key, value) in sorted {
        if !out.is_empty() {
            out.push(LABEL_JOIN);
        }
        out.push_str(key);
        out.push(LABEL_ASSIGN);
        out.push_str(value);
    }
    out
}

/// Inverse of [`canonicalize_labels`].
pub fn parse_labels(canonical: &str) -> Result<Vec<Label>> {
    if canonical.is_empty() {
        return Ok(Vec::new());
    }

    canonical
        .split(LABEL_JOIN)
        .map(|pair| {
            pair.split_once(LABEL_ASSIGN)
                .map(|(key, value)| Label::new(key, value))
                .ok_or_else(|| {
                    StoreError::BadRequest(format!("malformed label pair '{}'", pair))
                })
        })
        .collect()
}

// =============================================================================
// Path Decoding
// =============================================================================

/// Decoded form of a group member path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPath {
    pub group_id: Uuid,
    pub version: String,
    pub canonical_labels: String,
    pub entry_id: Uuid,
}

/// Decode `configs/{id}/{version}/` back into `(id, version)`.
pub fn parse_config_path(path: &str) -> Option<(Uuid, String)> {
    let parts = split_path(path)?;
    match parts.as_slice() {
        [root, id, version] if *root == CONFIGS => {
            Some((Uuid::parse_str(id).ok()?, version.to_string()))
        }
        _ => None,
    }
}

/// Decode a path produced by [`group_member_path`].
pub fn parse_group_member_path(path: &str) -> Option<MemberPath> {
    let parts = split_path(path)?;
    let (group_id, version, labels, entry_id) = match parts.as_slice() {
        [root, gid, version, entry] if *root == GROUPS => (gid, version, "", entry),
        [root, gid, version, labels, entry] if *root == GROUPS => (gid, version, *labels, entry),
        _ => return None,
    };

    Some(MemberPath {
        group_id: Uuid::parse_str(group_id).ok()?,
        version: version.to_string(),
        canonical_labels: labels.to_string(),
        entry_id: Uuid::parse_str(entry_id).ok()?,
    })
}

fn split_path(path: &str) -> Option<Vec<&str>> {
    let trimmed = path.strip_suffix(SEPARATOR)?;
    let parts: Vec<&str> = trimmed.split(SEPARATOR).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts)
}

// =============================================================================
// Validation
// =============================================================================

/// A path segment (version, idempotency key) must be non-empty and free of
/// the path separator.
pub fn validate_segment(what: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(StoreError::BadRequest(format!("{} must not be empty", what)));
    }
    if segment.contains(SEPARATOR) {
        return Err(StoreError::BadRequest(format!(
            "{} '{}' must not contain '{}'",
            what, segment, SEPARATOR
        )));
    }
    Ok(())
}

/// A selector is either empty or a canonical label string; it must not
/// escape its path segment.
pub fn validate_selector(selector: &str) -> Result<()> {
    if selector.contains(SEPARATOR) {
        return Err(StoreError::BadRequest(format!(
            "label selector '{}' must not contain '{}'",
            selector, SEPARATOR
        )));
    }
    Ok(())
}

fn validate_label_part(what: &str, part: &str) -> Result<()> {
    validate_segment(what, part)?;
    if part.contains(LABEL_JOIN) || part.contains(LABEL_ASSIGN) {
        return Err(StoreError::BadRequest(format!(
            "{} '{}' must not contain '{}' or '{}'",
            what, part, LABEL_JOIN, LABEL_ASSIGN
        )));
    }
    Ok(())
}
