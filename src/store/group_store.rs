//! Group Store
//!
//! Versioned groups of label-qualified configs. Members live at
//! `groups/{group_id}/{version}/{canonical_labels}/{entry_id}/`, so a prefix
//! listing on a canonical label string returns exactly the members written
//! with that label set.
//!
//! Multi-member writes are committed as one guarded batch: either every
//! member of a create request is stored or none is.

use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::keyspace;
use crate::kv::{CommitOutcome, Guard, KvBackend, WriteBatch};
use crate::model::{ConfigValue, Deletion, GroupEntry, NewGroup, NewGroupMember};

use super::{decode, encode};

/// Versioned group storage over a shared backend handle
pub struct GroupStore<B> {
    backend: Arc<B>,
}

impl<B> Clone for GroupStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: KvBackend> GroupStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Allocate a new group id and store every member of `group` under it.
    pub fn create_group(&self, ctx: &Context, group: &NewGroup) -> Result<Uuid> {
        let id = keyspace::generate_id();
        let batch = self
            .stage(&id, group)?
            .guard(Guard::PrefixAbsent(keyspace::group_root(&id)));

        ctx.check()?;
        match self.backend.commit(batch)? {
            CommitOutcome::Committed => {
                tracing::debug!(
                    group_id = %id,
                    version = %group.version,
                    members = group.configs.len(),
                    "Created group"
                );
                Ok(id)
            }
            CommitOutcome::Rejected { .. } => {
                Err(StoreError::AlreadyExists(format!("group {}", id)))
            }
        }
    }

    /// Store a new version of an existing group.
    ///
    /// Fails with `NotFound` if the group has no versions and with
    /// `AlreadyExists` if `group.version` is taken.
    pub fn create_group_version(&self, ctx: &Context, id: &Uuid, group: &NewGroup) -> Result<Uuid> {
        let batch = WriteBatch {
            guards: vec![
                Guard::PrefixPresent(keyspace::group_root(id)),
                Guard::PrefixAbsent(keyspace::group_path(id, &group.version, "")),
            ],
            puts: self.stage(id, group)?.puts,
        };

        ctx.check()?;
        match self.backend.commit(batch)? {
            CommitOutcome::Committed => {
                tracing::debug!(group_id = %id, version = %group.version, "Created group version");
                Ok(*id)
            }
            CommitOutcome::Rejected { guard: 0 } => {
                Err(StoreError::NotFound(format!("group {}", id)))
            }
            CommitOutcome::Rejected { .. } => Err(StoreError::AlreadyExists(format!(
                "group {} version {}",
                id, group.version
            ))),
        }
    }

    /// Add one member to an existing group version, returning its path.
    pub fn add_config_to_group(
        &self,
        ctx: &Context,
        id: &Uuid,
        version: &str,
        member: &NewGroupMember,
    ) -> Result<String> {
        keyspace::validate_segment("version", version)?;

        let (path, data) = self.stage_member(id, version, member)?;
        let batch = WriteBatch::new()
            .guard(Guard::PrefixPresent(keyspace::group_path(id, version, "")))
            .put(path.clone(), data);

        ctx.check()?;
        match self.backend.commit(batch)? {
            CommitOutcome::Committed => {
                tracing::debug!(group_id = %id, version, path = %path, "Added config to group");
                Ok(path)
            }
            CommitOutcome::Rejected { .. } => Err(StoreError::NotFound(format!(
                "group {} version {}",
                id, version
            ))),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Members of `(id, version)` carrying exactly the labels in `selector`,
    /// a `key=value&key=value` string in any key order. An empty selector
    /// returns every member of the version.
    pub fn get_group(
        &self,
        ctx: &Context,
        id: &Uuid,
        version: &str,
        selector: &str,
    ) -> Result<Vec<ConfigValue>> {
        let pairs = keyspace::parse_labels(selector)?;
        self.get_group_by_labels(ctx, id, version, pairs.iter().map(|l| (&l.key, &l.value)))
    }

    /// [`get_group`](Self::get_group) with a selector built from query pairs
    /// (first value per key wins).
    pub fn get_group_by_labels<I, K, V>(
        &self,
        ctx: &Context,
        id: &Uuid,
        version: &str,
        pairs: I,
    ) -> Result<Vec<ConfigValue>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let selector = keyspace::canonicalize_selector(pairs)?;
        self.read_partition(ctx, id, version, &selector)
    }

    /// Every member of a version, decoded with its entry id and labels
    pub fn members(&self, ctx: &Context, id: &Uuid, version: &str) -> Result<Vec<GroupEntry>> {
        keyspace::validate_segment("version", version)?;

        ctx.check()?;
        let listed = self.backend.list(&keyspace::group_path(id, version, ""))?;
        if listed.is_empty() {
            return Err(StoreError::NotFound(format!(
                "group {} version {}",
                id, version
            )));
        }

        listed
            .iter()
            .map(|(path, data)| -> Result<GroupEntry> {
                let decoded = keyspace::parse_group_member_path(path).ok_or_else(|| {
                    StoreError::Internal(format!("unrecognized group member path '{}'", path))
                })?;
                let config: ConfigValue = decode(data)?;
                Ok(GroupEntry {
                    entry_id: decoded.entry_id,
                    labels: keyspace::parse_labels(&decoded.canonical_labels)?,
                    key: config.key,
                    value: config.value,
                })
            })
            .collect()
    }

    pub fn group_exists(&self, ctx: &Context, id: &Uuid) -> Result<bool> {
        ctx.check()?;
        Ok(self.backend.has_prefix(&keyspace::group_root(id))?)
    }

    pub fn group_version_exists(&self, ctx: &Context, id: &Uuid, version: &str) -> Result<bool> {
        keyspace::validate_segment("version", version)?;

        ctx.check()?;
        Ok(self
            .backend
            .has_prefix(&keyspace::group_path(id, version, ""))?)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete a whole version: every label partition and every member.
    pub fn delete_group(&self, ctx: &Context, id: &Uuid, version: &str) -> Result<Deletion> {
        keyspace::validate_segment("version", version)?;

        ctx.check()?;
        let removed = self
            .backend
            .delete_prefix(&keyspace::group_path(id, version, ""))?;

        tracing::debug!(group_id = %id, version, removed, "Deleted group version");
        Ok(Deletion {
            deleted: *id,
            version: version.to_string(),
        })
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read_partition(
        &self,
        ctx: &Context,
        id: &Uuid,
        version: &str,
        canonical: &str,
    ) -> Result<Vec<ConfigValue>> {
        keyspace::validate_segment("version", version)?;
        keyspace::validate_selector(canonical)?;

        ctx.check()?;
        let listed = self
            .backend
            .list(&keyspace::group_path(id, version, canonical))?;

        if listed.is_empty() {
            return Err(StoreError::NotFound(format!(
                "group {} version {} labels '{}'",
                id, version, canonical
            )));
        }

        listed.iter().map(|(_, data)| decode(data)).collect()
    }

    /// Canonicalize and encode every member before anything is written
    fn stage(&self, id: &Uuid, group: &NewGroup) -> Result<WriteBatch> {
        keyspace::validate_segment("version", &group.version)?;
        if group.configs.is_empty() {
            return Err(StoreError::BadRequest(
                "group must contain at least one config".to_string(),
            ));
        }

        let mut batch = WriteBatch::new();
        for member in &group.configs {
            let (path, data) = self.stage_member(id, &group.version, member)?;
            batch = batch.put(path, data);
        }
        Ok(batch)
    }

    fn stage_member(
        &self,
        id: &Uuid,
        version: &str,
        member: &NewGroupMember,
    ) -> Result<(String, Bytes)> {
        let labels = keyspace::canonicalize_labels(&member.labels)?;
        let entry_id = keyspace::generate_id();
        let path = keyspace::group_member_path(id, version, &labels, &entry_id);
        let data = Bytes::from(encode(&member.to_value())?);
        Ok((path, data))
    }
}
