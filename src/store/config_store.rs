//! Config Store
//!
//! CRUD and versioning for single configs stored at
//! `configs/{config_id}/{version}/`.

use std::sync::Arc;

use uuid::Uuid;

use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::keyspace;
use crate::kv::{CommitOutcome, Guard, KvBackend, WriteBatch};
use crate::model::{ConfigValue, Deletion, NewConfig};

use super::{decode, encode};

/// Versioned config storage over a shared backend handle
pub struct ConfigStore<B> {
    backend: Arc<B>,
}

impl<B> Clone for ConfigStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: KvBackend> ConfigStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Allocate a new config id and store the first version under it.
    pub fn create_config(&self, ctx: &Context, config: &NewConfig) -> Result<Uuid> {
        keyspace::validate_segment("version", &config.version)?;

        let id = keyspace::generate_id();
        let path = keyspace::config_path(&id, &config.version);
        let data = encode(&config.to_value())?;

        ctx.check()?;
        self.backend.put(&path, &data)?;

        tracing::debug!(config_id = %id, version = %config.version, "Created config");
        Ok(id)
    }

    /// Add a version under an existing config id, returning its path.
    ///
    /// Fails with `NotFound` if `id` has no versions yet and with
    /// `AlreadyExists` if `config.version` is taken. Both checks are evaluated
    /// atomically with the write.
    pub fn create_config_version(
        &self,
        ctx: &Context,
        id: &Uuid,
        config: &NewConfig,
    ) -> Result<String> {
        keyspace::validate_segment("version", &config.version)?;

        let path = keyspace::config_path(id, &config.version);
        let batch = WriteBatch::new()
            .guard(Guard::PrefixPresent(keyspace::config_root(id)))
            .guard(Guard::PrefixAbsent(path.clone()))
            .put(path.clone(), encode(&config.to_value())?);

        ctx.check()?;
        match self.backend.commit(batch)? {
            CommitOutcome::Committed => {
                tracing::debug!(
                    config_id = %id,
                    version = %config.version,
                    "Created config version"
                );
                Ok(path)
            }
            CommitOutcome::Rejected { guard: 0 } => {
                Err(StoreError::NotFound(format!("config {}", id)))
            }
            CommitOutcome::Rejected { .. } => Err(StoreError::AlreadyExists(format!(
                "config {} version {}",
                id, config.version
            ))),
        }
    }

    pub fn get_config(&self, ctx: &Context, id: &Uuid, version: &str) -> Result<ConfigValue> {
        keyspace::validate_segment("version", version)?;

        ctx.check()?;
        match self.backend.get(&keyspace::config_path(id, version))? {
            Some(data) => decode(&data),
            None => Err(StoreError::NotFound(format!(
                "config {} version {}",
                id, version
            ))),
        }
    }

    /// Delete exactly one version. Deleting an absent version succeeds.
    pub fn delete_config(&self, ctx: &Context, id: &Uuid, version: &str) -> Result<Deletion> {
        keyspace::validate_segment("version", version)?;

        ctx.check()?;
        self.backend.delete(&keyspace::config_path(id, version))?;

        tracing::debug!(config_id = %id, version, "Deleted config version");
        Ok(Deletion {
            deleted: *id,
            version: version.to_string(),
        })
    }

    /// True iff any version is stored under `id`
    pub fn config_exists(&self, ctx: &Context, id: &Uuid) -> Result<bool> {
        ctx.check()?;
        Ok(self.backend.has_prefix(&keyspace::config_root(id))?)
    }

    pub fn config_version_exists(&self, ctx: &Context, id: &Uuid, version: &str) -> Result<bool> {
        keyspace::validate_segment("version", version)?;

        ctx.check()?;
        Ok(self.backend.has_prefix(&keyspace::config_path(id, version))?)
    }

    /// Every version stored under `id`, in key order
    pub fn list_versions(&self, ctx: &Context, id: &Uuid) -> Result<Vec<String>> {
        ctx.check()?;
        let versions: Vec<String> = self
            .backend
            .list(&keyspace::config_root(id))?
            .into_iter()
            .filter_map(|(path, _)| keyspace::parse_config_path(&path).map(|(_, version)| version))
            .collect();

        if versions.is_empty() {
            return Err(StoreError::NotFound(format!("config {}", id)));
        }
        Ok(versions)
    }
}
