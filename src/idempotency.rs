//! Idempotency Guard
//!
//! Gives a mutating operation a single effect per client-supplied key.
//!
//! ## Protocol
//! 1. Claim `idempotency/{key}/` with a *pending* record (put-if-absent).
//! 2. If the key is already held:
//!    - a live *complete* record is replayed without running the operation
//!    - a live *pending* record means another request owns the key
//!      (`InProgress`)
//!    - an expired or abandoned record is taken over with compare-and-put
//! 3. Run the operation. On success with a non-empty result the claim is
//!    swapped (compare-and-put) for a *complete* record; on failure the claim
//!    is released so the client can retry with the same key. A produced
//!    result is always returned, even if recording it fails.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::keyspace;
use crate::kv::KvBackend;
use crate::store::{decode, encode};

/// Bound on claim retries when the record changes between read and swap
const MAX_CLAIM_ATTEMPTS: usize = 3;

/// Stored state of an idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IdempotencyRecord {
    /// An operation holding this key is running
    Pending { created_at_ms: u64 },

    /// The operation finished and produced `result`
    Complete { result: String, created_at_ms: u64 },
}

impl IdempotencyRecord {
    pub fn created_at_ms(&self) -> u64 {
        match self {
            IdempotencyRecord::Pending { created_at_ms } => *created_at_ms,
            IdempotencyRecord::Complete { created_at_ms, .. } => *created_at_ms,
        }
    }
}

/// Result of a guarded execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Result identifier of the first successful execution
    pub result: String,

    /// True when the result came from a stored record rather than a fresh run
    pub replayed: bool,
}

enum Claim {
    Acquired,
    Replay(String),
}

/// Exactly-once wrapper for mutating operations
pub struct IdempotencyGuard<B> {
    backend: Arc<B>,
    ttl: Option<Duration>,
    pending_timeout: Duration,
}

impl<B> Clone for IdempotencyGuard<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ttl: self.ttl,
            pending_timeout: self.pending_timeout,
        }
    }
}

impl<B: KvBackend> IdempotencyGuard<B> {
    /// Create a guard with explicit retention settings
    pub fn new(backend: Arc<B>, ttl: Option<Duration>, pending_timeout: Duration) -> Self {
        Self {
            backend,
            ttl,
            pending_timeout,
        }
    }

    /// Create a guard using the retention settings of `config`
    pub fn from_config(backend: Arc<B>, config: &Config) -> Self {
        Self::new(backend, config.idempotency_ttl, config.idempotency_pending_timeout)
    }

    /// Run `operation` at most once per `key`.
    pub fn execute<F>(&self, ctx: &Context, key: &str, operation: F) -> Result<Outcome>
    where
        F: FnOnce() -> Result<String>,
    {
        keyspace::validate_segment("idempotency key", key)?;

        let path = keyspace::idempotency_path(key);
        let pending = encode(&IdempotencyRecord::Pending {
            created_at_ms: now_ms(),
        })?;

        if let Claim::Replay(result) = self.claim(ctx, key, &path, &pending)? {
            tracing::debug!(idempotency_key = key, result = %result, "Replayed idempotent request");
            return Ok(Outcome {
                result,
                replayed: true,
            });
        }

        match operation() {
            Ok(result) if !result.is_empty() => {
                // The operation's effect is already persisted; record it even
                // if the request was cancelled meanwhile.
                self.complete(key, &path, &pending, &result);
                Ok(Outcome {
                    result,
                    replayed: false,
                })
            }
            Ok(result) => {
                self.release(key, &path, &pending);
                Ok(Outcome {
                    result,
                    replayed: false,
                })
            }
            Err(err) => {
                self.release(key, &path, &pending);
                Err(err)
            }
        }
    }

    /// Current record for `key`, if any
    pub fn lookup(&self, ctx: &Context, key: &str) -> Result<Option<IdempotencyRecord>> {
        keyspace::validate_segment("idempotency key", key)?;

        ctx.check()?;
        match self.backend.get(&keyspace::idempotency_path(key))? {
            Some(data) => Ok(Some(decode(&data)?)),
            None => Ok(None),
        }
    }

    /// Delete every expired complete record and every abandoned claim,
    /// returning how many were removed
    pub fn purge_expired(&self, ctx: &Context) -> Result<usize> {
        ctx.check()?;
        let now = now_ms();
        let mut removed = 0;

        for (path, data) in self.backend.list(&keyspace::idempotency_root())? {
            let record: IdempotencyRecord = match decode(&data) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(
                        path = %path,
                        "Skipping undecodable idempotency record: {}",
                        err
                    );
                    continue;
                }
            };
            if !self.is_reclaimable(&record, now) {
                continue;
            }

            ctx.check()?;
            if self.backend.compare_and_delete(&path, &data)? {
                removed += 1;
            }
        }

        tracing::info!(removed, "Purged expired idempotency records");
        Ok(removed)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn claim(&self, ctx: &Context, key: &str, path: &str, pending: &[u8]) -> Result<Claim> {
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            ctx.check()?;
            if self.backend.put_if_absent(path, pending)? {
                return Ok(Claim::Acquired);
            }

            let current = match self.backend.get(path)? {
                Some(current) => current,
                // Released between our two calls; try again
                None => continue,
            };
            let record: IdempotencyRecord = decode(&current)?;

            if !self.is_reclaimable(&record, now_ms()) {
                return match record {
                    IdempotencyRecord::Complete { result, .. } => Ok(Claim::Replay(result)),
                    IdempotencyRecord::Pending { .. } => {
                        Err(StoreError::InProgress(key.to_string()))
                    }
                };
            }

            if self.backend.compare_and_put(path, Some(&current), pending)? {
                tracing::debug!(idempotency_key = key, "Reclaimed expired idempotency record");
                return Ok(Claim::Acquired);
            }
        }

        Err(StoreError::InProgress(key.to_string()))
    }

    /// Swap our pending claim for a complete record.
    ///
    /// The caller gets its result whether or not this succeeds; an
    /// unrecorded claim stays pending. A claim reclaimed by another holder in
    /// the meantime is left untouched.
    fn complete(&self, key: &str, path: &str, pending: &[u8], result: &str) {
        let record = match encode(&IdempotencyRecord::Complete {
            result: result.to_string(),
            created_at_ms: now_ms(),
        }) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    idempotency_key = key,
                    "Failed to encode idempotency record: {}",
                    err
                );
                return;
            }
        };

        match self.backend.compare_and_put(path, Some(pending), &record) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    idempotency_key = key,
                    result = %result,
                    "Idempotency claim was taken over before completion"
                );
            }
            Err(err) => {
                tracing::warn!(
                    idempotency_key = key,
                    result = %result,
                    "Failed to record idempotency result: {}",
                    err
                );
            }
        }
    }

    fn release(&self, key: &str, path: &str, pending: &[u8]) {
        if let Err(err) = self.backend.compare_and_delete(path, pending) {
            tracing::warn!(idempotency_key = key, "Failed to release idempotency claim: {}", err);
        }
    }

    fn is_reclaimable(&self, record: &IdempotencyRecord, now: u64) -> bool {
        let age = Duration::from_millis(now.saturating_sub(record.created_at_ms()));
        match record {
            IdempotencyRecord::Pending { .. } => age >= self.pending_timeout,
            IdempotencyRecord::Complete { .. } => match self.ttl {
                Some(ttl) => age >= ttl,
                None => false,
            },
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
