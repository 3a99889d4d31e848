//! Service facade
//!
//! Request/response surface over the stores. A transport decodes its own
//! wire format into a [`Request`], calls [`Service::handle`] and renders the
//! [`Response`] (status code plus JSON body).
//!
//! Every mutating request must carry an idempotency key; it is checked
//! before any store call and the operation runs under the
//! [`IdempotencyGuard`].

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::idempotency::{IdempotencyGuard, Outcome};
use crate::kv::KvBackend;
use crate::model::{Deletion, NewConfig, NewGroup, NewGroupMember};
use crate::store::{ConfigStore, GroupStore};

// =============================================================================
// Requests
// =============================================================================

/// One inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `POST /configs/`
    CreateConfig {
        idempotency_key: Option<String>,
        config: NewConfig,
    },

    /// `POST /configs/{id}/`
    CreateConfigVersion {
        idempotency_key: Option<String>,
        id: String,
        config: NewConfig,
    },

    /// `GET /configs/{id}/{version}/`
    GetConfig { id: String, version: String },

    /// `DELETE /configs/{id}/{version}/`
    DeleteConfig {
        idempotency_key: Option<String>,
        id: String,
        version: String,
    },

    /// `POST /groups/`
    CreateGroup {
        idempotency_key: Option<String>,
        group: NewGroup,
    },

    /// `POST /groups/{id}/`
    CreateGroupVersion {
        idempotency_key: Option<String>,
        id: String,
        group: NewGroup,
    },

    /// `GET /groups/{id}/{version}/?k=v...`; `labels` keeps query order
    GetGroup {
        id: String,
        version: String,
        labels: Vec<(String, String)>,
    },

    /// `DELETE /groups/{id}/{version}/`
    DeleteGroup {
        idempotency_key: Option<String>,
        id: String,
        version: String,
    },

    /// `POST /groups/{id}/{version}/configs/`
    AddConfigToGroup {
        idempotency_key: Option<String>,
        id: String,
        version: String,
        member: NewGroupMember,
    },
}

impl Request {
    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Request::CreateConfig { .. } => "create_config",
            Request::CreateConfigVersion { .. } => "create_config_version",
            Request::GetConfig { .. } => "get_config",
            Request::DeleteConfig { .. } => "delete_config",
            Request::CreateGroup { .. } => "create_group",
            Request::CreateGroupVersion { .. } => "create_group_version",
            Request::GetGroup { .. } => "get_group",
            Request::DeleteGroup { .. } => "delete_group",
            Request::AddConfigToGroup { .. } => "add_config_to_group",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Request::GetConfig { .. } | Request::GetGroup { .. })
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Response status, numbered like the HTTP codes they stand for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Status {
    Ok = 200,
    Created = 201,
    BadRequest = 400,
    NotFound = 404,
    Conflict = 409,
    Internal = 500,
    Unavailable = 503,
}

impl Status {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn is_success(self) -> bool {
        matches!(self, Status::Ok | Status::Created)
    }
}

impl From<&StoreError> for Status {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Status::NotFound,
            StoreError::BadRequest(_) => Status::BadRequest,
            StoreError::AlreadyExists(_) | StoreError::InProgress(_) => Status::Conflict,
            StoreError::Cancelled | StoreError::DeadlineExceeded => Status::Unavailable,
            StoreError::Backend(_) | StoreError::Internal(_) => Status::Internal,
        }
    }
}

/// A response to send to the client
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    pub body: Value,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self {
            status: Status::Ok,
            body,
        }
    }

    pub fn created(body: Value) -> Self {
        Self {
            status: Status::Created,
            body,
        }
    }

    /// Error response carrying the error message
    pub fn error(err: &StoreError) -> Self {
        Self {
            status: Status::from(err),
            body: json!({ "error": err.to_string() }),
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Dispatches requests to the config store, group store and idempotency guard
pub struct Service<B> {
    configs: ConfigStore<B>,
    groups: GroupStore<B>,
    idempotency: IdempotencyGuard<B>,
}

impl<B: KvBackend> Service<B> {
    pub fn new(backend: Arc<B>, config: &Config) -> Self {
        Self {
            configs: ConfigStore::new(Arc::clone(&backend)),
            groups: GroupStore::new(Arc::clone(&backend)),
            idempotency: IdempotencyGuard::from_config(backend, config),
        }
    }

    pub fn configs(&self) -> &ConfigStore<B> {
        &self.configs
    }

    pub fn groups(&self) -> &GroupStore<B> {
        &self.groups
    }

    pub fn idempotency(&self) -> &IdempotencyGuard<B> {
        &self.idempotency
    }

    /// Execute a request and return a response
    pub fn handle(&self, ctx: &Context, request: Request) -> Response {
        let name = request.name();

        match self.dispatch(ctx, request) {
            Ok(response) => {
                tracing::debug!(request = name, status = response.status.code(), "Request handled");
                response
            }
            Err(err) => {
                let response = Response::error(&err);
                if response.status == Status::Internal {
                    tracing::warn!(request = name, "Request failed: {}", err);
                } else {
                    tracing::debug!(
                        request = name,
                        status = response.status.code(),
                        "Request rejected: {}",
                        err
                    );
                }
                response
            }
        }
    }

    fn dispatch(&self, ctx: &Context, request: Request) -> Result<Response> {
        match request {
            Request::CreateConfig {
                idempotency_key,
                config,
            } => {
                let outcome = self.guarded(ctx, idempotency_key, || {
                    Ok(self.configs.create_config(ctx, &config)?.to_string())
                })?;
                Ok(Response::created(json!({ "id": outcome.result })))
            }

            Request::CreateConfigVersion {
                idempotency_key,
                id,
                config,
            } => {
                let id = parse_id(&id)?;
                let outcome = self.guarded(ctx, idempotency_key, || {
                    self.configs.create_config_version(ctx, &id, &config)?;
                    Ok(id.to_string())
                })?;
                Ok(Response::created(json!({ "id": outcome.result })))
            }

            Request::GetConfig { id, version } => {
                let id = parse_id(&id)?;
                let config = self.configs.get_config(ctx, &id, &version)?;
                Ok(Response::ok(serde_json::to_value(config)?))
            }

            Request::DeleteConfig {
                idempotency_key,
                id,
                version,
            } => {
                let id = parse_id(&id)?;
                self.guarded(ctx, idempotency_key, || {
                    Ok(self.configs.delete_config(ctx, &id, &version)?.deleted.to_string())
                })?;
                deleted(id, version)
            }

            Request::CreateGroup {
                idempotency_key,
                group,
            } => {
                let outcome = self.guarded(ctx, idempotency_key, || {
                    Ok(self.groups.create_group(ctx, &group)?.to_string())
                })?;
                Ok(Response::created(json!({ "id": outcome.result })))
            }

            Request::CreateGroupVersion {
                idempotency_key,
                id,
                group,
            } => {
                let id = parse_id(&id)?;
                let outcome = self.guarded(ctx, idempotency_key, || {
                    Ok(self.groups.create_group_version(ctx, &id, &group)?.to_string())
                })?;
                Ok(Response::created(json!({ "id": outcome.result })))
            }

            Request::GetGroup {
                id,
                version,
                labels,
            } => {
                let id = parse_id(&id)?;
                let members = self.groups.get_group_by_labels(ctx, &id, &version, labels)?;
                Ok(Response::ok(serde_json::to_value(members)?))
            }

            Request::DeleteGroup {
                idempotency_key,
                id,
                version,
            } => {
                let id = parse_id(&id)?;
                self.guarded(ctx, idempotency_key, || {
                    Ok(self.groups.delete_group(ctx, &id, &version)?.deleted.to_string())
                })?;
                deleted(id, version)
            }

            Request::AddConfigToGroup {
                idempotency_key,
                id,
                version,
                member,
            } => {
                let id = parse_id(&id)?;
                let outcome = self.guarded(ctx, idempotency_key, || {
                    self.groups.add_config_to_group(ctx, &id, &version, &member)
                })?;
                Ok(Response::created(json!({ "path": outcome.result })))
            }
        }
    }

    /// Run `operation` under the idempotency guard; a missing key is a
    /// client error and nothing is executed
    fn guarded<F>(&self, ctx: &Context, key: Option<String>, operation: F) -> Result<Outcome>
    where
        F: FnOnce() -> Result<String>,
    {
        match key {
            Some(key) if !key.is_empty() => self.idempotency.execute(ctx, &key, operation),
            _ => Err(StoreError::BadRequest("missing idempotency key".to_string())),
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| StoreError::BadRequest(format!("invalid id '{}'", raw)))
}

fn deleted(id: Uuid, version: String) -> Result<Response> {
    Ok(Response::ok(serde_json::to_value(Deletion {
        deleted: id,
        version,
    })?))
}
