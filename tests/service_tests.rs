//! Tests for the service facade
//!
//! These tests verify:
//! - Status codes for creations, reads and deletes
//! - Missing idempotency keys are rejected before any write
//! - Idempotent replays return the original id
//! - Error mapping (400 / 404 / 409 / 503)
//! - Group reads with label query pairs
//! - Durable writes report success even when compaction fails

use std::sync::Arc;

use confstore::model::{Label, NewConfig, NewGroup, NewGroupMember};
use confstore::{
    CancelToken, Config, Context, DurableBackend, MemoryBackend, Request, Response, Service,
    Status,
};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (Arc<MemoryBackend>, Service<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let service = Service::new(Arc::clone(&backend), &Config::default());
    (backend, service)
}

fn key(k: &str) -> Option<String> {
    Some(k.to_string())
}

fn create_config(
    service: &Service<MemoryBackend>,
    idempotency_key: &str,
    version: &str,
) -> Response {
    service.handle(
        &Context::background(),
        Request::CreateConfig {
            idempotency_key: key(idempotency_key),
            config: NewConfig::new("db.host", "10.0.0.1", version),
        },
    )
}

fn id_of(response: &Response) -> String {
    response.body["id"].as_str().unwrap().to_string()
}

fn env_group() -> NewGroup {
    NewGroup::new(
        "v1",
        vec![
            NewGroupMember::new("a", "1", vec![Label::new("env", "prod")]),
            NewGroupMember::new("a", "2", vec![Label::new("env", "dev")]),
        ],
    )
}

// =============================================================================
// Config Endpoint Tests
// =============================================================================

#[test]
fn test_create_and_get_config() {
    let (_backend, service) = setup();
    let ctx = Context::background();

    let created = create_config(&service, "req-1", "v1");
    assert_eq!(created.status, Status::Created);
    assert_eq!(created.status.code(), 201);

    let fetched = service.handle(
        &ctx,
        Request::GetConfig {
            id: id_of(&created),
            version: "v1".to_string(),
        },
    );
    assert_eq!(fetched.status, Status::Ok);
    assert_eq!(fetched.body, json!({ "key": "db.host", "value": "10.0.0.1" }));
}

#[test]
fn test_missing_idempotency_key_is_bad_request() {
    let (backend, service) = setup();
    let ctx = Context::background();

    for idempotency_key in [None, key("")] {
        let response = service.handle(
            &ctx,
            Request::CreateConfig {
                idempotency_key,
                config: NewConfig::new("a", "b", "v1"),
            },
        );
        assert_eq!(response.status, Status::BadRequest);
    }
    assert!(backend.is_empty());
}

#[test]
fn test_same_idempotency_key_returns_same_id() {
    let (backend, service) = setup();

    let first = create_config(&service, "req-1", "v1");
    let second = create_config(&service, "req-1", "v1");

    assert_eq!(first.status, Status::Created);
    assert_eq!(second.status, Status::Created);
    assert_eq!(id_of(&first), id_of(&second));
    // One config plus one idempotency record
    assert_eq!(backend.len(), 2);
}

#[test]
fn test_different_idempotency_keys_create_distinct_configs() {
    let (_backend, service) = setup();

    let first = create_config(&service, "req-1", "v1");
    let second = create_config(&service, "req-2", "v1");

    assert_ne!(id_of(&first), id_of(&second));
}

#[test]
fn test_duplicate_version_is_conflict() {
    let (_backend, service) = setup();
    let ctx = Context::background();
    let id = id_of(&create_config(&service, "req-1", "v1"));

    let response = service.handle(
        &ctx,
        Request::CreateConfigVersion {
            idempotency_key: key("req-2"),
            id: id.clone(),
            config: NewConfig::new("db.host", "10.0.0.2", "v1"),
        },
    );
    assert_eq!(response.status, Status::Conflict);
    assert!(response.body["error"].as_str().unwrap().contains("Already exists"));

    // The failure left no record, so the same key can be reused
    let retry = service.handle(
        &ctx,
        Request::CreateConfigVersion {
            idempotency_key: key("req-2"),
            id: id.clone(),
            config: NewConfig::new("db.host", "10.0.0.2", "v2"),
        },
    );
    assert_eq!(retry.status, Status::Created);
    assert_eq!(id_of(&retry), id);
}

#[test]
fn test_version_of_unknown_config_is_not_found() {
    let (_backend, service) = setup();

    let response = service.handle(
        &Context::background(),
        Request::CreateConfigVersion {
            idempotency_key: key("req-1"),
            id: confstore::keyspace::generate_id().to_string(),
            config: NewConfig::new("a", "b", "v2"),
        },
    );
    assert_eq!(response.status, Status::NotFound);
}

#[test]
fn test_malformed_id_is_bad_request() {
    let (_backend, service) = setup();

    let response = service.handle(
        &Context::background(),
        Request::GetConfig {
            id: "not-a-uuid".to_string(),
            version: "v1".to_string(),
        },
    );
    assert_eq!(response.status, Status::BadRequest);
}

#[test]
fn test_delete_config() {
    let (_backend, service) = setup();
    let ctx = Context::background();
    let id = id_of(&create_config(&service, "req-1", "v1"));

    let deleted = service.handle(
        &ctx,
        Request::DeleteConfig {
            idempotency_key: key("req-2"),
            id: id.clone(),
            version: "v1".to_string(),
        },
    );
    assert_eq!(deleted.status, Status::Ok);
    assert_eq!(deleted.body, json!({ "deleted": id, "version": "v1" }));

    let fetched = service.handle(
        &ctx,
        Request::GetConfig {
            id,
            version: "v1".to_string(),
        },
    );
    assert_eq!(fetched.status, Status::NotFound);
}

#[test]
fn test_cancelled_request_is_unavailable() {
    let (backend, service) = setup();
    let token = CancelToken::new();
    token.cancel();
    let ctx = Context::background().with_cancel(token);

    let response = service.handle(
        &ctx,
        Request::CreateConfig {
            idempotency_key: key("req-1"),
            config: NewConfig::new("a", "b", "v1"),
        },
    );

    assert_eq!(response.status, Status::Unavailable);
    assert!(backend.is_empty());
}

// =============================================================================
// Group Endpoint Tests
// =============================================================================

#[test]
fn test_group_lifecycle() {
    let (_backend, service) = setup();
    let ctx = Context::background();

    let created = service.handle(
        &ctx,
        Request::CreateGroup {
            idempotency_key: key("g-1"),
            group: env_group(),
        },
    );
    assert_eq!(created.status, Status::Created);
    let id = id_of(&created);

    let prod = service.handle(
        &ctx,
        Request::GetGroup {
            id: id.clone(),
            version: "v1".to_string(),
            labels: vec![("env".to_string(), "prod".to_string())],
        },
    );
    assert_eq!(prod.status, Status::Ok);
    assert_eq!(prod.body, json!([{ "key": "a", "value": "1" }]));

    let added = service.handle(
        &ctx,
        Request::AddConfigToGroup {
            idempotency_key: key("g-2"),
            id: id.clone(),
            version: "v1".to_string(),
            member: NewGroupMember::new("b", "3", vec![Label::new("env", "prod")]),
        },
    );
    assert_eq!(added.status, Status::Created);
    assert!(added.body["path"].as_str().unwrap().contains("/v1/env=prod/"));

    let deleted = service.handle(
        &ctx,
        Request::DeleteGroup {
            idempotency_key: key("g-3"),
            id: id.clone(),
            version: "v1".to_string(),
        },
    );
    assert_eq!(deleted.status, Status::Ok);

    let gone = service.handle(
        &ctx,
        Request::GetGroup {
            id,
            version: "v1".to_string(),
            labels: vec![],
        },
    );
    assert_eq!(gone.status, Status::NotFound);
}

#[test]
fn test_create_group_version_replay() {
    let (_backend, service) = setup();
    let ctx = Context::background();
    let id = id_of(&service.handle(
        &ctx,
        Request::CreateGroup {
            idempotency_key: key("g-1"),
            group: env_group(),
        },
    ));

    let request = Request::CreateGroupVersion {
        idempotency_key: key("g-2"),
        id: id.clone(),
        group: NewGroup::new("v2", env_group().configs),
    };
    let first = service.handle(&ctx, request.clone());
    let replay = service.handle(&ctx, request);

    assert_eq!(first.status, Status::Created);
    assert_eq!(replay, first);
    assert_eq!(id_of(&replay), id);
}

#[test]
fn test_duplicate_label_key_is_bad_request() {
    let (backend, service) = setup();

    let response = service.handle(
        &Context::background(),
        Request::CreateGroup {
            idempotency_key: key("g-1"),
            group: NewGroup::new(
                "v1",
                vec![NewGroupMember::new(
                    "a",
                    "1",
                    vec![Label::new("env", "prod"), Label::new("env", "dev")],
                )],
            ),
        },
    );

    assert_eq!(response.status, Status::BadRequest);
    assert!(backend.is_empty());
}

#[test]
fn test_request_names_and_mutability() {
    let get = Request::GetConfig {
        id: String::new(),
        version: String::new(),
    };
    let delete = Request::DeleteGroup {
        idempotency_key: None,
        id: String::new(),
        version: String::new(),
    };

    assert_eq!(get.name(), "get_config");
    assert!(!get.is_mutating());
    assert_eq!(delete.name(), "delete_group");
    assert!(delete.is_mutating());
}

#[test]
fn test_create_group_succeeds_when_compaction_fails() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .compaction_threshold(1)
        .build();
    let backend = Arc::new(DurableBackend::open(config.clone()).unwrap());
    let service = Service::new(Arc::clone(&backend), &config);
    std::fs::create_dir(temp.path().join("snapshot.tmp")).unwrap();

    let request = Request::CreateGroup {
        idempotency_key: key("k1"),
        group: env_group(),
    };
    let first = service.handle(&Context::background(), request.clone());
    let retry = service.handle(&Context::background(), request);

    assert_eq!(first.status, Status::Created);
    assert_eq!(retry, first);
    let id = id_of(&first).parse().unwrap();
    let members = service.groups().members(&Context::background(), &id, "v1").unwrap();
    assert_eq!(members.len(), 2);
}
