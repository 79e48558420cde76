//! Binding behaviour against a scripted transport.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tether_engine::mock::MockTransport;
use tether_engine::{
    Binding, ChangeMessage, Error, IntentKind, IntentState, Method, Record, Request, Scope,
    SyncConfig, Synchronizer,
};

fn rec(value: Value) -> Record {
    Record::from_value(value).unwrap()
}

fn server(seed: Value) -> Arc<MockTransport> {
    let transport = Arc::new(MockTransport::new());
    transport.on(Method::Get, "/user", Ok(seed));
    transport
}

async fn bind(transport: &Arc<MockTransport>, scope: &Scope) -> Binding {
    bind_with(transport, scope, SyncConfig::default()).await
}

async fn bind_with(transport: &Arc<MockTransport>, scope: &Scope, config: SyncConfig) -> Binding {
    Synchronizer::new(transport.clone(), config)
        .bind("user", scope, None)
        .await
        .unwrap()
}

/// Answer `GET /user {id}` lookups with `response`.
fn on_lookup(transport: &MockTransport, response: Value) {
    transport.when(
        |req| req.method == Method::Get && req.path == "/user" && req.params.get("id").is_some(),
        Ok(response),
    );
}

fn writes(transport: &MockTransport) -> Vec<Request> {
    transport
        .requests()
        .into_iter()
        .filter(|req| req.method != Method::Get)
        .collect()
}

// ============================================================================
// Seeding
// ============================================================================

#[tokio::test]
async fn seed_matches_fetch_in_order() {
    let transport = server(json!([
        {"id": 2, "name": "b"},
        {"id": 1, "name": "a"},
        {"id": 3, "name": "c"}
    ]));
    let scope = Scope::new();

    let binding = bind(&transport, &scope).await;

    assert_eq!(binding.collection_name(), "users");
    assert_eq!(binding.resource().name(), "user");
    assert_eq!(
        binding.records(),
        vec![
            rec(json!({"id": 2, "name": "b"})),
            rec(json!({"id": 1, "name": "a"})),
            rec(json!({"id": 3, "name": "c"})),
        ]
    );

    binding.settled().await.unwrap();
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn subset_is_passed_verbatim() {
    let transport = server(json!([]));
    let scope = Scope::new();
    let subset = json!({"where": {"active": true}, "limit": 10, "sort": "name ASC"});

    let _binding = Synchronizer::new(transport.clone(), SyncConfig::default())
        .bind("user", &scope, Some(subset.clone()))
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests[0], Request::get("/user", subset));
}

#[tokio::test]
async fn missing_subset_sends_empty_params() {
    let transport = server(json!([]));
    let scope = Scope::new();
    let _binding = bind(&transport, &scope).await;

    assert_eq!(transport.requests()[0].params, json!({}));
}

#[tokio::test]
async fn single_object_and_null_responses_normalize() {
    let transport = server(json!({"id": 9, "name": "solo"}));
    let binding = bind(&transport, &Scope::new()).await;
    assert_eq!(binding.records(), vec![rec(json!({"id": 9, "name": "solo"}))]);

    let scope = Scope::new();
    let transport = server(Value::Null);
    let binding = bind(&transport, &scope).await;
    assert!(binding.records().is_empty());
    assert_eq!(scope.len("users"), Some(0));
}

#[tokio::test]
async fn custom_collection_suffix() {
    let transport = server(json!([]));
    let scope = Scope::new();
    let binding =
        bind_with(&transport, &scope, SyncConfig::new().with_collection_suffix("List")).await;

    assert_eq!(binding.collection_name(), "userList");
    assert!(scope.contains("userList"));
}

#[tokio::test]
async fn bind_failures_leave_scope_untouched() {
    let scope = Scope::new();

    let transport = Arc::new(MockTransport::new());
    let sync = Synchronizer::new(transport.clone(), SyncConfig::default());

    // Nothing answers the fetch
    let result = sync.bind("user", &scope, None).await;
    assert_eq!(result.err(), Some(Error::NotFound("/user".into())));

    // Malformed fetch response
    transport.on(Method::Get, "/user", Ok(json!("nope")));
    let result = sync.bind("user", &scope, None).await;
    assert!(matches!(result, Err(Error::InvalidResponse(_))));

    // Subscription refused
    transport.on(Method::Get, "/user", Ok(json!([])));
    transport.fail_subscriptions();
    let result = sync.bind("user", &scope, None).await;
    assert!(matches!(result, Err(Error::Transport(_))));

    // Bad resource names
    let result = sync.bind("", &scope, None).await;
    assert!(matches!(result, Err(Error::InvalidResource(_))));

    assert!(!scope.contains("users"));
}

#[tokio::test]
async fn events_during_fetch_are_applied_after_seed() {
    let transport = Arc::new(MockTransport::new());
    let weak = Arc::downgrade(&transport);
    transport.respond_with(move |req| {
        if req.method != Method::Get || req.path != "/user" {
            return None;
        }
        if let Some(transport) = weak.upgrade() {
            transport.emit(
                "user",
                ChangeMessage::created(&rec(json!({"id": 2, "name": "late"}))),
            );
            transport.emit(
                "user",
                ChangeMessage::created(&rec(json!({"id": 1, "name": "seeded, newer"}))),
            );
        }
        Some(Ok(json!([{"id": 1, "name": "seeded"}])))
    });
    let scope = Scope::new();

    let binding = bind(&transport, &scope).await;
    binding.settled().await.unwrap();

    assert_eq!(
        binding.records(),
        vec![
            rec(json!({"id": 1, "name": "seeded, newer"})),
            rec(json!({"id": 2, "name": "late"})),
        ]
    );
    assert!(writes(&transport).is_empty());
}

// ============================================================================
// Remote events
// ============================================================================

#[tokio::test]
async fn remote_created_appends_without_create() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    let sent = transport.emit(
        "user",
        ChangeMessage::created(&rec(json!({"id": 2, "name": "b"}))),
    );
    assert_eq!(sent, 1);
    binding.settled().await.unwrap();

    assert_eq!(
        binding.records(),
        vec![rec(json!({"id": 1, "name": "a"})), rec(json!({"id": 2, "name": "b"}))]
    );
    assert!(writes(&transport).is_empty());
    assert!(binding.outbox().is_empty());
}

#[tokio::test]
async fn remote_updated_merges_without_echo() {
    let transport = server(json!([{"id": 1, "name": "a", "updatedAt": "t0"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    transport.emit("user", ChangeMessage::updated(json!(1), json!({"name": "b"})));
    binding.settled().await.unwrap();

    assert_eq!(
        binding.records(),
        vec![rec(json!({"id": 1, "name": "b", "updatedAt": "t0"}))]
    );
    assert!(writes(&transport).is_empty());
}

#[tokio::test]
async fn remote_update_with_new_timestamp_is_not_echoed() {
    let transport = server(json!([{"id": 1, "name": "a", "updatedAt": "t0"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    transport.emit(
        "user",
        ChangeMessage::updated(json!(1), json!({"name": "b", "updatedAt": "t1"})),
    );
    binding.settled().await.unwrap();

    assert_eq!(
        binding.records(),
        vec![rec(json!({"id": 1, "name": "b", "updatedAt": "t1"}))]
    );
    assert!(writes(&transport).is_empty());
}

#[tokio::test]
async fn remote_update_matches_ids_numerically() {
    let transport = server(json!([
        {"id": "5", "name": "string id"},
        {"id": 6, "name": "other"}
    ]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    transport.emit("user", ChangeMessage::updated(json!(5), json!({"name": "x"})));
    transport.emit("user", ChangeMessage::updated(json!("6"), json!({"name": "y"})));
    binding.settled().await.unwrap();

    assert_eq!(
        binding.records(),
        vec![
            rec(json!({"id": "5", "name": "x"})),
            rec(json!({"id": 6, "name": "y"})),
        ]
    );
}

#[tokio::test]
async fn remote_update_for_unknown_id_is_ignored() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    transport.emit("user", ChangeMessage::updated(json!(42), json!({"name": "x"})));
    binding.settled().await.unwrap();

    assert_eq!(binding.records(), vec![rec(json!({"id": 1, "name": "a"}))]);
}

#[tokio::test]
async fn remote_destroyed_removes_exactly_that_record() {
    let transport = server(json!([
        {"id": 1, "name": "twin"},
        {"id": 2, "name": "twin"},
        {"id": 3, "name": "other"}
    ]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    transport.emit("user", ChangeMessage::destroyed(json!(2)));
    binding.settled().await.unwrap();

    assert_eq!(
        binding.records(),
        vec![
            rec(json!({"id": 1, "name": "twin"})),
            rec(json!({"id": 3, "name": "other"})),
        ]
    );
    // No lookup, no delete
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn duplicate_created_merges() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    transport.emit(
        "user",
        ChangeMessage::created(&rec(json!({"id": "1", "name": "a", "extra": true}))),
    );
    binding.settled().await.unwrap();

    assert_eq!(
        binding.records(),
        vec![rec(json!({"id": "1", "name": "a", "extra": true}))]
    );
}

#[tokio::test]
async fn unknown_and_malformed_events_are_ignored() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    transport.emit(
        "user",
        ChangeMessage {
            verb: "addedTo".into(),
            id: json!(1),
            data: json!({"name": "x"}),
        },
    );
    transport.emit(
        "user",
        ChangeMessage {
            verb: "updated".into(),
            id: json!(1),
            data: json!("not an object"),
        },
    );
    binding.settled().await.unwrap();

    assert_eq!(binding.records(), vec![rec(json!({"id": 1, "name": "a"}))]);
    assert!(binding.is_active());
}

#[tokio::test]
async fn worked_scenario() {
    let transport = server(json!([{"id": 1, "name": "a", "updatedAt": "t0"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    transport.emit("user", ChangeMessage::updated(json!(1), json!({"name": "b"})));
    binding.settled().await.unwrap();

    assert_eq!(
        scope.records("users").unwrap(),
        vec![rec(json!({"id": 1, "name": "b", "updatedAt": "t0"}))]
    );
    assert_eq!(transport.requests_with(Method::Post).len(), 0);
}

// ============================================================================
// Local creates
// ============================================================================

fn on_create(transport: &MockTransport, id: i64) {
    transport.on(
        Method::Put,
        "/user/create",
        Ok(json!({"id": id, "name": "new"})),
    );
    transport.on(
        Method::Get,
        format!("/user/{id}"),
        Ok(json!({
            "id": id,
            "name": "new",
            "createdAt": "t1",
            "updatedAt": "t1"
        })),
    );
}

#[tokio::test]
async fn local_push_creates_exactly_once() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    on_create(&transport, 7);
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    let key = scope
        .apply("users", |c| c.push(Record::new().with("name", "new")))
        .unwrap();
    binding.settled().await.unwrap();

    // Server fields landed on the same item
    let created = scope.read("users", |c| c.get(key).cloned()).flatten();
    assert_eq!(
        created,
        Some(rec(json!({
            "id": 7,
            "name": "new",
            "createdAt": "t1",
            "updatedAt": "t1"
        })))
    );
    assert_eq!(scope.len("users"), Some(2));

    let puts = transport.requests_with(Method::Put);
    assert_eq!(puts, vec![Request::put("/user/create", json!({"name": "new"}))]);

    let outbox = binding.outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].kind, IntentKind::Create);
    assert_eq!(outbox[0].item, key);
    assert_eq!(outbox[0].record_id, Some(json!(7)));
    assert_eq!(outbox[0].state, IntentState::Confirmed);

    // Reconciliation is not mistaken for a local edit or a new item
    binding.settled().await.unwrap();
    assert_eq!(transport.requests_with(Method::Put).len(), 1);
    assert!(transport.requests_with(Method::Post).is_empty());
}

#[tokio::test]
async fn pushing_a_record_with_id_does_not_create() {
    let transport = server(json!([]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| c.push(rec(json!({"id": 3, "name": "known"}))))
        .unwrap();
    binding.settled().await.unwrap();

    assert!(writes(&transport).is_empty());
}

#[tokio::test]
async fn failed_create_is_recorded_and_not_retried() {
    let transport = server(json!([]));
    transport.on(
        Method::Put,
        "/user/create",
        Err(Error::Transport("connection reset".into())),
    );
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| c.push(Record::new().with("name", "draft")))
        .unwrap();
    binding.settled().await.unwrap();

    let failed = binding.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind, IntentKind::Create);
    assert!(matches!(&failed[0].state, IntentState::Failed(reason) if reason.contains("connection reset")));
    assert_eq!(binding.records(), vec![rec(json!({"name": "draft"}))]);

    // An unrelated change does not retry the create
    scope
        .apply("users", |c| c.push(rec(json!({"id": 5}))))
        .unwrap();
    binding.settled().await.unwrap();
    assert_eq!(transport.requests_with(Method::Put).len(), 1);
}

#[tokio::test]
async fn create_response_without_id_fails() {
    let transport = server(json!([]));
    transport.on(Method::Put, "/user/create", Ok(json!({"name": "new"})));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| c.push(Record::new().with("name", "new")))
        .unwrap();
    binding.settled().await.unwrap();

    assert_eq!(binding.failed().len(), 1);
    assert_eq!(transport.requests_with(Method::Get).len(), 1);
}

#[tokio::test]
async fn item_added_and_removed_between_digests_sends_nothing() {
    let transport = server(json!([]));
    on_create(&transport, 8);
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| {
            let key = c.push(Record::new().with("name", "new"));
            c.remove(key);
        })
        .unwrap();
    binding.settled().await.unwrap();

    assert!(binding.records().is_empty());
    assert!(writes(&transport).is_empty());
}

#[tokio::test]
async fn created_event_ahead_of_create_response_keeps_one_item() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    on_create(&transport, 7);
    let weak = Arc::downgrade(&transport);
    transport.respond_with(move |req| {
        if req.method != Method::Put || req.path != "/user/create" {
            return None;
        }
        if let Some(transport) = weak.upgrade() {
            transport.emit(
                "user",
                ChangeMessage::created(&rec(json!({"id": 7, "name": "new", "updatedAt": "t0"}))),
            );
        }
        Some(Ok(json!({"id": 7, "name": "new"})))
    });
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    let key = scope
        .apply("users", |c| c.push(Record::new().with("name", "new")))
        .unwrap();
    binding.settled().await.unwrap();

    let ids: Vec<_> = binding.records().iter().map(Record::numeric_id).collect();
    assert_eq!(ids, vec![Some(1), Some(7)]);
    assert_eq!(
        scope.read("users", |c| c.find_by_id(&json!(7))).flatten(),
        Some(key)
    );
    assert_eq!(
        scope.read("users", |c| c.get(key).cloned()).flatten(),
        Some(rec(json!({
            "id": 7,
            "name": "new",
            "createdAt": "t1",
            "updatedAt": "t1"
        })))
    );

    // Folding the echo away is not a local removal
    binding.settled().await.unwrap();
    assert_eq!(writes(&transport), vec![Request::put("/user/create", json!({"name": "new"}))]);

    // A later remote destroy leaves nothing behind
    transport.emit("user", ChangeMessage::destroyed(json!(7)));
    binding.settled().await.unwrap();
    assert_eq!(scope.len("users"), Some(1));
    assert_eq!(writes(&transport).len(), 1);
}

#[tokio::test]
async fn item_removed_before_create_answer_stays_removed() {
    let transport = server(json!([]));
    on_create(&transport, 7);
    let scope = Scope::new();
    let remover = scope.clone();
    transport.respond_with(move |req| {
        if req.method != Method::Put || req.path != "/user/create" {
            return None;
        }
        remover.apply("users", |c| c.retain(|_| false));
        Some(Ok(json!({"id": 7, "name": "new"})))
    });
    let binding = bind(&transport, &scope).await;

    let key = scope
        .apply("users", |c| c.push(Record::new().with("name", "new")))
        .unwrap();
    binding.settled().await.unwrap();
    binding.settled().await.unwrap();

    assert_eq!(scope.len("users"), Some(0));
    assert!(transport.requests_with(Method::Delete).is_empty());
    assert!(transport
        .requests_with(Method::Get)
        .iter()
        .all(|req| req.params.get("id").is_none()));

    let outbox = binding.outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].kind, IntentKind::Create);
    assert_eq!(outbox[0].item, key);
    assert_eq!(outbox[0].record_id, Some(json!(7)));
    assert_eq!(outbox[0].state, IntentState::Confirmed);
}

// ============================================================================
// Local edits
// ============================================================================

#[tokio::test]
async fn edit_without_new_timestamp_is_not_sent() {
    let transport = server(json!([{"id": 1, "name": "a", "updatedAt": "t0"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| {
            let key = c.key_at(0).unwrap();
            c.get_mut(key).unwrap().set("name", "b");
        })
        .unwrap();
    binding.settled().await.unwrap();

    assert!(writes(&transport).is_empty());
    assert!(binding.outbox().is_empty());
}

#[tokio::test]
async fn edit_with_new_timestamp_is_sent() {
    let transport = server(json!([{"id": 1, "name": "a", "updatedAt": "t0"}]));
    transport.on(
        Method::Post,
        "/user/update/1",
        Ok(json!({"id": 1, "name": "b", "updatedAt": "t1"})),
    );
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| {
            let key = c.key_at(0).unwrap();
            let item = c.get_mut(key).unwrap();
            item.set("name", "b");
            item.set("updatedAt", "t1");
        })
        .unwrap();
    binding.settled().await.unwrap();

    assert_eq!(
        writes(&transport),
        vec![Request::post(
            "/user/update/1",
            json!({"id": 1, "name": "b", "updatedAt": "t1"})
        )]
    );
    let outbox = binding.outbox();
    assert_eq!(outbox[0].kind, IntentKind::Update);
    assert_eq!(outbox[0].state, IntentState::Confirmed);
}

#[tokio::test]
async fn any_edit_is_sent_without_timestamp_guard() {
    let transport = server(json!([{"id": 1, "name": "a", "updatedAt": "t0"}]));
    transport.on(Method::Post, "/user/update/1", Ok(json!({})));
    let scope = Scope::new();
    let binding = bind_with(
        &transport,
        &scope,
        SyncConfig::new().with_require_timestamp_change(false),
    )
    .await;

    scope
        .apply("users", |c| {
            let key = c.key_at(0).unwrap();
            c.get_mut(key).unwrap().set("name", "b");
        })
        .unwrap();
    binding.settled().await.unwrap();

    assert_eq!(transport.requests_with(Method::Post).len(), 1);

    // Remote changes are still never echoed
    transport.emit("user", ChangeMessage::updated(json!(1), json!({"name": "c"})));
    binding.settled().await.unwrap();
    assert_eq!(transport.requests_with(Method::Post).len(), 1);
}

#[tokio::test]
async fn failed_update_is_recorded() {
    let transport = server(json!([{"id": 1, "name": "a", "updatedAt": "t0"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| {
            let key = c.key_at(0).unwrap();
            c.get_mut(key).unwrap().set("updatedAt", "t1");
        })
        .unwrap();
    binding.settled().await.unwrap();

    let failed = binding.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind, IntentKind::Update);
    assert_eq!(failed[0].record_id, Some(json!(1)));
    assert_eq!(binding.pending_count(), 0);
}

#[tokio::test]
async fn edits_follow_items_across_inserts() {
    let transport = server(json!([
        {"id": 1, "name": "a", "updatedAt": "t0"},
        {"id": 2, "name": "b", "updatedAt": "t0"}
    ]));
    on_create(&transport, 3);
    transport.on(Method::Post, "/user/update/2", Ok(json!({})));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| {
            let second = c.key_at(1).unwrap();
            c.insert(0, Record::new().with("name", "front"));
            let item = c.get_mut(second).unwrap();
            item.set("name", "B");
            item.set("updatedAt", "t1");
        })
        .unwrap();
    binding.settled().await.unwrap();

    let posts = transport.requests_with(Method::Post);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].path, "/user/update/2");
    assert_eq!(transport.requests_with(Method::Put).len(), 1);
}

#[tokio::test]
async fn local_edit_survives_concurrent_remote_event() {
    let transport = server(json!([
        {"id": 1, "name": "a", "updatedAt": "t0"},
        {"id": 2, "name": "b", "updatedAt": "t0"}
    ]));
    transport.on(Method::Post, "/user/update/1", Ok(json!({})));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| {
            let key = c.key_at(0).unwrap();
            c.get_mut(key).unwrap().set("updatedAt", "t1");
        })
        .unwrap();
    transport.emit(
        "user",
        ChangeMessage::updated(json!(2), json!({"name": "B", "updatedAt": "t2"})),
    );
    binding.settled().await.unwrap();

    let posts = transport.requests_with(Method::Post);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].path, "/user/update/1");
}

// ============================================================================
// Local removals
// ============================================================================

#[tokio::test]
async fn removal_looks_up_then_deletes() {
    let transport = server(json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]));
    on_lookup(&transport, json!({"id": 1, "name": "a"}));
    transport.on(Method::Delete, "/user/destroy/1", Ok(json!({"id": 1})));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope
        .apply("users", |c| c.retain(|r| r.numeric_id() != Some(1)))
        .unwrap();
    binding.settled().await.unwrap();

    let requests = transport.requests();
    assert_eq!(
        requests[1..],
        [
            Request::get("/user", json!({"id": 1})),
            Request::delete("/user/destroy/1"),
        ]
    );
    let outbox = binding.outbox();
    assert_eq!(outbox[0].kind, IntentKind::Destroy);
    assert_eq!(outbox[0].state, IntentState::Confirmed);
}

#[tokio::test]
async fn removal_of_vanished_record_is_skipped() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    on_lookup(&transport, json!({"error": "not found"}));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope.apply("users", |c| c.retain(|_| false)).unwrap();
    binding.settled().await.unwrap();

    assert!(transport.requests_with(Method::Delete).is_empty());
    assert_eq!(binding.outbox()[0].state, IntentState::Skipped);
}

#[tokio::test]
async fn removal_when_lookup_is_not_found_is_skipped() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    transport.when(
        |req| req.params.get("id").is_some(),
        Err(Error::NotFound("/user".into())),
    );
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope.apply("users", |c| c.retain(|_| false)).unwrap();
    binding.settled().await.unwrap();

    assert!(transport.requests_with(Method::Delete).is_empty());
    assert_eq!(binding.outbox()[0].state, IntentState::Skipped);
}

#[tokio::test]
async fn removal_without_lookup() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    transport.on(Method::Delete, "/user/destroy/1", Ok(json!({"id": 1})));
    let scope = Scope::new();
    let binding = bind_with(
        &transport,
        &scope,
        SyncConfig::new().with_confirm_before_destroy(false),
    )
    .await;

    scope.apply("users", |c| c.retain(|_| false)).unwrap();
    binding.settled().await.unwrap();

    assert_eq!(writes(&transport), vec![Request::delete("/user/destroy/1")]);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn removing_an_unsaved_item_sends_nothing() {
    let transport = server(json!([{"name": "never saved", "id": null}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope.apply("users", |c| c.retain(|_| false)).unwrap();
    binding.settled().await.unwrap();

    assert_eq!(transport.requests().len(), 1);
    assert!(binding.outbox().is_empty());
}

#[tokio::test]
async fn failed_delete_is_recorded() {
    let transport = server(json!([{"id": 1, "name": "a"}]));
    on_lookup(&transport, json!({"id": 1}));
    transport.on(
        Method::Delete,
        "/user/destroy/1",
        Err(Error::Transport("timeout".into())),
    );
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;

    scope.apply("users", |c| c.retain(|_| false)).unwrap();
    binding.settled().await.unwrap();

    assert_eq!(binding.failed().len(), 1);
    assert_eq!(binding.failed()[0].kind, IntentKind::Destroy);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn unbind_stops_propagation() {
    let transport = server(json!([{"id": 1, "name": "a", "updatedAt": "t0"}]));
    let scope = Scope::new();
    let binding = bind(&transport, &scope).await;
    binding.settled().await.unwrap();

    binding.unbind();
    tokio::time::sleep(Duration::from_millis(20)).await;

    scope
        .apply("users", |c| {
            let key = c.key_at(0).unwrap();
            c.get_mut(key).unwrap().set("updatedAt", "t1");
        })
        .unwrap();
    transport.emit("user", ChangeMessage::destroyed(json!(1)));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(transport.requests().len(), 1);
    assert_eq!(scope.len("users"), Some(1));
    assert_eq!(transport.subscriber_count("user"), 0);
}

#[tokio::test]
async fn independent_bindings_share_a_transport() {
    let transport = server(json!([{"id": 1}]));
    transport.on(Method::Get, "/todo", Ok(json!([{"id": 10}, {"id": 11}])));
    let scope = Scope::new();
    let sync = Synchronizer::new(transport.clone(), SyncConfig::default());

    let users = sync.bind("user", &scope, None).await.unwrap();
    let todos = sync.bind("todo", &scope, None).await.unwrap();

    transport.emit("todo", ChangeMessage::destroyed(json!(10)));
    todos.settled().await.unwrap();
    users.settled().await.unwrap();

    assert_eq!(scope.len("users"), Some(1));
    assert_eq!(scope.records("todos").unwrap(), vec![rec(json!({"id": 11}))]);
}
