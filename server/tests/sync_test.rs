//! Push/pull protocol tests against the in-memory store.
//!
//! Each test drives the full router with `oneshot`, so routing, extraction,
//! error mapping and the processors are all exercised together.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use stow_server::config::Config;
use stow_server::mutators::{default_registry, MutatorError, MutatorFuture, MutatorRegistry};
use stow_server::store::Store;
use stow_server::transaction::WriteTransaction;
use stow_server::websocket::ServerMessage;
use stow_server::{build_router, AppState};
use tokio::sync::mpsc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        Self::with_state(AppState::new(
            Store::memory(),
            config,
            default_registry().unwrap(),
        ))
    }

    fn with_registry(registry: MutatorRegistry) -> Self {
        Self::with_state(AppState::new(Store::memory(), Config::default(), registry))
    }

    fn with_state(state: AppState) -> Self {
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        principal: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(principal) = principal {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", principal));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&body).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn create_space(&self, space_id: &str) {
        let (status, _) = self
            .request(
                Method::POST,
                "/spaces",
                Some("alice"),
                Some(json!({"spaceID": space_id})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn push_as(&self, principal: &str, space_id: &str, body: Value) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            &format!("/spaces/{}/push", space_id),
            Some(principal),
            Some(body),
        )
        .await
    }

    async fn push(&self, space_id: &str, body: Value) -> (StatusCode, Value) {
        self.push_as("alice", space_id, body).await
    }

    async fn pull_as(&self, principal: &str, space_id: &str, body: Value) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            &format!("/spaces/{}/pull", space_id),
            Some(principal),
            Some(body),
        )
        .await
    }

    async fn pull(&self, space_id: &str, group: &str, cookie: Value) -> Value {
        let (status, body) = self
            .pull_as("alice", space_id, json!({"clientGroupID": group, "cookie": cookie}))
            .await;
        assert_eq!(status, StatusCode::OK, "pull failed: {}", body);
        body
    }

    async fn version(&self, space_id: &str) -> i64 {
        let (status, body) = self
            .request(Method::GET, &format!("/spaces/{}", space_id), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["version"].as_i64().unwrap()
    }
}

fn push_body(group: &str, mutations: &[(&str, i64, &str, Value)]) -> Value {
    let mutations: Vec<Value> = mutations
        .iter()
        .map(|(client, id, name, args)| {
            json!({"clientID": client, "id": id, "name": name, "args": args})
        })
        .collect();
    json!({"clientGroupID": group, "mutations": mutations})
}

fn create(id: &str) -> Value {
    json!({"id": id, "text": format!("todo {}", id), "completed": false})
}

// ============================================================================
// Spaces
// ============================================================================

#[tokio::test]
async fn space_lifecycle() {
    let app = TestApp::new();

    let (status, body) = app.request(Method::POST, "/spaces", None, None).await;
    assert_eq!(status, StatusCode::CREATED);
    let generated = body["spaceID"].as_str().unwrap().to_string();
    assert_eq!(app.version(&generated).await, 0);

    app.create_space("s1").await;
    let (status, _) = app
        .request(Method::POST, "/spaces", None, Some(json!({"spaceID": "s1"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app.request(Method::GET, "/spaces/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_space_is_not_found() {
    let app = TestApp::new();

    let (status, _) = app
        .push("nowhere", push_body("g", &[("c1", 1, "createTodo", create("1"))]))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .pull_as("alice", "nowhere", json!({"clientGroupID": "g", "cookie": null}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Push
// ============================================================================

#[tokio::test]
async fn push_applies_batch_in_one_version() {
    let app = TestApp::new();
    app.create_space("s").await;

    let (status, body) = app
        .push(
            "s",
            push_body(
                "g",
                &[
                    ("c1", 1, "createTodo", create("a")),
                    ("c1", 2, "createTodo", create("b")),
                ],
            ),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    assert_eq!(app.version("s").await, 1);

    let pull = app.pull("s", "g", Value::Null).await;
    assert_eq!(pull["cookie"], json!(1));
    assert_eq!(pull["lastMutationIDChanges"], json!({"c1": 2}));
    assert_eq!(pull["patch"].as_array().unwrap().len(), 2);
    assert_eq!(pull["patch"][1]["value"]["sort"], json!(2.0));
}

#[tokio::test]
async fn replayed_push_changes_nothing() {
    let app = TestApp::new();
    app.create_space("s").await;
    let body = push_body(
        "g",
        &[
            ("c1", 1, "createTodo", create("a")),
            ("c1", 2, "createTodo", create("b")),
        ],
    );

    app.push("s", body.clone()).await;
    let (status, response) = app.push("s", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({}));
    assert_eq!(app.version("s").await, 1);

    let pull = app.pull("s", "g", json!(1)).await;
    assert_eq!(pull["lastMutationIDChanges"], json!({}));
    assert_eq!(pull["patch"], json!([]));
}

#[tokio::test]
async fn each_applying_push_bumps_version_once() {
    let app = TestApp::new();
    app.create_space("s").await;

    for id in 1..=3 {
        app.push(
            "s",
            push_body("g", &[("c1", id, "createTodo", create(&id.to_string()))]),
        )
        .await;
    }
    assert_eq!(app.version("s").await, 3);

    // An empty push applies nothing.
    let (status, _) = app.push("s", push_body("g", &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.version("s").await, 3);
}

#[tokio::test]
async fn future_mutation_commits_applied_prefix() {
    let app = TestApp::new();
    app.create_space("s").await;

    let (status, body) = app
        .push(
            "s",
            push_body(
                "g",
                &[
                    ("c1", 1, "createTodo", create("a")),
                    ("c1", 2, "createTodo", create("b")),
                    ("c1", 4, "createTodo", create("d")),
                    ("c1", 5, "createTodo", create("e")),
                ],
            ),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"error": "ClientStateNotFound"}));

    let pull = app.pull("s", "g", Value::Null).await;
    assert_eq!(pull["lastMutationIDChanges"], json!({"c1": 2}));
    let keys: Vec<_> = pull["patch"]
        .as_array()
        .unwrap()
        .iter()
        .map(|op| op["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["todo/a", "todo/b"]);
}

#[tokio::test]
async fn unknown_client_must_start_at_one() {
    let app = TestApp::new();
    app.create_space("s").await;

    let (status, body) = app
        .push("s", push_body("g", &[("c1", 3, "createTodo", create("a"))]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"error": "ClientStateNotFound"}));
    assert_eq!(app.version("s").await, 0);

    let pull = app.pull("s", "g", Value::Null).await;
    assert_eq!(pull["lastMutationIDChanges"], json!({}));
}

#[tokio::test]
async fn failed_mutator_is_applied_as_noop() {
    let app = TestApp::new();
    app.create_space("s").await;

    let (status, body) = app
        .push(
            "s",
            push_body(
                "g",
                &[
                    ("c1", 1, "updateTodo", json!({"id": "missing", "text": "x"})),
                    ("c1", 2, "createTodo", json!({"text": "no id"})),
                    ("c1", 3, "createTodo", create("a")),
                ],
            ),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let pull = app.pull("s", "g", Value::Null).await;
    assert_eq!(pull["lastMutationIDChanges"], json!({"c1": 3}));
    assert_eq!(pull["patch"].as_array().unwrap().len(), 1);
    assert_eq!(pull["patch"][0]["key"], json!("todo/a"));
}

fn put_key(tx: &mut dyn WriteTransaction, key: String) -> MutatorFuture<'_> {
    Box::pin(async move {
        tx.put(&key, json!("kept"));
        Ok(())
    })
}

fn put_then_fail(tx: &mut dyn WriteTransaction, key: String) -> MutatorFuture<'_> {
    Box::pin(async move {
        tx.put(&key, json!("partial"));
        tx.put("shared", json!("clobbered"));
        Err(MutatorError::Failed(format!("refusing {}", key)))
    })
}

#[tokio::test]
async fn failed_mutator_writes_are_discarded() {
    let registry = MutatorRegistry::builder()
        .register("putKey", put_key)
        .register("putThenFail", put_then_fail)
        .build()
        .unwrap();
    let app = TestApp::with_registry(registry);
    app.create_space("s").await;

    let (status, body) = app
        .push(
            "s",
            push_body(
                "g",
                &[
                    ("c1", 1, "putKey", json!("shared")),
                    ("c1", 2, "putThenFail", json!("k")),
                    ("c1", 3, "putKey", json!("after")),
                ],
            ),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    assert_eq!(app.version("s").await, 1);

    let pull = app.pull("s", "g", Value::Null).await;
    assert_eq!(pull["lastMutationIDChanges"], json!({"c1": 3}));
    let patch = pull["patch"].as_array().unwrap();
    let keys: Vec<_> = patch.iter().map(|op| op["key"].as_str().unwrap()).collect();
    assert_eq!(keys, vec!["after", "shared"]);
    assert!(patch.iter().all(|op| op["value"] == json!("kept")));

    // A push holding only a failing mutation still advances the cursor and version.
    let (status, _) = app
        .push("s", push_body("g", &[("c1", 4, "putThenFail", json!("k"))]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.version("s").await, 2);

    let pull = app.pull("s", "g", json!(1)).await;
    assert_eq!(pull["lastMutationIDChanges"], json!({"c1": 4}));
    assert_eq!(pull["patch"], json!([]));
}

#[tokio::test]
async fn clients_are_tracked_independently() {
    let app = TestApp::new();
    app.create_space("s").await;

    app.push(
        "s",
        push_body(
            "g",
            &[
                ("c1", 1, "createTodo", create("a")),
                ("c2", 1, "createTodo", create("b")),
                ("c1", 2, "deleteTodo", json!("a")),
            ],
        ),
    )
    .await;

    let pull = app.pull("s", "g", Value::Null).await;
    assert_eq!(pull["lastMutationIDChanges"], json!({"c1": 2, "c2": 1}));
    assert_eq!(
        pull["patch"],
        json!([
            {"op": "put", "key": "todo/b", "value": {"id": "b", "text": "todo b", "completed": false, "sort": 2.0}}
        ])
    );
}

#[tokio::test]
async fn invalid_pushes_are_rejected_before_running() {
    let app = TestApp::new();
    app.create_space("s").await;

    let (status, _) = app
        .push(
            "s",
            push_body(
                "g",
                &[
                    ("c1", 1, "createTodo", create("a")),
                    ("c1", 2, "dropTables", json!({})),
                ],
            ),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .push("s", push_body("", &[("c1", 1, "createTodo", create("a"))]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .push("s", push_body("g", &[("c1", 0, "createTodo", create("a"))]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.push("s", json!({"mutations": "nope"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .push(
            "s",
            json!({
                "clientGroupID": "g",
                "mutations": [{"clientID": "c1", "id": 1.5, "name": "createTodo", "args": {}}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.version("s").await, 0);
}

// ============================================================================
// Pull
// ============================================================================

#[tokio::test]
async fn full_pull_reports_puts_and_tombstones() {
    let app = TestApp::new();
    app.create_space("s").await;

    app.push(
        "s",
        push_body(
            "g",
            &[
                ("c1", 1, "putTodo", json!({"id": "x", "text": "x", "completed": false, "sort": 5.0})),
                ("c1", 2, "putTodo", json!({"id": "y", "text": "y", "completed": false, "sort": 6.0})),
            ],
        ),
    )
    .await;
    app.push("s", push_body("g", &[("c1", 3, "deleteTodo", json!("y"))]))
        .await;

    let pull = app.pull("s", "g", Value::Null).await;
    assert_eq!(pull["cookie"], json!(2));
    assert_eq!(
        pull["patch"],
        json!([
            {"op": "put", "key": "todo/x", "value": {"id": "x", "text": "x", "completed": false, "sort": 5.0}},
            {"op": "del", "key": "todo/y"}
        ])
    );
}

#[tokio::test]
async fn incremental_pull_includes_only_newer_changes() {
    let app = TestApp::new();
    app.create_space("s").await;

    app.push("s", push_body("g", &[("c1", 1, "createTodo", create("a"))]))
        .await;
    app.push("s", push_body("g", &[("c1", 2, "createTodo", create("b"))]))
        .await;

    let pull = app.pull("s", "g", json!(1)).await;
    assert_eq!(pull["cookie"], json!(2));
    assert_eq!(pull["lastMutationIDChanges"], json!({"c1": 2}));
    assert_eq!(pull["patch"].as_array().unwrap().len(), 1);
    assert_eq!(pull["patch"][0]["key"], json!("todo/b"));

    let pull = app.pull("s", "g", json!(2)).await;
    assert_eq!(pull["patch"], json!([]));
}

#[tokio::test]
async fn cookie_ahead_of_server_resets_client() {
    let app = TestApp::new();
    app.create_space("s").await;
    app.push("s", push_body("g", &[("c1", 1, "createTodo", create("a"))]))
        .await;

    let pull = app.pull("s", "g", json!(99)).await;
    assert_eq!(pull["cookie"], json!(1));
    assert_eq!(pull["patch"][0], json!({"op": "clear"}));
    assert_eq!(pull["patch"][1]["key"], json!("todo/a"));
    assert_eq!(pull["lastMutationIDChanges"], json!({"c1": 1}));
}

#[tokio::test]
async fn pull_for_unknown_group_is_empty() {
    let app = TestApp::new();
    app.create_space("s").await;

    let pull = app.pull("s", "fresh", Value::Null).await;
    assert_eq!(pull["cookie"], json!(0));
    assert_eq!(pull["lastMutationIDChanges"], json!({}));
}

#[tokio::test]
async fn negative_cookie_is_rejected() {
    let app = TestApp::new();
    app.create_space("s").await;

    let (status, _) = app
        .pull_as("alice", "s", json!({"clientGroupID": "g", "cookie": -1}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn groups_belong_to_their_creator() {
    let app = TestApp::new();
    app.create_space("s").await;
    app.push("s", push_body("g", &[("c1", 1, "createTodo", create("a"))]))
        .await;

    let (status, _) = app
        .push_as("bob", "s", push_body("g", &[("c9", 1, "createTodo", create("b"))]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .pull_as("bob", "s", json!({"clientGroupID": "g", "cookie": null}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn client_cannot_move_to_another_group() {
    let app = TestApp::new();
    app.create_space("s").await;
    app.push("s", push_body("g1", &[("c1", 1, "createTodo", create("a"))]))
        .await;

    let (status, _) = app
        .push("s", push_body("g2", &[("c1", 2, "createTodo", create("b"))]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.version("s").await, 1);
}

#[tokio::test]
async fn group_is_bound_to_its_space() {
    let app = TestApp::new();
    app.create_space("s1").await;
    app.create_space("s2").await;
    app.push("s1", push_body("g", &[("c1", 1, "createTodo", create("a"))]))
        .await;

    let (status, _) = app
        .push("s2", push_body("g", &[("c1", 2, "createTodo", create("b"))]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_token_required_when_secret_is_set() {
    let app = TestApp::with_config(Config {
        auth_secret: Some("secret".to_string()),
        ..Config::default()
    });
    app.create_space("s").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/spaces/s/pull",
            None,
            Some(json!({"clientGroupID": "g", "cookie": null})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .pull_as("alice", "s", json!({"clientGroupID": "g", "cookie": null}))
        .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Pokes and concurrency
// ============================================================================

#[tokio::test]
async fn only_applying_pushes_poke() {
    let app = TestApp::new();
    app.create_space("s").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    app.state.notifier.subscribe("s", tx);

    let body = push_body("g", &[("c1", 1, "createTodo", create("a"))]);
    app.push("s", body.clone()).await;
    assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Poke));

    app.push("s", body).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pushes_all_commit() {
    let app = std::sync::Arc::new(TestApp::new());
    app.create_space("s").await;

    let mut handles = Vec::new();
    for n in 0..8 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let client = format!("c{}", n);
            app.push(
                "s",
                push_body("g", &[(client.as_str(), 1, "createTodo", create(&client))]),
            )
            .await
        }));
    }
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK, "push failed: {}", body);
    }

    assert_eq!(app.version("s").await, 8);

    let pull = app.pull("s", "g", Value::Null).await;
    assert_eq!(pull["lastMutationIDChanges"].as_object().unwrap().len(), 8);

    let mut sorts: Vec<f64> = pull["patch"]
        .as_array()
        .unwrap()
        .iter()
        .map(|op| op["value"]["sort"].as_f64().unwrap())
        .collect();
    sorts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(sorts, (1..=8).map(f64::from).collect::<Vec<_>>());
}
