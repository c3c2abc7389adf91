//! Integration tests for the roster service and the sync client.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::auth::SESSION_HEADER;
use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::feed::ChangeFeedHub;
use crate::models::{ChangeKind, ClientRecord, CurrentUser, Watermark};
use crate::search::ClientSearchIndex;
use crate::sync::{ClientDirectory, HttpDirectory, RosterState, RosterSync, SyncError};
use crate::{create_router, AppState};

const TEST_PSK: &str = "test-api-key";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    feed: Arc<ChangeFeedHub>,
    _temp_dir: TempDir,
}

async fn test_state(psk: Option<String>, feed_capacity: usize) -> (AppState, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let index_path = temp_dir.path().join("index");

    // Initialize database
    let pool = init_database(&db_path).await.expect("Failed to init DB");
    let repo = Arc::new(Repository::new(pool));

    // Initialize search index
    let search = Arc::new(ClientSearchIndex::open(&index_path).expect("Failed to init search"));

    let config = Config {
        api_psk: psk,
        db_path,
        index_path,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        feed_capacity,
    };

    let state = AppState {
        repo,
        search,
        feed: Arc::new(ChangeFeedHub::new(config.feed_capacity)),
        config: Arc::new(config),
    };
    (state, temp_dir)
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some(TEST_PSK.to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        Self::build(psk, 64).await
    }

    async fn with_feed_capacity(feed_capacity: usize) -> Self {
        Self::build(Some(TEST_PSK.to_string()), feed_capacity).await
    }

    async fn build(psk: Option<String>, feed_capacity: usize) -> Self {
        let (state, temp_dir) = test_state(psk.clone(), feed_capacity).await;
        let feed = state.feed.clone();
        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            feed,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register a coach and return its session token.
    async fn register_coach(&self, display_name: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/coaches"))
            .json(&json!({ "displayName": display_name }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["sessionToken"].as_str().unwrap().to_string()
    }

    async fn create_client(&self, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/clients"))
            .header(SESSION_HEADER, token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn create_named(&self, token: &str, name: &str) -> String {
        let resp = self.create_client(token, json!({ "name": name })).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["client"]["id"].as_str().unwrap().to_string()
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(SESSION_HEADER, token)
            .send()
            .await
            .unwrap()
    }

    fn directory(&self, token: &str) -> HttpDirectory {
        HttpDirectory::new(self.base_url.clone(), Some(TEST_PSK), token).unwrap()
    }
}

async fn wait_for(
    rx: &mut tokio::sync::watch::Receiver<RosterState>,
    condition: impl FnMut(&RosterState) -> bool,
) -> RosterState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(condition))
        .await
        .expect("timed out waiting for roster state")
        .expect("roster state sender dropped")
        .clone()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_health_check_skips_auth() {
    let (state, _temp_dir) = test_state(Some("secret-key".to_string()), 64).await;
    let app = create_router(state);

    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    // Request without API key
    let resp = Client::new()
        .post(fixture.url("/api/coaches"))
        .json(&json!({ "displayName": "Dana" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::new().await;

    // Request with wrong API key
    let resp = Client::new()
        .post(fixture.url("/api/coaches"))
        .header("x-api-key", "wrong-key")
        .json(&json!({ "displayName": "Dana" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_bearer_psk_is_accepted() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .post(fixture.url("/api/coaches"))
        .bearer_auth(TEST_PSK)
        .json(&json!({ "displayName": "Dana" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_no_psk_configured_allows_requests() {
    let fixture = TestFixture::with_psk(None).await;
    let token = fixture.register_coach("Dana").await;

    let resp = fixture.get(&token, "/api/clients").await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_coach_session_required() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/clients"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture.get("not-a-session", "/api/clients").await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(body["error"]["message"], "Unknown coach session");
}

#[tokio::test]
async fn test_register_coach_and_resolve_identity() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/coaches"))
        .json(&json!({ "displayName": "Dana" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let cookie = resp
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = resp.json().await.unwrap();
    let token = body["sessionToken"].as_str().unwrap();
    let uid = body["coach"]["uid"].as_str().unwrap();
    assert_eq!(body["coach"]["displayName"], "Dana");
    assert!(cookie.starts_with(&format!("roster_session={};", token)));

    // Session header
    let me: Value = fixture.get(token, "/api/auth/me").await.json().await.unwrap();
    assert_eq!(me["uid"], uid);

    // Session cookie
    let resp = fixture
        .client
        .get(fixture.url("/api/auth/me"))
        .header("cookie", format!("roster_session={}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_register_coach_requires_name() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/coaches"))
        .json(&json!({ "displayName": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_client_crud() {
    let fixture = TestFixture::new().await;
    let token = fixture.register_coach("Dana").await;

    // Create
    let resp = fixture
        .create_client(
            &token,
            json!({
                "name": "Ann Lee",
                "email": "ann@example.com",
                "goal": "Run a half marathon",
                "program": "Endurance Base"
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let client = &body["client"];
    let id = client["id"].as_str().unwrap().to_string();
    assert_eq!(client["name"], "Ann Lee");
    assert_eq!(client["initials"], "AL");
    assert_eq!(client["status"], "active");
    assert_eq!(client["version"], 1);
    assert!(client.get("coachId").is_none());

    // Get
    let resp = fixture.get(&token, &format!("/api/clients/{}", id)).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["client"]["email"], "ann@example.com");

    // Update
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/clients/{}", id)))
        .header(SESSION_HEADER, &token)
        .json(&json!({
            "status": "on_hold",
            "completion": 80,
            "lastWorkout": { "name": "Tempo Run", "date": "2025-06-01", "completion": 100 },
            "expectedVersion": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["client"]["status"], "on_hold");
    assert_eq!(body["client"]["completion"], 80);
    assert_eq!(body["client"]["lastWorkout"]["name"], "Tempo Run");
    assert_eq!(body["client"]["version"], 2);

    // Delete
    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/clients/{}", id)))
        .header(SESSION_HEADER, &token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture.get(&token, &format!("/api/clients/{}", id)).await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_list_clients_newest_first_with_watermark() {
    let fixture = TestFixture::new().await;
    let token = fixture.register_coach("Dana").await;

    let first = fixture.create_named(&token, "Ann").await;
    let second = fixture.create_named(&token, "Bo").await;

    let before = Utc::now();
    let resp = fixture.get(&token, "/api/clients").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["totalClients"], 2);
    assert_eq!(body["clients"][0]["id"], second);
    assert_eq!(body["clients"][1]["id"], first);
    assert!(body["cursor"].as_i64().unwrap() >= 2);

    let fetched_at: DateTime<Utc> = body["fetchedAt"].as_str().unwrap().parse().unwrap();
    assert!(fetched_at >= before - chrono::Duration::seconds(1));
}

#[tokio::test]
async fn test_clients_are_scoped_to_coach() {
    let fixture = TestFixture::new().await;
    let dana = fixture.register_coach("Dana").await;
    let eli = fixture.register_coach("Eli").await;

    let id = fixture.create_named(&dana, "Ann").await;

    let body: Value = fixture.get(&eli, "/api/clients").await.json().await.unwrap();
    assert_eq!(body["totalClients"], 0);

    let resp = fixture.get(&eli, &format!("/api/clients/{}", id)).await;
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/clients/{}", id)))
        .header(SESSION_HEADER, &eli)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = fixture.get(&dana, "/api/clients").await.json().await.unwrap();
    assert_eq!(body["totalClients"], 1);
}

#[tokio::test]
async fn test_client_validation_errors() {
    let fixture = TestFixture::new().await;
    let token = fixture.register_coach("Dana").await;

    let resp = fixture.create_client(&token, json!({ "name": "  " })).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let resp = fixture
        .create_client(&token, json!({ "name": "channel?VER=8&database=projects/x" }))
        .await;
    assert_eq!(resp.status(), 400);

    let id = fixture.create_named(&token, "Ann").await;
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/clients/{}", id)))
        .header(SESSION_HEADER, &token)
        .json(&json!({ "completion": 150 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_version_conflict() {
    let fixture = TestFixture::new().await;
    let token = fixture.register_coach("Dana").await;
    let id = fixture.create_named(&token, "Ann").await;

    // Update with wrong version
    let resp = fixture
        .client
        .put(fixture.url(&format!("/api/clients/{}", id)))
        .header(SESSION_HEADER, &token)
        .json(&json!({ "goal": "Strength", "expectedVersion": 99 }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
    assert_eq!(body["error"]["details"]["currentVersion"], 1);
}

#[tokio::test]
async fn test_search_clients() {
    let fixture = TestFixture::new().await;
    let dana = fixture.register_coach("Dana").await;
    let eli = fixture.register_coach("Eli").await;

    let resp = fixture
        .create_client(&dana, json!({ "name": "Ann", "goal": "Marathon training" }))
        .await;
    assert_eq!(resp.status(), 200);
    fixture.create_named(&dana, "Bo").await;
    let resp = fixture
        .create_client(&eli, json!({ "name": "Cy", "goal": "Marathon finish" }))
        .await;
    assert_eq!(resp.status(), 200);

    let resp = fixture.get(&dana, "/api/clients/search?q=marathon").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["results"][0]["client"]["name"], "Ann");
    assert_eq!(body["limit"], 20);

    let body: Value = fixture
        .get(&dana, "/api/clients/search?q=marathon&limit=500")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["limit"], 100);
}

#[tokio::test]
async fn test_search_window_edges() {
    let fixture = TestFixture::new().await;
    let token = fixture.register_coach("Dana").await;
    fixture.create_named(&token, "Ann").await;

    // A zero limit is raised to one result
    let resp = fixture.get(&token, "/api/clients/search?q=ann&limit=0").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["limit"], 1);
    assert_eq!(body["total"], 1);

    // An offset past the search window yields an empty page
    let resp = fixture
        .get(
            &token,
            &format!("/api/clients/search?q=ann&limit=100&offset={}", usize::MAX),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["total"], 0);
    assert_eq!(body["offset"], crate::search::MAX_SEARCH_WINDOW);
}

#[tokio::test]
async fn test_feed_delivers_new_clients_only() {
    let fixture = TestFixture::new().await;
    let token = fixture.register_coach("Dana").await;
    let directory = fixture.directory(&token);

    fixture.create_named(&token, "Ann").await;
    let coach = directory.current_user().await.unwrap();
    let since = Utc::now();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut feed = directory.subscribe(&coach, Watermark::Since(since)).await.unwrap();

    // Nothing newer than the watermark yet
    let initial = feed.next().await.unwrap().unwrap();
    assert!(initial.changes.is_empty());

    let id = fixture.create_named(&token, "Bo").await;
    let snapshot = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.changes.len(), 1);
    assert_eq!(snapshot.changes[0].kind, ChangeKind::Added);
    assert_eq!(snapshot.changes[0].client.id, id);
    assert_eq!(snapshot.changes[0].client.name, "Bo");
}

#[tokio::test]
async fn test_feed_is_scoped_to_coach() {
    let fixture = TestFixture::new().await;
    let dana = fixture.register_coach("Dana").await;
    let eli = fixture.register_coach("Eli").await;
    let directory = fixture.directory(&dana);

    let coach = directory.current_user().await.unwrap();
    let mut feed = directory
        .subscribe(&coach, Watermark::After(0))
        .await
        .unwrap();
    assert!(feed.next().await.unwrap().unwrap().changes.is_empty());

    fixture.create_named(&eli, "Not yours").await;
    let id = fixture.create_named(&dana, "Ann").await;

    let snapshot = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.changes[0].client.id, id);
}

#[tokio::test]
async fn test_http_directory_reports_status_errors() {
    let fixture = TestFixture::new().await;
    let directory = fixture.directory("not-a-session");

    let err = directory.current_user().await.unwrap_err();
    assert!(matches!(err, SyncError::Status { status: 401, .. }));

    let coach = CurrentUser {
        uid: "nobody".to_string(),
    };
    let err = directory.list_clients(&coach).await.unwrap_err();
    assert!(matches!(err, SyncError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_roster_sync_end_to_end() {
    let fixture = TestFixture::new().await;
    let token = fixture.register_coach("Dana").await;
    let ann = fixture.create_named(&token, "Ann").await;

    let sync = RosterSync::new(Arc::new(fixture.directory(&token)), Duration::from_secs(60));
    let mut rx = sync.subscribe();

    assert_eq!(sync.load().await.unwrap(), 1);
    assert!(sync.watermark().await.is_some());
    let listener = sync.start_listener();

    // Let the listener open its subscription before writing
    tokio::time::sleep(Duration::from_millis(100)).await;
    let bo = fixture.create_named(&token, "Bo").await;

    let state = wait_for(&mut rx, |s| s.clients.len() == 2).await;
    let ids: Vec<&str> = state.clients.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![bo.as_str(), ann.as_str()]);
    assert_eq!(state.error, None);
    assert!(!state.loading);

    // Deleting through the sync client drops the row locally too
    sync.delete_client(&ann).await.unwrap();
    assert_eq!(sync.state().clients.len(), 1);

    listener.close();
}

#[tokio::test]
async fn test_overlapping_feed_snapshot_is_deduplicated() {
    let fixture = TestFixture::new().await;
    let token = fixture.register_coach("Dana").await;
    fixture.create_named(&token, "Ann").await;
    fixture.create_named(&token, "Bo").await;

    let directory = fixture.directory(&token);
    let sync = RosterSync::new(Arc::new(directory.clone()), Duration::from_secs(60));
    sync.load().await.unwrap();
    let loaded = sync.state().clients;

    // A feed opened from the first sequence redelivers every loaded client
    let coach = directory.current_user().await.unwrap();
    let mut feed = directory
        .subscribe(&coach, Watermark::After(0))
        .await
        .unwrap();
    let snapshot = feed.next().await.unwrap().unwrap();
    assert_eq!(snapshot.changes.len(), 2);

    let outcome = sync.apply_snapshot(&snapshot);
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.duplicates, 2);
    assert_eq!(sync.state().clients, loaded);
}

#[tokio::test]
async fn test_roster_sync_load_failure() {
    let fixture = TestFixture::new().await;
    let sync = RosterSync::new(
        Arc::new(fixture.directory("not-a-session")),
        Duration::from_secs(60),
    );

    assert!(sync.load().await.is_err());
    let state = sync.state();
    assert!(state.clients.is_empty());
    assert!(!state.loading);
    assert!(state.error.unwrap().contains("401"));
}

#[tokio::test]
async fn test_lagging_feed_surfaces_as_roster_error() {
    let fixture = TestFixture::with_feed_capacity(1).await;
    let token = fixture.register_coach("Dana").await;
    fixture.create_named(&token, "Ann").await;

    let sync = RosterSync::new(Arc::new(fixture.directory(&token)), Duration::from_secs(60));
    let mut rx = sync.subscribe();
    sync.load().await.unwrap();
    let listener = sync.start_listener();

    tokio::time::timeout(Duration::from_secs(5), async {
        while fixture.feed.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener never subscribed");

    // Publish past capacity without yielding so the SSE subscriber falls behind
    for i in 0..5 {
        let client = ClientRecord::new(format!("burst-{}", i), "Burst", Utc::now());
        fixture.feed.publish(ChangeKind::Added, &client);
    }

    let state = wait_for(&mut rx, |s| s.error.is_some()).await;
    let error = state.error.unwrap();
    let expected = SyncError::Feed("feed lagged behind by 4 changes".to_string()).to_string();
    assert_eq!(error, expected);
    assert_eq!(state.clients.len(), 1);
    assert!(!state.loading);

    listener.close();
}
