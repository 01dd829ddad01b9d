use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Form, Json, Router};
use core_platform_client::models::{Module, TaskBadges};
use core_platform_client::session::TOKEN_KEY;
use core_platform_client::{
    ApiClient, ClientConfig, ClientError, MemoryStorage, ModuleStore, MoveDirection, SessionStore,
    Storage,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const TOKEN: &str = "stub-token";

#[derive(Default)]
struct Stub {
    authorizations: Mutex<Vec<String>>,
    fail_order: AtomicBool,
}

impl Stub {
    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let accepted = value == format!("Bearer {TOKEN}");
        self.authorizations.lock().unwrap().push(value);
        if accepted {
            Ok(())
        } else {
            Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "UNAUTHORIZED", "message": "Authentication required"})),
            )
                .into_response())
        }
    }
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct OrderUpdate {
    ordered_ids: Vec<String>,
}

fn module(id: &str, order: i32) -> Module {
    Module {
        id: id.to_string(),
        name: id.to_string(),
        title: id.to_string(),
        path: format!("/{id}"),
        order,
        is_primary: order == 0,
        has_access: true,
        permissions: Default::default(),
    }
}

async fn login(Form(credentials): Form<Credentials>) -> Response {
    if credentials.password == "secret" {
        Json(json!({"access_token": TOKEN, "token_type": "bearer"})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "INVALID_CREDENTIALS", "message": format!("Wrong password for {}", credentials.username)})),
        )
            .into_response()
    }
}

async fn me(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> Response {
    match stub.authorize(&headers) {
        Ok(()) => Json(json!({"id": 3, "username": "lena"})).into_response(),
        Err(rejection) => rejection,
    }
}

async fn modules(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> Response {
    match stub.authorize(&headers) {
        Ok(()) => Json(vec![module("help", 0), module("tasks", 1), module("admin", 2)]).into_response(),
        Err(rejection) => rejection,
    }
}

async fn module_order(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Json(update): Json<OrderUpdate>,
) -> Response {
    if let Err(rejection) = stub.authorize(&headers) {
        return rejection;
    }
    if stub.fail_order.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "INTERNAL_ERROR", "message": "Internal server error"})),
        )
            .into_response();
    }
    let reordered: Vec<Module> = update
        .ordered_ids
        .iter()
        .enumerate()
        .map(|(order, id)| module(id, order as i32))
        .collect();
    Json(reordered).into_response()
}

async fn badges(State(stub): State<Arc<Stub>>, headers: HeaderMap) -> Response {
    match stub.authorize(&headers) {
        Ok(()) => Json(json!({"pending_verify_count": 2, "fresh_completed_flag": true})).into_response(),
        Err(rejection) => rejection,
    }
}

async fn task(Path(task_id): Path<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": format!("Task {task_id} not found")})),
    )
        .into_response()
}

async fn calendar() -> Response {
    (StatusCode::BAD_REQUEST, "from must not be after to").into_response()
}

async fn spawn_stub() -> anyhow::Result<(String, Arc<Stub>)> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
    let stub = Arc::new(Stub::default());
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/modules", get(modules))
        .route("/modules/order", patch(module_order))
        .route("/tasks/badges", get(badges))
        .route("/tasks/calendar", get(calendar))
        .route("/tasks/{task_id}", get(task))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{address}"), stub))
}

fn client(base_url: &str, storage: &MemoryStorage) -> anyhow::Result<ApiClient> {
    let session = SessionStore::load(storage.clone())?;
    Ok(ApiClient::new(&ClientConfig::new(base_url), session))
}

#[tokio::test]
async fn can_login_and_send_bearer_token_until_logout() -> anyhow::Result<()> {
    let (base_url, stub) = spawn_stub().await?;
    let storage = MemoryStorage::new();
    let api = client(&base_url, &storage)?;

    let user = api.login("lena", "secret").await?;
    assert_eq!(user.username, "lena");
    assert_eq!(storage.get(TOKEN_KEY)?.as_deref(), Some(TOKEN));
    assert_eq!(
        api.session().read().await.user().map(|user| user.id),
        Some(3)
    );

    let badges = api.badges().await?;
    assert_eq!(
        badges,
        TaskBadges {
            pending_verify_count: 2,
            fresh_completed_flag: true,
        }
    );
    assert!(stub
        .authorizations
        .lock()
        .unwrap()
        .iter()
        .all(|value| value == "Bearer stub-token"));

    api.logout().await?;
    assert!(!api.session().read().await.is_authenticated());
    assert_eq!(storage.get(TOKEN_KEY)?, None);
    assert!(matches!(api.badges().await, Err(ClientError::Unauthorized)));
    assert_eq!(stub.authorizations.lock().unwrap().last().map(String::as_str), Some(""));
    Ok(())
}

#[tokio::test]
async fn can_clear_session_when_token_is_rejected() -> anyhow::Result<()> {
    let (base_url, _) = spawn_stub().await?;
    let storage = MemoryStorage::new();
    storage.set(TOKEN_KEY, "expired-token")?;
    let api = client(&base_url, &storage)?;
    assert!(api.session().read().await.is_authenticated());

    let result = api.badges().await;

    assert!(matches!(result, Err(ClientError::Unauthorized)));
    let session = api.session();
    let session = session.read().await;
    assert!(!session.is_authenticated());
    assert_eq!(session.redirect_to(), Some("/login"));
    assert_eq!(storage.get(TOKEN_KEY)?, None);
    Ok(())
}

#[tokio::test]
async fn can_restore_persisted_session() -> anyhow::Result<()> {
    let (base_url, _) = spawn_stub().await?;
    let storage = MemoryStorage::new();
    storage.set(TOKEN_KEY, TOKEN)?;
    let api = client(&base_url, &storage)?;

    let user = api.restore().await?;

    assert_eq!(user.map(|user| user.username), Some("lena".to_string()));
    Ok(())
}

#[tokio::test]
async fn can_report_bad_credentials_without_redirect() -> anyhow::Result<()> {
    let (base_url, _) = spawn_stub().await?;
    let storage = MemoryStorage::new();
    let api = client(&base_url, &storage)?;

    let result = api.login("lena", "guess").await;

    match result {
        Err(ClientError::Http { status, message }) => {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(message, "Wrong password for lena");
        }
        other => panic!("unexpected login result: {other:?}"),
    }
    assert_eq!(api.session().read().await.redirect_to(), None);
    Ok(())
}

#[tokio::test]
async fn can_surface_server_error_messages() -> anyhow::Result<()> {
    let (base_url, _) = spawn_stub().await?;
    let storage = MemoryStorage::new();
    storage.set(TOKEN_KEY, TOKEN)?;
    let api = client(&base_url, &storage)?;

    let missing = api.task("t-404").await;
    assert!(matches!(
        missing,
        Err(ClientError::Http { status: StatusCode::NOT_FOUND, ref message }) if message == "Task t-404 not found"
    ));

    let today = chrono::Local::now().date_naive();
    let backwards = api.calendar(today, today).await;
    assert!(matches!(
        backwards,
        Err(ClientError::Http { status: StatusCode::BAD_REQUEST, ref message }) if message == "from must not be after to"
    ));
    Ok(())
}

#[tokio::test]
async fn can_reorder_modules_optimistically() -> anyhow::Result<()> {
    let (base_url, stub) = spawn_stub().await?;
    let storage = MemoryStorage::new();
    storage.set(TOKEN_KEY, TOKEN)?;
    let api = client(&base_url, &storage)?;
    let mut store = ModuleStore::new();
    store.reload(&api).await?;

    assert!(store.reorder(&api, "admin", MoveDirection::Up).await?);
    let committed: Vec<&str> = store.modules().iter().map(|module| module.id.as_str()).collect();
    assert_eq!(committed, vec!["help", "admin", "tasks"]);
    assert_eq!(store.modules()[1].order, 1);

    stub.fail_order.store(true, Ordering::SeqCst);
    let result = store.reorder(&api, "admin", MoveDirection::Up).await;
    assert!(matches!(result, Err(ClientError::Http { .. })));
    let reverted: Vec<&str> = store.modules().iter().map(|module| module.id.as_str()).collect();
    assert_eq!(reverted, vec!["help", "admin", "tasks"]);
    assert_eq!(store.error(), Some("Internal server error"));
    assert_eq!(store.pending(), None);

    assert!(!store.reorder(&api, "help", MoveDirection::Up).await?);
    Ok(())
}
