use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use chrono::Utc;
use deltodos_server::blob::{BlobStore, LocalBlobStore};
use deltodos_server::entities::todo::Status;
use deltodos_server::todo::TodoStore;
use deltodos_server::todo::web::TodoState;
use deltodos_server::web::create_app;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

mod common;

use common::{MemoryBlobStore, MultipartBody, auth_cookie, insert_todo, png_bytes};

/// Test context for page endpoint tests.
pub struct TestContext {
    pub db: DatabaseConnection,
    pub blobs: Arc<MemoryBlobStore>,
    pub app: Router,
    #[allow(dead_code)] // kept so the storage directory outlives the app
    pub storage: TempDir,
}

impl TestContext {
    fn store(&self) -> TodoStore<'_> {
        TodoStore::new(&self.db, self.blobs.as_ref())
    }
}

async fn setup() -> anyhow::Result<TestContext> {
    let db = common::setup_sqlite().await?;
    let storage = tempfile::tempdir()?;
    let blobs = Arc::new(MemoryBlobStore::default());
    let app = create_app(
        common::auth_state(),
        common::todo_state(db.clone(), blobs.clone()),
        storage.path(),
    );
    Ok(TestContext {
        db,
        blobs,
        app,
        storage,
    })
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn submit(method: Method, uri: &str, cookie: &str, form: MultipartBody) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, MultipartBody::content_type())
        .body(Body::from(form.finish()))
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn anonymous_visitors_are_sent_to_login() {
    let ctx = setup().await.expect("Failed to setup test context");

    for uri in ["/", "/todos", "/todos/create", "/stats", "/profile"] {
        let response = ctx.app.clone().oneshot(get(uri, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&response), common::LOGIN_URL);
    }
}

#[tokio::test]
async fn health_check_needs_no_login() {
    let ctx = setup().await.expect("Failed to setup test context");

    let response = ctx.app.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn index_lists_only_own_todos() {
    let ctx = setup().await.expect("Failed to setup test context");
    insert_todo(&ctx.db, "alice", "Buy milk", Utc::now()).await;
    insert_todo(&ctx.db, "bob", "Fix bike", Utc::now()).await;

    let response = ctx
        .app
        .oneshot(get("/todos", Some(&auth_cookie("alice", "Alice"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Buy milk"));
    assert!(!body.contains("Fix bike"));
    assert!(body.contains("Alice"));
}

#[tokio::test]
async fn index_filters_by_search_and_tolerates_bad_page() {
    let ctx = setup().await.expect("Failed to setup test context");
    insert_todo(&ctx.db, "alice", "Buy milk", Utc::now()).await;
    insert_todo(&ctx.db, "alice", "Walk dog", Utc::now()).await;

    let response = ctx
        .app
        .oneshot(get(
            "/todos?search=milk&page=abc",
            Some(&auth_cookie("alice", "Alice")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Buy milk"));
    assert!(!body.contains("Walk dog"));
    assert!(body.contains("Page 1 of 1"));
}

#[tokio::test]
async fn can_create_todo_and_see_notice() {
    let ctx = setup().await.expect("Failed to setup test context");
    let cookie = auth_cookie("alice", "Alice");
    let form = MultipartBody::new()
        .text("title", "Buy milk")
        .text("description", "Oat, two litres")
        .text("priority", "high")
        .file("cover", "cover.png", "image/png", &png_bytes());

    let response = ctx
        .app
        .clone()
        .oneshot(submit(Method::POST, "/todos", &cookie, form))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/todos");
    assert!(
        set_cookies(&response)
            .iter()
            .any(|cookie| cookie.starts_with("flash=created"))
    );

    let page = ctx.store().list("alice", None, 1).await.unwrap();
    assert_eq!(page.total(), 1);
    let todo = &page.todos()[0];
    assert_eq!(todo.title(), "Buy milk");
    assert_eq!(todo.status(), Status::Pending);
    assert!(ctx.blobs.contains(todo.cover().unwrap()));

    let response = ctx
        .app
        .oneshot(get("/todos", Some(&format!("{}; flash=created", cookie))))
        .await
        .unwrap();
    let body = body_text(response).await;
    assert!(body.contains("Todo added successfully!"));
}

#[tokio::test]
async fn invalid_create_rerenders_form_with_errors() {
    let ctx = setup().await.expect("Failed to setup test context");
    let form = MultipartBody::new()
        .text("title", "")
        .text("description", "kept text")
        .text("priority", "urgent")
        .file("cover", "notes.txt", "text/plain", b"not an image");

    let response = ctx
        .app
        .oneshot(submit(
            Method::POST,
            "/todos",
            &auth_cookie("alice", "Alice"),
            form,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_text(response).await;
    assert!(body.contains("The title field is required."));
    assert!(body.contains("The selected priority is invalid."));
    assert!(body.contains("The cover field must be an image."));
    assert!(body.contains("kept text"));
    assert!(ctx.blobs.is_empty());
}

#[tokio::test]
async fn foreign_todo_is_forbidden_and_missing_todo_is_not_found() {
    let ctx = setup().await.expect("Failed to setup test context");
    let todo = insert_todo(&ctx.db, "bob", "Bob's secret", Utc::now()).await;
    let cookie = auth_cookie("alice", "Alice");

    for uri in [format!("/todos/{}", todo.id), format!("/todos/{}/edit", todo.id)] {
        let response = ctx
            .app
            .clone()
            .oneshot(get(&uri, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_text(response).await;
        assert!(body.contains("Access denied."));
        assert!(!body.contains("secret"));
    }

    let response = ctx
        .app
        .oneshot(get("/todos/9999", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn can_show_and_edit_own_todo() {
    let ctx = setup().await.expect("Failed to setup test context");
    let todo = insert_todo(&ctx.db, "alice", "Water plants", Utc::now()).await;
    let cookie = auth_cookie("alice", "Alice");

    let response = ctx
        .app
        .clone()
        .oneshot(get(&format!("/todos/{}", todo.id), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Water plants"));

    let response = ctx
        .app
        .oneshot(get(&format!("/todos/{}/edit", todo.id), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(&format!("action=\"/todos/{}\"", todo.id)));
    assert!(body.contains("value=\"Water plants\""));
}

#[tokio::test]
async fn can_update_todo_with_put_or_post() {
    let ctx = setup().await.expect("Failed to setup test context");
    let todo = insert_todo(&ctx.db, "alice", "Water plants", Utc::now()).await;
    let cookie = auth_cookie("alice", "Alice");

    for (method, status) in [(Method::PUT, "in_progress"), (Method::POST, "complete")] {
        let form = MultipartBody::new()
            .text("title", "Water the plants")
            .text("status", status)
            .text("priority", "");
        let response = ctx
            .app
            .clone()
            .oneshot(submit(method, &format!("/todos/{}", todo.id), &cookie, form))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(
            set_cookies(&response)
                .iter()
                .any(|cookie| cookie.starts_with("flash=updated"))
        );
    }

    let updated = ctx.store().get("alice", todo.id).await.unwrap();
    assert_eq!(updated.title(), "Water the plants");
    assert_eq!(updated.status(), Status::Complete);
}

#[tokio::test]
async fn update_without_status_is_rejected() {
    let ctx = setup().await.expect("Failed to setup test context");
    let todo = insert_todo(&ctx.db, "alice", "Water plants", Utc::now()).await;
    let form = MultipartBody::new().text("title", "Water plants");

    let response = ctx
        .app
        .oneshot(submit(
            Method::POST,
            &format!("/todos/{}", todo.id),
            &auth_cookie("alice", "Alice"),
            form,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(
        body_text(response)
            .await
            .contains("The status field is required.")
    );
}

#[tokio::test]
async fn cannot_update_foreign_todo() {
    let ctx = setup().await.expect("Failed to setup test context");
    let todo = insert_todo(&ctx.db, "bob", "Fix bike", Utc::now()).await;
    let form = MultipartBody::new()
        .text("title", "Hijacked")
        .text("status", "complete");

    let response = ctx
        .app
        .clone()
        .oneshot(submit(
            Method::POST,
            &format!("/todos/{}", todo.id),
            &auth_cookie("alice", "Alice"),
            form,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let unchanged = ctx.store().get("bob", todo.id).await.unwrap();
    assert_eq!(unchanged.title(), "Fix bike");
}

#[tokio::test]
async fn can_delete_todo_with_form_or_delete_method() {
    let ctx = setup().await.expect("Failed to setup test context");
    let first = insert_todo(&ctx.db, "alice", "First", Utc::now()).await;
    let second = insert_todo(&ctx.db, "alice", "Second", Utc::now()).await;
    let cookie = auth_cookie("alice", "Alice");

    let requests = [
        (Method::POST, format!("/todos/{}/delete", first.id)),
        (Method::DELETE, format!("/todos/{}", second.id)),
    ];
    for (method, uri) in requests {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let response = ctx.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/todos");
    }

    let page = ctx.store().list("alice", None, 1).await.unwrap();
    assert_eq!(page.total(), 0);
}

#[tokio::test]
async fn dashboard_and_profile_render_for_user() {
    let ctx = setup().await.expect("Failed to setup test context");
    insert_todo(&ctx.db, "alice", "Buy milk", Utc::now()).await;
    let cookie = auth_cookie("alice", "ada");

    let response = ctx
        .app
        .clone()
        .oneshot(get("/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Welcome back, ada"));
    assert!(body.contains("Buy milk"));

    let response = ctx
        .app
        .clone()
        .oneshot(get("/stats", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Completion rate"));

    let response = ctx
        .app
        .oneshot(get("/profile", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(">A</span>"));
}

#[tokio::test]
async fn logout_clears_auth_cookie() {
    let ctx = setup().await.expect("Failed to setup test context");

    let response = ctx
        .app
        .oneshot(get("/logout", Some(&auth_cookie("alice", "Alice"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), common::LOGIN_URL);
    assert!(
        set_cookies(&response)
            .iter()
            .any(|cookie| cookie.starts_with("auth_token=;"))
    );
}

#[tokio::test]
async fn unknown_page_is_not_found() {
    let ctx = setup().await.expect("Failed to setup test context");

    let response = ctx.app.oneshot(get("/nowhere", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn serves_uploaded_cover_from_storage() {
    let db = common::setup_sqlite().await.unwrap();
    let storage = tempfile::tempdir().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(storage.path()));
    let state = Arc::new(TodoState::new(Arc::new(db), blobs));
    let app = create_app(common::auth_state(), state, storage.path());
    let cookie = auth_cookie("alice", "Alice");
    let form = MultipartBody::new()
        .text("title", "Paint")
        .file("cover", "cover.png", "image/png", &png_bytes());

    let response = app
        .clone()
        .oneshot(submit(Method::POST, "/todos", &cookie, form))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let covers: Vec<_> = std::fs::read_dir(storage.path().join("covers"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(covers.len(), 1);

    let uri = format!("/storage/covers/{}", covers[0]);
    let response = app.clone().oneshot(get(&uri, Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.to_vec(), png_bytes());

    let response = app.oneshot(get(&uri, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}
