use askama::Template;
use axum::Router;
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::middleware::from_fn_with_state;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use migration::MigratorTrait;
use sea_orm::Database;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthState, auth_user_middleware, login_redirect_middleware, logout_handler, profile_handler,
};
use crate::blob::{BlobStore, LocalBlobStore};
use crate::config::Config;
use crate::stats::create_dashboard_router;
use crate::todo::web::{TodoState, create_todo_router};

pub mod api;

/// Custom error type for web handler operations.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        tracing::error!("Page rendering failed: {}", self);
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

#[derive(Template)]
#[template(path = "error.html")]
struct NotFoundTemplate {
    status: u16,
    message: &'static str,
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    tokio::fs::create_dir_all(&config.storage_dir).await?;
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.storage_dir));
    let auth_state = Arc::new(AuthState::from_config(&config));
    let todo_state =
        Arc::new(TodoState::new(Arc::new(db), blobs).with_page_size(config.page_size));

    let app = create_app(auth_state, todo_state, Path::new(&config.storage_dir));

    axum::serve(listener, app).await?;
    Ok(())
}

/// Assembles every page, API and asset route of the application.
///
/// Pages and stored covers require a session cookie and send anonymous
/// visitors to the login page. The JSON API answers 401 instead.
pub fn create_app(
    auth_state: Arc<AuthState>,
    todo_state: Arc<TodoState>,
    storage_dir: &Path,
) -> Router {
    let protected_routes = Router::new()
        .merge(create_todo_router(todo_state.clone()))
        .merge(create_dashboard_router(todo_state.clone()))
        .route("/profile", get(profile_handler))
        .nest_service("/storage", ServeDir::new(storage_dir))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware))
                .layer(from_fn_with_state(
                    auth_state.clone(),
                    login_redirect_middleware,
                )),
        );

    let public_routes = Router::new()
        .route("/health", get(health_check_handler))
        .merge(
            Router::new()
                .route("/logout", get(logout_handler))
                .with_state(auth_state.clone()),
        );

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .merge(api::create_api_router(auth_state, todo_state))
        .merge(api::create_docs_router())
        .fallback(not_found_handler)
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION, COOKIE]))
                .layer(TraceLayer::new_for_http()),
        )
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

#[tracing::instrument]
async fn not_found_handler() -> Result<Response, WebError> {
    let template = NotFoundTemplate {
        status: StatusCode::NOT_FOUND.as_u16(),
        message: "The page you are looking for does not exist.",
    };
    let html = template.render()?;
    Ok((StatusCode::NOT_FOUND, Html(html)).into_response())
}
