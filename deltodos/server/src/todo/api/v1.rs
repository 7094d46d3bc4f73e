use crate::auth::CurrentUser;
use crate::auth::api::v1::ErrorResponse;
use crate::entities::todo::{Priority, Status};
use crate::stats::TodoStats;
use crate::todo::web::TodoState;
use crate::todo::{ListQuery, Todo, TodoPage, TodoStoreError};
use axum::{
    Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// JSON representation of a Todo for API responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodoJson {
    /// Unique identifier of the todo
    pub id: i32,
    pub title: String,
    pub description: String,
    /// Path the cover image is served from, if the todo has one
    pub cover_url: Option<String>,
    pub status: Status,
    pub priority: Option<Priority>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Todo> for TodoJson {
    fn from(todo: Todo) -> Self {
        Self {
            id: todo.id(),
            title: todo.title().to_string(),
            description: todo.description().to_string(),
            cover_url: todo.cover_url(),
            status: todo.status(),
            priority: todo.priority(),
            created_at: todo.created_at(),
            updated_at: todo.updated_at(),
        }
    }
}

/// API response for one page of todos.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodoPageJson {
    pub todos: Vec<TodoJson>,
    /// Number of matching todos across all pages
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub last_page: u64,
    /// Search filter the page was produced with
    pub search: Option<String>,
    /// Query string of the previous page, if there is one
    pub prev_page_query: Option<String>,
    /// Query string of the next page, if there is one
    pub next_page_query: Option<String>,
}

impl From<TodoPage> for TodoPageJson {
    fn from(page: TodoPage) -> Self {
        let prev_page_query = page.previous_query();
        let next_page_query = page.next_query();
        let total = page.total();
        let current = page.page();
        let per_page = page.page_size();
        let last_page = page.last_page();
        let search = page.search().map(str::to_string);
        Self {
            todos: page.into_todos().into_iter().map(TodoJson::from).collect(),
            total,
            page: current,
            per_page,
            last_page,
            search,
            prev_page_query,
            next_page_query,
        }
    }
}

/// Query parameters for listing todos.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TodosQuery {
    /// Only todos whose title contains this text
    #[serde(default)]
    search: Option<String>,
    /// 1-based page number, defaults to 1
    #[serde(default)]
    page: Option<String>,
}

impl From<TodosQuery> for ListQuery {
    fn from(query: TodosQuery) -> Self {
        ListQuery {
            search: query.search,
            page: query.page,
        }
    }
}

/// Error type of the todo API handlers.
#[derive(Debug)]
pub struct ApiError(TodoStoreError);

impl From<TodoStoreError> for ApiError {
    fn from(err: TodoStoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            TodoStoreError::AccessDenied(_) => (
                StatusCode::FORBIDDEN,
                ErrorResponse::new("ACCESS_DENIED", "Access denied."),
            ),
            TodoStoreError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("NOT_FOUND", "The requested todo does not exist."),
            ),
            TodoStoreError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("VALIDATION_ERROR", &errors.to_string()),
            ),
            TodoStoreError::MissingOwner => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new(
                    "UNAUTHORIZED",
                    "Authentication required to access this resource",
                ),
            ),
            TodoStoreError::Database(_) | TodoStoreError::Blob(_) => {
                tracing::error!("Todo API request failed: {}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("STORAGE_FAILURE", "Failed to process the todo request"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Handler for GET /api/v1/todos - Returns one page of the caller's todos.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos",
    params(TodosQuery),
    responses(
        (status = 200, description = "Successfully retrieved todos", body = TodoPageJson),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Todos"
)]
pub async fn list_todos_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<TodosQuery>,
) -> Result<Json<TodoPageJson>, ApiError> {
    let query = ListQuery::from(query);
    let page = state
        .store()
        .list(&user.id, query.search(), query.page_number())
        .await?;
    Ok(Json(TodoPageJson::from(page)))
}

/// Handler for GET /api/v1/todos/{id} - Returns one of the caller's todos.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos/{id}",
    params(("id" = i32, Path, description = "ID of the todo")),
    responses(
        (status = 200, description = "Successfully retrieved the todo", body = TodoJson),
        (status = 403, description = "The todo belongs to another user", body = ErrorResponse),
        (status = 404, description = "The todo does not exist", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Todos"
)]
pub async fn get_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<TodoJson>, ApiError> {
    let todo = state.store().get(&user.id, id).await?;
    Ok(Json(TodoJson::from(todo)))
}

/// Handler for DELETE /api/v1/todos/{id} - Deletes one of the caller's todos.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/api/v1/todos/{id}",
    params(("id" = i32, Path, description = "ID of the todo")),
    responses(
        (status = 204, description = "The todo and its cover were deleted"),
        (status = 403, description = "The todo belongs to another user", body = ErrorResponse),
        (status = 404, description = "The todo does not exist", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Todos"
)]
pub async fn delete_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    state.store().delete(&user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/stats - Returns statistics over all of the caller's todos.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    responses(
        (status = 200, description = "Statistics of the caller's todos", body = TodoStats),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Todos"
)]
pub async fn stats_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<TodoStats>, ApiError> {
    let todos = state.store().all_for_owner(&user.id).await?;
    Ok(Json(TodoStats::from_todos(&todos)))
}

/// Creates and returns the todos API router.
pub fn create_api_router(state: Arc<TodoState>) -> Router {
    Router::new()
        .route("/todos", get(list_todos_handler))
        .route(
            "/todos/{id}",
            get(get_todo_handler).delete(delete_todo_handler),
        )
        .route("/stats", get(stats_handler))
        .with_state(state)
}
