use askama::Template;
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Extension, Multipart, Path, Query, State, multipart::MultipartError,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::blob::BlobStore;
use crate::todo::validation::COVER_MAX_BYTES;
use crate::todo::{
    CoverUpload, CreateTodoInput, DEFAULT_PAGE_SIZE, ListQuery, Todo, TodoPage, TodoStore,
    TodoStoreError, UpdateTodoInput, ValidationErrors,
};

/// Largest request body accepted by the todo forms: a full-size cover plus the text fields.
pub const UPLOAD_BODY_LIMIT: usize = COVER_MAX_BYTES + 1024 * 1024;

/// Cookie carrying a one-shot notice across a redirect.
pub const FLASH_COOKIE: &str = "flash";

#[derive(Clone)]
pub struct TodoState {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub blobs: Arc<dyn BlobStore>,
    pub page_size: u64,
}

impl TodoState {
    pub fn new(db: Arc<sea_orm::DatabaseConnection>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db,
            blobs,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Returns a TodoStore over this state's connection and blob storage.
    pub fn store(&self) -> TodoStore<'_> {
        TodoStore::new(&self.db, self.blobs.as_ref()).with_page_size(self.page_size)
    }
}

/// Custom error type for todo page handlers.
#[derive(Debug, thiserror::Error)]
pub enum TodoWebError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a failed TodoStore operation.
    #[error("Todo store error: {0}")]
    Store(#[from] TodoStoreError),
    /// Represents a form submission that could not be read.
    #[error("Malformed form submission: {0}")]
    Multipart(#[from] MultipartError),
}

impl IntoResponse for TodoWebError {
    fn into_response(self) -> Response {
        let (status_code, user_facing_error_message) = match &self {
            TodoWebError::Store(TodoStoreError::AccessDenied(_)) => {
                (StatusCode::FORBIDDEN, "Access denied.")
            }
            TodoWebError::Store(TodoStoreError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "The requested todo does not exist.")
            }
            TodoWebError::Store(TodoStoreError::Validation(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "The submitted todo is invalid.",
            ),
            TodoWebError::Store(TodoStoreError::MissingOwner) => (
                StatusCode::UNAUTHORIZED,
                "You need to be logged in to manage todos.",
            ),
            TodoWebError::Multipart(err) => {
                (err.status(), "The submitted form could not be read.")
            }
            _ => {
                tracing::error!("Todo request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred while processing your request. Please try again later.",
                )
            }
        };

        let error_template = ErrorTemplate {
            status: status_code.as_u16(),
            message: user_facing_error_message,
        };
        let Ok(rendered) = error_template.render() else {
            return status_code.into_response();
        };
        (status_code, Html(rendered)).into_response()
    }
}

/// Notices shown once on the todo list after a successful change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    Created,
    Updated,
    Deleted,
}

impl Flash {
    fn code(self) -> &'static str {
        match self {
            Flash::Created => "created",
            Flash::Updated => "updated",
            Flash::Deleted => "deleted",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "created" => Some(Flash::Created),
            "updated" => Some(Flash::Updated),
            "deleted" => Some(Flash::Deleted),
            _ => None,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Flash::Created => "Todo added successfully!",
            Flash::Updated => "Todo updated successfully!",
            Flash::Deleted => "Todo deleted successfully!",
        }
    }

    fn cookie(self) -> Cookie<'static> {
        Cookie::build((FLASH_COOKIE, self.code()))
            .path("/")
            .http_only(true)
            .max_age(time::Duration::minutes(5))
            .build()
    }
}

/// Redirects to the todo list, leaving a notice for the next page view.
fn redirect_with_flash(jar: CookieJar, flash: Flash) -> Response {
    (jar.add(flash.cookie()), Redirect::to("/todos")).into_response()
}

/// Fields of the create and edit forms as submitted.
#[derive(Debug, Default)]
struct TodoForm {
    title: String,
    description: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    cover: Option<CoverUpload>,
}

impl TodoForm {
    /// Reads the multipart body of a todo form. An empty file input means no new cover.
    async fn read(mut multipart: Multipart) -> Result<Self, TodoWebError> {
        let mut form = TodoForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.title = field.text().await?,
                "description" => form.description = Some(field.text().await?),
                "status" => form.status = Some(field.text().await?),
                "priority" => form.priority = Some(field.text().await?),
                "cover" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        form.cover = Some(CoverUpload::new(file_name, bytes.to_vec()));
                    }
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn values(&self) -> FormValues {
        FormValues {
            title: self.title.clone(),
            description: self.description.clone().unwrap_or_default(),
            status: self.status.clone().unwrap_or_default(),
            priority: self.priority.clone().unwrap_or_default(),
        }
    }

    fn into_create_input(self) -> CreateTodoInput {
        CreateTodoInput {
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            cover: self.cover,
        }
    }

    fn into_update_input(self) -> UpdateTodoInput {
        UpdateTodoInput {
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            cover: self.cover,
        }
    }
}

/// Values shown in the form inputs.
#[derive(Debug, Clone, Default)]
struct FormValues {
    title: String,
    description: String,
    status: String,
    priority: String,
}

impl From<&Todo> for FormValues {
    fn from(todo: &Todo) -> Self {
        Self {
            title: todo.title().to_string(),
            description: todo.description().to_string(),
            status: todo.status().as_str().to_string(),
            priority: todo
                .priority()
                .map(|priority| priority.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "todos/index.html")]
struct TodosIndexTemplate {
    title: &'static str,
    user: CurrentUser,
    page: TodoPage,
    search: String,
    flash: Option<&'static str>,
}

#[derive(Template)]
#[template(path = "todos/show.html")]
struct TodoShowTemplate {
    title: &'static str,
    user: CurrentUser,
    todo: Todo,
}

#[derive(Template)]
#[template(path = "todos/create.html")]
struct TodoCreateTemplate {
    title: &'static str,
    user: CurrentUser,
    form: FormValues,
    errors: ValidationErrors,
}

#[derive(Template)]
#[template(path = "todos/edit.html")]
struct TodoEditTemplate {
    title: &'static str,
    user: CurrentUser,
    todo: Todo,
    form: FormValues,
    errors: ValidationErrors,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    status: u16,
    message: &'static str,
}

/// Handler for GET /todos that lists the current user's todos page by page.
#[tracing::instrument(skip(state, jar))]
async fn todos_index_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), TodoWebError> {
    let page = state
        .store()
        .list(&user.id, query.search(), query.page_number())
        .await?;

    let flash = jar
        .get(FLASH_COOKIE)
        .and_then(|cookie| Flash::from_code(cookie.value()))
        .map(Flash::message);
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/"));

    let template = TodosIndexTemplate {
        title: "Todos",
        search: page.search().unwrap_or_default().to_string(),
        user,
        page,
        flash,
    };
    let html = template.render().map_err(TodoWebError::from)?;
    Ok((jar, Html(html)))
}

/// Handler for GET /todos/create that serves an empty create form.
#[tracing::instrument]
async fn create_form_handler(
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, TodoWebError> {
    let template = TodoCreateTemplate {
        title: "Add Todo",
        user,
        form: FormValues {
            status: "pending".to_string(),
            ..Default::default()
        },
        errors: ValidationErrors::new(),
    };
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Handler for POST /todos that creates a todo from the multipart form.
#[tracing::instrument(skip(state, jar, multipart))]
async fn create_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<Response, TodoWebError> {
    let form = TodoForm::read(multipart).await?;
    let values = form.values();

    match state.store().create(&user.id, form.into_create_input()).await {
        Ok(_) => Ok(redirect_with_flash(jar, Flash::Created)),
        Err(TodoStoreError::Validation(errors)) => {
            let template = TodoCreateTemplate {
                title: "Add Todo",
                user,
                form: values,
                errors,
            };
            let html = template.render().map_err(TodoWebError::from)?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response())
        }
        Err(err) => Err(TodoWebError::Store(err)),
    }
}

/// Handler for GET /todos/{id} that shows one todo.
#[tracing::instrument(skip(state))]
async fn show_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TodoWebError> {
    let todo = state.store().get(&user.id, id).await?;
    let template = TodoShowTemplate {
        title: "Todo Detail",
        user,
        todo,
    };
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Handler for GET /todos/{id}/edit that serves the edit form filled with the todo.
#[tracing::instrument(skip(state))]
async fn edit_form_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TodoWebError> {
    let todo = state.store().get(&user.id, id).await?;
    let template = TodoEditTemplate {
        title: "Edit Todo",
        user,
        form: FormValues::from(&todo),
        todo,
        errors: ValidationErrors::new(),
    };
    template.render().map(Html).map_err(TodoWebError::from)
}

/// Handler for PUT or POST /todos/{id} that applies the edit form.
#[tracing::instrument(skip(state, jar, multipart))]
async fn update_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<Response, TodoWebError> {
    let form = TodoForm::read(multipart).await?;
    let values = form.values();
    let store = state.store();

    match store.update(&user.id, id, form.into_update_input()).await {
        Ok(_) => Ok(redirect_with_flash(jar, Flash::Updated)),
        Err(TodoStoreError::Validation(errors)) => {
            let todo = store.get(&user.id, id).await?;
            let template = TodoEditTemplate {
                title: "Edit Todo",
                user,
                todo,
                form: values,
                errors,
            };
            let html = template.render().map_err(TodoWebError::from)?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response())
        }
        Err(err) => Err(TodoWebError::Store(err)),
    }
}

/// Handler for DELETE /todos/{id} and POST /todos/{id}/delete.
#[tracing::instrument(skip(state, jar))]
async fn delete_todo_handler(
    State(state): State<Arc<TodoState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    jar: CookieJar,
) -> Result<Response, TodoWebError> {
    state.store().delete(&user.id, id).await?;
    Ok(redirect_with_flash(jar, Flash::Deleted))
}

/// Creates and returns the todo router with all todo page routes.
pub fn create_todo_router(state: Arc<TodoState>) -> Router {
    Router::new()
        .route("/todos", get(todos_index_handler).post(create_todo_handler))
        .route("/todos/create", get(create_form_handler))
        .route(
            "/todos/{id}",
            get(show_todo_handler)
                .put(update_todo_handler)
                .post(update_todo_handler)
                .delete(delete_todo_handler),
        )
        .route("/todos/{id}/edit", get(edit_form_handler))
        .route("/todos/{id}/delete", post(delete_todo_handler))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .with_state(state)
}
