use crate::blob::{BlobError, BlobStore};
use crate::entities::todo::{Priority, Status};
use crate::entities::*;
use chrono::{DateTime, Utc};
use sea_orm::*;

pub mod api;
pub mod page;
pub mod validation;
pub mod web;

pub use page::{DEFAULT_PAGE_SIZE, ListQuery, TodoPage};
pub use validation::{CoverUpload, CreateTodoInput, UpdateTodoInput, ValidationErrors};

/// A task owned by exactly one user.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Todo {
    id: i32,
    owner_id: String,
    title: String,
    description: String,
    cover: Option<String>,
    status: Status,
    priority: Option<Priority>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the blob key of the cover image, if one was uploaded.
    pub fn cover(&self) -> Option<&str> {
        self.cover.as_deref()
    }

    /// Returns the path the cover image is served from.
    pub fn cover_url(&self) -> Option<String> {
        self.cover.as_ref().map(|key| format!("/storage/{}", key))
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[cfg(test)]
    pub(crate) fn sample(id: i32, owner_id: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            description: String::new(),
            cover: None,
            status: Status::Pending,
            priority: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<todo::Model> for Todo {
    fn from(model: todo::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            title: model.title,
            description: model.description,
            cover: model.cover,
            status: model.status,
            priority: model.priority,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Error type for TodoStore operations.
#[derive(Debug, thiserror::Error)]
pub enum TodoStoreError {
    /// Represents input that broke one or more field rules.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    /// Represents a todo that belongs to another user.
    #[error("Access denied to todo with ID {0}")]
    AccessDenied(i32),
    /// Represents a todo ID that does not exist.
    #[error("Todo with ID {0} not found")]
    NotFound(i32),
    /// Represents an operation attempted without an owner.
    #[error("An owner ID is required")]
    MissingOwner,
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// Represents a failure of the cover image storage.
    #[error("Blob storage error: {0}")]
    Blob(#[from] BlobError),
}

impl TodoStoreError {
    /// True for failures of the database or the blob storage.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, TodoStoreError::Database(_) | TodoStoreError::Blob(_))
    }
}

/// Per-owner persistence of todos and their cover images.
///
/// Every operation takes the caller's owner ID explicitly and never returns or
/// mutates a todo owned by someone else.
pub struct TodoStore<'a> {
    db: &'a sea_orm::DatabaseConnection,
    blobs: &'a dyn BlobStore,
    page_size: u64,
}

impl<'a> TodoStore<'a> {
    pub fn new(db: &'a sea_orm::DatabaseConnection, blobs: &'a dyn BlobStore) -> TodoStore<'a> {
        TodoStore {
            db,
            blobs,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the number of todos per page. Values below 1 are raised to 1.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Lists one page of the owner's todos, newest first.
    ///
    /// # Arguments
    ///
    /// * `owner_id` - The ID of the user whose todos are listed.
    /// * `search` - Optional substring the title must contain. Blank means no filter.
    /// * `page` - The 1-based page number. 0 is treated as 1.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `TodoPage` if successful. Pages past the end are
    /// empty but still report the total.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        owner_id: &str,
        search: Option<&str>,
        page: u64,
    ) -> Result<TodoPage, TodoStoreError> {
        let page = page.max(1);
        let search = search.map(str::trim).filter(|term| !term.is_empty());

        let mut query = todo::Entity::find().filter(todo::Column::OwnerId.eq(owner_id));
        if let Some(term) = search {
            query = query.filter(todo::Column::Title.contains(term));
        }

        let paginator = query
            .order_by_desc(todo::Column::CreatedAt)
            .order_by_desc(todo::Column::Id)
            .paginate(self.db, self.page_size);
        let ItemsAndPagesNumber {
            number_of_items, ..
        } = paginator.num_items_and_pages().await?;
        // Pages whose offset lies past the last row, or past u64, are empty.
        let offset = (page - 1).checked_mul(self.page_size);
        let todos = match offset {
            Some(offset) if offset < number_of_items => paginator
                .fetch_page(page - 1)
                .await?
                .into_iter()
                .map(Todo::from)
                .collect(),
            _ => Vec::new(),
        };

        Ok(TodoPage::new(
            todos,
            number_of_items,
            page,
            self.page_size,
            search.map(str::to_string),
        ))
    }

    /// Retrieves one todo of the owner.
    ///
    /// # Returns
    ///
    /// The `Todo`, `TodoStoreError::NotFound` if the ID does not exist, or
    /// `TodoStoreError::AccessDenied` if it belongs to another user.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, owner_id: &str, id: i32) -> Result<Todo, TodoStoreError> {
        let model = self.find_owned(owner_id, id).await?;
        Ok(Todo::from(model))
    }

    /// Creates a todo for the owner.
    ///
    /// The cover image, when present, is stored before the record is inserted. If
    /// the insert fails the stored image is removed again.
    #[tracing::instrument(skip(self, input))]
    pub async fn create(
        &self,
        owner_id: &str,
        input: CreateTodoInput,
    ) -> Result<Todo, TodoStoreError> {
        if owner_id.is_empty() {
            return Err(TodoStoreError::MissingOwner);
        }
        let new_todo = input.validate()?;

        let cover_key = match &new_todo.cover {
            Some(cover) => Some(self.blobs.put(cover.bytes(), cover.extension()).await?),
            None => None,
        };

        let now = Utc::now();
        let active_model = todo::ActiveModel {
            owner_id: ActiveValue::Set(owner_id.to_string()),
            title: ActiveValue::Set(new_todo.title),
            description: ActiveValue::Set(new_todo.description),
            cover: ActiveValue::Set(cover_key.clone()),
            status: ActiveValue::Set(new_todo.status),
            priority: ActiveValue::Set(new_todo.priority),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };

        match active_model.insert(self.db).await {
            Ok(created_model) => {
                tracing::info!("Created todo {} for owner {}", created_model.id, owner_id);
                Ok(Todo::from(created_model))
            }
            Err(err) => {
                if let Some(key) = cover_key {
                    self.discard_blob(&key).await;
                }
                Err(TodoStoreError::Database(err))
            }
        }
    }

    /// Replaces the title, description, status and priority of an owned todo.
    ///
    /// A new cover upload replaces the old image: the new one is stored first,
    /// the record is switched to it, then the old image is removed. Without an
    /// upload the cover stays as it is.
    #[tracing::instrument(skip(self, input))]
    pub async fn update(
        &self,
        owner_id: &str,
        id: i32,
        input: UpdateTodoInput,
    ) -> Result<Todo, TodoStoreError> {
        let existing = self.find_owned(owner_id, id).await?;
        let changes = input.validate()?;

        let new_cover_key = match &changes.cover {
            Some(cover) => Some(self.blobs.put(cover.bytes(), cover.extension()).await?),
            None => None,
        };
        let old_cover_key = existing.cover.clone();

        let mut active_model: todo::ActiveModel = existing.into();
        active_model.title = ActiveValue::Set(changes.title);
        active_model.description = ActiveValue::Set(changes.description);
        active_model.status = ActiveValue::Set(changes.status);
        active_model.priority = ActiveValue::Set(changes.priority);
        active_model.updated_at = ActiveValue::Set(Utc::now());
        if let Some(key) = &new_cover_key {
            active_model.cover = ActiveValue::Set(Some(key.clone()));
        }

        match active_model.update(self.db).await {
            Ok(updated_model) => {
                if let (Some(_), Some(old_key)) = (&new_cover_key, old_cover_key) {
                    self.discard_blob(&old_key).await;
                }
                Ok(Todo::from(updated_model))
            }
            Err(err) => {
                if let Some(key) = new_cover_key {
                    self.discard_blob(&key).await;
                }
                match err {
                    // The row was deleted after the ownership check.
                    DbErr::RecordNotUpdated => Err(TodoStoreError::NotFound(id)),
                    err => Err(TodoStoreError::Database(err)),
                }
            }
        }
    }

    /// Deletes an owned todo together with its cover image.
    ///
    /// Removing the image is best effort: a failure is logged and the record is
    /// deleted anyway.
    ///
    /// # Returns
    ///
    /// A `Result` containing the deleted `Todo` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, owner_id: &str, id: i32) -> Result<Todo, TodoStoreError> {
        let existing = self.find_owned(owner_id, id).await?;

        if let Some(key) = &existing.cover {
            self.discard_blob(key).await;
        }

        let result = todo::Entity::delete_by_id(id).exec(self.db).await?;
        if result.rows_affected == 0 {
            return Err(TodoStoreError::NotFound(id));
        }
        tracing::info!("Deleted todo {} of owner {}", id, owner_id);
        Ok(Todo::from(existing))
    }

    /// Retrieves every todo of the owner, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn all_for_owner(&self, owner_id: &str) -> Result<Vec<Todo>, TodoStoreError> {
        let todos = todo::Entity::find()
            .filter(todo::Column::OwnerId.eq(owner_id))
            .order_by_desc(todo::Column::CreatedAt)
            .order_by_desc(todo::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Todo::from)
            .collect();
        Ok(todos)
    }

    /// Retrieves the owner's most recently changed todos.
    #[tracing::instrument(skip(self))]
    pub async fn recent_activity(
        &self,
        owner_id: &str,
        limit: u64,
    ) -> Result<Vec<Todo>, TodoStoreError> {
        let todos = todo::Entity::find()
            .filter(todo::Column::OwnerId.eq(owner_id))
            .order_by_desc(todo::Column::UpdatedAt)
            .order_by_desc(todo::Column::Id)
            .limit(limit)
            .all(self.db)
            .await?
            .into_iter()
            .map(Todo::from)
            .collect();
        Ok(todos)
    }

    async fn find_owned(&self, owner_id: &str, id: i32) -> Result<todo::Model, TodoStoreError> {
        let model = todo::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TodoStoreError::NotFound(id))?;
        if model.owner_id != owner_id {
            tracing::warn!("Owner {} was denied access to todo {}", owner_id, id);
            return Err(TodoStoreError::AccessDenied(id));
        }
        Ok(model)
    }

    async fn discard_blob(&self, key: &str) {
        if let Err(err) = self.blobs.delete(key).await {
            tracing::warn!("Failed to remove blob {}: {}", key, err);
        }
    }
}
