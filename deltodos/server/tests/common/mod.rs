#![allow(dead_code)] // each test binary uses a different part of these helpers

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deltodos_server::auth::{AUTH_COOKIE, AuthState, encode_jwt};
use deltodos_server::blob::{BlobError, BlobStore, new_cover_key};
use deltodos_server::entities::todo::{self, Priority, Status};
use deltodos_server::todo::web::TodoState;
use migration::MigratorTrait;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::{postgres, testcontainers};

pub const JWT_SECRET: &str = "test_secret";
pub const LOGIN_URL: &str = "/auth/login";

pub async fn setup_container() -> anyhow::Result<testcontainers::ContainerAsync<postgres::Postgres>>
{
    let container = postgres::Postgres::default().start().await?;
    Ok(container)
}

pub async fn setup_db(
    container: &testcontainers::ContainerAsync<postgres::Postgres>,
) -> anyhow::Result<DatabaseConnection> {
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let db_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
    let db = Database::connect(&db_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Migrated in-memory SQLite database. A single connection keeps the data alive.
pub async fn setup_sqlite() -> anyhow::Result<DatabaseConnection> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// BlobStore keeping blobs in memory so tests can inspect what was stored.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn keys(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<String, BlobError> {
        let key = new_cover_key(extension);
        self.blobs
            .lock()
            .unwrap()
            .insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Smallest byte sequence recognised as a PNG image.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0; 16]);
    bytes
}

/// Inserts a todo directly, bypassing the store, with a fixed creation time.
pub async fn insert_todo(
    db: &DatabaseConnection,
    owner_id: &str,
    title: &str,
    created_at: DateTime<Utc>,
) -> todo::Model {
    insert_todo_with(db, owner_id, title, Status::Pending, None, created_at).await
}

pub async fn insert_todo_with(
    db: &DatabaseConnection,
    owner_id: &str,
    title: &str,
    status: Status,
    priority: Option<Priority>,
    created_at: DateTime<Utc>,
) -> todo::Model {
    let active_model = todo::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        title: Set(title.to_string()),
        description: Set(String::new()),
        cover: Set(None),
        status: Set(status),
        priority: Set(priority),
        created_at: Set(created_at),
        updated_at: Set(created_at),
        ..Default::default()
    };
    active_model.insert(db).await.unwrap()
}

pub fn auth_state() -> Arc<AuthState> {
    Arc::new(AuthState {
        jwt_secret: JWT_SECRET.to_string(),
        login_url: LOGIN_URL.to_string(),
    })
}

pub fn todo_state(db: DatabaseConnection, blobs: Arc<MemoryBlobStore>) -> Arc<TodoState> {
    Arc::new(TodoState::new(Arc::new(db), blobs))
}

/// Cookie header value that authenticates as the given user.
pub fn auth_cookie(user_id: &str, name: &str) -> String {
    let token = encode_jwt(user_id, name, JWT_SECRET).unwrap();
    format!("{}={}", AUTH_COOKIE, token)
}

/// Authorization header value that authenticates as the given user.
pub fn bearer(user_id: &str, name: &str) -> String {
    let token = encode_jwt(user_id, name, JWT_SECRET).unwrap();
    format!("Bearer {}", token)
}

/// Builds a multipart/form-data body the way a browser submits the todo forms.
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub const BOUNDARY: &'static str = "----deltodos-test-boundary";

    pub fn new() -> Self {
        Self { body: Vec::new() }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                Self::BOUNDARY,
                name,
                value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                Self::BOUNDARY,
                name,
                file_name,
                content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={}", Self::BOUNDARY)
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", Self::BOUNDARY).as_bytes());
        self.body
    }
}
