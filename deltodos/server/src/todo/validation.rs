//! Typed input schemas for creating and updating todos.
//!
//! Every rule of an operation is checked before anything is persisted, and all
//! violations are reported together so a form can show them next to each field.

use serde::Serialize;
use std::fmt;

use crate::entities::todo::{Priority, Status};

/// Maximum number of characters allowed in a title.
pub const TITLE_MAX_CHARS: usize = 255;

/// Maximum size of a cover image in kilobytes.
pub const COVER_MAX_KILOBYTES: usize = 2048;

/// Maximum size of a cover image in bytes.
pub const COVER_MAX_BYTES: usize = COVER_MAX_KILOBYTES * 1024;

/// A file submitted as the cover of a todo, not yet checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl CoverUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// A cover upload that is a supported image within the size limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCover {
    bytes: Vec<u8>,
    extension: &'static str,
}

impl ValidCover {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// File extension matching the detected image format.
    pub fn extension(&self) -> &'static str {
        self.extension
    }
}

/// A single rule violation for one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// All rule violations found in one submitted input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Returns the first message reported for `field`, if any.
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "The given data was invalid")?;
        for error in &self.errors {
            write!(f, "; {}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Raw fields submitted to create a todo.
#[derive(Debug, Clone, Default)]
pub struct CreateTodoInput {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub cover: Option<CoverUpload>,
}

/// A validated request to create a todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Option<Priority>,
    pub cover: Option<ValidCover>,
}

impl CreateTodoInput {
    /// Checks every field; a missing or empty status becomes `pending`.
    pub fn validate(self) -> Result<NewTodo, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = check_title(&self.title, &mut errors);
        let status = match present(self.status.as_deref()) {
            None => Some(Status::Pending),
            Some(value) => check_status(value, &mut errors),
        };
        let priority = check_priority(self.priority.as_deref(), &mut errors);
        let cover = self
            .cover
            .and_then(|upload| check_cover(upload, &mut errors));

        errors.into_result(NewTodo {
            title,
            description: description(self.description),
            status: status.unwrap_or_default(),
            priority,
            cover,
        })
    }
}

/// Raw fields submitted to update a todo. Unlike creation, status is required.
#[derive(Debug, Clone, Default)]
pub struct UpdateTodoInput {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub cover: Option<CoverUpload>,
}

/// A validated set of changes for an existing todo.
///
/// `cover` is only `Some` when a replacement image was uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoChanges {
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Option<Priority>,
    pub cover: Option<ValidCover>,
}

impl UpdateTodoInput {
    pub fn validate(self) -> Result<TodoChanges, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = check_title(&self.title, &mut errors);
        let status = match present(self.status.as_deref()) {
            None => {
                errors.add("status", "The status field is required.");
                None
            }
            Some(value) => check_status(value, &mut errors),
        };
        let priority = check_priority(self.priority.as_deref(), &mut errors);
        let cover = self
            .cover
            .and_then(|upload| check_cover(upload, &mut errors));

        errors.into_result(TodoChanges {
            title,
            description: description(self.description),
            status: status.unwrap_or_default(),
            priority,
            cover,
        })
    }
}

/// Trims a raw value and treats an empty result as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn description(value: Option<String>) -> String {
    present(value.as_deref()).unwrap_or_default().to_string()
}

fn check_title(raw: &str, errors: &mut ValidationErrors) -> String {
    let title = raw.trim();
    if title.is_empty() {
        errors.add("title", "The title field is required.");
    } else if title.chars().count() > TITLE_MAX_CHARS {
        errors.add(
            "title",
            format!(
                "The title field must not be greater than {} characters.",
                TITLE_MAX_CHARS
            ),
        );
    }
    title.to_string()
}

fn check_status(value: &str, errors: &mut ValidationErrors) -> Option<Status> {
    let status = value.parse::<Status>().ok();
    if status.is_none() {
        errors.add("status", "The selected status is invalid.");
    }
    status
}

fn check_priority(raw: Option<&str>, errors: &mut ValidationErrors) -> Option<Priority> {
    let value = present(raw)?;
    let priority = value.parse::<Priority>().ok();
    if priority.is_none() {
        errors.add("priority", "The selected priority is invalid.");
    }
    priority
}

fn check_cover(upload: CoverUpload, errors: &mut ValidationErrors) -> Option<ValidCover> {
    let extension = image::guess_format(&upload.bytes)
        .ok()
        .and_then(cover_extension);
    let Some(extension) = extension else {
        errors.add("cover", "The cover field must be an image.");
        return None;
    };
    if upload.bytes.len() > COVER_MAX_BYTES {
        errors.add(
            "cover",
            format!(
                "The cover field must not be greater than {} kilobytes.",
                COVER_MAX_KILOBYTES
            ),
        );
        return None;
    }
    Some(ValidCover {
        bytes: upload.bytes,
        extension,
    })
}

fn cover_extension(format: image::ImageFormat) -> Option<&'static str> {
    match format {
        image::ImageFormat::Png => Some("png"),
        image::ImageFormat::Jpeg => Some("jpg"),
        image::ImageFormat::Gif => Some("gif"),
        image::ImageFormat::WebP => Some("webp"),
        image::ImageFormat::Bmp => Some("bmp"),
        _ => None,
    }
}
