use std::sync::Arc;

use crate::{
    auth::{self, AuthState},
    todo::{api::v1, web::TodoState},
};

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
};
use tower::ServiceBuilder;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        v1::list_todos_handler,
        v1::get_todo_handler,
        v1::delete_todo_handler,
        v1::stats_handler
    ),
    modifiers(&BearerSecurity),
    tags((name = "Todos", description = "Todos of the authenticated user"))
)]
pub struct ApiDoc;

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Creates the API routes for JSON API endpoints.
pub fn create_api_router(auth_state: Arc<AuthState>, todo_state: Arc<TodoState>) -> Router {
    let todos_router = v1::create_api_router(todo_state)
        .layer(ServiceBuilder::new().layer(from_fn(auth::api::v1::require_auth_middleware)));
    Router::new()
        .nest("/api/v1", todos_router)
        .layer(ServiceBuilder::new().layer(from_fn_with_state(
            auth_state,
            auth::api::v1::auth_user_middleware,
        )))
}

/// Serves the OpenAPI document and the Swagger UI that renders it.
pub fn create_docs_router() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
