use askama::Template;
use axum::extract::{Extension, Request, State};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use jsonwebtoken::encode;
use std::sync::Arc;

use crate::config::Config;

pub mod api;

/// Name of the cookie holding the identity token for the HTML pages.
pub const AUTH_COOKIE: &str = "auth_token";

/// Represents the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    /// Identifier used as the owner of the user's todos.
    pub id: String,
    pub name: String,
}

impl CurrentUser {
    /// Creates a new CurrentUser instance.
    pub fn new(id: String, name: String) -> Self {
        Self { id, name }
    }

    /// Uppercase first letter of the name, used as an avatar.
    pub fn initial(&self) -> String {
        self.name
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "G".to_string())
    }
}

/// Authentication state containing the token secret and where to send anonymous users.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: String,
    pub login_url: String,
}

impl AuthState {
    /// Creates a new AuthState from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            login_url: config.login_url.clone(),
        }
    }
}

/// Claims of the identity tokens issued by the login service.
#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub exp: usize,   // Expiry time of the token
    pub iat: usize,   // Issued at time of the token
    pub sub: String,  // ID of the authenticated user
    pub name: String, // Display name of the authenticated user
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        CurrentUser::new(claims.sub, claims.name)
    }
}

/// Custom error type for authentication pages.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::error!("Auth page failed: {}", self);
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Authentication middleware that checks for a valid JWT cookie and sets the CurrentUser extension.
/// This middleware only populates the CurrentUser extension and does not perform redirects.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token_cookie) = jar.get(AUTH_COOKIE) {
        match decode_jwt(token_cookie.value(), &state.jwt_secret) {
            Ok(claims) => {
                request.extensions_mut().insert(CurrentUser::from(claims));
            }
            Err(err) => tracing::debug!("Ignoring invalid auth cookie: {}", err),
        }
    }

    next.run(request).await
}

/// Login redirect middleware that redirects unauthenticated users to the login page.
/// This middleware should be applied after auth_user_middleware to check for CurrentUser extension.
pub async fn login_redirect_middleware(
    State(state): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        return Redirect::to(&state.login_url).into_response();
    }

    next.run(request).await
}

/// Issues a token for a user, signed the same way the login service signs them.
///
/// The server itself only verifies tokens; this is used by tests and by the
/// login service when it shares this crate.
pub fn encode_jwt(user_id: &str, name: &str, jwt_secret: &str) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::hours(24);
    let exp = (now + expire).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        exp,
        iat,
        sub: user_id.to_string(),
        name: name.to_string(),
    };
    let jwt = encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(jwt)
}

pub fn decode_jwt(token: &str, jwt_secret: &str) -> anyhow::Result<Claims> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    if token_data.claims.sub.is_empty() {
        anyhow::bail!("token has an empty subject");
    }
    Ok(token_data.claims)
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub title: &'static str,
    pub user: CurrentUser,
}

/// Handles GET requests to display the profile of the current user.
#[tracing::instrument]
pub async fn profile_handler(
    Extension(user): Extension<CurrentUser>,
) -> Result<Html<String>, AuthError> {
    let template = ProfileTemplate {
        title: "Profile",
        user,
    };
    template.render().map(Html).map_err(AuthError::from)
}

/// Handles GET /logout by dropping the auth cookie and sending the user to the login page.
#[tracing::instrument(skip(state, jar))]
pub async fn logout_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/"));
    (jar, Redirect::to(&state.login_url))
}
