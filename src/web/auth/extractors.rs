//! Axum extractors that enforce bearer-token authentication.
//!
//! ```ignore
//! async fn handler(ApiClient(role): ApiClient, ...) -> impl IntoResponse { ... }
//! async fn admin_handler(AdminClient: AdminClient, ...) -> impl IntoResponse { ... }
//! ```

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::debug;

use crate::state::AppState;
use crate::web::auth::{Role, bearer_token};
use crate::web::error::ApiError;

fn authenticate(parts: &Parts, state: &AppState) -> Result<Role, ApiError> {
    let Some(token) = bearer_token(&parts.headers) else {
        return Err(ApiError::unauthorized("missing bearer token"));
    };
    state.auth.role_for(token).ok_or_else(|| {
        debug!(path = %parts.uri.path(), "rejected unknown bearer token");
        ApiError::unauthorized("invalid bearer token")
    })
}

/// Any authenticated caller (client or admin token).
pub struct ApiClient(pub Role);

impl FromRequestParts<AppState> for ApiClient {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).map(ApiClient)
    }
}

/// A caller presenting the admin token. Client tokens get 403.
pub struct AdminClient;

impl FromRequestParts<AppState> for AdminClient {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state)? {
            Role::Admin => Ok(AdminClient),
            Role::Client => Err(ApiError::forbidden("admin token required")),
        }
    }
}
