use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use utoipa::ToSchema;

use crate::access::AccessState;
use crate::auth::{self, AuthState};
use crate::registry::RegistryState;
use crate::sidebar::SidebarState;
use crate::tasks::TaskState;

/// JSON response for API errors
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Error returned by every JSON handler. Carries the HTTP status, a stable
/// machine-readable code and a human-readable message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// Logs the cause and hides it behind a generic 500.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", cause);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An unexpected error occurred while processing your request. Please try again later.",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn error(&self) -> &str {
        self.error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.error.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        ApiError::internal(err)
    }
}

/// Shared state handed to every feature router.
pub struct ApiStates {
    pub auth: Arc<AuthState>,
    pub access: Arc<AccessState>,
    pub registry: Arc<RegistryState>,
    pub sidebar: Arc<SidebarState>,
    pub tasks: Arc<TaskState>,
}

/// Creates the API routes for JSON API endpoints.
pub fn create_api_router(states: ApiStates) -> Router {
    let auth_router = auth::api::v1::create_api_router(states.auth.clone());
    let protected_routes = Router::new()
        .merge(crate::access::api::v1::create_api_router(states.access))
        .merge(crate::registry::api::v1::create_api_router(states.registry))
        .merge(crate::sidebar::api::v1::create_api_router(states.sidebar))
        .merge(crate::tasks::api::v1::create_api_router(states.tasks))
        .layer(ServiceBuilder::new().layer(from_fn(auth::api::v1::require_auth_middleware)));
    Router::new()
        .merge(auth_router)
        .merge(protected_routes)
        .layer(ServiceBuilder::new().layer(from_fn_with_state(
            states.auth,
            auth::api::v1::auth_user_middleware,
        )))
}
