use crate::auth::{AuthService, AuthServiceError, AuthState, CurrentUser, decode_jwt, encode_jwt};
use crate::web::api::{ApiError, ErrorResponse};
use axum::{
    Extension, Form, Json, Router,
    extract::{FromRequest, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Credentials accepted by register and login.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Public view of an account.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
}

/// Bearer token issued on login.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Entry of the assignee/verifier picker.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListItem {
    pub id: i32,
    pub full_name: String,
}

impl From<AuthServiceError> for ApiError {
    fn from(err: AuthServiceError) -> Self {
        match err {
            AuthServiceError::DuplicateUsername(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "USERNAME_TAKEN", err.to_string())
            }
            AuthServiceError::InvalidCredentials => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid username or password",
            ),
            AuthServiceError::Validation(message) => ApiError::bad_request(message),
            AuthServiceError::UserNotFound(_) => ApiError::not_found(err.to_string()),
            AuthServiceError::PasswordHash(_)
            | AuthServiceError::Jwt(_)
            | AuthServiceError::Database(_) => ApiError::internal(err),
        }
    }
}

/// Creates the authentication router. Register and login are public, the
/// rest requires a bearer token.
pub fn create_api_router(state: Arc<AuthState>) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler));
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/auth/users", get(users_handler))
        .route_layer(from_fn(require_auth_middleware));
    public_routes.merge(protected_routes).with_state(state)
}

/// API authentication middleware that extracts the current user from Authorization Bearer header.
/// Sets the CurrentUser extension if a valid JWT token is found and the user still exists.
/// A failed user lookup answers 500 so clients keep their session.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    match resolve_current_user(&state, &headers).await {
        Ok(Some(current_user)) => {
            request.extensions_mut().insert(current_user);
        }
        Ok(None) => {}
        Err(err) => return ApiError::from(err).into_response(),
    }

    next.run(request).await
}

async fn resolve_current_user(
    state: &AuthState,
    headers: &HeaderMap,
) -> Result<Option<CurrentUser>, AuthServiceError> {
    let Some(user_id) = bearer_user_id(state, headers) else {
        return Ok(None);
    };
    let user = AuthService::new(&state.db).find_user(user_id).await?;
    Ok(user.map(|user| CurrentUser::new(user.id, user.username)))
}

fn bearer_user_id(state: &AuthState, headers: &HeaderMap) -> Option<i32> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    let claims = decode_jwt(token, &state.jwt_secret).ok()?;
    claims.sub.parse::<i32>().ok()
}

/// Middleware that ensures the current user is authenticated.
/// Returns UNAUTHORIZED if the CurrentUser extension is not found in the request.
/// This middleware should be applied after auth_user_middleware.
pub async fn require_auth_middleware(request: Request, next: Next) -> Response {
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        let error_response = ErrorResponse {
            error: "UNAUTHORIZED".to_string(),
            message: "Authentication required to access this resource".to_string(),
        };
        return (StatusCode::UNAUTHORIZED, Json(error_response)).into_response();
    }

    next.run(request).await
}

/// Handler for POST /auth/register.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Username taken or invalid payload", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register_handler(
    State(state): State<Arc<AuthState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = AuthService::new(&state.db)
        .register(&payload.username, &payload.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            username: user.username,
        }),
    ))
}

/// Handler for POST /auth/login. Accepts form-encoded or JSON credentials.
#[tracing::instrument(skip(state, request))]
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = CredentialsRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    request: Request,
) -> Result<Json<TokenResponse>, ApiError> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    let payload = if is_json {
        Json::<CredentialsRequest>::from_request(request, &())
            .await
            .map(|Json(payload)| payload)
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?
    } else {
        Form::<CredentialsRequest>::from_request(request, &())
            .await
            .map(|Form(payload)| payload)
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?
    };

    let user = AuthService::new(&state.db)
        .authenticate(&payload.username, &payload.password)
        .await?;
    let access_token = encode_jwt(&user, &state.jwt_secret, state.token_expires_minutes)?;
    tracing::info!("User {} logged in", user.username);

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// Handler for GET /auth/me.
#[tracing::instrument]
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Auth"
)]
pub async fn me_handler(Extension(current_user): Extension<CurrentUser>) -> Json<UserResponse> {
    Json(UserResponse {
        id: current_user.id,
        username: current_user.username,
    })
}

/// Handler for GET /auth/users.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/auth/users",
    responses(
        (status = 200, description = "Users ordered by username", body = [UserListItem]),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Auth"
)]
pub async fn users_handler(
    State(state): State<Arc<AuthState>>,
) -> Result<Json<Vec<UserListItem>>, ApiError> {
    let users = AuthService::new(&state.db).list_users().await?;
    Ok(Json(
        users
            .into_iter()
            .map(|user| UserListItem {
                id: user.id,
                full_name: user.username,
            })
            .collect(),
    ))
}
