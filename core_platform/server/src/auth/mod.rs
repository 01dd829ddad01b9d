use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::MatchedPath;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use sea_orm::*;
use std::sync::Arc;
use tower_http::trace::MakeSpan;
use tracing::Span;

use crate::config::Config;
use crate::entities::*;

pub mod api;

/// Role handed to every self-registered account.
pub const DEFAULT_ROLE_NAME: &str = "employee";

/// Represents the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
}

impl CurrentUser {
    /// Creates a new CurrentUser instance.
    pub fn new(id: i32, username: String) -> Self {
        Self { id, username }
    }
}

/// Authentication state containing the user store and JWT settings.
#[derive(Clone)]
pub struct AuthState {
    pub db: Arc<DatabaseConnection>,
    pub jwt_secret: String,
    pub token_expires_minutes: i64,
}

impl AuthState {
    /// Creates a new AuthState from the application config.
    pub fn from_config(config: &Config, db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
            token_expires_minutes: config.token_expires_minutes,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub sub: String,      // User id
    pub username: String, // Username of the authenticated user
    pub iat: usize,       // Issued at time of the token
    pub exp: usize,       // Expiry time of the token
}

/// A registered platform account, without credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub username: String,
}

impl From<user::Model> for User {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
        }
    }
}

/// Error type for AuthService operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("Username already registered")]
    DuplicateUsername(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("User with ID {0} not found")]
    UserNotFound(i32),
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    #[error("JWT operation failed")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub fn encode_jwt(
    user: &User,
    jwt_secret: &str,
    expires_minutes: i64,
) -> Result<String, AuthServiceError> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::minutes(expires_minutes);
    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        iat: now.timestamp() as usize,
        exp: (now + expire).timestamp() as usize,
    };
    let jwt = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(jwt)
}

pub fn decode_jwt(token: &str, jwt_secret: &str) -> Result<Claims, AuthServiceError> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Produces an argon2id PHC string for the password.
pub fn hash_password(password: &str) -> Result<String, AuthServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthServiceError::PasswordHash(err.to_string()))
}

pub fn verify_password(password: &str, hashed_password: &str) -> bool {
    match PasswordHash::new(hashed_password) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub struct AuthService<'a> {
    db: &'a DatabaseConnection,
}

impl AuthService<'_> {
    pub fn new(db: &DatabaseConnection) -> AuthService<'_> {
        AuthService { db }
    }

    /// Registers a new account and grants it the default role.
    ///
    /// # Arguments
    ///
    /// * `username` - Login name, 3 to 255 characters.
    /// * `password` - Plain password, 6 to 128 characters.
    ///
    /// # Returns
    ///
    /// The created `User`, or `DuplicateUsername` when the login is taken.
    #[tracing::instrument(skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthServiceError> {
        let username_len = username.chars().count();
        if !(3..=255).contains(&username_len) {
            return Err(AuthServiceError::Validation(
                "Username must be between 3 and 255 characters".to_string(),
            ));
        }
        let password_len = password.chars().count();
        if !(6..=128).contains(&password_len) {
            return Err(AuthServiceError::Validation(
                "Password must be between 6 and 128 characters".to_string(),
            ));
        }
        if self.find_by_username(username).await?.is_some() {
            return Err(AuthServiceError::DuplicateUsername(username.to_string()));
        }

        let hashed_password = hash_password(password)?;
        let txn = self.db.begin().await?;
        let created = user::ActiveModel {
            username: ActiveValue::Set(username.to_string()),
            hashed_password: ActiveValue::Set(hashed_password),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let default_role = role::Entity::find()
            .filter(role::Column::Name.eq(DEFAULT_ROLE_NAME))
            .one(&txn)
            .await?;
        match default_role {
            Some(default_role) => {
                user_role::ActiveModel {
                    user_id: ActiveValue::Set(created.id),
                    role_id: ActiveValue::Set(default_role.id),
                }
                .insert(&txn)
                .await?;
            }
            None => tracing::warn!("Default role '{}' is missing", DEFAULT_ROLE_NAME),
        }
        txn.commit().await?;

        tracing::info!("Registered user {}", created.username);
        Ok(User::from(created))
    }

    /// Checks a username/password pair.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthServiceError> {
        let found = self
            .find_by_username(username)
            .await?
            .ok_or(AuthServiceError::InvalidCredentials)?;
        if !verify_password(password, &found.hashed_password) {
            return Err(AuthServiceError::InvalidCredentials);
        }
        Ok(User::from(found))
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_user(&self, id: i32) -> Result<Option<User>, AuthServiceError> {
        Ok(user::Entity::find_by_id(id).one(self.db).await?.map(User::from))
    }

    /// Lists every account ordered by username, for assignee pickers.
    #[tracing::instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<User>, AuthServiceError> {
        let users = user::Entity::find()
            .order_by_asc(user::Column::Username)
            .all(self.db)
            .await?
            .into_iter()
            .map(User::from)
            .collect();
        Ok(users)
    }

    /// Returns the account with this username, creating it when missing.
    /// An existing account keeps its password.
    #[tracing::instrument(skip(self, password))]
    pub async fn ensure_user(&self, username: &str, password: &str) -> Result<User, AuthServiceError> {
        if let Some(existing) = self.find_by_username(username).await? {
            return Ok(User::from(existing));
        }
        let created = user::ActiveModel {
            username: ActiveValue::Set(username.to_string()),
            hashed_password: ActiveValue::Set(hash_password(password)?),
            ..Default::default()
        }
        .insert(self.db)
        .await?;
        tracing::info!("Created user {}", created.username);
        Ok(User::from(created))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<user::Model>, AuthServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db)
            .await?)
    }
}

/// Custom span maker that filters sensitive data from credential requests.
/// This implementation avoids logging request bodies and headers for security.
#[derive(Clone, Debug)]
pub struct FilteredMakeSpan;

impl FilteredMakeSpan {
    const SENSITIVE_PATHS: [&'static str; 2] = ["/auth/login", "/auth/register"];
}

impl<B> MakeSpan<B> for FilteredMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let uri = request.uri();
        let method = request.method();
        let matched_path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str);

        if Self::SENSITIVE_PATHS.contains(&uri.path()) {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
                sensitive_route = true,
            )
        } else {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_round_trip_token_claims() {
        let user = User {
            id: 7,
            username: "alice".to_string(),
        };
        let token = encode_jwt(&user, "secret", 30).unwrap();
        let claims = decode_jwt(&token, "secret").unwrap();

        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn can_reject_token_signed_with_other_secret() {
        let user = User {
            id: 1,
            username: "bob".to_string(),
        };
        let token = encode_jwt(&user, "secret", 30).unwrap();

        assert!(decode_jwt(&token, "other").is_err());
    }

    #[test]
    fn can_reject_expired_token() {
        let user = User {
            id: 1,
            username: "bob".to_string(),
        };
        let token = encode_jwt(&user, "secret", -10).unwrap();

        assert!(decode_jwt(&token, "secret").is_err());
    }

    #[test]
    fn can_verify_hashed_password() {
        let hashed = hash_password("hunter22").unwrap();

        assert!(hashed.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hashed));
        assert!(!verify_password("hunter23", &hashed));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }
}
