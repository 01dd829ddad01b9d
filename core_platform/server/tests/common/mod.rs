#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use core_platform_server::auth::{AuthService, User, encode_jwt};
use core_platform_server::config::Config;
use core_platform_server::events::EventPublisher;
use core_platform_server::tasks::TaskService;
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::Value;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub fn test_config() -> Config {
    Config {
        db_url: "sqlite::memory:".to_string(),
        port: 0,
        admin_username: "admin".to_string(),
        admin_password: ADMIN_PASSWORD.to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        token_expires_minutes: 30,
        environment: "test".to_string(),
        recurrence_horizon_days: 365,
    }
}

/// Migrated and seeded in-memory database. One pooled connection keeps the
/// in-memory schema alive for the whole test.
pub async fn setup_db() -> anyhow::Result<DatabaseConnection> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
    let mut options = ConnectOptions::new(test_config().db_url);
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    core_platform_server::bootstrap::run(&db, &test_config()).await?;
    Ok(db)
}

pub struct TestContext {
    pub db: DatabaseConnection,
    pub app: Router,
    pub events: EventPublisher,
}

impl TestContext {
    pub async fn new() -> anyhow::Result<Self> {
        let db = setup_db().await?;
        let app = core_platform_server::web::build_app(&test_config(), db.clone());
        Ok(Self {
            db,
            app,
            events: EventPublisher::with_default_handlers(),
        })
    }

    pub fn tasks(&self) -> TaskService<'_> {
        TaskService::new(&self.db, &self.events, test_config().recurrence_horizon_days)
    }

    /// Registers an employee and returns it with a bearer token.
    pub async fn employee(&self, username: &str) -> anyhow::Result<(User, String)> {
        let user = AuthService::new(&self.db)
            .register(username, "password123")
            .await?;
        let token = encode_jwt(&user, JWT_SECRET, 30)?;
        Ok((user, token))
    }

    /// The seeded administrator with a bearer token.
    pub async fn admin(&self) -> anyhow::Result<(User, String)> {
        let user = AuthService::new(&self.db)
            .authenticate("admin", ADMIN_PASSWORD)
            .await?;
        let token = encode_jwt(&user, JWT_SECRET, 30)?;
        Ok((user, token))
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> anyhow::Result<(StatusCode, Value)> {
        self.send("GET", uri, token, None).await
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        Ok((status, json))
    }
}
