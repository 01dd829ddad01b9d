//! Typed wrappers over the REST API. Every call made on behalf of a signed-in
//! user carries the session's bearer token. A 401 on such a call ends the
//! session.

use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::*;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<RwLock<SessionStore>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: SessionStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session: Arc::new(RwLock::new(session)),
        }
    }

    pub fn session(&self) -> Arc<RwLock<SessionStore>> {
        self.session.clone()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn authorized(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.session.read().await.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    #[tracing::instrument(skip_all)]
    async fn execute(&self, builder: RequestBuilder, authenticated: bool) -> Result<Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED && authenticated {
            tracing::warn!("Server rejected the session token");
            self.session.write().await.sign_out()?;
            return Err(ClientError::Unauthorized);
        }
        let message = error_message(status, &body);
        tracing::debug!("Request failed with {}: {}", status, message);
        Err(ClientError::Http { status, message })
    }

    async fn call<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = self.execute(builder, true).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn call_empty(&self, builder: RequestBuilder) -> Result<(), ClientError> {
        self.execute(builder, true).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        let response = self
            .execute(self.http.get(self.url("/health")), false)
            .await?;
        Ok(response.json().await?)
    }

    // Auth

    pub async fn register(&self, username: &str, password: &str) -> Result<CurrentUser, ClientError> {
        let builder = self
            .http
            .post(self.url("/auth/register"))
            .json(&json!({"username": username, "password": password}));
        Ok(self.execute(builder, false).await?.json().await?)
    }

    /// Exchanges credentials for a token, stores it and loads the user. A
    /// failure after the token was issued leaves the session signed out.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<CurrentUser, ClientError> {
        let builder = self
            .http
            .post(self.url("/auth/login"))
            .form(&[("username", username), ("password", password)]);
        let token: TokenResponse = self.execute(builder, false).await?.json().await?;
        self.session.write().await.sign_in(&token.access_token)?;

        match self.me().await {
            Ok(user) => {
                self.session.write().await.set_user(user.clone());
                tracing::info!("Signed in as {}", user.username);
                Ok(user)
            }
            Err(err) => {
                self.session.write().await.sign_out()?;
                Err(err)
            }
        }
    }

    /// Re-validates a persisted token. Returns `None` when signed out.
    pub async fn restore(&self) -> Result<Option<CurrentUser>, ClientError> {
        if !self.session.read().await.is_authenticated() {
            return Ok(None);
        }
        match self.me().await {
            Ok(user) => {
                self.session.write().await.set_user(user.clone());
                Ok(Some(user))
            }
            Err(ClientError::Unauthorized) => Ok(None),
            Err(err) => {
                self.session.write().await.sign_out()?;
                Err(err)
            }
        }
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.session.write().await.sign_out()
    }

    pub async fn me(&self) -> Result<CurrentUser, ClientError> {
        self.call(self.authorized(Method::GET, "/auth/me").await).await
    }

    pub async fn users(&self) -> Result<Vec<UserListItem>, ClientError> {
        self.call(self.authorized(Method::GET, "/auth/users").await).await
    }

    // Modules and sidebar

    pub async fn modules(&self) -> Result<Vec<Module>, ClientError> {
        self.call(self.authorized(Method::GET, "/modules").await).await
    }

    pub async fn set_primary_module(&self, module_id: Option<&str>) -> Result<Vec<Module>, ClientError> {
        let builder = self
            .authorized(Method::PATCH, "/modules/primary")
            .await
            .json(&json!({"module_id": module_id}));
        self.call(builder).await
    }

    pub async fn set_module_order(&self, ordered_ids: &[String]) -> Result<Vec<Module>, ClientError> {
        let builder = self
            .authorized(Method::PATCH, "/modules/order")
            .await
            .json(&json!({"ordered_ids": ordered_ids}));
        self.call(builder).await
    }

    pub async fn sidebar_settings(&self) -> Result<SidebarSettings, ClientError> {
        self.call(self.authorized(Method::GET, "/user/sidebar-settings").await)
            .await
    }

    pub async fn save_sidebar_order(&self, modules_order: &[String]) -> Result<SidebarSettings, ClientError> {
        let builder = self
            .authorized(Method::PUT, "/user/sidebar-settings/modules-order")
            .await
            .json(&json!({"modules_order": modules_order}));
        self.call(builder).await
    }

    // Tasks

    pub async fn tasks_for_date(
        &self,
        date: NaiveDate,
        folder_id: Option<&str>,
    ) -> Result<Vec<Task>, ClientError> {
        let mut query = vec![("date", date.to_string())];
        if let Some(folder_id) = folder_id {
            query.push(("folder_id", folder_id.to_string()));
        }
        let builder = self.authorized(Method::GET, "/tasks").await.query(&query);
        self.call(builder).await
    }

    pub async fn calendar(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<CalendarDay>, ClientError> {
        let builder = self
            .authorized(Method::GET, "/tasks/calendar")
            .await
            .query(&[("from", from.to_string()), ("to", to.to_string())]);
        self.call(builder).await
    }

    pub async fn task(&self, task_id: &str) -> Result<Task, ClientError> {
        self.call(self.authorized(Method::GET, &format!("/tasks/{task_id}")).await)
            .await
    }

    pub async fn create_task(&self, new_task: &NewTask) -> Result<Task, ClientError> {
        let builder = self.authorized(Method::POST, "/tasks").await.json(new_task);
        self.call(builder).await
    }

    pub async fn update_task(&self, task_id: &str, changes: &TaskChanges) -> Result<Task, ClientError> {
        let builder = self
            .authorized(Method::PATCH, &format!("/tasks/{task_id}"))
            .await
            .json(changes);
        self.call(builder).await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), ClientError> {
        self.call_empty(self.authorized(Method::DELETE, &format!("/tasks/{task_id}")).await)
            .await
    }

    pub async fn complete_task(&self, task_id: &str) -> Result<Task, ClientError> {
        self.call(
            self.authorized(Method::POST, &format!("/tasks/{task_id}/complete"))
                .await,
        )
        .await
    }

    pub async fn verify_task(&self, task_id: &str) -> Result<Task, ClientError> {
        self.call(
            self.authorized(Method::POST, &format!("/tasks/{task_id}/verify"))
                .await,
        )
        .await
    }

    pub async fn recurrence_action(
        &self,
        task_id: &str,
        action: RecurrenceAction,
    ) -> Result<Task, ClientError> {
        let builder = self
            .authorized(Method::POST, &format!("/tasks/{task_id}/recurrence-action"))
            .await
            .json(&json!({"action": action}));
        self.call(builder).await
    }

    /// Removes generated children of a series master and returns how many
    /// went away.
    pub async fn delete_recurrence_children(
        &self,
        task_id: &str,
        selection: DeleteChildren,
    ) -> Result<u64, ClientError> {
        let query = match selection {
            DeleteChildren::All => vec![("mode", "all".to_string())],
            DeleteChildren::Before(date) => {
                vec![("mode", "before".to_string()), ("date", date.to_string())]
            }
            DeleteChildren::After(date) => {
                vec![("mode", "after".to_string()), ("date", date.to_string())]
            }
        };
        let builder = self
            .authorized(Method::DELETE, &format!("/tasks/{task_id}/recurrence-children"))
            .await
            .query(&query);
        let deleted: DeletedChildren = self.call(builder).await?;
        Ok(deleted.deleted)
    }

    pub async fn attention(&self) -> Result<Vec<Task>, ClientError> {
        self.call(self.authorized(Method::GET, "/tasks/attention").await)
            .await
    }

    pub async fn badges(&self) -> Result<TaskBadges, ClientError> {
        self.call(self.authorized(Method::GET, "/tasks/badges").await)
            .await
    }

    pub async fn folders(&self) -> Result<Vec<Folder>, ClientError> {
        self.call(self.authorized(Method::GET, "/tasks/folders").await)
            .await
    }

    pub async fn create_folder(&self, name: &str, filter_json: Value) -> Result<Folder, ClientError> {
        let builder = self
            .authorized(Method::POST, "/tasks/folders")
            .await
            .json(&json!({"name": name, "filter_json": filter_json}));
        self.call(builder).await
    }

    pub async fn update_folder(&self, folder_id: &str, changes: &FolderChanges) -> Result<Folder, ClientError> {
        let builder = self
            .authorized(Method::PATCH, &format!("/tasks/folders/{folder_id}"))
            .await
            .json(changes);
        self.call(builder).await
    }

    pub async fn delete_folder(&self, folder_id: &str) -> Result<(), ClientError> {
        self.call_empty(
            self.authorized(Method::DELETE, &format!("/tasks/folders/{folder_id}"))
                .await,
        )
        .await
    }

    // Access administration

    pub async fn roles(&self) -> Result<Vec<Role>, ClientError> {
        self.call(self.authorized(Method::GET, "/admin/access/roles").await)
            .await
    }

    pub async fn create_role(&self, name: &str) -> Result<Role, ClientError> {
        let builder = self
            .authorized(Method::POST, "/admin/access/roles")
            .await
            .json(&json!({"name": name}));
        self.call(builder).await
    }

    pub async fn delete_role(&self, role_id: i32) -> Result<(), ClientError> {
        self.call_empty(
            self.authorized(Method::DELETE, &format!("/admin/access/roles/{role_id}"))
                .await,
        )
        .await
    }

    pub async fn admin_modules(&self) -> Result<Vec<AdminModule>, ClientError> {
        self.call(self.authorized(Method::GET, "/admin/access/modules").await)
            .await
    }

    pub async fn set_module_access(
        &self,
        role_id: i32,
        module_id: &str,
        has_access: bool,
    ) -> Result<ChangeImpact, ClientError> {
        let builder = self
            .authorized(
                Method::PATCH,
                &format!("/admin/access/roles/{role_id}/modules/{module_id}"),
            )
            .await
            .json(&json!({"has_access": has_access}));
        self.call(builder).await
    }

    pub async fn permissions(&self, role_id: i32, module_id: &str) -> Result<RolePermissions, ClientError> {
        self.call(
            self.authorized(
                Method::GET,
                &format!("/admin/access/roles/{role_id}/modules/{module_id}/permissions"),
            )
            .await,
        )
        .await
    }

    /// Replaces every stored permission of the role on the module.
    pub async fn update_permissions(
        &self,
        role_id: i32,
        module_id: &str,
        permissions: &[Permission],
    ) -> Result<ChangeImpact, ClientError> {
        let builder = self
            .authorized(
                Method::PUT,
                &format!("/admin/access/roles/{role_id}/modules/{module_id}/permissions"),
            )
            .await
            .json(&json!({"permissions": permissions}));
        self.call(builder).await
    }

    pub async fn access_users(&self) -> Result<Vec<UserRoles>, ClientError> {
        self.call(self.authorized(Method::GET, "/admin/access/users").await)
            .await
    }

    pub async fn set_user_roles(&self, user_id: i32, role_ids: &[i32]) -> Result<ChangeImpact, ClientError> {
        let builder = self
            .authorized(Method::PUT, &format!("/admin/access/users/{user_id}/roles"))
            .await
            .json(&json!({"role_ids": role_ids}));
        self.call(builder).await
    }

    pub async fn session_action(
        &self,
        user_ids: &[i32],
        mode: SessionMode,
    ) -> Result<SessionActionResult, ClientError> {
        let builder = self
            .authorized(Method::POST, "/admin/access/session-actions")
            .await
            .json(&json!({"user_ids": user_ids, "mode": mode}));
        self.call(builder).await
    }
}

/// Human readable reason for a failed request: the body's `detail` or
/// `message`, else the raw body, else a generic line.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message"] {
            match value.get(key) {
                Some(Value::String(message)) if !message.is_empty() => return message.clone(),
                Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    let body = body.trim();
    if body.is_empty() {
        format!("Request failed with status {}", status.as_u16())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStorage;

    #[test]
    fn can_prefer_detail_then_message() {
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"detail": "Task not found"}"#),
            "Task not found"
        );
        assert_eq!(
            error_message(
                StatusCode::CONFLICT,
                r#"{"error": "CONFLICT", "message": "Role already exists"}"#
            ),
            "Role already exists"
        );
    }

    #[test]
    fn can_fall_back_to_body_and_generic_line() {
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "  upstream down \n"), "upstream down");
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "Request failed with status 500"
        );
    }

    #[test]
    fn can_join_paths_to_base_url() {
        let session = SessionStore::load(MemoryStorage::new()).unwrap();
        let client = ApiClient::new(&ClientConfig::new("http://api.local/"), session);

        assert_eq!(client.url("/tasks"), "http://api.local/tasks");
        assert_eq!(client.url("tasks/badges"), "http://api.local/tasks/badges");
        assert_eq!(client.url("https://elsewhere/x"), "https://elsewhere/x");
    }
}
