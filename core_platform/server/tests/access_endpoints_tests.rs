use axum::http::StatusCode;
use serde_json::{Value, json};

mod common;

use common::TestContext;

fn role_id(roles: &Value, name: &str) -> Option<i64> {
    roles
        .as_array()?
        .iter()
        .find(|role| role["name"] == name)?["id"]
        .as_i64()
}

#[tokio::test]
async fn can_forbid_access_administration_to_employees() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_, token) = ctx.employee("erin").await?;

    let (status, error) = ctx.get("/admin/access/roles", Some(&token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["error"], "FORBIDDEN");

    let (status, _) = ctx
        .send(
            "POST",
            "/admin/access/roles",
            Some(&token),
            Some(json!({"name": "sneaky"})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn can_create_role_once() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_, token) = ctx.admin().await?;

    let (status, role) = ctx
        .send(
            "POST",
            "/admin/access/roles",
            Some(&token),
            Some(json!({"name": "auditor"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(role["can_manage_access"], false);
    assert_eq!(role["module_ids"], json!(["admin", "help", "tasks"]));

    let (status, error) = ctx
        .send(
            "POST",
            "/admin/access/roles",
            Some(&token),
            Some(json!({"name": "auditor"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "CONFLICT");

    let (status, roles) = ctx.get("/admin/access/roles", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = roles
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|role| role["name"].as_str())
        .collect();
    assert_eq!(names, vec!["admin", "auditor", "employee"]);
    Ok(())
}

#[tokio::test]
async fn can_toggle_permissions_and_see_them_in_registry() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_, admin_token) = ctx.admin().await?;
    let (_, employee_token) = ctx.employee("frank").await?;
    let (_, roles) = ctx.get("/admin/access/roles", Some(&admin_token)).await?;
    let employee_role = role_id(&roles, "employee").unwrap_or_default();
    let uri = format!("/admin/access/roles/{employee_role}/modules/tasks/permissions");

    let (status, impact) = ctx
        .send(
            "PUT",
            &uri,
            Some(&admin_token),
            Some(json!({"permissions": [
                {"name": "view", "is_allowed": true},
                {"name": "create", "is_allowed": true},
                {"name": "edit", "is_allowed": true},
                {"name": "delete", "is_allowed": false}
            ]})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let affected: Vec<&str> = impact["affected_users"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|user| user["username"].as_str())
        .collect();
    assert_eq!(affected, vec!["frank"]);

    let (_, permissions) = ctx.get(&uri, Some(&admin_token)).await?;
    assert_eq!(
        permissions["permissions"],
        json!([
            {"name": "create", "is_allowed": true},
            {"name": "delete", "is_allowed": false},
            {"name": "edit", "is_allowed": true},
            {"name": "view", "is_allowed": true}
        ])
    );

    let (_, modules) = ctx.get("/modules", Some(&employee_token)).await?;
    let tasks_module = modules
        .as_array()
        .into_iter()
        .flatten()
        .find(|module| module["id"] == "tasks")
        .cloned()
        .unwrap_or_default();
    assert_eq!(tasks_module["permissions"]["delete"], false);
    assert_eq!(tasks_module["permissions"]["view"], true);
    Ok(())
}

#[tokio::test]
async fn can_replace_user_roles_and_report_impact() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_, admin_token) = ctx.admin().await?;
    let (gina, gina_token) = ctx.employee("gina").await?;
    let (_, roles) = ctx.get("/admin/access/roles", Some(&admin_token)).await?;
    let admin_role = role_id(&roles, "admin").unwrap_or_default();

    let (status, impact) = ctx
        .send(
            "PUT",
            &format!("/admin/access/users/{}/roles", gina.id),
            Some(&admin_token),
            Some(json!({"role_ids": [admin_role]})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(impact["message"], "Changes affect active users");

    let (status, _) = ctx.get("/admin/access/roles", Some(&gina_token)).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn can_accept_known_session_actions_only() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_, token) = ctx.admin().await?;

    let (status, accepted) = ctx
        .send(
            "POST",
            "/admin/access/session-actions",
            Some(&token),
            Some(json!({"user_ids": [1], "mode": "now"})),
        )
        .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["status"], "accepted");

    let (status, _) = ctx
        .send(
            "POST",
            "/admin/access/session-actions",
            Some(&token),
            Some(json!({"user_ids": [1], "mode": "tomorrow"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
