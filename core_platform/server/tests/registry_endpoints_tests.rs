use axum::http::StatusCode;
use serde_json::{Value, json};

mod common;

use common::TestContext;

fn ids(modules: &Value) -> Vec<String> {
    modules
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|module| module["id"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn can_list_seeded_modules_with_access_flags() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_, token) = ctx.employee("hank").await?;

    let (status, modules) = ctx.get("/modules", Some(&token)).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&modules), vec!["help", "tasks", "admin"]);
    let access: Vec<bool> = modules
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|module| module["has_access"].as_bool())
        .collect();
    assert_eq!(access, vec![true, true, false]);
    assert_eq!(modules[0]["is_primary"], true);
    Ok(())
}

#[tokio::test]
async fn can_reorder_modules_with_a_permutation_only() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_, token) = ctx.employee("ivy").await?;

    let (status, modules) = ctx
        .send(
            "PATCH",
            "/modules/order",
            Some(&token),
            Some(json!({"ordered_ids": ["tasks", "admin", "help"]})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&modules), vec!["tasks", "admin", "help"]);

    let (status, _) = ctx
        .send(
            "PATCH",
            "/modules/order",
            Some(&token),
            Some(json!({"ordered_ids": ["tasks", "help"]})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .send(
            "PATCH",
            "/modules/order",
            Some(&token),
            Some(json!({"ordered_ids": ["tasks", "tasks", "help"]})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn can_move_primary_flag() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_, token) = ctx.employee("jack").await?;

    let (status, modules) = ctx
        .send(
            "PATCH",
            "/modules/primary",
            Some(&token),
            Some(json!({"module_id": "tasks"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let primary: Vec<String> = modules
        .as_array()
        .into_iter()
        .flatten()
        .filter(|module| module["is_primary"] == true)
        .filter_map(|module| module["id"].as_str().map(str::to_string))
        .collect();
    assert_eq!(primary, vec!["tasks"]);

    let (status, _) = ctx
        .send(
            "PATCH",
            "/modules/primary",
            Some(&token),
            Some(json!({"module_id": "nowhere"})),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn can_save_sidebar_order_per_user() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_, kate) = ctx.employee("kate").await?;
    let (_, liam) = ctx.employee("liam").await?;

    let (status, settings) = ctx.get("/user/sidebar-settings", Some(&kate)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["modules_order"], Value::Null);

    let (status, settings) = ctx
        .send(
            "PUT",
            "/user/sidebar-settings/modules-order",
            Some(&kate),
            Some(json!({"modules_order": ["tasks", "help"]})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["modules_order"], json!(["tasks", "help"]));

    let (_, settings) = ctx.get("/user/sidebar-settings", Some(&kate)).await?;
    assert_eq!(settings["modules_order"], json!(["tasks", "help"]));
    let (_, settings) = ctx.get("/user/sidebar-settings", Some(&liam)).await?;
    assert_eq!(settings["modules_order"], Value::Null);

    let (status, _) = ctx
        .send(
            "PUT",
            "/user/sidebar-settings/modules-order",
            Some(&kate),
            Some(json!({"modules_order": ["tasks", "tasks"]})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
