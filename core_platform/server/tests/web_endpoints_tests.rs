use axum::http::StatusCode;

mod common;

use common::TestContext;

#[tokio::test]
async fn can_report_health_with_environment() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;

    let (status, health) = ctx.get("/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    insta::assert_json_snapshot!(health, @r#"
    {
      "environment": "test",
      "status": "ok"
    }
    "#);
    Ok(())
}

#[tokio::test]
async fn can_report_readiness_when_database_answers() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;

    let (status, ready) = ctx.get("/ready", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ready["status"], "ready");
    Ok(())
}

#[tokio::test]
async fn can_serve_openapi_document() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;

    let (status, doc) = ctx.get("/api-docs/openapi.json", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["info"]["title"], "Core Platform API");
    assert!(doc["paths"]["/tasks/{task_id}/complete"]["post"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearer"].is_object());
    Ok(())
}
