use anyhow::Context;
use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt; // for `oneshot`

use workboard::create_app;

async fn setup(db_name: &str) -> Result<(Router, tempfile::TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join(db_name);
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool).await?;
    Ok((app, dir))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp: Response = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

async fn register(app: &Router, name: &str, email: &str) -> Result<(String, String)> {
    let (status, body) = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({"name": name, "email": email, "password": "password123"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    let token = body["token"].as_str().context("missing token")?.to_string();
    let user_id = body["user"]["id"].as_str().context("missing user id")?.to_string();
    Ok((token, user_id))
}

#[tokio::test]
async fn full_api_flow() -> Result<()> {
    let (app, _dir) = setup("test_flow.db").await?;

    let (owner_token, _owner_id) = register(&app, "Owner", "owner@example.com").await?;
    let (member_token, member_id) = register(&app, "Member", "member@example.com").await?;

    // -- owner creates a workspace and becomes its owner
    let (status, ws) = send(
        &app,
        "POST",
        "/workspaces",
        Some(&owner_token),
        Some(json!({"name": "Acme Inc", "slug": "acme"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "workspace create failed: {}", ws);
    let ws_id = ws["id"].as_str().context("missing workspace id")?.to_string();

    let (status, list) = send(&app, "GET", "/workspaces", Some(&owner_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["role"], "owner");

    // -- a stranger sees nothing and gets 403 on direct access
    let (status, list) = send(&app, "GET", "/workspaces", Some(&member_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());

    let (status, _) = send(
        &app,
        "GET",
        &format!("/workspaces/{}", ws_id),
        Some(&member_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // -- owner creates a project and a task
    let (status, project) = send(
        &app,
        "POST",
        &format!("/workspaces/{}/projects", ws_id),
        Some(&owner_token),
        Some(json!({"name": "Launch", "identifier": "lnch"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "project create failed: {}", project);
    let project_id = project["id"].as_str().context("missing project id")?.to_string();
    assert_eq!(project["identifier"], "LNCH");

    let (status, task) = send(
        &app,
        "POST",
        &format!("/projects/{}/tasks", project_id),
        Some(&owner_token),
        Some(json!({"title": "Checklist"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "task create failed: {}", task);
    let task_id = task["id"].as_str().context("missing task id")?.to_string();

    // -- owner grants workspace membership (READ|WRITE = 3) to the second user
    let (status, entry) = send(
        &app,
        "POST",
        "/acl",
        Some(&owner_token),
        Some(json!({
            "resource_type": "workspace",
            "resource_id": ws_id,
            "principal_kind": "user",
            "principal_id": member_id,
            "access": 3
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "grant failed: {}", entry);

    let (status, list) = send(&app, "GET", "/workspaces", Some(&member_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["role"], "member");

    // member-tier access reaches tasks through the derived project role
    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/projects/{}/tasks/{}", project_id, task_id),
        Some(&member_token),
        Some(json!({"status": "in_progress"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "task update failed: {}", updated);
    assert_eq!(updated["status"], "in_progress");

    // but a member may not manage the workspace or its entries
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/workspaces/{}", ws_id),
        Some(&member_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "POST",
        "/acl",
        Some(&member_token),
        Some(json!({
            "resource_type": "workspace",
            "resource_id": ws_id,
            "principal_kind": "user",
            "principal_id": member_id,
            "access": 16
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // -- owner deactivates the workspace; access vanishes for everyone
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/workspaces/{}", ws_id),
        Some(&owner_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, list) = send(&app, "GET", "/workspaces", Some(&owner_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());

    let (status, _) = send(
        &app,
        "GET",
        &format!("/workspaces/{}", ws_id),
        Some(&owner_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn missing_resources_are_not_found() -> Result<()> {
    let (app, _dir) = setup("test_404.db").await?;
    let (token, _) = register(&app, "Solo", "solo@example.com").await?;

    let ghost = uuid::Uuid::new_v4();
    let (status, _) = send(&app, "GET", &format!("/workspaces/{}", ghost), Some(&token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", &format!("/projects/{}", ghost), Some(&token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // unauthenticated requests are rejected outright
    let (status, _) = send(&app, "GET", "/workspaces", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}
