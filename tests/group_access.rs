use anyhow::Context;
use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;

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
async fn group_grant_follows_membership_and_activation() -> Result<()> {
    let (app, _dir) = setup("test_groups.db").await?;
    let (owner_token, _) = register(&app, "Owner", "owner@example.com").await?;
    let (member_token, member_id) = register(&app, "Member", "member@example.com").await?;

    let (_, ws) = send(
        &app,
        "POST",
        "/workspaces",
        Some(&owner_token),
        Some(json!({"name": "Acme", "slug": "acme"})),
    )
    .await?;
    let ws_id = ws["id"].as_str().unwrap().to_string();

    // workspace-scoped group, managed by the workspace owner
    let (status, group) = send(
        &app,
        "POST",
        "/groups",
        Some(&owner_token),
        Some(json!({"name": "Backend Guild", "workspace_id": ws_id})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "group create failed: {}", group);
    let group_id = group["id"].as_str().unwrap().to_string();

    // the grant lands on the group, before any membership exists
    let (status, _) = send(
        &app,
        "POST",
        "/acl",
        Some(&owner_token),
        Some(json!({
            "resource_type": "workspace",
            "resource_id": ws_id,
            "principal_kind": "group",
            "principal_id": group_id,
            "access": 3
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/workspaces/{}", ws_id),
        Some(&member_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // membership switches access on
    let (status, _) = send(
        &app,
        "POST",
        &format!("/groups/{}/members", group_id),
        Some(&owner_token),
        Some(json!({"user_id": member_id})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, list) = send(&app, "GET", "/workspaces", Some(&member_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["role"], "member");

    // a member may not administer the group
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/groups/{}", group_id),
        Some(&member_token),
        Some(json!({"is_active": false})),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // deactivating the group switches access off without touching the entry
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/groups/{}", group_id),
        Some(&owner_token),
        Some(json!({"is_active": false})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, list) = send(&app, "GET", "/workspaces", Some(&member_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());

    // platform-scoped groups are reserved for super admins
    let (status, _) = send(
        &app,
        "POST",
        "/groups",
        Some(&owner_token),
        Some(json!({"name": "Global"})),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}
