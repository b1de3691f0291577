use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::authz;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::workspaces::list_workspaces,
		routes::workspaces::create_workspace,
		routes::workspaces::get_workspace,
		routes::workspaces::update_workspace,
		routes::workspaces::delete_workspace,
		routes::projects::list_projects,
		routes::projects::create_project,
		routes::projects::get_project,
		routes::projects::update_project,
		routes::projects::delete_project,
		routes::tasks::list_tasks,
		routes::tasks::create_task,
		routes::tasks::update_task,
		routes::tasks::delete_task,
		routes::acl::list_entries,
		routes::acl::grant_entry,
		routes::acl::revoke_entry,
		routes::groups::create_group,
		routes::groups::update_group,
		routes::groups::add_member,
		routes::groups::remove_member,
	),
	components(
		schemas(
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::workspace::Workspace,
			models::workspace::WorkspaceCreateRequest,
			models::workspace::WorkspaceUpdateRequest,
			models::project::Project,
			models::project::ProjectCreateRequest,
			models::project::ProjectUpdateRequest,
			models::task::Task,
			models::task::TaskCreateRequest,
			models::task::TaskUpdateRequest,
			models::acl::AclEntry,
			models::acl::AclGrantRequest,
			models::acl::ResourceType,
			models::acl::PrincipalKind,
			models::group::Group,
			models::group::GroupMember,
			models::group::GroupCreateRequest,
			models::group::GroupUpdateRequest,
			models::group::GroupAddMemberRequest,
			authz::WorkspaceSummary,
			authz::ProjectSummary,
			authz::roles::PlatformRole,
			authz::roles::WorkspaceRole,
			authz::roles::ProjectRole,
		)
	),
	tags(
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Workspaces", description = "Workspace management"),
		(name = "Projects", description = "Project management"),
		(name = "Tasks", description = "Task management"),
		(name = "ACL", description = "Access-control entry administration"),
		(name = "Groups", description = "Principal group administration"),
		(name = "Health", description = "Service health")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_servers(&mut doc, port);

	// Path-aware errors: a malformed doc names the offending JSON pointer.
	let doc = serde_path_to_error::deserialize(doc)
		.map_err(|err| anyhow::anyhow!("invalid OpenAPI document at {}: {}", err.path(), err))?;
	Ok(doc)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}

fn ensure_security_components(doc: &mut Value) {
	let components = doc
		.as_object_mut()
		.expect("OpenAPI root must be an object")
		.entry("components")
		.or_insert_with(|| json!({}));

	if let Some(components) = components.as_object_mut() {
		let schemes = components
			.entry("securitySchemes")
			.or_insert_with(|| json!({}));
		if let Some(schemes) = schemes.as_object_mut() {
			schemes.entry("bearerAuth").or_insert_with(|| {
				json!({
					"type": "http",
					"scheme": "bearer",
					"bearerFormat": "JWT"
				})
			});
		}
	}

	// Bearer auth by default; /auth/register, /auth/login and /health
	// override per-operation.
	doc.as_object_mut()
		.expect("OpenAPI root must be an object")
		.entry("security")
		.or_insert_with(|| json!([{ "bearerAuth": [] }]));
}

fn ensure_servers(doc: &mut Value, port: u16) {
	doc.as_object_mut()
		.expect("OpenAPI root must be an object")
		.entry("servers")
		.or_insert_with(|| json!([{ "url": format!("http://localhost:{}", port) }]));
}
