use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: &'static str, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context for activity logging (IP, User-Agent, etc.)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract context from Axum request headers
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

/// Structured activity payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// The current/new state of the entity
    #[serde(rename = "new")]
    pub current: Value,
    /// The previous state (for update/delete operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    /// Request context (IP, User-Agent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    /// Severity level for retention policy
    pub severity: Severity,
}

/// Helper function to log activity for any entity implementing `Loggable`.
#[allow(dead_code)]
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    log_activity_with_context(event_bus, action, actor_id, entity, None, None);
}

/// Activity logging with old/new tracking and request context.
///
/// # Arguments
/// * `event_bus` - The event bus to send the event to.
/// * `action` - The action performed (e.g., "created", "updated", "deleted").
/// * `actor_id` - The user who performed the action.
/// * `entity` - The current/new entity state (must implement `Loggable`).
/// * `old_entity` - Optional previous entity state (for updates/deletes).
/// * `context` - Optional request context (IP, User-Agent).
pub fn log_activity_with_context<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    // Build event name like "workspace.created"
    let event_name = format!("{}.{}", T::entity_type(), action);

    // We need a 'static lifetime for name, so we leak the string.
    // This is acceptable because event names are a small, bounded set.
    let static_name: &'static str = Box::leak(event_name.into_boxed_str());

    let severity = entity.severity_for_action(action);
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity,
    };

    let event = DomainEvent::new(
        static_name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    // Fire and forget - logging failures should not break the API
    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("Activity listener started");
    while let Ok(event) = rx.recv().await {
        let event_json = event.clone();

        // Basic extraction (tolerant)
        let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
        let actor_id_str = event.get("actor_id").and_then(|v| v.as_str());
        let subject_id_str = event.get("subject_id").and_then(|v| v.as_str());
        let occurred_at_str = event.get("occurred_at").and_then(|v| v.as_str());

        let description = match name {
            "workspace.created" => "Workspace created",
            "workspace.updated" => "Workspace updated",
            "workspace.deleted" => "Workspace deactivated",
            "project.created" => "Project created",
            "project.updated" => "Project updated",
            "project.deleted" => "Project deactivated",
            "task.created" => "Task created",
            "task.updated" => "Task updated",
            "task.deleted" => "Task deleted",
            "acl_entry.created" => "ACL entry granted",
            "acl_entry.deleted" => "ACL entry revoked",
            "group.created" => "Group created",
            "group.updated" => "Group updated",
            "group_member.created" => "Group member added",
            "group_member.deleted" => "Group member removed",
            "user.registered" => "New user registered",
            "user.login" => "User logged in",
            _ => "System event",
        }
        .to_string();

        let severity = event
            .get("payload")
            .and_then(|p| p.get("severity"))
            .and_then(|s| s.as_str())
            .unwrap_or("important");

        let actor_id = actor_id_str.and_then(|s| Uuid::parse_str(s).ok());
        let subject_id = subject_id_str.and_then(|s| Uuid::parse_str(s).ok());

        let occurred_at = occurred_at_str
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let id = Uuid::new_v4();

        // Projection for queries
        let result = sqlx::query(
            "INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(&description)
        .bind(actor_id)
        .bind(subject_id)
        .bind(occurred_at)
        .bind(event_json.to_string())
        .bind(severity)
        .execute(&pool)
        .await;

        if let Err(e) = result {
            tracing::error!("Failed to save activity log: {}", e);
        }

        // Append-only event store with hash chain
        let event_store_id = Uuid::new_v4();
        let payload_str = serde_json::to_string(&event_json).unwrap_or_default();

        let prev_hash_result: Option<String> = sqlx::query_scalar(
            "SELECT hash FROM event_store ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&pool)
        .await
        .ok()
        .flatten();

        // SHA256(prev_hash || payload)
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        if let Some(ref ph) = prev_hash_result {
            hasher.update(ph.as_bytes());
        }
        hasher.update(payload_str.as_bytes());
        let hash = hex::encode(hasher.finalize());

        let event_store_result = sqlx::query(
            "INSERT INTO event_store (id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event_store_id)
        .bind(name)
        .bind(occurred_at)
        .bind(actor_id)
        .bind(subject_id)
        .bind(&payload_str)
        .bind(severity)
        .bind(&prev_hash_result)
        .bind(&hash)
        .bind(Utc::now())
        .execute(&pool)
        .await;

        if let Err(e) = event_store_result {
            tracing::error!("Failed to save to event store: {}", e);
        }
    }
}
