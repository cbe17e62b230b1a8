use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Append a row to the audit trail. Audit writes never fail the operation
/// that triggered them; failures are logged and swallowed.
pub async fn record(
    pool: &PgPool,
    user_id: Uuid,
    action: &str,
    entity_type: &str,
    entity_id: Option<Uuid>,
    detail: Option<Value>,
) {
    let result = sqlx::query(
        "INSERT INTO activity_log (user_id, action, entity_type, entity_id, detail) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(user_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(detail)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!("activity log write failed ({} {}): {}", action, entity_type, e);
    }
}
