use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Record of a bulk change, written in the same transaction as the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AuditEntry {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub organization_id: u64,
    pub actor_user_id: u64,
    #[schema(example = "COMPENSATION_BULK_UPDATE")]
    pub action: String,
    pub reason: String,
    pub affected_count: usize,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

impl AuditEntry {
    pub fn new(
        organization_id: u64,
        actor_user_id: u64,
        action: impl Into<String>,
        reason: impl Into<String>,
        affected_count: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            actor_user_id,
            action: action.into(),
            reason: reason.into(),
            affected_count,
            created_at: Utc::now().naive_utc(),
        }
    }
}
