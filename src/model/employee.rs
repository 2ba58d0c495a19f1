use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "organization_id": 7,
        "department_id": 10,
        "employee_code": "EMP-001",
        "first_name": "Juan",
        "last_name": "Dela Cruz",
        "status": "active"
    })
)]
pub struct Employee {
    pub id: u64,
    pub organization_id: u64,
    pub department_id: Option<u64>,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
}

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}
