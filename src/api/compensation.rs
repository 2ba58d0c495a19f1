use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::model::audit::AuditEntry;
use crate::model::compensation::CompensationUpdate;
use crate::service::AppService;

#[derive(Deserialize, ToSchema)]
pub struct BulkCompensationRequest {
    #[schema(example = "2026-02-01", value_type = String, format = "date")]
    pub effective_date: NaiveDate,

    #[schema(example = "Annual salary adjustment")]
    pub reason: String,

    pub updates: Vec<CompensationUpdate>,
}

/// Change the pay rate of several employees at once
#[utoipa::path(
    post,
    path = "/api/compensation/bulk-update",
    request_body = BulkCompensationRequest,
    responses(
        (status = 200, description = "All updates applied", body = AuditEntry),
        (status = 400, description = "Invalid updates or blank reason"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 422, description = "An employee has no compensation in force on the date")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Compensation"
)]
pub async fn bulk_update(
    auth: AuthUser,
    service: web::Data<AppService>,
    body: web::Json<BulkCompensationRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let audit = service
        .bulk_update_compensation(
            auth.organization_id,
            auth.user_id,
            &body.updates,
            body.effective_date,
            &body.reason,
        )
        .await?;

    Ok(HttpResponse::Ok().json(audit))
}
