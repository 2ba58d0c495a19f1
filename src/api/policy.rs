use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::service::{AppService, ApplicablePolicies};

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct ApplicablePolicyQuery {
    /// Defaults to the caller's own employee record
    #[schema(example = 1001)]
    pub employee_id: Option<u64>,

    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    #[param(value_type = String, format = "date")]
    pub date: NaiveDate,
}

/// Late and undertime policies in force for an employee on a date
#[utoipa::path(
    get,
    path = "/api/policies/applicable",
    params(ApplicablePolicyQuery),
    responses(
        (status = 200, description = "Policies in force", body = ApplicablePolicies),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Policy"
)]
pub async fn applicable_policies(
    auth: AuthUser,
    service: web::Data<AppService>,
    query: web::Query<ApplicablePolicyQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = match query.employee_id {
        Some(id) if auth.employee_id != Some(id) => {
            auth.require_payroll_access()?;
            id
        }
        Some(id) => id,
        None => auth.employee_id()?,
    };

    let policies = service
        .get_applicable_policies(auth.organization_id, employee_id, query.date)
        .await?;

    Ok(HttpResponse::Ok().json(policies))
}
