use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::engine::periods::PeriodRequest;
use crate::model::payroll_period::{PayrollPeriod, PeriodType};
use crate::model::schedule::WeekdayTag;
use crate::service::AppService;

fn default_week_start() -> WeekdayTag {
    WeekdayTag::Mon
}

#[derive(Deserialize, ToSchema)]
pub struct GeneratePeriodsRequest {
    #[schema(example = "SEMI_MONTHLY")]
    pub period_type: PeriodType,

    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub start_date: NaiveDate,

    #[schema(example = "2026-06-30", value_type = String, format = "date")]
    pub end_date: NaiveDate,

    /// Days after the window end (monthly: after the first of the next month)
    #[schema(example = 5)]
    pub pay_day_offset: i64,

    /// Anchor weekday for weekly and bi-weekly windows
    #[serde(default = "default_week_start")]
    #[schema(example = "MON")]
    pub week_start: WeekdayTag,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct PeriodQuery {
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    #[param(value_type = String, format = "date")]
    pub start_date: NaiveDate,

    #[schema(example = "2026-12-31", value_type = String, format = "date")]
    #[param(value_type = String, format = "date")]
    pub end_date: NaiveDate,
}

/// Generate payroll periods for a date range
#[utoipa::path(
    post,
    path = "/api/periods/generate",
    request_body = GeneratePeriodsRequest,
    responses(
        (status = 200, description = "Stored periods, existing ones included", body = [PayrollPeriod]),
        (status = 400, description = "Invalid range or offset"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "A window overlaps a different existing period")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Period"
)]
pub async fn generate_periods(
    auth: AuthUser,
    service: web::Data<AppService>,
    body: web::Json<GeneratePeriodsRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let request = PeriodRequest {
        organization_id: auth.organization_id,
        period_type: body.period_type,
        start: body.start_date,
        end: body.end_date,
        pay_day_offset: body.pay_day_offset,
        week_start: body.week_start,
    };
    let periods = service.generate_payroll_periods(&request).await?;

    Ok(HttpResponse::Ok().json(periods))
}

/// List periods overlapping a date range
#[utoipa::path(
    get,
    path = "/api/periods",
    params(PeriodQuery),
    responses(
        (status = 200, description = "Periods ordered by start date", body = [PayrollPeriod]),
        (status = 400, description = "Invalid range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Period"
)]
pub async fn list_periods(
    auth: AuthUser,
    service: web::Data<AppService>,
    query: web::Query<PeriodQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_payroll_access()?;

    let periods = service
        .list_periods(auth.organization_id, query.start_date, query.end_date)
        .await?;

    Ok(HttpResponse::Ok().json(periods))
}

/// Delete a period no live payroll refers to
#[utoipa::path(
    delete,
    path = "/api/periods/{id}",
    params(
        ("id" = u64, Path, description = "Period ID")
    ),
    responses(
        (status = 200, description = "Period deleted", body = Object, example = json!({
            "message": "Payroll period deleted"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Period not found"),
        (status = 409, description = "Period is referenced by a payroll")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Period"
)]
pub async fn delete_period(
    auth: AuthUser,
    service: web::Data<AppService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let period_id = path.into_inner();
    service.delete_period(auth.organization_id, period_id).await?;
    tracing::info!(period_id, user_id = auth.user_id, "Payroll period deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Payroll period deleted"
    })))
}
