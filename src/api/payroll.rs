use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::engine::batch::BatchReport;
use crate::engine::payroll::PayrollWindow;
use crate::model::payroll::{Payroll, PayrollStatus};
use crate::service::{AppService, ComputeOptions, RecomputeResult};

fn default_persist() -> bool {
    true
}

#[derive(Deserialize, ToSchema)]
pub struct ComputePayrollRequest {
    #[schema(example = 1001)]
    pub employee_id: u64,

    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,

    #[schema(example = "2026-01-15", value_type = String, format = "date")]
    pub period_end: NaiveDate,

    /// `false` returns a DRAFT preview without writing anything
    #[serde(default = "default_persist")]
    #[schema(example = true)]
    pub persist_data: bool,

    #[schema(example = 10)]
    pub department_id: Option<u64>,

    #[schema(example = 12)]
    pub period_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct TransitionRequest {
    #[schema(example = "APPROVED")]
    pub status: PayrollStatus,

    /// Required when voiding
    #[schema(example = "Duplicate payout")]
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct PayrollWindowRequest {
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,

    #[schema(example = "2026-01-15", value_type = String, format = "date")]
    pub period_end: NaiveDate,

    #[schema(example = 10)]
    pub department_id: Option<u64>,

    #[schema(example = 12)]
    pub period_id: Option<u64>,
}

impl PayrollWindowRequest {
    fn window(&self, organization_id: u64) -> PayrollWindow {
        PayrollWindow {
            organization_id,
            period_id: self.period_id,
            department_id: self.department_id,
            start: self.period_start,
            end: self.period_end,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RecomputeRequest {
    #[serde(flatten)]
    pub window: PayrollWindowRequest,

    #[schema(example = "Attendance corrections for January")]
    pub reason: String,
}

/// Compute (or preview) one employee's payroll
#[utoipa::path(
    post,
    path = "/api/payroll/compute",
    request_body = ComputePayrollRequest,
    responses(
        (status = 200, description = "Computed payroll", body = Payroll),
        (status = 400, description = "Invalid window"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Stored payroll is no longer editable"),
        (status = 422, description = "No compensation in force for the window")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll"
)]
pub async fn compute_payroll(
    auth: AuthUser,
    service: web::Data<AppService>,
    body: web::Json<ComputePayrollRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_payroll_access()?;
    let options = ComputeOptions {
        persist_data: body.persist_data,
        department_id: body.department_id,
        period_id: body.period_id,
    };

    let payroll = service
        .compute_payroll(
            auth.organization_id,
            body.employee_id,
            body.period_start,
            body.period_end,
            options,
        )
        .await?;

    Ok(HttpResponse::Ok().json(payroll))
}

/// Get payroll by ID
#[utoipa::path(
    get,
    path = "/api/payroll/{id}",
    params(
        ("id" = u64, Path, description = "Payroll ID")
    ),
    responses(
        (status = 200, description = "Payroll found", body = Payroll),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Payroll not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll"
)]
pub async fn get_payroll(
    auth: AuthUser,
    service: web::Data<AppService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let payroll = service.get_payroll(auth.organization_id, path.into_inner()).await?;

    // Employees may only read their own payslips
    if !auth.role.can_process_payroll() && auth.employee_id != Some(payroll.employee_id) {
        return Err(actix_web::error::ErrorForbidden("Access denied"));
    }

    Ok(HttpResponse::Ok().json(payroll))
}

/// Move a payroll to another status
#[utoipa::path(
    put,
    path = "/api/payroll/{id}/status",
    params(
        ("id" = u64, Path, description = "Payroll ID")
    ),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Status changed", body = Payroll),
        (status = 400, description = "Void reason missing"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Payroll not found"),
        (status = 409, description = "Transition not allowed or record changed concurrently")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll"
)]
pub async fn transition_payroll(
    auth: AuthUser,
    service: web::Data<AppService>,
    path: web::Path<u64>,
    body: web::Json<TransitionRequest>,
) -> actix_web::Result<impl Responder> {
    if body.status == PayrollStatus::Computed {
        auth.require_payroll_access()?;
    } else {
        auth.require_hr_or_admin()?;
    }

    let payroll = service
        .transition_payroll(
            auth.organization_id,
            path.into_inner(),
            body.status,
            body.reason.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(payroll))
}

/// Recompute every active employee of a window atomically
#[utoipa::path(
    post,
    path = "/api/payroll/recompute",
    request_body = RecomputeRequest,
    responses(
        (status = 200, description = "All payrolls saved", body = RecomputeResult),
        (status = 400, description = "Reason missing"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "A payroll in the window is no longer editable"),
        (status = 422, description = "An employee has no compensation in force")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll"
)]
pub async fn recompute_payrolls(
    auth: AuthUser,
    service: web::Data<AppService>,
    body: web::Json<RecomputeRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let result = service
        .bulk_recompute(
            auth.organization_id,
            auth.user_id,
            body.window.window(auth.organization_id),
            &body.reason,
        )
        .await?;

    Ok(HttpResponse::Ok().json(result))
}

/// Start a background payroll run
#[utoipa::path(
    post,
    path = "/api/payroll/batch",
    request_body = PayrollWindowRequest,
    responses(
        (status = 202, description = "Run started", body = BatchReport),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll"
)]
pub async fn start_batch(
    auth: AuthUser,
    service: web::Data<AppService>,
    body: web::Json<PayrollWindowRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let report = service.start_batch(body.window(auth.organization_id)).await?;

    Ok(HttpResponse::Accepted().json(report))
}

/// Progress of a background payroll run
#[utoipa::path(
    get,
    path = "/api/payroll/batch/{run_id}",
    params(
        ("run_id" = String, Path, description = "Run ID returned when the run started")
    ),
    responses(
        (status = 200, description = "Current report", body = BatchReport),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown run")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll"
)]
pub async fn batch_status(
    auth: AuthUser,
    service: web::Data<AppService>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    auth.require_payroll_access()?;

    let report = service.batch_status(auth.organization_id, path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(report))
}

/// Stop scheduling further employees of a run
#[utoipa::path(
    post,
    path = "/api/payroll/batch/{run_id}/cancel",
    params(
        ("run_id" = String, Path, description = "Run ID returned when the run started")
    ),
    responses(
        (status = 200, description = "Cancellation requested", body = BatchReport),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown run")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Payroll"
)]
pub async fn cancel_batch(
    auth: AuthUser,
    service: web::Data<AppService>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let report = service.cancel_batch(auth.organization_id, path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(report))
}
