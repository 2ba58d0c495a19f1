use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDateTime};
use serde_json::json;

use crate::auth::auth::AuthUser;
use crate::service::AppService;

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    responses(
        (status = 200, description = "Checked in successfully", body = Object, example = json!({
            "message": "Checked in successfully",
            "entry_id": 501
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Already checked in", body = Object, example = json!({
            "message": "state conflict: employee already has an open time entry"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(auth: AuthUser, service: web::Data<AppService>) -> actix_web::Result<impl Responder> {
    let employee_id = auth.employee_id()?;

    let entry = service.clock_in(employee_id, now()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Checked in successfully",
        "entry_id": entry.id
    })))
}

/// Check-out endpoint
#[utoipa::path(
    put,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = Object, example = json!({
            "message": "Checked out successfully",
            "total_work_minutes": 480
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "No open time entry", body = Object, example = json!({
            "message": "state conflict: no open time entry"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(auth: AuthUser, service: web::Data<AppService>) -> actix_web::Result<impl Responder> {
    let employee_id = auth.employee_id()?;

    let entry = service.clock_out(employee_id, now()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Checked out successfully",
        "total_work_minutes": entry.total_work_minutes
    })))
}

/// Start a break on the open time entry
#[utoipa::path(
    post,
    path = "/api/attendance/break",
    responses(
        (status = 200, description = "Break started", body = Object, example = json!({
            "message": "Break started",
            "break_id": 77
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "No open entry or a break is already running")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn start_break(auth: AuthUser, service: web::Data<AppService>) -> actix_web::Result<impl Responder> {
    let employee_id = auth.employee_id()?;

    let started = service.start_break(employee_id, now()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Break started",
        "break_id": started.id
    })))
}

/// End the running break
#[utoipa::path(
    put,
    path = "/api/attendance/break",
    responses(
        (status = 200, description = "Break ended", body = Object, example = json!({
            "message": "Break ended"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "No break is running")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn end_break(auth: AuthUser, service: web::Data<AppService>) -> actix_web::Result<impl Responder> {
    let employee_id = auth.employee_id()?;

    service.end_break(employee_id, now()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Break ended"
    })))
}
