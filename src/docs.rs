use crate::api::compensation::BulkCompensationRequest;
use crate::api::payroll::{ComputePayrollRequest, PayrollWindowRequest, RecomputeRequest, TransitionRequest};
use crate::api::period::{GeneratePeriodsRequest, PeriodQuery};
use crate::api::policy::ApplicablePolicyQuery;
use crate::engine::batch::{BatchReport, BatchStatus, EmployeeFailure};
use crate::engine::payroll::OvertimeCapMode;
use crate::error::FieldError;
use crate::model::attendance::{AttendanceSummary, HolidayType};
use crate::model::audit::AuditEntry;
use crate::model::compensation::{Allowance, CompensationUpdate};
use crate::model::contribution::ContributionKind;
use crate::model::late_policy::PolicyType;
use crate::model::payroll::{
    DeductionType, EarningType, EmployerContribution, Payroll, PayrollStatus, PayrollWarning, WarningCode,
};
use crate::model::payroll_period::{PayrollPeriod, PeriodStatus, PeriodType};
use crate::model::schedule::WeekdayTag;
use crate::service::{ApplicablePolicies, PolicySummary, RecomputeResult};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Payroll API",
        version = "1.0.0",
        description = r#"
## Payroll computation service

Turns attendance records and date-effective compensation into per-employee
payroll records for an organization.

### Key Features
- **Payroll**
  - Compute or preview a payroll, move it through DRAFT, COMPUTED, APPROVED and RELEASED, or void it
  - Recompute a whole window atomically, or run it in the background with progress and cancellation
- **Periods**
  - Generate monthly, semi-monthly, bi-weekly and weekly windows with pay dates
- **Policies**
  - Look up the late and undertime deduction policies in force
- **Compensation**
  - Apply audited bulk pay-rate changes from an effective date
- **Attendance**
  - Check-in, check-out and breaks

### Security
Every endpoint requires a **JWT Bearer** access token. Requests are scoped to
the token's organization; approvals and bulk operations are limited to HR and Admin.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::payroll::compute_payroll,
        crate::api::payroll::get_payroll,
        crate::api::payroll::transition_payroll,
        crate::api::payroll::recompute_payrolls,
        crate::api::payroll::start_batch,
        crate::api::payroll::batch_status,
        crate::api::payroll::cancel_batch,

        crate::api::period::generate_periods,
        crate::api::period::list_periods,
        crate::api::period::delete_period,

        crate::api::policy::applicable_policies,

        crate::api::compensation::bulk_update,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::start_break,
        crate::api::attendance::end_break
    ),
    components(
        schemas(
            ComputePayrollRequest,
            TransitionRequest,
            PayrollWindowRequest,
            RecomputeRequest,
            RecomputeResult,
            Payroll,
            PayrollStatus,
            PayrollWarning,
            WarningCode,
            EarningType,
            DeductionType,
            EmployerContribution,
            ContributionKind,
            AttendanceSummary,
            HolidayType,
            OvertimeCapMode,
            BatchReport,
            BatchStatus,
            EmployeeFailure,
            GeneratePeriodsRequest,
            PeriodQuery,
            PayrollPeriod,
            PeriodType,
            PeriodStatus,
            WeekdayTag,
            ApplicablePolicyQuery,
            ApplicablePolicies,
            PolicySummary,
            PolicyType,
            BulkCompensationRequest,
            CompensationUpdate,
            Allowance,
            AuditEntry,
            FieldError
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Payroll", description = "Payroll computation and lifecycle APIs"),
        (name = "Period", description = "Payroll period APIs"),
        (name = "Policy", description = "Deduction policy lookup APIs"),
        (name = "Compensation", description = "Compensation change APIs"),
        (name = "Attendance", description = "Attendance tracking APIs"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/payroll/compute",
            "/api/payroll/{id}/status",
            "/api/payroll/batch/{run_id}/cancel",
            "/api/periods/generate",
            "/api/policies/applicable",
            "/api/compensation/bulk-update",
            "/api/attendance/break",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} is not documented");
        }
        assert!(doc.components.unwrap().security_schemes.contains_key("bearer_auth"));
    }
}
