//! Persistence boundary of the payroll service.
//!
//! Reads are plain lookups; every write that touches more than one row runs
//! in a single transaction inside the implementation.

pub mod mysql;

#[cfg(test)]
pub mod memory;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::AppResult;
use crate::model::attendance::{Holiday, TimeBreak, TimeEntry};
use crate::model::audit::AuditEntry;
use crate::model::compensation::{Compensation, CompensationRevision};
use crate::model::contribution::ContributionTier;
use crate::model::employee::Employee;
use crate::model::late_policy::LateDeductionPolicy;
use crate::model::leave_request::LeaveRequest;
use crate::model::payroll::{Payroll, PayrollStatus};
use crate::model::payroll_period::{NewPayrollPeriod, PayrollPeriod};

pub use mysql::MySqlRepository;

#[allow(async_fn_in_trait)]
pub trait PayrollRepository {
    async fn find_employee(&self, organization_id: u64, employee_id: u64) -> AppResult<Option<Employee>>;

    async fn list_active_employees(
        &self,
        organization_id: u64,
        department_id: Option<u64>,
    ) -> AppResult<Vec<Employee>>;

    /// Full compensation history of one employee.
    async fn list_compensations(&self, employee_id: u64) -> AppResult<Vec<Compensation>>;

    /// Entries whose `work_date` falls in `[start, end]`, breaks included.
    async fn list_time_entries(&self, employee_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<TimeEntry>>;

    async fn list_leaves(&self, employee_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<LeaveRequest>>;

    async fn list_policies(&self, organization_id: u64) -> AppResult<Vec<LateDeductionPolicy>>;

    async fn list_tiers(&self, organization_id: u64) -> AppResult<Vec<ContributionTier>>;

    async fn list_holidays(&self, organization_id: u64) -> AppResult<Vec<Holiday>>;

    /// Periods overlapping `[start, end]`, ordered by start date.
    async fn list_periods(&self, organization_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<PayrollPeriod>>;

    async fn find_period(&self, organization_id: u64, period_id: u64) -> AppResult<Option<PayrollPeriod>>;

    /// Inserts the windows that do not exist yet, keyed on
    /// (organization, start, end), and returns every window's stored row.
    async fn upsert_periods(&self, periods: &[NewPayrollPeriod]) -> AppResult<Vec<PayrollPeriod>>;

    /// Deletes a period unless a non-voided payroll references it; returns
    /// `StateConflict` in that case.
    async fn delete_period(&self, organization_id: u64, period_id: u64) -> AppResult<()>;

    async fn find_payroll(&self, organization_id: u64, payroll_id: u64) -> AppResult<Option<Payroll>>;

    /// Latest non-voided payroll for the employee and exact window.
    async fn find_active_payroll(
        &self,
        organization_id: u64,
        employee_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Option<Payroll>>;

    /// Inserts (no id) or rewrites (id set, still editable) a payroll with
    /// its line items. Returns the id.
    async fn save_payroll(&self, payroll: &Payroll) -> AppResult<u64>;

    /// All-or-nothing variant of [`save_payroll`](Self::save_payroll) that
    /// also writes the audit entry.
    async fn save_payrolls(&self, payrolls: &[Payroll], audit: &AuditEntry) -> AppResult<Vec<u64>>;

    /// Compare-and-set on the stored status. `false` when the row was not
    /// in `expected` any more.
    async fn update_payroll_status(
        &self,
        organization_id: u64,
        payroll_id: u64,
        expected: PayrollStatus,
        target: PayrollStatus,
        void_reason: Option<&str>,
    ) -> AppResult<bool>;

    async fn apply_compensation_revisions(
        &self,
        revisions: &[CompensationRevision],
        audit: &AuditEntry,
    ) -> AppResult<()>;

    async fn find_open_entry(&self, employee_id: u64) -> AppResult<Option<TimeEntry>>;

    /// Fails with `StateConflict` when the employee already has an open entry.
    async fn insert_entry(&self, employee_id: u64, work_date: NaiveDate, clock_in_at: NaiveDateTime) -> AppResult<TimeEntry>;

    async fn close_entry(&self, entry_id: u64, clock_out_at: NaiveDateTime, total_work_minutes: i64) -> AppResult<()>;

    async fn start_break(&self, entry_id: u64, start_at: NaiveDateTime) -> AppResult<TimeBreak>;

    async fn end_break(&self, break_id: u64, end_at: NaiveDateTime) -> AppResult<()>;
}
