//! In-memory repository used by the service tests.

use std::sync::{Mutex, PoisonError};

use chrono::{NaiveDate, NaiveDateTime};

use super::PayrollRepository;
use crate::error::{AppError, AppResult};
use crate::model::attendance::{Holiday, TimeBreak, TimeEntry, TimeEntryStatus};
use crate::model::audit::AuditEntry;
use crate::model::compensation::{Compensation, CompensationRevision};
use crate::model::contribution::ContributionTier;
use crate::model::employee::Employee;
use crate::model::late_policy::LateDeductionPolicy;
use crate::model::leave_request::LeaveRequest;
use crate::model::payroll::{Payroll, PayrollStatus};
use crate::model::payroll_period::{NewPayrollPeriod, PayrollPeriod, PeriodStatus};

#[derive(Debug, Default)]
pub struct State {
    pub employees: Vec<Employee>,
    pub compensations: Vec<Compensation>,
    pub entries: Vec<TimeEntry>,
    pub leaves: Vec<LeaveRequest>,
    pub policies: Vec<LateDeductionPolicy>,
    pub tiers: Vec<ContributionTier>,
    pub holidays: Vec<Holiday>,
    pub periods: Vec<PayrollPeriod>,
    pub payrolls: Vec<Payroll>,
    pub audits: Vec<AuditEntry>,
    /// Any write touching this employee fails, to exercise rollbacks.
    pub fail_writes_for: Option<u64>,
    /// Number of organization table loads, for cache assertions.
    pub rule_loads: usize,
    pub(crate) next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        1000 + self.next_id
    }

    fn check_writable(&self, employee_id: u64) -> AppResult<()> {
        if self.fail_writes_for == Some(employee_id) {
            return Err(AppError::Internal(format!("simulated write failure for employee {employee_id}")));
        }
        Ok(())
    }

    /// Validates a payroll write without applying it.
    fn check_payroll(&self, payroll: &Payroll) -> AppResult<()> {
        self.check_writable(payroll.employee_id)?;
        let Some(id) = payroll.id else {
            let taken = self.payrolls.iter().any(|p| {
                p.organization_id == payroll.organization_id
                    && p.employee_id == payroll.employee_id
                    && (p.period_start, p.period_end) == (payroll.period_start, payroll.period_end)
                    && p.status != PayrollStatus::Voided
            });
            if taken {
                return Err(AppError::StateConflict(format!(
                    "a payroll for employee {} from {} to {} already exists",
                    payroll.employee_id, payroll.period_start, payroll.period_end
                )));
            }
            return Ok(());
        };
        let stored = self
            .payrolls
            .iter()
            .find(|p| p.id == Some(id))
            .ok_or_else(|| AppError::NotFound(format!("payroll {id}")))?;
        if !stored.status.is_editable() {
            return Err(AppError::StateConflict(format!("payroll {id} is {}", stored.status)));
        }
        Ok(())
    }

    fn write_payroll(&mut self, payroll: &Payroll) -> u64 {
        let mut stored = payroll.clone();
        match payroll.id {
            Some(id) => {
                if let Some(slot) = self.payrolls.iter_mut().find(|p| p.id == Some(id)) {
                    *slot = stored;
                }
                id
            }
            None => {
                let id = self.next_id();
                stored.id = Some(id);
                self.payrolls.push(stored);
                id
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new(state: State) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl PayrollRepository for MemoryRepository {
    async fn find_employee(&self, organization_id: u64, employee_id: u64) -> AppResult<Option<Employee>> {
        Ok(self.with(|s| {
            s.employees
                .iter()
                .find(|e| e.id == employee_id && e.organization_id == organization_id)
                .cloned()
        }))
    }

    async fn list_active_employees(&self, organization_id: u64, department_id: Option<u64>) -> AppResult<Vec<Employee>> {
        Ok(self.with(|s| {
            s.employees
                .iter()
                .filter(|e| e.organization_id == organization_id && e.is_active())
                .filter(|e| department_id.is_none() || e.department_id == department_id)
                .cloned()
                .collect()
        }))
    }

    async fn list_compensations(&self, employee_id: u64) -> AppResult<Vec<Compensation>> {
        Ok(self.with(|s| {
            s.compensations
                .iter()
                .filter(|c| c.employee_id == employee_id)
                .cloned()
                .collect()
        }))
    }

    async fn list_time_entries(&self, employee_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<TimeEntry>> {
        Ok(self.with(|s| {
            s.entries
                .iter()
                .filter(|e| e.employee_id == employee_id && start <= e.work_date && e.work_date <= end)
                .cloned()
                .collect()
        }))
    }

    async fn list_leaves(&self, employee_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<LeaveRequest>> {
        Ok(self.with(|s| {
            s.leaves
                .iter()
                .filter(|l| l.employee_id == employee_id && l.start_date <= end && start <= l.end_date)
                .cloned()
                .collect()
        }))
    }

    async fn list_policies(&self, organization_id: u64) -> AppResult<Vec<LateDeductionPolicy>> {
        Ok(self.with(|s| {
            s.rule_loads += 1;
            s.policies
                .iter()
                .filter(|p| p.organization_id == organization_id)
                .cloned()
                .collect()
        }))
    }

    async fn list_tiers(&self, organization_id: u64) -> AppResult<Vec<ContributionTier>> {
        Ok(self.with(|s| {
            s.tiers
                .iter()
                .filter(|t| t.organization_id == organization_id)
                .cloned()
                .collect()
        }))
    }

    async fn list_holidays(&self, organization_id: u64) -> AppResult<Vec<Holiday>> {
        Ok(self.with(|s| {
            s.holidays
                .iter()
                .filter(|h| h.organization_id == organization_id)
                .cloned()
                .collect()
        }))
    }

    async fn list_periods(&self, organization_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<PayrollPeriod>> {
        Ok(self.with(|s| {
            let mut periods: Vec<PayrollPeriod> = s
                .periods
                .iter()
                .filter(|p| p.organization_id == organization_id && p.start_date <= end && start <= p.end_date)
                .cloned()
                .collect();
            periods.sort_by_key(|p| p.start_date);
            periods
        }))
    }

    async fn find_period(&self, organization_id: u64, period_id: u64) -> AppResult<Option<PayrollPeriod>> {
        Ok(self.with(|s| {
            s.periods
                .iter()
                .find(|p| p.id == period_id && p.organization_id == organization_id)
                .cloned()
        }))
    }

    async fn upsert_periods(&self, periods: &[NewPayrollPeriod]) -> AppResult<Vec<PayrollPeriod>> {
        Ok(self.with(|s| {
            let mut stored = Vec::with_capacity(periods.len());
            for period in periods {
                let existing = s.periods.iter().find(|p| {
                    p.organization_id == period.organization_id
                        && p.start_date == period.start_date
                        && p.end_date == period.end_date
                });
                let row = match existing {
                    Some(row) => row.clone(),
                    None => {
                        let row = PayrollPeriod {
                            id: s.next_id(),
                            organization_id: period.organization_id,
                            period_type: period.period_type,
                            status: PeriodStatus::Pending,
                            start_date: period.start_date,
                            end_date: period.end_date,
                            pay_date: period.pay_date,
                            year: period.year(),
                            month: period.month(),
                            period_number: period.period_number(),
                        };
                        s.periods.push(row.clone());
                        row
                    }
                };
                stored.push(row);
            }
            stored
        }))
    }

    async fn delete_period(&self, organization_id: u64, period_id: u64) -> AppResult<()> {
        self.with(|s| {
            if !s
                .periods
                .iter()
                .any(|p| p.id == period_id && p.organization_id == organization_id)
            {
                return Err(AppError::NotFound(format!("payroll period {period_id}")));
            }
            let active = s
                .payrolls
                .iter()
                .filter(|p| p.period_id == Some(period_id) && p.status != PayrollStatus::Voided)
                .count();
            if active > 0 {
                return Err(AppError::StateConflict(format!(
                    "period {period_id} is referenced by {active} payroll(s)"
                )));
            }
            for payroll in s.payrolls.iter_mut().filter(|p| p.period_id == Some(period_id)) {
                payroll.period_id = None;
            }
            s.periods.retain(|p| p.id != period_id);
            Ok(())
        })
    }

    async fn find_payroll(&self, organization_id: u64, payroll_id: u64) -> AppResult<Option<Payroll>> {
        Ok(self.with(|s| {
            s.payrolls
                .iter()
                .find(|p| p.id == Some(payroll_id) && p.organization_id == organization_id)
                .cloned()
        }))
    }

    async fn find_active_payroll(
        &self,
        organization_id: u64,
        employee_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Option<Payroll>> {
        Ok(self.with(|s| {
            s.payrolls
                .iter()
                .filter(|p| {
                    p.organization_id == organization_id
                        && p.employee_id == employee_id
                        && p.period_start == start
                        && p.period_end == end
                        && p.status != PayrollStatus::Voided
                })
                .max_by_key(|p| p.id)
                .cloned()
        }))
    }

    async fn save_payroll(&self, payroll: &Payroll) -> AppResult<u64> {
        self.with(|s| {
            s.check_payroll(payroll)?;
            Ok(s.write_payroll(payroll))
        })
    }

    async fn save_payrolls(&self, payrolls: &[Payroll], audit: &AuditEntry) -> AppResult<Vec<u64>> {
        self.with(|s| {
            for payroll in payrolls {
                s.check_payroll(payroll)?;
            }
            let ids = payrolls.iter().map(|p| s.write_payroll(p)).collect();
            s.audits.push(audit.clone());
            Ok(ids)
        })
    }

    async fn update_payroll_status(
        &self,
        organization_id: u64,
        payroll_id: u64,
        expected: PayrollStatus,
        target: PayrollStatus,
        void_reason: Option<&str>,
    ) -> AppResult<bool> {
        Ok(self.with(|s| {
            let Some(payroll) = s.payrolls.iter_mut().find(|p| {
                p.id == Some(payroll_id) && p.organization_id == organization_id && p.status == expected
            }) else {
                return false;
            };
            payroll.status = target;
            if let Some(reason) = void_reason {
                payroll.void_reason = Some(reason.to_string());
            }
            true
        }))
    }

    async fn apply_compensation_revisions(&self, revisions: &[CompensationRevision], audit: &AuditEntry) -> AppResult<()> {
        self.with(|s| {
            for revision in revisions {
                let (CompensationRevision::Replace(next) | CompensationRevision::Supersede { next, .. }) = revision;
                s.check_writable(next.employee_id)?;
            }
            for revision in revisions {
                match revision {
                    CompensationRevision::Replace(next) => {
                        if let Some(slot) = s.compensations.iter_mut().find(|c| c.id == next.id) {
                            *slot = next.clone();
                        }
                    }
                    CompensationRevision::Supersede {
                        closed_id,
                        closed_end,
                        next,
                    } => {
                        if let Some(slot) = s.compensations.iter_mut().find(|c| c.id == *closed_id) {
                            slot.end_date = Some(*closed_end);
                        }
                        let mut next = next.clone();
                        next.id = s.next_id();
                        s.compensations.push(next);
                    }
                }
            }
            s.audits.push(audit.clone());
            Ok(())
        })
    }

    async fn find_open_entry(&self, employee_id: u64) -> AppResult<Option<TimeEntry>> {
        Ok(self.with(|s| {
            s.entries
                .iter()
                .find(|e| e.employee_id == employee_id && e.status == TimeEntryStatus::Open)
                .cloned()
        }))
    }

    async fn insert_entry(&self, employee_id: u64, work_date: NaiveDate, clock_in_at: NaiveDateTime) -> AppResult<TimeEntry> {
        self.with(|s| {
            if s
                .entries
                .iter()
                .any(|e| e.employee_id == employee_id && e.status == TimeEntryStatus::Open)
            {
                return Err(AppError::StateConflict("employee already has an open time entry".into()));
            }
            let entry = TimeEntry {
                id: s.next_id(),
                employee_id,
                work_date,
                clock_in_at,
                clock_out_at: None,
                total_work_minutes: None,
                status: TimeEntryStatus::Open,
                breaks: Vec::new(),
            };
            s.entries.push(entry.clone());
            Ok(entry)
        })
    }

    async fn close_entry(&self, entry_id: u64, clock_out_at: NaiveDateTime, total_work_minutes: i64) -> AppResult<()> {
        self.with(|s| {
            let entry = s
                .entries
                .iter_mut()
                .find(|e| e.id == entry_id && e.status == TimeEntryStatus::Open)
                .ok_or_else(|| AppError::StateConflict(format!("time entry {entry_id} is not open")))?;
            for b in entry.breaks.iter_mut().filter(|b| b.end_at.is_none()) {
                b.end_at = Some(clock_out_at);
            }
            entry.clock_out_at = Some(clock_out_at);
            entry.total_work_minutes = Some(total_work_minutes);
            entry.status = TimeEntryStatus::Closed;
            Ok(())
        })
    }

    async fn start_break(&self, entry_id: u64, start_at: NaiveDateTime) -> AppResult<TimeBreak> {
        self.with(|s| {
            let id = s.next_id();
            let entry = s
                .entries
                .iter_mut()
                .find(|e| e.id == entry_id)
                .ok_or_else(|| AppError::NotFound(format!("time entry {entry_id}")))?;
            let time_break = TimeBreak {
                id,
                start_at,
                end_at: None,
            };
            entry.breaks.push(time_break.clone());
            Ok(time_break)
        })
    }

    async fn end_break(&self, break_id: u64, end_at: NaiveDateTime) -> AppResult<()> {
        self.with(|s| {
            let running = s
                .entries
                .iter_mut()
                .flat_map(|e| e.breaks.iter_mut())
                .find(|b| b.id == break_id && b.end_at.is_none())
                .ok_or_else(|| AppError::StateConflict(format!("break {break_id} is not running")))?;
            running.end_at = Some(end_at);
            Ok(())
        })
    }
}
