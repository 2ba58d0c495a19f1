//! Payroll operations exposed over HTTP. Each call loads what the engine
//! needs from the repository, runs the pure computation and writes the
//! outcome back.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use futures::stream::{self, StreamExt, TryStreamExt};
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::engine::attendance::entry_work_minutes;
use crate::engine::batch::{BatchReport, BatchRun, fan_out};
use crate::engine::late_policy::select_policy;
use crate::engine::payroll::{self, EmployeeInputs, OrganizationRules, PayrollSettings, PayrollWindow};
use crate::engine::periods::{PeriodRequest, generate_periods};
use crate::engine::schedule::resolve_compensation;
use crate::error::{AppError, AppResult, FieldError};
use crate::model::attendance::{TimeBreak, TimeEntry, TimeEntryStatus};
use crate::model::audit::AuditEntry;
use crate::model::compensation::CompensationUpdate;
use crate::model::employee::Employee;
use crate::model::late_policy::{DeductionMethod, LateDeductionPolicy, PolicyType};
use crate::model::payroll::{Payroll, PayrollStatus};
use crate::model::payroll_period::{PayrollPeriod, PeriodStatus};
use crate::repository::{MySqlRepository, PayrollRepository};

/// The service wired to the production database.
pub type AppService = PayrollService<MySqlRepository>;

const BATCH_REGISTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComputeOptions {
    /// `false` returns a side-effect free `DRAFT` preview.
    pub persist_data: bool,
    pub department_id: Option<u64>,
    pub period_id: Option<u64>,
}

/// Flattened view of a deduction policy.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PolicySummary {
    pub id: u64,
    pub name: String,
    pub policy_type: PolicyType,
    #[schema(example = "FIXED_AMOUNT")]
    pub deduction_method: String,
    #[schema(example = "100.00")]
    pub value: Decimal,
    pub grace_period_minutes: i64,
    pub minimum_late_minutes: i64,
    pub max_deduction_per_day: Option<Decimal>,
    pub max_deduction_per_cutoff: Option<Decimal>,
    #[schema(value_type = String, format = "date")]
    pub effective_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
}

impl From<&LateDeductionPolicy> for PolicySummary {
    fn from(policy: &LateDeductionPolicy) -> Self {
        let (deduction_method, value) = match policy.method {
            DeductionMethod::FixedAmount(v) => ("FIXED_AMOUNT", v),
            DeductionMethod::Percentage(v) => ("PERCENTAGE", v),
            DeductionMethod::HourlyRate(v) => ("HOURLY_RATE", v),
        };
        Self {
            id: policy.id,
            name: policy.name.clone(),
            policy_type: policy.policy_type,
            deduction_method: deduction_method.to_string(),
            value,
            grace_period_minutes: policy.grace_period_minutes,
            minimum_late_minutes: policy.minimum_late_minutes,
            max_deduction_per_day: policy.max_deduction_per_day,
            max_deduction_per_cutoff: policy.max_deduction_per_cutoff,
            effective_date: policy.effective_date,
            end_date: policy.end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ApplicablePolicies {
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub late: Option<PolicySummary>,
    pub undertime: Option<PolicySummary>,
    /// Policy types where more than one policy shared the winning date.
    pub ambiguous: Vec<PolicyType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RecomputeResult {
    pub audit: AuditEntry,
    pub payroll_ids: Vec<u64>,
}

pub struct PayrollService<R> {
    repo: Arc<R>,
    settings: PayrollSettings,
    max_concurrency: usize,
    rules: Cache<u64, Arc<OrganizationRules>>,
    batches: Cache<Uuid, (u64, Arc<BatchRun>)>,
}

impl<R> Clone for PayrollService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            settings: self.settings,
            max_concurrency: self.max_concurrency,
            rules: self.rules.clone(),
            batches: self.batches.clone(),
        }
    }
}

impl<R: PayrollRepository + 'static> PayrollService<R> {
    pub fn new(repo: R, settings: PayrollSettings, max_concurrency: usize, rules_ttl: Duration) -> Self {
        Self {
            repo: Arc::new(repo),
            settings,
            max_concurrency: max_concurrency.max(1),
            rules: Cache::builder().max_capacity(1_000).time_to_live(rules_ttl).build(),
            batches: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(BATCH_REGISTRY_TTL)
                .build(),
        }
    }

    #[cfg(test)]
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Policies, tiers and holidays of one organization, cached.
    async fn organization_rules(&self, organization_id: u64) -> AppResult<Arc<OrganizationRules>> {
        if let Some(rules) = self.rules.get(&organization_id).await {
            return Ok(rules);
        }
        let policies = self.repo.list_policies(organization_id).await?;
        for policy in &policies {
            policy.validate().inspect_err(|_| {
                tracing::warn!(organization_id, policy_id = policy.id, "Invalid deduction policy");
            })?;
        }
        let rules = Arc::new(OrganizationRules {
            policies,
            tiers: self.repo.list_tiers(organization_id).await?,
            holidays: self.repo.list_holidays(organization_id).await?,
        });
        self.rules.insert(organization_id, Arc::clone(&rules)).await;
        Ok(rules)
    }

    /// A window tied to a period must be that period's window.
    async fn check_period(&self, window: &PayrollWindow) -> AppResult<()> {
        let Some(period_id) = window.period_id else {
            return Ok(());
        };
        let period = self
            .repo
            .find_period(window.organization_id, period_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payroll period {period_id}")))?;
        if period.status == PeriodStatus::Cancelled {
            return Err(AppError::field("period_id", format!("period {period_id} is cancelled")));
        }
        if (period.start_date, period.end_date) != (window.start, window.end) {
            return Err(AppError::field(
                "period_id",
                format!(
                    "period {period_id} runs {} to {}, not {} to {}",
                    period.start_date, period.end_date, window.start, window.end
                ),
            ));
        }
        Ok(())
    }

    async fn employee(&self, organization_id: u64, employee_id: u64) -> AppResult<Employee> {
        self.repo
            .find_employee(organization_id, employee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("employee {employee_id}")))
    }

    async fn draft(&self, window: &PayrollWindow, rules: &OrganizationRules, employee: &Employee) -> AppResult<Payroll> {
        let compensations = self.repo.list_compensations(employee.id).await?;
        let entries = self.repo.list_time_entries(employee.id, window.start, window.end).await?;
        let leaves = self.repo.list_leaves(employee.id, window.start, window.end).await?;
        let inputs = EmployeeInputs {
            employee,
            compensations: &compensations,
            entries: &entries,
            leaves: &leaves,
        };
        payroll::compute_payroll(window, rules, inputs, &self.settings)
    }

    /// Marks a draft `COMPUTED`, taking over the id of the editable record
    /// already stored for the same window.
    async fn prepare_for_save(&self, mut payroll: Payroll) -> AppResult<Payroll> {
        let existing = self
            .repo
            .find_active_payroll(
                payroll.organization_id,
                payroll.employee_id,
                payroll.period_start,
                payroll.period_end,
            )
            .await?;
        if let Some(existing) = existing {
            if !existing.status.is_editable() {
                return Err(AppError::StateConflict(format!(
                    "payroll {} is {} and cannot be recomputed",
                    existing.id.unwrap_or_default(),
                    existing.status
                )));
            }
            payroll.id = existing.id;
        }
        payroll.status = PayrollStatus::Computed;
        Ok(payroll)
    }

    async fn compute_and_save(&self, window: PayrollWindow, rules: &OrganizationRules, employee_id: u64) -> AppResult<u64> {
        let employee = self.employee(window.organization_id, employee_id).await?;
        let window = PayrollWindow {
            department_id: window.department_id.or(employee.department_id),
            ..window
        };
        let draft = self.draft(&window, rules, &employee).await?;
        let payroll = self.prepare_for_save(draft).await?;
        self.repo.save_payroll(&payroll).await
    }

    pub async fn compute_payroll(
        &self,
        organization_id: u64,
        employee_id: u64,
        period_start: NaiveDate,
        period_end: NaiveDate,
        options: ComputeOptions,
    ) -> AppResult<Payroll> {
        let employee = self.employee(organization_id, employee_id).await?;
        let rules = self.organization_rules(organization_id).await?;
        let window = PayrollWindow {
            organization_id,
            period_id: options.period_id,
            department_id: options.department_id.or(employee.department_id),
            start: period_start,
            end: period_end,
        };
        self.check_period(&window).await?;
        let draft = self.draft(&window, &rules, &employee).await?;
        if !options.persist_data {
            return Ok(draft);
        }

        let mut payroll = self.prepare_for_save(draft).await?;
        let id = self.repo.save_payroll(&payroll).await?;
        payroll.id = Some(id);
        tracing::info!(payroll_id = id, employee_id, net_pay = %payroll.net_pay, "Payroll saved");
        Ok(payroll)
    }

    pub async fn get_payroll(&self, organization_id: u64, payroll_id: u64) -> AppResult<Payroll> {
        self.repo
            .find_payroll(organization_id, payroll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payroll {payroll_id}")))
    }

    pub async fn get_applicable_policies(
        &self,
        organization_id: u64,
        employee_id: u64,
        date: NaiveDate,
    ) -> AppResult<ApplicablePolicies> {
        self.employee(organization_id, employee_id).await?;
        let rules = self.organization_rules(organization_id).await?;

        let late = select_policy(&rules.policies, organization_id, PolicyType::Late, date);
        let undertime = select_policy(&rules.policies, organization_id, PolicyType::Undertime, date);
        let ambiguous = [(PolicyType::Late, late.ambiguous), (PolicyType::Undertime, undertime.ambiguous)]
            .into_iter()
            .filter_map(|(kind, ambiguous)| ambiguous.then_some(kind))
            .collect();

        Ok(ApplicablePolicies {
            employee_id,
            date,
            late: late.policy.map(PolicySummary::from),
            undertime: undertime.policy.map(PolicySummary::from),
            ambiguous,
        })
    }

    /// Generates and stores the windows of `request`. Re-running the same
    /// request returns the rows already stored.
    pub async fn generate_payroll_periods(&self, request: &PeriodRequest) -> AppResult<Vec<PayrollPeriod>> {
        let generated = generate_periods(request)?;
        let (Some(first), Some(last)) = (generated.first(), generated.last()) else {
            return Ok(Vec::new());
        };

        let existing = self
            .repo
            .list_periods(request.organization_id, first.start_date, last.end_date)
            .await?;
        for window in &generated {
            let clash = existing.iter().find(|p| {
                p.status != PeriodStatus::Cancelled
                    && window.overlaps(p)
                    && (p.start_date, p.end_date) != (window.start_date, window.end_date)
            });
            if let Some(p) = clash {
                return Err(AppError::StateConflict(format!(
                    "{} to {} overlaps period {} ({} to {})",
                    window.start_date, window.end_date, p.id, p.start_date, p.end_date
                )));
            }
        }

        let stored = self.repo.upsert_periods(&generated).await?;
        tracing::info!(
            organization_id = request.organization_id,
            period_type = %request.period_type,
            count = stored.len(),
            "Payroll periods generated"
        );
        Ok(stored)
    }

    pub async fn list_periods(&self, organization_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<PayrollPeriod>> {
        if end < start {
            return Err(AppError::field("end_date", "must not precede start_date"));
        }
        self.repo.list_periods(organization_id, start, end).await
    }

    pub async fn delete_period(&self, organization_id: u64, period_id: u64) -> AppResult<()> {
        self.repo.delete_period(organization_id, period_id).await
    }

    /// Applies every update from `effective_date` onwards in one transaction,
    /// or none of them.
    pub async fn bulk_update_compensation(
        &self,
        organization_id: u64,
        actor_user_id: u64,
        updates: &[CompensationUpdate],
        effective_date: NaiveDate,
        reason: &str,
    ) -> AppResult<AuditEntry> {
        let mut errors = Vec::new();
        if updates.is_empty() {
            errors.push(FieldError::new("updates", "at least one update is required"));
        }
        if reason.trim().is_empty() {
            errors.push(FieldError::new("reason", "must not be blank"));
        }
        let mut seen = HashSet::new();
        for update in updates {
            if !seen.insert(update.employee_id) {
                errors.push(FieldError::new(
                    "updates",
                    format!("employee {} is listed more than once", update.employee_id),
                ));
            }
        }
        AppError::check(errors)?;

        let mut revisions = Vec::with_capacity(updates.len());
        for update in updates {
            self.employee(organization_id, update.employee_id).await?;
            let history = self.repo.list_compensations(update.employee_id).await?;
            let current = resolve_compensation(&history, effective_date).ok_or_else(|| {
                AppError::ConfigurationMissing(format!(
                    "employee {} has no compensation in force on {effective_date}",
                    update.employee_id
                ))
            })?;
            revisions.push(current.revise(effective_date, update)?);
        }

        let audit = AuditEntry::new(
            organization_id,
            actor_user_id,
            "COMPENSATION_BULK_UPDATE",
            reason.trim(),
            revisions.len(),
        );
        self.repo.apply_compensation_revisions(&revisions, &audit).await?;
        tracing::info!(audit_id = %audit.id, count = revisions.len(), "Compensation bulk update applied");
        Ok(audit)
    }

    /// Moves a payroll along its lifecycle. The write only succeeds if the
    /// stored status is still the one the transition was validated against.
    pub async fn transition_payroll(
        &self,
        organization_id: u64,
        payroll_id: u64,
        target: PayrollStatus,
        reason: Option<&str>,
    ) -> AppResult<Payroll> {
        let mut payroll = self.get_payroll(organization_id, payroll_id).await?;
        let from = payroll.status;
        from.transition(target, reason)?;

        let void_reason = (target == PayrollStatus::Voided).then(|| reason.unwrap_or_default().trim());
        let updated = self
            .repo
            .update_payroll_status(organization_id, payroll_id, from, target, void_reason)
            .await?;
        if !updated {
            return Err(AppError::StateConflict(format!(
                "payroll {payroll_id} changed while moving from {from} to {target}"
            )));
        }

        tracing::info!(payroll_id, from = %from, to = %target, "Payroll status changed");
        payroll.status = target;
        if let Some(reason) = void_reason {
            payroll.void_reason = Some(reason.to_string());
        }
        Ok(payroll)
    }

    /// Recomputes every active employee of the window and stores the whole
    /// set atomically with an audit entry. Any failure leaves nothing written.
    pub async fn bulk_recompute(
        &self,
        organization_id: u64,
        actor_user_id: u64,
        window: PayrollWindow,
        reason: &str,
    ) -> AppResult<RecomputeResult> {
        if reason.trim().is_empty() {
            return Err(AppError::field("reason", "must not be blank"));
        }
        let window = PayrollWindow {
            organization_id,
            ..window
        };
        self.check_period(&window).await?;
        let employees = self
            .repo
            .list_active_employees(organization_id, window.department_id)
            .await?;
        let rules = self.organization_rules(organization_id).await?;

        let rules = &rules;
        let payrolls: Vec<Payroll> = stream::iter(employees)
            .map(|employee| async move {
                let window = PayrollWindow {
                    department_id: window.department_id.or(employee.department_id),
                    ..window
                };
                let draft = self.draft(&window, rules, &employee).await?;
                self.prepare_for_save(draft).await
            })
            .buffered(self.max_concurrency.max(1))
            .try_collect()
            .await?;

        let audit = AuditEntry::new(
            organization_id,
            actor_user_id,
            "PAYROLL_BULK_RECOMPUTE",
            reason.trim(),
            payrolls.len(),
        );
        let payroll_ids = self.repo.save_payrolls(&payrolls, &audit).await?;
        tracing::info!(audit_id = %audit.id, count = payroll_ids.len(), "Payroll bulk recompute saved");
        Ok(RecomputeResult { audit, payroll_ids })
    }

    /// Starts a background run over every active employee of the window and
    /// returns its initial report. Each employee is saved independently.
    pub async fn start_batch(&self, window: PayrollWindow) -> AppResult<BatchReport> {
        let organization_id = window.organization_id;
        self.check_period(&window).await?;
        let employee_ids: Vec<u64> = self
            .repo
            .list_active_employees(organization_id, window.department_id)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        let rules = self.organization_rules(organization_id).await?;

        let run = Arc::new(BatchRun::new(employee_ids.len()));
        let run_id = run.id();
        self.batches
            .insert(run_id, (organization_id, Arc::clone(&run)))
            .await;
        tracing::info!(%run_id, organization_id, total = employee_ids.len(), "Payroll batch started");

        let report = run.snapshot();
        let service = self.clone();
        actix_web::rt::spawn(async move {
            let service = &service;
            let rules = &rules;
            fan_out(&run, employee_ids, service.max_concurrency, move |employee_id| {
                service.compute_and_save(window, rules, employee_id)
            })
            .await;
        });
        Ok(report)
    }

    async fn registered_run(&self, organization_id: u64, run_id: Uuid) -> AppResult<Arc<BatchRun>> {
        match self.batches.get(&run_id).await {
            Some((owner, run)) if owner == organization_id => Ok(run),
            _ => Err(AppError::NotFound(format!("batch run {run_id}"))),
        }
    }

    pub async fn batch_status(&self, organization_id: u64, run_id: Uuid) -> AppResult<BatchReport> {
        Ok(self.registered_run(organization_id, run_id).await?.snapshot())
    }

    /// Stops scheduling new employees. Payrolls already saved are kept.
    pub async fn cancel_batch(&self, organization_id: u64, run_id: Uuid) -> AppResult<BatchReport> {
        let run = self.registered_run(organization_id, run_id).await?;
        run.cancel();
        tracing::warn!(%run_id, "Payroll batch cancelled");
        Ok(run.snapshot())
    }

    pub async fn clock_in(&self, employee_id: u64, now: NaiveDateTime) -> AppResult<TimeEntry> {
        self.repo.insert_entry(employee_id, now.date(), now).await
    }

    /// Closes the open entry, ending a running break at the same instant.
    pub async fn clock_out(&self, employee_id: u64, now: NaiveDateTime) -> AppResult<TimeEntry> {
        let mut entry = self.open_entry(employee_id).await?;
        if now < entry.clock_in_at {
            return Err(AppError::field("clock_out_at", "must not precede clock_in_at"));
        }
        for b in entry.breaks.iter_mut().filter(|b| b.end_at.is_none()) {
            b.end_at = Some(now);
        }
        entry.clock_out_at = Some(now);
        let minutes = entry_work_minutes(&entry);

        self.repo.close_entry(entry.id, now, minutes).await?;
        entry.total_work_minutes = Some(minutes);
        entry.status = TimeEntryStatus::Closed;
        Ok(entry)
    }

    pub async fn start_break(&self, employee_id: u64, now: NaiveDateTime) -> AppResult<TimeBreak> {
        let entry = self.open_entry(employee_id).await?;
        if entry.breaks.iter().any(|b| b.end_at.is_none()) {
            return Err(AppError::StateConflict("a break is already running".into()));
        }
        if now < entry.clock_in_at {
            return Err(AppError::field("start_at", "must not precede clock_in_at"));
        }
        self.repo.start_break(entry.id, now).await
    }

    pub async fn end_break(&self, employee_id: u64, now: NaiveDateTime) -> AppResult<TimeBreak> {
        let entry = self.open_entry(employee_id).await?;
        let mut running = entry
            .breaks
            .into_iter()
            .find(|b| b.end_at.is_none())
            .ok_or_else(|| AppError::StateConflict("no break is running".into()))?;
        if now < running.start_at {
            return Err(AppError::field("end_at", "must not precede the break start"));
        }
        self.repo.end_break(running.id, now).await?;
        running.end_at = Some(now);
        Ok(running)
    }

    async fn open_entry(&self, employee_id: u64) -> AppResult<TimeEntry> {
        self.repo
            .find_open_entry(employee_id)
            .await?
            .ok_or_else(|| AppError::StateConflict("no open time entry".into()))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::engine::batch::BatchStatus;
    use crate::engine::payroll::fixtures::{compensation, d, employee, full_week, standard_rules, worked};
    use crate::model::payroll_period::PeriodType;
    use crate::model::schedule::{PayRate, WeekdayTag};
    use crate::repository::memory::{MemoryRepository, State};

    fn staff(id: u64) -> Employee {
        Employee {
            id,
            employee_code: format!("EMP-{id:03}"),
            ..employee()
        }
    }

    fn seeded() -> State {
        let rules = standard_rules();
        let mut state = State {
            employees: vec![employee(), staff(2)],
            entries: full_week(),
            policies: rules.policies,
            ..State::default()
        };
        let mut second = compensation(PayRate::Monthly(dec!(22000)), Vec::new());
        second.id = 101;
        second.employee_id = 2;
        state.compensations = vec![compensation(PayRate::Monthly(dec!(22000)), Vec::new()), second];
        state
    }

    fn service(state: State) -> PayrollService<MemoryRepository> {
        PayrollService::new(
            MemoryRepository::new(state),
            PayrollSettings::default(),
            2,
            Duration::from_secs(60),
        )
    }

    fn persist() -> ComputeOptions {
        ComputeOptions {
            persist_data: true,
            ..ComputeOptions::default()
        }
    }

    fn week() -> PayrollWindow {
        PayrollWindow {
            organization_id: 7,
            period_id: None,
            department_id: None,
            start: d(6),
            end: d(10),
        }
    }

    #[actix_web::test]
    async fn preview_writes_nothing() {
        let svc = service(seeded());
        let first = svc.compute_payroll(7, 1, d(6), d(10), ComputeOptions::default()).await.unwrap();
        let second = svc.compute_payroll(7, 1, d(6), d(10), ComputeOptions::default()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, PayrollStatus::Draft);
        assert_eq!(first.net_pay, dec!(5000));
        assert!(svc.repository().with(|s| s.payrolls.is_empty()));
    }

    #[actix_web::test]
    async fn persisting_reuses_editable_record() {
        let svc = service(seeded());
        let saved = svc.compute_payroll(7, 1, d(6), d(10), persist()).await.unwrap();
        assert_eq!(saved.status, PayrollStatus::Computed);

        svc.repository().with(|s| s.entries[0] = worked(1, d(6), (9, 15), (18, 15)));
        let again = svc.compute_payroll(7, 1, d(6), d(10), persist()).await.unwrap();
        assert_eq!(again.id, saved.id);
        assert_eq!(again.net_pay, dec!(4900));
        assert_eq!(svc.repository().with(|s| s.payrolls.len()), 1);
    }

    #[actix_web::test]
    async fn approved_payroll_cannot_be_recomputed() {
        let svc = service(seeded());
        let saved = svc.compute_payroll(7, 1, d(6), d(10), persist()).await.unwrap();
        let id = saved.id.unwrap();
        svc.transition_payroll(7, id, PayrollStatus::Approved, None).await.unwrap();

        let err = svc.compute_payroll(7, 1, d(6), d(10), persist()).await.unwrap_err();
        assert!(matches!(err, AppError::StateConflict(_)));
        // previews stay available
        assert!(svc.compute_payroll(7, 1, d(6), d(10), ComputeOptions::default()).await.is_ok());
    }

    #[actix_web::test]
    async fn transitions_follow_lifecycle() {
        let svc = service(seeded());
        let id = svc.compute_payroll(7, 1, d(6), d(10), persist()).await.unwrap().id.unwrap();

        assert!(matches!(
            svc.transition_payroll(7, id, PayrollStatus::Released, None).await,
            Err(AppError::StateConflict(_))
        ));
        svc.transition_payroll(7, id, PayrollStatus::Approved, None).await.unwrap();
        svc.transition_payroll(7, id, PayrollStatus::Released, None).await.unwrap();
        assert!(matches!(
            svc.transition_payroll(7, id, PayrollStatus::Voided, Some(" ")).await,
            Err(AppError::Validation(_))
        ));
        let voided = svc
            .transition_payroll(7, id, PayrollStatus::Voided, Some(" bank rejected "))
            .await
            .unwrap();
        assert_eq!(voided.void_reason.as_deref(), Some("bank rejected"));

        let stored = svc.get_payroll(7, id).await.unwrap();
        assert_eq!(stored.status, PayrollStatus::Voided);
        assert!(svc.transition_payroll(7, id, PayrollStatus::Computed, None).await.is_err());
        assert!(matches!(svc.get_payroll(8, id).await, Err(AppError::NotFound(_))));
    }

    #[actix_web::test]
    async fn organization_rules_are_cached() {
        let svc = service(seeded());
        svc.compute_payroll(7, 1, d(6), d(10), ComputeOptions::default()).await.unwrap();
        svc.compute_payroll(7, 2, d(6), d(10), ComputeOptions::default()).await.unwrap();
        assert_eq!(svc.repository().with(|s| s.rule_loads), 1);
    }

    #[actix_web::test]
    async fn applicable_policies_are_flattened() {
        let svc = service(seeded());
        let found = svc.get_applicable_policies(7, 1, d(6)).await.unwrap();
        let late = found.late.unwrap();
        assert_eq!(late.deduction_method, "FIXED_AMOUNT");
        assert_eq!(late.value, dec!(100));
        assert_eq!(found.undertime.unwrap().value, dec!(500));
        assert!(found.ambiguous.is_empty());

        assert!(matches!(
            svc.get_applicable_policies(7, 99, d(6)).await,
            Err(AppError::NotFound(_))
        ));
    }

    fn semi_monthly() -> PeriodRequest {
        PeriodRequest {
            organization_id: 7,
            period_type: PeriodType::SemiMonthly,
            start: d(1),
            end: d(31),
            pay_day_offset: 5,
            week_start: WeekdayTag::Mon,
        }
    }

    #[actix_web::test]
    async fn period_generation_is_idempotent() {
        let svc = service(seeded());
        let first = svc.generate_payroll_periods(&semi_monthly()).await.unwrap();
        let second = svc.generate_payroll_periods(&semi_monthly()).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(svc.repository().with(|s| s.periods.len()), 2);
    }

    #[actix_web::test]
    async fn overlapping_period_is_a_conflict() {
        let svc = service(seeded());
        let weekly = PeriodRequest {
            period_type: PeriodType::Weekly,
            start: d(6),
            end: d(12),
            pay_day_offset: 2,
            ..semi_monthly()
        };
        svc.generate_payroll_periods(&weekly).await.unwrap();
        assert!(matches!(
            svc.generate_payroll_periods(&semi_monthly()).await,
            Err(AppError::StateConflict(_))
        ));

        svc.repository().with(|s| s.periods[0].status = PeriodStatus::Cancelled);
        assert_eq!(svc.generate_payroll_periods(&semi_monthly()).await.unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn referenced_period_cannot_be_deleted() {
        let svc = service(seeded());
        let periods = svc.generate_payroll_periods(&semi_monthly()).await.unwrap();
        let period_id = periods[0].id;
        let options = ComputeOptions {
            period_id: Some(period_id),
            ..persist()
        };
        let payroll = svc.compute_payroll(7, 1, d(1), d(15), options).await.unwrap();

        assert!(matches!(svc.delete_period(7, period_id).await, Err(AppError::StateConflict(_))));

        svc.transition_payroll(7, payroll.id.unwrap(), PayrollStatus::Voided, Some("wrong window"))
            .await
            .unwrap();
        svc.delete_period(7, period_id).await.unwrap();
        let remaining = svc.list_periods(7, d(1), d(31)).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[actix_web::test]
    async fn payroll_must_match_its_period() {
        let svc = service(seeded());
        let periods = svc.generate_payroll_periods(&semi_monthly()).await.unwrap();
        let options = ComputeOptions {
            period_id: Some(periods[0].id),
            ..persist()
        };
        let err = svc.compute_payroll(7, 1, d(6), d(10), options).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref f) if f[0].field == "period_id"));

        let unknown = ComputeOptions {
            period_id: Some(9999),
            ..persist()
        };
        assert!(matches!(
            svc.compute_payroll(7, 1, d(1), d(15), unknown).await,
            Err(AppError::NotFound(_))
        ));
        let window = PayrollWindow {
            period_id: Some(periods[1].id),
            ..week()
        };
        assert!(matches!(svc.start_batch(window).await, Err(AppError::Validation(_))));
        assert!(svc.repository().with(|s| s.payrolls.is_empty()));
    }

    #[actix_web::test]
    async fn second_live_payroll_for_a_window_is_rejected() {
        let svc = service(seeded());
        svc.compute_payroll(7, 1, d(6), d(10), persist()).await.unwrap();

        // a writer that looked before the first save still holds an id-less record
        let mut late_writer = svc.compute_payroll(7, 1, d(6), d(10), ComputeOptions::default()).await.unwrap();
        late_writer.status = PayrollStatus::Computed;
        let err = svc.repository().save_payroll(&late_writer).await.unwrap_err();
        assert!(matches!(err, AppError::StateConflict(_)));
        assert_eq!(svc.repository().with(|s| s.payrolls.len()), 1);
    }

    #[actix_web::test]
    async fn invalid_stored_schedule_is_rejected_before_computation() {
        let mut state = seeded();
        state.compensations[0].schedule.rest_days.insert(WeekdayTag::Mon);
        state.compensations[0].schedule.required_work_minutes = 0;
        let svc = service(state);

        let err = svc.compute_payroll(7, 1, d(6), d(10), persist()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(svc.repository().with(|s| s.payrolls.is_empty()));
    }

    #[actix_web::test]
    async fn invalid_policy_is_rejected_before_computation() {
        let mut state = seeded();
        state.policies[0].minimum_late_minutes = 0;
        let svc = service(state);

        let err = svc.compute_payroll(7, 1, d(6), d(10), ComputeOptions::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref f) if f[0].field == "minimum_late_minutes"));
    }

    #[actix_web::test]
    async fn raise_inside_a_window_is_paid_from_its_effective_date() {
        let svc = service(seeded());
        svc.bulk_update_compensation(7, 42, &[raise(1, dec!(44000))], d(8), "promotion")
            .await
            .unwrap();

        let payroll = svc.compute_payroll(7, 1, d(6), d(10), ComputeOptions::default()).await.unwrap();
        // Mon-Tue at 125/h, Wed-Fri at 250/h
        assert_eq!(payroll.gross_pay, dec!(8000));
    }

    fn raise(employee_id: u64, amount: Decimal) -> CompensationUpdate {
        CompensationUpdate {
            employee_id,
            pay_rate: amount,
            allowances: None,
        }
    }

    #[actix_web::test]
    async fn bulk_compensation_update_supersedes_with_audit() {
        let svc = service(seeded());
        let audit = svc
            .bulk_update_compensation(7, 42, &[raise(1, dec!(24000)), raise(2, dec!(26000))], d(16), "annual raise")
            .await
            .unwrap();
        assert_eq!(audit.affected_count, 2);
        assert_eq!(audit.actor_user_id, 42);

        svc.repository().with(|s| {
            assert_eq!(s.audits.len(), 1);
            assert_eq!(s.compensations.len(), 4);
            let closed = s.compensations.iter().find(|c| c.id == 100).unwrap();
            assert_eq!(closed.end_date, Some(d(15)));
            let next = s
                .compensations
                .iter()
                .find(|c| c.employee_id == 1 && c.effective_date == d(16))
                .unwrap();
            assert_eq!(next.schedule.pay_rate, PayRate::Monthly(dec!(24000)));
        });
    }

    #[actix_web::test]
    async fn bulk_compensation_update_is_all_or_nothing() {
        let svc = service(seeded());
        let err = svc
            .bulk_update_compensation(7, 42, &[raise(1, dec!(24000)), raise(99, dec!(1))], d(16), "raise")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        svc.repository().with(|s| s.fail_writes_for = Some(2));
        assert!(
            svc.bulk_update_compensation(7, 42, &[raise(1, dec!(24000)), raise(2, dec!(26000))], d(16), "raise")
                .await
                .is_err()
        );
        svc.repository().with(|s| {
            assert!(s.audits.is_empty());
            assert_eq!(s.compensations.len(), 2);
            assert!(s.compensations.iter().all(|c| c.end_date.is_none()));
        });

        assert!(matches!(
            svc.bulk_update_compensation(7, 42, &[raise(1, dec!(1)), raise(1, dec!(2))], d(16), "x").await,
            Err(AppError::Validation(_))
        ));
    }

    #[actix_web::test]
    async fn bulk_recompute_saves_everyone_or_no_one() {
        let svc = service(seeded());
        let result = svc.bulk_recompute(7, 42, week(), "attendance corrected").await.unwrap();
        assert_eq!(result.payroll_ids.len(), 2);
        assert_eq!(result.audit.affected_count, 2);

        svc.repository().with(|s| {
            s.employees.push(staff(3));
            s.payrolls.clear();
            s.audits.clear();
        });
        let err = svc.bulk_recompute(7, 42, week(), "again").await.unwrap_err();
        assert!(matches!(err, AppError::ConfigurationMissing(_)));
        svc.repository().with(|s| {
            assert!(s.payrolls.is_empty());
            assert!(s.audits.is_empty());
        });
    }

    async fn wait_for(svc: &PayrollService<MemoryRepository>, run_id: Uuid) -> BatchReport {
        for _ in 0..200 {
            let report = svc.batch_status(7, run_id).await.unwrap();
            if report.status != BatchStatus::Running {
                return report;
            }
            actix_web::rt::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("batch {run_id} did not finish");
    }

    #[actix_web::test]
    async fn background_batch_records_failures_per_employee() {
        let mut state = seeded();
        state.employees.push(staff(3));
        let svc = service(state);

        let started = svc.start_batch(week()).await.unwrap();
        assert_eq!(started.total, 3);
        let report = wait_for(&svc, started.run_id).await;

        assert_eq!(report.status, BatchStatus::Completed);
        assert_eq!(report.computed, vec![1, 2]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].employee_id, 3);
        assert_eq!(svc.repository().with(|s| s.payrolls.len()), 2);
        assert!(matches!(
            svc.batch_status(8, started.run_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn cancelling_a_finished_batch_keeps_its_outcome() {
        let svc = service(seeded());
        let started = svc.start_batch(week()).await.unwrap();
        let finished = wait_for(&svc, started.run_id).await;
        assert_eq!(finished.status, BatchStatus::Completed);

        let after = svc.cancel_batch(7, started.run_id).await.unwrap();
        assert_eq!(after.status, BatchStatus::Completed);
        assert_eq!(after.computed, vec![1, 2]);
        assert!(matches!(
            svc.cancel_batch(7, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        d(day).and_hms_opt(h, m, 0).unwrap()
    }

    #[actix_web::test]
    async fn clock_cycle_with_break() {
        let svc = service(State {
            employees: vec![employee()],
            ..State::default()
        });
        svc.clock_in(1, at(20, 9, 0)).await.unwrap();
        assert!(matches!(svc.clock_in(1, at(20, 9, 5)).await, Err(AppError::StateConflict(_))));

        svc.start_break(1, at(20, 12, 0)).await.unwrap();
        assert!(svc.start_break(1, at(20, 12, 5)).await.is_err());
        let ended = svc.end_break(1, at(20, 12, 45)).await.unwrap();
        assert_eq!(ended.end_at, Some(at(20, 12, 45)));

        let closed = svc.clock_out(1, at(20, 18, 0)).await.unwrap();
        assert_eq!(closed.total_work_minutes, Some(9 * 60 - 45));
        assert_eq!(closed.status, TimeEntryStatus::Closed);
        assert!(matches!(svc.clock_out(1, at(20, 19, 0)).await, Err(AppError::StateConflict(_))));

        let stored = svc.repository().with(|s| s.entries[0].clone());
        assert_eq!(stored.total_work_minutes, Some(495));
    }

    #[actix_web::test]
    async fn clock_out_ends_running_break() {
        let svc = service(State::default());
        svc.clock_in(1, at(20, 9, 0)).await.unwrap();
        svc.start_break(1, at(20, 17, 0)).await.unwrap();
        let closed = svc.clock_out(1, at(20, 18, 0)).await.unwrap();
        assert_eq!(closed.total_work_minutes, Some(8 * 60));
        assert!(closed.breaks.iter().all(|b| b.end_at == Some(at(20, 18, 0))));
    }

    #[test]
    fn policy_summary_flattens_method() {
        let rules = standard_rules();
        let summary = PolicySummary::from(&rules.policies[1]);
        assert_eq!(summary.policy_type, PolicyType::Undertime);
        assert_eq!(summary.deduction_method, "FIXED_AMOUNT");
    }
}
