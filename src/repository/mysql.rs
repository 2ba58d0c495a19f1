use std::collections::HashMap;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, MySql, MySqlConnection, MySqlPool, QueryBuilder};

use super::PayrollRepository;
use crate::error::{AppError, AppResult};
use crate::model::attendance::{AttendanceSummary, Holiday, TimeBreak, TimeEntry, TimeEntryStatus};
use crate::model::audit::AuditEntry;
use crate::model::compensation::{Allowance, Compensation, CompensationRevision};
use crate::model::contribution::{ContributionTier, TierFormula};
use crate::model::employee::Employee;
use crate::model::late_policy::{DeductionMethod, LateDeductionPolicy};
use crate::model::leave_request::LeaveRequest;
use crate::model::payroll::{EmployerContribution, LineItem, Payroll, PayrollStatus, PayrollWarning};
use crate::model::payroll_period::{NewPayrollPeriod, PayrollPeriod};
use crate::model::schedule::WorkSchedule;

/// MySQL error code for duplicate keys and constraint violations.
const INTEGRITY_VIOLATION: &str = "23000";

#[derive(Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn parse_column<T: FromStr>(column: &str, value: &str) -> AppResult<T> {
    value
        .parse()
        .map_err(|_| AppError::Internal(format!("unexpected {column} value `{value}`")))
}

fn required(column: &str, value: Option<Decimal>) -> AppResult<Decimal> {
    value.ok_or_else(|| AppError::Internal(format!("{column} is required by the row's method")))
}

fn is_integrity_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(INTEGRITY_VIOLATION))
}

#[derive(FromRow)]
struct CompensationRow {
    id: u64,
    employee_id: u64,
    organization_id: u64,
    effective_date: NaiveDate,
    end_date: Option<NaiveDate>,
    schedule: Json<WorkSchedule>,
    allowances: Json<Vec<Allowance>>,
}

impl From<CompensationRow> for Compensation {
    fn from(row: CompensationRow) -> Self {
        Compensation {
            id: row.id,
            employee_id: row.employee_id,
            organization_id: row.organization_id,
            effective_date: row.effective_date,
            end_date: row.end_date,
            schedule: row.schedule.0,
            allowances: row.allowances.0,
        }
    }
}

#[derive(FromRow)]
struct EntryRow {
    id: u64,
    employee_id: u64,
    work_date: NaiveDate,
    clock_in_at: NaiveDateTime,
    clock_out_at: Option<NaiveDateTime>,
    total_work_minutes: Option<i64>,
    status: String,
}

#[derive(FromRow)]
struct BreakRow {
    id: u64,
    time_entry_id: u64,
    start_at: NaiveDateTime,
    end_at: Option<NaiveDateTime>,
}

impl EntryRow {
    fn into_entry(self, breaks: Vec<TimeBreak>) -> AppResult<TimeEntry> {
        Ok(TimeEntry {
            id: self.id,
            employee_id: self.employee_id,
            work_date: self.work_date,
            clock_in_at: self.clock_in_at,
            clock_out_at: self.clock_out_at,
            total_work_minutes: self.total_work_minutes,
            status: parse_column::<TimeEntryStatus>("time_entries.status", &self.status)?,
            breaks,
        })
    }
}

#[derive(FromRow)]
struct PolicyRow {
    id: u64,
    organization_id: u64,
    name: String,
    policy_type: String,
    deduction_method: String,
    fixed_amount: Option<Decimal>,
    percentage_rate: Option<Decimal>,
    hourly_rate_multiplier: Option<Decimal>,
    grace_period_minutes: i64,
    minimum_late_minutes: i64,
    max_deduction_per_day: Option<Decimal>,
    max_deduction_per_cutoff: Option<Decimal>,
    effective_date: NaiveDate,
    end_date: Option<NaiveDate>,
    is_active: bool,
}

impl TryFrom<PolicyRow> for LateDeductionPolicy {
    type Error = AppError;

    fn try_from(row: PolicyRow) -> AppResult<Self> {
        let method = match row.deduction_method.as_str() {
            "FIXED_AMOUNT" => DeductionMethod::FixedAmount(required("fixed_amount", row.fixed_amount)?),
            "PERCENTAGE" => DeductionMethod::Percentage(required("percentage_rate", row.percentage_rate)?),
            "HOURLY_RATE" => {
                DeductionMethod::HourlyRate(required("hourly_rate_multiplier", row.hourly_rate_multiplier)?)
            }
            other => return Err(AppError::Internal(format!("unknown deduction method `{other}`"))),
        };
        Ok(LateDeductionPolicy {
            id: row.id,
            organization_id: row.organization_id,
            name: row.name,
            policy_type: parse_column("policy_type", &row.policy_type)?,
            method,
            grace_period_minutes: row.grace_period_minutes,
            minimum_late_minutes: row.minimum_late_minutes,
            max_deduction_per_day: row.max_deduction_per_day,
            max_deduction_per_cutoff: row.max_deduction_per_cutoff,
            effective_date: row.effective_date,
            end_date: row.end_date,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct TierRow {
    id: u64,
    organization_id: u64,
    kind: String,
    formula: String,
    min_salary: Decimal,
    max_salary: Option<Decimal>,
    base_tax: Option<Decimal>,
    rate: Option<Decimal>,
    excess_over: Option<Decimal>,
    employee_rate: Option<Decimal>,
    employer_rate: Option<Decimal>,
    employee_amount: Option<Decimal>,
    employer_amount: Option<Decimal>,
    max_contribution: Option<Decimal>,
    effective_from: NaiveDate,
    effective_to: Option<NaiveDate>,
}

impl TryFrom<TierRow> for ContributionTier {
    type Error = AppError;

    fn try_from(row: TierRow) -> AppResult<Self> {
        let formula = match row.formula.as_str() {
            "PROGRESSIVE" => TierFormula::Progressive {
                base_tax: row.base_tax.unwrap_or_default(),
                rate: required("rate", row.rate)?,
                excess_over: row.excess_over,
            },
            "RATE" => TierFormula::Rate {
                employee_rate: required("employee_rate", row.employee_rate)?,
                employer_rate: row.employer_rate.unwrap_or_default(),
            },
            "FIXED" => TierFormula::Fixed {
                employee_amount: required("employee_amount", row.employee_amount)?,
                employer_amount: row.employer_amount.unwrap_or_default(),
            },
            other => return Err(AppError::Internal(format!("unknown tier formula `{other}`"))),
        };
        Ok(ContributionTier {
            id: row.id,
            organization_id: row.organization_id,
            kind: parse_column("contribution_tiers.kind", &row.kind)?,
            min_salary: row.min_salary,
            max_salary: row.max_salary,
            formula,
            max_contribution: row.max_contribution,
            effective_from: row.effective_from,
            effective_to: row.effective_to,
        })
    }
}

#[derive(FromRow)]
struct PeriodRow {
    id: u64,
    organization_id: u64,
    period_type: String,
    status: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    pay_date: NaiveDate,
    year: i32,
    month: u32,
    period_number: u32,
}

impl TryFrom<PeriodRow> for PayrollPeriod {
    type Error = AppError;

    fn try_from(row: PeriodRow) -> AppResult<Self> {
        Ok(PayrollPeriod {
            id: row.id,
            organization_id: row.organization_id,
            period_type: parse_column("period_type", &row.period_type)?,
            status: parse_column("payroll_periods.status", &row.status)?,
            start_date: row.start_date,
            end_date: row.end_date,
            pay_date: row.pay_date,
            year: row.year,
            month: row.month,
            period_number: row.period_number,
        })
    }
}

#[derive(FromRow)]
struct PayrollRow {
    id: u64,
    organization_id: u64,
    employee_id: u64,
    department_id: Option<u64>,
    period_id: Option<u64>,
    period_start: NaiveDate,
    period_end: NaiveDate,
    status: String,
    gross_pay: Decimal,
    taxable_income: Decimal,
    total_deductions: Decimal,
    net_pay: Decimal,
    attendance: Json<AttendanceSummary>,
    employer_contributions: Json<Vec<EmployerContribution>>,
    warnings: Json<Vec<PayrollWarning>>,
    void_reason: Option<String>,
}

#[derive(FromRow)]
struct LineRow {
    kind: String,
    description: String,
    hours: Decimal,
    rate: Decimal,
    amount: Decimal,
}

impl LineRow {
    fn into_line<K: FromStr>(self, column: &str) -> AppResult<LineItem<K>> {
        Ok(LineItem {
            kind: parse_column(column, &self.kind)?,
            description: self.description,
            hours: self.hours,
            rate: self.rate,
            amount: self.amount,
        })
    }
}

const PAYROLL_COLUMNS: &str = r#"
    id, organization_id, employee_id, department_id, period_id, period_start, period_end,
    status, gross_pay, taxable_income, total_deductions, net_pay, attendance,
    employer_contributions, warnings, void_reason
"#;

const PERIOD_COLUMNS: &str = r#"
    id, organization_id, period_type, status, start_date, end_date, pay_date, year, month, period_number
"#;

async fn load_payroll(conn: &mut MySqlConnection, row: PayrollRow) -> AppResult<Payroll> {
    let earnings = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT earning_type AS kind, description, hours, rate, amount
        FROM payroll_earnings
        WHERE payroll_id = ?
        ORDER BY id
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|l| l.into_line("earning_type"))
    .collect::<AppResult<Vec<_>>>()?;

    let deductions = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT deduction_type AS kind, description, hours, rate, amount
        FROM payroll_deductions
        WHERE payroll_id = ?
        ORDER BY id
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|l| l.into_line("deduction_type"))
    .collect::<AppResult<Vec<_>>>()?;

    Ok(Payroll {
        id: Some(row.id),
        organization_id: row.organization_id,
        employee_id: row.employee_id,
        department_id: row.department_id,
        period_id: row.period_id,
        period_start: row.period_start,
        period_end: row.period_end,
        status: parse_column("payrolls.status", &row.status)?,
        earnings,
        deductions,
        employer_contributions: row.employer_contributions.0,
        warnings: row.warnings.0,
        attendance: row.attendance.0,
        gross_pay: row.gross_pay,
        taxable_income: row.taxable_income,
        total_deductions: row.total_deductions,
        net_pay: row.net_pay,
        void_reason: row.void_reason,
    })
}

/// Writes header and line items. Must run inside a transaction.
async fn write_payroll(conn: &mut MySqlConnection, payroll: &Payroll) -> AppResult<u64> {
    let id = match payroll.id {
        Some(id) => {
            let current: Option<(String,)> =
                sqlx::query_as("SELECT status FROM payrolls WHERE id = ? AND organization_id = ? FOR UPDATE")
                    .bind(id)
                    .bind(payroll.organization_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let Some((status,)) = current else {
                return Err(AppError::NotFound(format!("payroll {id}")));
            };
            let status: PayrollStatus = parse_column("payrolls.status", &status)?;
            if !status.is_editable() {
                return Err(AppError::StateConflict(format!("payroll {id} is {status} and cannot be recomputed")));
            }

            sqlx::query(
                r#"
                UPDATE payrolls
                SET department_id = ?, period_id = ?, status = ?, gross_pay = ?, taxable_income = ?,
                    total_deductions = ?, net_pay = ?, attendance = ?, employer_contributions = ?, warnings = ?
                WHERE id = ?
                "#,
            )
            .bind(payroll.department_id)
            .bind(payroll.period_id)
            .bind(payroll.status.to_string())
            .bind(payroll.gross_pay)
            .bind(payroll.taxable_income)
            .bind(payroll.total_deductions)
            .bind(payroll.net_pay)
            .bind(Json(&payroll.attendance))
            .bind(Json(&payroll.employer_contributions))
            .bind(Json(&payroll.warnings))
            .bind(id)
            .execute(&mut *conn)
            .await?;

            sqlx::query("DELETE FROM payroll_earnings WHERE payroll_id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            sqlx::query("DELETE FROM payroll_deductions WHERE payroll_id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            id
        }
        None => {
            let inserted = sqlx::query(
                r#"
                INSERT INTO payrolls
                (organization_id, employee_id, department_id, period_id, period_start, period_end, status,
                 gross_pay, taxable_income, total_deductions, net_pay, attendance, employer_contributions, warnings)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(payroll.organization_id)
            .bind(payroll.employee_id)
            .bind(payroll.department_id)
            .bind(payroll.period_id)
            .bind(payroll.period_start)
            .bind(payroll.period_end)
            .bind(payroll.status.to_string())
            .bind(payroll.gross_pay)
            .bind(payroll.taxable_income)
            .bind(payroll.total_deductions)
            .bind(payroll.net_pay)
            .bind(Json(&payroll.attendance))
            .bind(Json(&payroll.employer_contributions))
            .bind(Json(&payroll.warnings))
            .execute(&mut *conn)
            .await;
            match inserted {
                Ok(done) => done.last_insert_id(),
                // uq_active_payroll: another writer saved this window first
                Err(e) if is_integrity_violation(&e) => {
                    return Err(AppError::StateConflict(format!(
                        "a payroll for employee {} from {} to {} already exists",
                        payroll.employee_id, payroll.period_start, payroll.period_end
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    if !payroll.earnings.is_empty() {
        let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO payroll_earnings (payroll_id, earning_type, description, hours, rate, amount) ",
        );
        qb.push_values(&payroll.earnings, |mut b, line| {
            b.push_bind(id)
                .push_bind(line.kind.to_string())
                .push_bind(line.description.clone())
                .push_bind(line.hours)
                .push_bind(line.rate)
                .push_bind(line.amount);
        });
        qb.build().execute(&mut *conn).await?;
    }
    if !payroll.deductions.is_empty() {
        let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO payroll_deductions (payroll_id, deduction_type, description, hours, rate, amount) ",
        );
        qb.push_values(&payroll.deductions, |mut b, line| {
            b.push_bind(id)
                .push_bind(line.kind.to_string())
                .push_bind(line.description.clone())
                .push_bind(line.hours)
                .push_bind(line.rate)
                .push_bind(line.amount);
        });
        qb.build().execute(&mut *conn).await?;
    }

    Ok(id)
}

async fn write_audit(conn: &mut MySqlConnection, audit: &AuditEntry) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_entries (id, organization_id, actor_user_id, action, reason, affected_count, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(audit.id.to_string())
    .bind(audit.organization_id)
    .bind(audit.actor_user_id)
    .bind(&audit.action)
    .bind(&audit.reason)
    .bind(audit.affected_count as u64)
    .bind(audit.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl PayrollRepository for MySqlRepository {
    async fn find_employee(&self, organization_id: u64, employee_id: u64) -> AppResult<Option<Employee>> {
        let employee = sqlx::query_as::<_, Employee>(
            r#"
            SELECT id, organization_id, department_id, employee_code, first_name, last_name, status
            FROM employees
            WHERE id = ? AND organization_id = ?
            "#,
        )
        .bind(employee_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(employee)
    }

    async fn list_active_employees(&self, organization_id: u64, department_id: Option<u64>) -> AppResult<Vec<Employee>> {
        let employees = sqlx::query_as::<_, Employee>(
            r#"
            SELECT id, organization_id, department_id, employee_code, first_name, last_name, status
            FROM employees
            WHERE organization_id = ? AND status = 'active' AND (? IS NULL OR department_id = ?)
            ORDER BY id
            "#,
        )
        .bind(organization_id)
        .bind(department_id)
        .bind(department_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(employees)
    }

    async fn list_compensations(&self, employee_id: u64) -> AppResult<Vec<Compensation>> {
        let rows = sqlx::query_as::<_, CompensationRow>(
            r#"
            SELECT id, employee_id, organization_id, effective_date, end_date, schedule, allowances
            FROM compensations
            WHERE employee_id = ?
            ORDER BY effective_date, id
            "#,
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Compensation::from).collect())
    }

    async fn list_time_entries(&self, employee_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<TimeEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, employee_id, work_date, clock_in_at, clock_out_at, total_work_minutes, status
            FROM time_entries
            WHERE employee_id = ? AND work_date BETWEEN ? AND ?
            ORDER BY clock_in_at
            "#,
        )
        .bind(employee_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let break_rows = sqlx::query_as::<_, BreakRow>(
            r#"
            SELECT b.id, b.time_entry_id, b.start_at, b.end_at
            FROM time_breaks b
            JOIN time_entries e ON e.id = b.time_entry_id
            WHERE e.employee_id = ? AND e.work_date BETWEEN ? AND ?
            ORDER BY b.start_at
            "#,
        )
        .bind(employee_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut breaks: HashMap<u64, Vec<TimeBreak>> = HashMap::new();
        for b in break_rows {
            breaks.entry(b.time_entry_id).or_default().push(TimeBreak {
                id: b.id,
                start_at: b.start_at,
                end_at: b.end_at,
            });
        }
        rows.into_iter()
            .map(|row| {
                let entry_breaks = breaks.remove(&row.id).unwrap_or_default();
                row.into_entry(entry_breaks)
            })
            .collect()
    }

    async fn list_leaves(&self, employee_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<LeaveRequest>> {
        let leaves = sqlx::query_as::<_, LeaveRequest>(
            r#"
            SELECT id, employee_id, start_date, end_date, leave_type, status
            FROM leave_requests
            WHERE employee_id = ? AND start_date <= ? AND end_date >= ? AND status = 'approved'
            "#,
        )
        .bind(employee_id)
        .bind(end)
        .bind(start)
        .fetch_all(&self.pool)
        .await?;
        Ok(leaves)
    }

    async fn list_policies(&self, organization_id: u64) -> AppResult<Vec<LateDeductionPolicy>> {
        sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, organization_id, name, policy_type, deduction_method, fixed_amount, percentage_rate,
                   hourly_rate_multiplier, grace_period_minutes, minimum_late_minutes, max_deduction_per_day,
                   max_deduction_per_cutoff, effective_date, end_date, is_active
            FROM late_deduction_policies
            WHERE organization_id = ?
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(LateDeductionPolicy::try_from)
        .collect()
    }

    async fn list_tiers(&self, organization_id: u64) -> AppResult<Vec<ContributionTier>> {
        sqlx::query_as::<_, TierRow>(
            r#"
            SELECT id, organization_id, kind, formula, min_salary, max_salary, base_tax, rate, excess_over,
                   employee_rate, employer_rate, employee_amount, employer_amount, max_contribution,
                   effective_from, effective_to
            FROM contribution_tiers
            WHERE organization_id = ?
            ORDER BY kind, min_salary
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ContributionTier::try_from)
        .collect()
    }

    async fn list_holidays(&self, organization_id: u64) -> AppResult<Vec<Holiday>> {
        let holidays = sqlx::query_as::<_, Holiday>(
            r#"
            SELECT organization_id, holiday_date AS date, name, holiday_type
            FROM holidays
            WHERE organization_id = ?
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(holidays)
    }

    async fn list_periods(&self, organization_id: u64, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<PayrollPeriod>> {
        let sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM payroll_periods \
             WHERE organization_id = ? AND start_date <= ? AND end_date >= ? ORDER BY start_date"
        );
        sqlx::query_as::<_, PeriodRow>(&sql)
            .bind(organization_id)
            .bind(end)
            .bind(start)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(PayrollPeriod::try_from)
            .collect()
    }

    async fn find_period(&self, organization_id: u64, period_id: u64) -> AppResult<Option<PayrollPeriod>> {
        let sql = format!("SELECT {PERIOD_COLUMNS} FROM payroll_periods WHERE id = ? AND organization_id = ?");
        sqlx::query_as::<_, PeriodRow>(&sql)
            .bind(period_id)
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await?
            .map(PayrollPeriod::try_from)
            .transpose()
    }

    async fn upsert_periods(&self, periods: &[NewPayrollPeriod]) -> AppResult<Vec<PayrollPeriod>> {
        let mut tx = self.pool.begin().await?;
        let select = format!(
            "SELECT {PERIOD_COLUMNS} FROM payroll_periods \
             WHERE organization_id = ? AND start_date = ? AND end_date = ?"
        );
        let mut stored = Vec::with_capacity(periods.len());

        for period in periods {
            sqlx::query(
                r#"
                INSERT INTO payroll_periods
                (organization_id, period_type, status, start_date, end_date, pay_date, year, month, period_number)
                VALUES (?, ?, 'PENDING', ?, ?, ?, ?, ?, ?)
                ON DUPLICATE KEY UPDATE id = id
                "#,
            )
            .bind(period.organization_id)
            .bind(period.period_type.to_string())
            .bind(period.start_date)
            .bind(period.end_date)
            .bind(period.pay_date)
            .bind(period.year())
            .bind(period.month())
            .bind(period.period_number())
            .execute(&mut *tx)
            .await?;

            let row = sqlx::query_as::<_, PeriodRow>(&select)
                .bind(period.organization_id)
                .bind(period.start_date)
                .bind(period.end_date)
                .fetch_one(&mut *tx)
                .await?;
            stored.push(PayrollPeriod::try_from(row)?);
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn delete_period(&self, organization_id: u64, period_id: u64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(u64,)> =
            sqlx::query_as("SELECT id FROM payroll_periods WHERE id = ? AND organization_id = ? FOR UPDATE")
                .bind(period_id)
                .bind(organization_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("payroll period {period_id}")));
        }

        let (active,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM payrolls WHERE period_id = ? AND status <> 'VOIDED'")
                .bind(period_id)
                .fetch_one(&mut *tx)
                .await?;
        if active > 0 {
            return Err(AppError::StateConflict(format!(
                "period {period_id} is referenced by {active} payroll(s)"
            )));
        }

        sqlx::query("UPDATE payrolls SET period_id = NULL WHERE period_id = ?")
            .bind(period_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM payroll_periods WHERE id = ?")
            .bind(period_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_payroll(&self, organization_id: u64, payroll_id: u64) -> AppResult<Option<Payroll>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {PAYROLL_COLUMNS} FROM payrolls WHERE id = ? AND organization_id = ?");
        let row = sqlx::query_as::<_, PayrollRow>(&sql)
            .bind(payroll_id)
            .bind(organization_id)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(load_payroll(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn find_active_payroll(
        &self,
        organization_id: u64,
        employee_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Option<Payroll>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {PAYROLL_COLUMNS} FROM payrolls \
             WHERE organization_id = ? AND employee_id = ? AND period_start = ? AND period_end = ? \
             AND status <> 'VOIDED' ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, PayrollRow>(&sql)
            .bind(organization_id)
            .bind(employee_id)
            .bind(start)
            .bind(end)
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(load_payroll(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn save_payroll(&self, payroll: &Payroll) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;
        let id = write_payroll(&mut tx, payroll).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn save_payrolls(&self, payrolls: &[Payroll], audit: &AuditEntry) -> AppResult<Vec<u64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(payrolls.len());
        for payroll in payrolls {
            ids.push(write_payroll(&mut tx, payroll).await?);
        }
        write_audit(&mut tx, audit).await?;
        tx.commit().await?;
        Ok(ids)
    }

    async fn update_payroll_status(
        &self,
        organization_id: u64,
        payroll_id: u64,
        expected: PayrollStatus,
        target: PayrollStatus,
        void_reason: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payrolls
            SET status = ?, void_reason = COALESCE(?, void_reason)
            WHERE id = ? AND organization_id = ? AND status = ?
            "#,
        )
        .bind(target.to_string())
        .bind(void_reason)
        .bind(payroll_id)
        .bind(organization_id)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_compensation_revisions(&self, revisions: &[CompensationRevision], audit: &AuditEntry) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for revision in revisions {
            match revision {
                CompensationRevision::Replace(compensation) => {
                    sqlx::query("UPDATE compensations SET schedule = ?, allowances = ? WHERE id = ?")
                        .bind(Json(&compensation.schedule))
                        .bind(Json(&compensation.allowances))
                        .bind(compensation.id)
                        .execute(&mut *tx)
                        .await?;
                }
                CompensationRevision::Supersede {
                    closed_id,
                    closed_end,
                    next,
                } => {
                    sqlx::query("UPDATE compensations SET end_date = ? WHERE id = ?")
                        .bind(closed_end)
                        .bind(closed_id)
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query(
                        r#"
                        INSERT INTO compensations
                        (employee_id, organization_id, effective_date, end_date, schedule, allowances)
                        VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(next.employee_id)
                    .bind(next.organization_id)
                    .bind(next.effective_date)
                    .bind(next.end_date)
                    .bind(Json(&next.schedule))
                    .bind(Json(&next.allowances))
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
        write_audit(&mut tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_open_entry(&self, employee_id: u64) -> AppResult<Option<TimeEntry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, employee_id, work_date, clock_in_at, clock_out_at, total_work_minutes, status
            FROM time_entries
            WHERE employee_id = ? AND status = 'OPEN'
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let breaks = sqlx::query_as::<_, BreakRow>(
            "SELECT id, time_entry_id, start_at, end_at FROM time_breaks WHERE time_entry_id = ? ORDER BY start_at",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|b| TimeBreak {
            id: b.id,
            start_at: b.start_at,
            end_at: b.end_at,
        })
        .collect();
        row.into_entry(breaks).map(Some)
    }

    async fn insert_entry(&self, employee_id: u64, work_date: NaiveDate, clock_in_at: NaiveDateTime) -> AppResult<TimeEntry> {
        let result = sqlx::query(
            r#"
            INSERT INTO time_entries (employee_id, work_date, clock_in_at, status)
            VALUES (?, ?, ?, 'OPEN')
            "#,
        )
        .bind(employee_id)
        .bind(work_date)
        .bind(clock_in_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(TimeEntry {
                id: done.last_insert_id(),
                employee_id,
                work_date,
                clock_in_at,
                clock_out_at: None,
                total_work_minutes: None,
                status: TimeEntryStatus::Open,
                breaks: Vec::new(),
            }),
            Err(e) if is_integrity_violation(&e) => {
                Err(AppError::StateConflict("employee already has an open time entry".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn close_entry(&self, entry_id: u64, clock_out_at: NaiveDateTime, total_work_minutes: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE time_breaks SET end_at = ? WHERE time_entry_id = ? AND end_at IS NULL")
            .bind(clock_out_at)
            .bind(entry_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(
            r#"
            UPDATE time_entries
            SET clock_out_at = ?, total_work_minutes = ?, status = 'CLOSED'
            WHERE id = ? AND status = 'OPEN'
            "#,
        )
        .bind(clock_out_at)
        .bind(total_work_minutes)
        .bind(entry_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::StateConflict(format!("time entry {entry_id} is not open")));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn start_break(&self, entry_id: u64, start_at: NaiveDateTime) -> AppResult<TimeBreak> {
        let id = sqlx::query("INSERT INTO time_breaks (time_entry_id, start_at) VALUES (?, ?)")
            .bind(entry_id)
            .bind(start_at)
            .execute(&self.pool)
            .await?
            .last_insert_id();
        Ok(TimeBreak {
            id,
            start_at,
            end_at: None,
        })
    }

    async fn end_break(&self, break_id: u64, end_at: NaiveDateTime) -> AppResult<()> {
        let result = sqlx::query("UPDATE time_breaks SET end_at = ? WHERE id = ? AND end_at IS NULL")
            .bind(end_at)
            .bind(break_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::StateConflict(format!("break {break_id} is not running")));
        }
        Ok(())
    }
}
