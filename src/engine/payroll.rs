//! Aggregates one employee's period into a [`Payroll`].
//!
//! Everything here is pure: the caller prefetches the organization rules and
//! the employee's inputs, so a preview can run the same code as a persisted
//! computation and produce identical output.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::attendance::{DayCalendar, classify_day, summarize};
use super::contributions::compute_statutory;
use super::late_policy::{CutoffDeductions, select_policy};
use super::schedule::{RateTable, ResolvedSchedule, resolve_compensation};
use crate::error::{AppError, AppResult};
use crate::model::attendance::{AttendanceSummary, DailyAttendanceOutcome, Holiday, HolidayType, TimeEntry};
use crate::model::compensation::Compensation;
use crate::model::contribution::{ContributionKind, ContributionTier};
use crate::model::employee::Employee;
use crate::model::late_policy::{LateDeductionPolicy, PolicyType};
use crate::model::leave_request::LeaveRequest;
use crate::model::payroll::{
    DeductionLine, DeductionType, EarningLine, EarningType, EmployerContribution, Payroll,
    PayrollStatus, PayrollWarning, WarningCode,
};
use crate::model::schedule::RateMultipliers;
use crate::utils::money::{minutes_to_hours, round_money};

/// What happens to overtime beyond `max_overtime_hours`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OvertimeCapMode {
    /// Unpaid; logged and reported as a warning.
    #[default]
    Drop,
    PayAtRegularRate,
    /// The cap is ignored and every overtime minute earns the overtime rate.
    Uncapped,
}

impl FromStr for OvertimeCapMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(OvertimeCapMode::Drop),
            "pay_regular" | "pay_at_regular_rate" => Ok(OvertimeCapMode::PayAtRegularRate),
            "uncapped" => Ok(OvertimeCapMode::Uncapped),
            other => Err(format!("unknown overtime cap mode `{other}`")),
        }
    }
}

/// Engine switches that used to be ambient lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayrollSettings {
    pub overtime_cap_mode: OvertimeCapMode,
    /// Treat a work day with only an open entry as an absence.
    pub incomplete_as_absent: bool,
    /// Withholding tax is computed on taxable income net of contributions.
    pub contributions_reduce_taxable: bool,
}

/// Organization-wide rule tables, fetched once per run.
#[derive(Debug, Clone, Default)]
pub struct OrganizationRules {
    pub policies: Vec<LateDeductionPolicy>,
    pub tiers: Vec<ContributionTier>,
    pub holidays: Vec<Holiday>,
}

/// Everything fetched for one employee.
#[derive(Debug, Clone, Copy)]
pub struct EmployeeInputs<'a> {
    pub employee: &'a Employee,
    pub compensations: &'a [Compensation],
    pub entries: &'a [TimeEntry],
    pub leaves: &'a [LeaveRequest],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayrollWindow {
    pub organization_id: u64,
    pub period_id: Option<u64>,
    pub department_id: Option<u64>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

struct ClassifiedDay {
    outcome: DailyAttendanceOutcome,
    /// Index of the resolved compensation in force on the day.
    schedule: usize,
    required_minutes: i64,
}

/// The days of a window priced by one compensation record.
struct Segment<'a> {
    pricing: &'a ResolvedSchedule,
    days: Vec<&'a ClassifiedDay>,
    summary: AttendanceSummary,
}

impl Segment<'_> {
    fn hourly(&self) -> Decimal {
        self.pricing.rates.hourly
    }

    fn multipliers(&self) -> &RateMultipliers {
        self.pricing.multipliers()
    }

    fn is_monthly(&self) -> bool {
        self.pricing.is_monthly_rate()
    }
}

fn split_segments<'a>(resolved: &'a [ResolvedSchedule], days: &'a [ClassifiedDay]) -> Vec<Segment<'a>> {
    let mut grouped: Vec<Vec<&ClassifiedDay>> = vec![Vec::new(); resolved.len()];
    for day in days {
        grouped[day.schedule].push(day);
    }
    resolved
        .iter()
        .zip(grouped)
        .map(|(pricing, days)| {
            let outcomes: Vec<DailyAttendanceOutcome> = days.iter().map(|d| d.outcome.clone()).collect();
            Segment {
                pricing,
                summary: summarize(&outcomes),
                days,
            }
        })
        .collect()
}

/// Minutes accumulated per (type, description, rate); one line each.
#[derive(Default)]
struct MinuteBuckets(Vec<(EarningType, String, Decimal, i64)>);

impl MinuteBuckets {
    fn add(&mut self, kind: EarningType, description: impl Into<String>, rate: Decimal, minutes: i64) {
        if minutes <= 0 || rate <= Decimal::ZERO {
            return;
        }
        let description = description.into();
        match self
            .0
            .iter_mut()
            .find(|(k, d, r, _)| *k == kind && *d == description && *r == rate)
        {
            Some(bucket) => bucket.3 += minutes,
            None => self.0.push((kind, description, rate, minutes)),
        }
    }

    fn into_lines(self) -> Vec<EarningLine> {
        self.0
            .into_iter()
            .map(|(kind, description, rate, minutes)| {
                EarningLine::priced(kind, description, minutes_to_hours(minutes), rate)
            })
            .collect()
    }
}

/// Prices late or absence occurrences for one policy type across a cutoff,
/// keeping a running total per selected policy.
struct PolicyLedger<'a> {
    policies: &'a [LateDeductionPolicy],
    organization_id: u64,
    policy_type: PolicyType,
    cutoffs: HashMap<u64, CutoffDeductions<'a>>,
    warned_missing: bool,
    warned_ambiguous: bool,
}

impl<'a> PolicyLedger<'a> {
    fn new(policies: &'a [LateDeductionPolicy], organization_id: u64, policy_type: PolicyType) -> Self {
        Self {
            policies,
            organization_id,
            policy_type,
            cutoffs: HashMap::new(),
            warned_missing: false,
            warned_ambiguous: false,
        }
    }

    fn price(
        &mut self,
        date: NaiveDate,
        minutes: i64,
        rates: &RateTable,
        warnings: &mut Vec<PayrollWarning>,
    ) -> Decimal {
        let selection = select_policy(self.policies, self.organization_id, self.policy_type, date);
        if selection.ambiguous && !self.warned_ambiguous {
            self.warned_ambiguous = true;
            warnings.push(PayrollWarning::new(
                WarningCode::AmbiguousPolicy,
                format!("several {} policies share the same effective date", self.policy_type),
                Some(date),
            ));
        }
        let Some(policy) = selection.policy else {
            if !self.warned_missing {
                self.warned_missing = true;
                tracing::warn!(
                    organization_id = self.organization_id,
                    policy_type = %self.policy_type,
                    %date,
                    "No deduction policy in force; occurrence not deducted"
                );
                warnings.push(PayrollWarning::new(
                    WarningCode::ConfigurationMissing,
                    format!("no active {} policy", self.policy_type),
                    Some(date),
                ));
            }
            return Decimal::ZERO;
        };
        self.cutoffs
            .entry(policy.id)
            .or_insert_with(|| CutoffDeductions::new(policy))
            .price_day(minutes, rates)
    }
}

fn holiday_multiplier(schedule: &ResolvedSchedule, holiday: HolidayType) -> Decimal {
    let rates = schedule.multipliers();
    match holiday {
        HolidayType::Regular => rates.holiday_rate,
        HolidayType::Special => rates.special_holiday_rate,
        HolidayType::Double => rates.double_holiday_rate,
    }
}

/// Computes a payroll for one employee and window. The result is a `DRAFT`;
/// the caller decides whether it is persisted as `COMPUTED`.
pub fn compute_payroll(
    window: &PayrollWindow,
    rules: &OrganizationRules,
    inputs: EmployeeInputs<'_>,
    settings: &PayrollSettings,
) -> AppResult<Payroll> {
    if window.end < window.start {
        return Err(AppError::field("period_end", "must not precede period_start"));
    }
    let organization_id = window.organization_id;
    let employee_id = inputs.employee.id;

    let holidays: HashMap<NaiveDate, HolidayType> = rules
        .holidays
        .iter()
        .filter(|h| h.organization_id == organization_id)
        .map(|h| (h.date, h.holiday_type))
        .collect();
    let mut entries_by_day: BTreeMap<NaiveDate, Vec<&TimeEntry>> = BTreeMap::new();
    for entry in inputs.entries.iter().filter(|e| e.employee_id == employee_id) {
        entries_by_day.entry(entry.work_date).or_default().push(entry);
    }

    let mut warnings = Vec::new();
    let mut resolved: Vec<ResolvedSchedule> = Vec::new();
    let mut days: Vec<ClassifiedDay> = Vec::new();

    for date in window.start.iter_days().take_while(|d| *d <= window.end) {
        let Some(compensation) = resolve_compensation(inputs.compensations, date) else {
            continue;
        };
        let index = match resolved.iter().position(|r| r.compensation_id == compensation.id) {
            Some(index) => index,
            None => {
                resolved.push(ResolvedSchedule::from_compensation(compensation)?);
                resolved.len() - 1
            }
        };
        let schedule = &resolved[index];
        let calendar = DayCalendar {
            holiday: holidays.get(&date).copied(),
            on_leave: inputs
                .leaves
                .iter()
                .any(|l| l.employee_id == employee_id && l.covers(date)),
        };
        let entries = entries_by_day.get(&date).map(Vec::as_slice).unwrap_or(&[]);
        let mut outcome = classify_day(date, schedule, calendar, entries);

        if outcome.is_incomplete {
            warnings.push(PayrollWarning::new(
                WarningCode::IncompleteAttendance,
                "time entry without clock-out",
                Some(date),
            ));
            if settings.incomplete_as_absent
                && outcome.worked_minutes == 0
                && !outcome.is_rest_day
                && calendar.holiday.is_none()
                && !calendar.on_leave
            {
                outcome.is_absent = true;
            }
        }

        days.push(ClassifiedDay {
            outcome,
            schedule: index,
            required_minutes: schedule.schedule.required_work_minutes,
        });
    }

    // Allowances and taxability follow the record in force at the end of the window.
    let closing = days.last().map(|d| &resolved[d.schedule]).ok_or_else(|| {
        AppError::ConfigurationMissing(format!(
            "no compensation covers employee {employee_id} between {} and {}",
            window.start, window.end
        ))
    })?;

    let outcomes: Vec<DailyAttendanceOutcome> = days.iter().map(|d| d.outcome.clone()).collect();
    let summary = summarize(&outcomes);
    let segments = split_segments(&resolved, &days);

    let mut priced = MinuteBuckets::default();

    // Monthly-rated pay covers every scheduled day, holidays included.
    for segment in &segments {
        let minutes = if segment.is_monthly() {
            segment
                .days
                .iter()
                .filter(|d| !d.outcome.is_rest_day)
                .map(|d| d.required_minutes)
                .sum()
        } else {
            segment.summary.regular_minutes
        };
        priced.add(EarningType::Regular, "Regular hours", segment.hourly(), minutes);
    }

    for segment in &segments {
        for day in &segment.days {
            let Some(holiday) = day.outcome.holiday else {
                continue;
            };
            let covered_by_base = segment.is_monthly() && !day.outcome.is_rest_day;
            let multiplier = holiday_multiplier(segment.pricing, holiday);
            let premium = if covered_by_base { multiplier - Decimal::ONE } else { multiplier };
            priced.add(
                EarningType::Holiday,
                format!("{holiday} holiday work"),
                segment.hourly() * premium,
                day.outcome.regular_minutes,
            );
        }
    }

    for segment in &segments {
        priced.add(
            EarningType::RestDay,
            "Rest day work",
            segment.hourly() * segment.multipliers().rest_day_rate,
            segment.summary.rest_day_minutes,
        );
    }

    let mut dropped_minutes = 0;
    for segment in &segments {
        let (overtime_minutes, excess_minutes) = match settings.overtime_cap_mode {
            OvertimeCapMode::Uncapped => (
                segment.summary.overtime_minutes + segment.summary.excess_overtime_minutes,
                0,
            ),
            _ => (segment.summary.overtime_minutes, segment.summary.excess_overtime_minutes),
        };
        priced.add(
            EarningType::Overtime,
            "Overtime",
            segment.hourly() * segment.multipliers().overtime_rate,
            overtime_minutes,
        );
        if settings.overtime_cap_mode == OvertimeCapMode::PayAtRegularRate {
            priced.add(
                EarningType::Overtime,
                "Overtime beyond cap at regular rate",
                segment.hourly(),
                excess_minutes,
            );
        } else {
            dropped_minutes += excess_minutes;
        }
    }
    if dropped_minutes > 0 {
        tracing::warn!(employee_id, excess_minutes = dropped_minutes, "Overtime beyond cap dropped");
        warnings.push(PayrollWarning::new(
            WarningCode::OvertimeCapExceeded,
            format!("{dropped_minutes} overtime minutes beyond the cap were not paid"),
            None,
        ));
    }

    for segment in &segments {
        priced.add(
            EarningType::NightDiff,
            "Night differential",
            segment.hourly() * segment.multipliers().night_diff_rate,
            segment.summary.night_diff_minutes,
        );
    }

    let mut earnings = priced.into_lines();
    for allowance in &closing.allowances {
        if allowance.amount > Decimal::ZERO {
            earnings.push(EarningLine::flat(EarningType::Allowance, allowance.name.clone(), allowance.amount));
        }
    }

    let mut deductions = Vec::new();
    let mut late = PolicyLedger::new(&rules.policies, organization_id, PolicyType::Late);
    let mut absence = PolicyLedger::new(&rules.policies, organization_id, PolicyType::Undertime);
    for day in &days {
        let pricing = &resolved[day.schedule];
        let outcome = &day.outcome;
        if pricing.schedule.allow_late_deduction
            && outcome.late_minutes > 0
            && !outcome.is_incomplete
            && !outcome.is_absent
        {
            let amount = late.price(outcome.date, outcome.late_minutes, &pricing.rates, &mut warnings);
            if amount > Decimal::ZERO {
                deductions.push(DeductionLine::flat(
                    DeductionType::Late,
                    format!("Late {} min on {}", outcome.late_minutes, outcome.date),
                    amount,
                ));
            }
        }
        // Daily and hourly rates already pay only for time worked.
        if outcome.is_absent && pricing.is_monthly_rate() {
            let amount = absence.price(outcome.date, day.required_minutes, &pricing.rates, &mut warnings);
            if amount > Decimal::ZERO {
                deductions.push(DeductionLine::flat(
                    DeductionType::Absence,
                    format!("Absent on {}", outcome.date),
                    amount,
                ));
            }
        }
    }

    let gross: Decimal = earnings.iter().map(|l| l.amount).sum();
    let non_taxable: Decimal = closing
        .allowances
        .iter()
        .filter(|a| !a.taxable && a.amount > Decimal::ZERO)
        .map(|a| round_money(a.amount))
        .sum();
    let taxable_income = (gross - non_taxable).max(Decimal::ZERO);

    let statutory = compute_statutory(
        &rules.tiers,
        organization_id,
        window.end,
        taxable_income,
        settings.contributions_reduce_taxable,
    );
    for kind in &statutory.missing {
        tracing::warn!(organization_id, %kind, date = %window.end, "No contribution table in force");
        warnings.push(PayrollWarning::new(
            WarningCode::ConfigurationMissing,
            format!("no {kind} table effective on {}", window.end),
            Some(window.end),
        ));
    }
    let mut employer_contributions = Vec::new();
    for result in &statutory.results {
        if result.employee_amount > Decimal::ZERO {
            let description = match result.kind {
                ContributionKind::Tax => "Withholding tax".to_string(),
                kind => format!("{kind} contribution"),
            };
            deductions.push(DeductionLine::flat(result.kind.into(), description, result.employee_amount));
        }
        if result.employer_amount > Decimal::ZERO {
            employer_contributions.push(EmployerContribution {
                kind: result.kind,
                amount: result.employer_amount,
            });
        }
    }

    let mut payroll = Payroll {
        id: None,
        organization_id,
        employee_id,
        department_id: window.department_id.or(inputs.employee.department_id),
        period_id: window.period_id,
        period_start: window.start,
        period_end: window.end,
        status: PayrollStatus::Draft,
        earnings,
        deductions,
        employer_contributions,
        warnings,
        attendance: summary,
        gross_pay: Decimal::ZERO,
        taxable_income: round_money(taxable_income),
        total_deductions: Decimal::ZERO,
        net_pay: Decimal::ZERO,
        void_reason: None,
    };
    payroll.recalculate_totals();

    tracing::debug!(
        employee_id,
        gross = %payroll.gross_pay,
        net = %payroll.net_pay,
        "Payroll computed"
    );
    Ok(payroll)
}
