use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use super::attendance::AttendanceSummary;
use super::contribution::ContributionKind;
use crate::error::{AppError, AppResult};
use crate::utils::money::{round_money, round_quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PayrollStatus {
    Draft,
    Computed,
    Approved,
    Released,
    Voided,
}

impl PayrollStatus {
    /// Line items may only be rewritten while the record is still a draft or
    /// freshly computed.
    pub fn is_editable(self) -> bool {
        matches!(self, PayrollStatus::Draft | PayrollStatus::Computed)
    }

    pub fn can_transition_to(self, target: PayrollStatus) -> bool {
        use PayrollStatus::*;
        matches!(
            (self, target),
            (Draft, Computed)
                | (Computed, Approved)
                | (Approved, Released)
                | (Computed | Approved | Released, Voided)
        )
    }

    /// Validates a requested transition. Voiding needs a non-blank reason.
    pub fn transition(self, target: PayrollStatus, reason: Option<&str>) -> AppResult<PayrollStatus> {
        if !self.can_transition_to(target) {
            return Err(AppError::StateConflict(format!(
                "payroll cannot move from {self} to {target}"
            )));
        }
        if target == PayrollStatus::Voided && reason.is_none_or(|r| r.trim().is_empty()) {
            return Err(AppError::field("reason", "a reason is required to void a payroll"));
        }
        Ok(target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EarningType {
    Regular,
    Overtime,
    NightDiff,
    RestDay,
    Holiday,
    Allowance,
    Bonus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeductionType {
    Tax,
    Sss,
    Philhealth,
    Pagibig,
    Late,
    Absence,
}

impl From<ContributionKind> for DeductionType {
    fn from(kind: ContributionKind) -> Self {
        match kind {
            ContributionKind::Tax => DeductionType::Tax,
            ContributionKind::Sss => DeductionType::Sss,
            ContributionKind::Philhealth => DeductionType::Philhealth,
            ContributionKind::Pagibig => DeductionType::Pagibig,
        }
    }
}

/// A priced component of a payroll. `amount` is the unrounded hours times
/// rate, rounded once to centavos; the stored `hours` and `rate` are rounded
/// to four decimals for display. Flat lines carry zero hours and rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem<K> {
    pub kind: K,
    pub description: String,
    pub hours: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

pub type EarningLine = LineItem<EarningType>;
pub type DeductionLine = LineItem<DeductionType>;

const LINE_TOLERANCE: Decimal = dec!(0.01);
/// Half of the last displayed decimal of `hours` and `rate`.
const QUANTITY_HALF_STEP: Decimal = dec!(0.00005);

impl<K> LineItem<K> {
    pub fn priced(kind: K, description: impl Into<String>, hours: Decimal, rate: Decimal) -> Self {
        Self {
            kind,
            description: description.into(),
            hours: round_quantity(hours),
            rate: round_quantity(rate),
            amount: round_money(hours * rate),
        }
    }

    pub fn flat(kind: K, description: impl Into<String>, amount: Decimal) -> Self {
        Self {
            kind,
            description: description.into(),
            hours: Decimal::ZERO,
            rate: Decimal::ZERO,
            amount: round_money(amount),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.hours.is_zero() || self.rate.is_zero()
    }

    pub fn is_consistent(&self) -> bool {
        let display_error = QUANTITY_HALF_STEP * (self.hours.abs() + self.rate.abs());
        self.is_flat() || (self.amount - self.hours * self.rate).abs() <= LINE_TOLERANCE + display_error
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmployerContribution {
    pub kind: ContributionKind,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    ConfigurationMissing,
    AmbiguousPolicy,
    IncompleteAttendance,
    OvertimeCapExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PayrollWarning {
    pub code: WarningCode,
    pub message: String,
    #[schema(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
}

impl PayrollWarning {
    pub fn new(code: WarningCode, message: impl Into<String>, date: Option<NaiveDate>) -> Self {
        Self {
            code,
            message: message.into(),
            date,
        }
    }
}

/// Root aggregate for one employee and one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Payroll {
    pub id: Option<u64>,
    pub organization_id: u64,
    pub employee_id: u64,
    pub department_id: Option<u64>,
    pub period_id: Option<u64>,
    #[schema(value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub period_end: NaiveDate,
    pub status: PayrollStatus,
    #[schema(value_type = Vec<Object>)]
    pub earnings: Vec<EarningLine>,
    #[schema(value_type = Vec<Object>)]
    pub deductions: Vec<DeductionLine>,
    pub employer_contributions: Vec<EmployerContribution>,
    pub warnings: Vec<PayrollWarning>,
    pub attendance: AttendanceSummary,
    pub gross_pay: Decimal,
    pub taxable_income: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
    pub void_reason: Option<String>,
}

impl Payroll {
    /// Re-derives gross, total deductions and net from the line items.
    pub fn recalculate_totals(&mut self) {
        self.gross_pay = self.earnings.iter().map(|l| l.amount).sum();
        self.total_deductions = self.deductions.iter().map(|l| l.amount).sum();
        self.net_pay = self.gross_pay - self.total_deductions;
    }

    pub fn totals_match_lines(&self) -> bool {
        let gross: Decimal = self.earnings.iter().map(|l| l.amount).sum();
        let deductions: Decimal = self.deductions.iter().map(|l| l.amount).sum();
        self.gross_pay == gross
            && self.total_deductions == deductions
            && self.net_pay == gross - deductions
    }
}
