use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult, FieldError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyType {
    Late,
    /// Also used to price whole-day absences.
    Undertime,
}

/// How a billable late or absent occurrence is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeductionMethod {
    FixedAmount(Decimal),
    /// Percentage of the daily rate, e.g. `10` for 10%.
    Percentage(Decimal),
    HourlyRate(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateDeductionPolicy {
    pub id: u64,
    pub organization_id: u64,
    pub name: String,
    pub policy_type: PolicyType,
    pub method: DeductionMethod,
    pub grace_period_minutes: i64,
    pub minimum_late_minutes: i64,
    pub max_deduction_per_day: Option<Decimal>,
    pub max_deduction_per_cutoff: Option<Decimal>,
    pub effective_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl LateDeductionPolicy {
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.is_active
            && self.effective_date <= date
            && self.end_date.is_none_or(|end| date <= end)
    }

    /// Minutes below this are never billable.
    pub fn threshold_minutes(&self) -> i64 {
        self.grace_period_minutes.max(self.minimum_late_minutes)
    }

    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        if self.grace_period_minutes < 0 {
            errors.push(FieldError::new("grace_period_minutes", "must be zero or greater"));
        }
        if self.minimum_late_minutes < 1 {
            errors.push(FieldError::new("minimum_late_minutes", "must be at least 1"));
        }
        let method_value = match self.method {
            DeductionMethod::FixedAmount(v) => ("fixed_amount", v),
            DeductionMethod::Percentage(v) => ("percentage_rate", v),
            DeductionMethod::HourlyRate(v) => ("hourly_rate_multiplier", v),
        };
        if method_value.1 <= Decimal::ZERO {
            errors.push(FieldError::new(method_value.0, "must be greater than zero"));
        }
        if let Some(end) = self.end_date {
            if end < self.effective_date {
                errors.push(FieldError::new("end_date", "must not precede effective_date"));
            }
        }
        for (field, cap) in [
            ("max_deduction_per_day", self.max_deduction_per_day),
            ("max_deduction_per_cutoff", self.max_deduction_per_cutoff),
        ] {
            if cap.is_some_and(|c| c < Decimal::ZERO) {
                errors.push(FieldError::new(field, "must be zero or greater"));
            }
        }
        AppError::check(errors)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn policy(method: DeductionMethod) -> LateDeductionPolicy {
        LateDeductionPolicy {
            id: 1,
            organization_id: 7,
            name: "Standard late".into(),
            policy_type: PolicyType::Late,
            method,
            grace_period_minutes: 5,
            minimum_late_minutes: 1,
            max_deduction_per_day: None,
            max_deduction_per_cutoff: None,
            effective_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: None,
            is_active: true,
        }
    }

    fn fields(result: AppResult<()>) -> Vec<String> {
        match result {
            Err(AppError::Validation(f)) => f.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_a_sane_policy() {
        assert!(policy(DeductionMethod::FixedAmount(dec!(100))).validate().is_ok());
    }

    #[test]
    fn rejects_every_bad_field() {
        let mut bad = policy(DeductionMethod::Percentage(dec!(0)));
        bad.minimum_late_minutes = 0;
        bad.max_deduction_per_cutoff = Some(dec!(-1));
        bad.end_date = NaiveDate::from_ymd_opt(2024, 12, 31);
        let mut got = fields(bad.validate());
        got.sort();
        assert_eq!(
            got,
            vec!["end_date", "max_deduction_per_cutoff", "minimum_late_minutes", "percentage_rate"]
        );
    }
}
