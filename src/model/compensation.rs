use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::schedule::WorkSchedule;
use crate::error::{AppError, AppResult};

/// A recurring amount paid every period on top of attendance-based pay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Allowance {
    #[schema(example = "Rice subsidy")]
    pub name: String,
    #[schema(example = "1000.00")]
    pub amount: Decimal,
    pub taxable: bool,
}

/// Date-effective pay configuration for one employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compensation {
    pub id: u64,
    pub employee_id: u64,
    pub organization_id: u64,
    pub effective_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub schedule: WorkSchedule,
    pub allowances: Vec<Allowance>,
}

/// One line of a bulk compensation change. The pay basis is kept; only the
/// amount (and optionally the allowances) change.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct CompensationUpdate {
    #[schema(example = 1001)]
    pub employee_id: u64,
    #[schema(example = "24000.00")]
    pub pay_rate: Decimal,
    pub allowances: Option<Vec<Allowance>>,
}

/// How a change lands on the compensation history.
#[derive(Debug, Clone, PartialEq)]
pub enum CompensationRevision {
    /// The record in force already starts on the effective date.
    Replace(Compensation),
    /// The record in force is closed the day before and a new one begins.
    Supersede {
        closed_id: u64,
        closed_end: NaiveDate,
        next: Compensation,
    },
}

impl Compensation {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_date <= date && self.end_date.is_none_or(|end| date <= end)
    }

    /// Applies `update` from `effective_date` onwards. `self` must be the
    /// record in force on that date.
    pub fn revise(&self, effective_date: NaiveDate, update: &CompensationUpdate) -> AppResult<CompensationRevision> {
        if update.pay_rate <= Decimal::ZERO {
            return Err(AppError::field("pay_rate", "must be greater than zero"));
        }
        if !self.covers(effective_date) {
            return Err(AppError::field(
                "effective_date",
                format!("compensation {} is not in force on {effective_date}", self.id),
            ));
        }

        let mut next = self.clone();
        next.schedule.pay_rate = self.schedule.pay_rate.with_amount(update.pay_rate);
        if let Some(allowances) = &update.allowances {
            next.allowances = allowances.clone();
        }
        next.schedule.validate()?;

        if self.effective_date == effective_date {
            return Ok(CompensationRevision::Replace(next));
        }
        let closed_end = effective_date
            .pred_opt()
            .ok_or_else(|| AppError::field("effective_date", "out of range"))?;
        next.id = 0;
        next.effective_date = effective_date;
        Ok(CompensationRevision::Supersede {
            closed_id: self.id,
            closed_end,
            next,
        })
    }
}
