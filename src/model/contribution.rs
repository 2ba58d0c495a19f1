use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
    ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionKind {
    Tax,
    Sss,
    Philhealth,
    Pagibig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "formula", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TierFormula {
    /// `base_tax + rate * (income - excess_over)`; `excess_over` defaults to
    /// the band's minimum.
    Progressive {
        base_tax: Decimal,
        rate: Decimal,
        excess_over: Option<Decimal>,
    },
    /// Rates applied to the income clamped into the band.
    Rate {
        employee_rate: Decimal,
        employer_rate: Decimal,
    },
    Fixed {
        employee_amount: Decimal,
        employer_amount: Decimal,
    },
}

/// One salary band of a tax or contribution table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionTier {
    pub id: u64,
    pub organization_id: u64,
    pub kind: ContributionKind,
    pub min_salary: Decimal,
    /// `None` is unbounded.
    pub max_salary: Option<Decimal>,
    pub formula: TierFormula,
    pub max_contribution: Option<Decimal>,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

impl ContributionTier {
    pub fn effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.is_none_or(|to| date <= to)
    }
}
