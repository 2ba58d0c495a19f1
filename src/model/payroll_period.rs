use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Monthly,
    SemiMonthly,
    BiWeekly,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 12,
    "organization_id": 7,
    "period_type": "SEMI_MONTHLY",
    "status": "PENDING",
    "start_date": "2026-01-01",
    "end_date": "2026-01-15",
    "pay_date": "2026-01-20",
    "year": 2026,
    "month": 1,
    "period_number": 1
}))]
pub struct PayrollPeriod {
    pub id: u64,
    pub organization_id: u64,
    pub period_type: PeriodType,
    pub status: PeriodStatus,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub pay_date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub period_number: u32,
}

/// A generated window that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayrollPeriod {
    pub organization_id: u64,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pay_date: NaiveDate,
}

impl NewPayrollPeriod {
    pub fn year(&self) -> i32 {
        self.start_date.year()
    }

    pub fn month(&self) -> u32 {
        self.start_date.month()
    }

    /// Position of the window inside its starting month.
    pub fn period_number(&self) -> u32 {
        let day = self.start_date.day();
        match self.period_type {
            PeriodType::Monthly => 1,
            PeriodType::SemiMonthly => {
                if day <= 15 {
                    1
                } else {
                    2
                }
            }
            PeriodType::BiWeekly => (day - 1) / 14 + 1,
            PeriodType::Weekly => (day - 1) / 7 + 1,
        }
    }

    pub fn overlaps(&self, other: &PayrollPeriod) -> bool {
        self.start_date <= other.end_date && other.start_date <= self.end_date
    }
}
