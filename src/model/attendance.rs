use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeEntryStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBreak {
    pub id: u64,
    pub start_at: NaiveDateTime,
    pub end_at: Option<NaiveDateTime>,
}

/// One clock-in/clock-out session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: u64,
    pub employee_id: u64,
    pub work_date: NaiveDate,
    pub clock_in_at: NaiveDateTime,
    pub clock_out_at: Option<NaiveDateTime>,
    pub total_work_minutes: Option<i64>,
    pub status: TimeEntryStatus,
    pub breaks: Vec<TimeBreak>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HolidayType {
    Regular,
    Special,
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Holiday {
    pub organization_id: u64,
    pub date: NaiveDate,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub holiday_type: HolidayType,
}

impl TryFrom<String> for HolidayType {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What one calendar day of attendance amounts to for one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailyAttendanceOutcome {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub worked_minutes: i64,
    pub regular_minutes: i64,
    pub overtime_minutes: i64,
    /// Overtime beyond the schedule's cap; never paid as overtime.
    pub excess_overtime_minutes: i64,
    pub night_diff_minutes: i64,
    pub late_minutes: i64,
    pub is_absent: bool,
    pub is_incomplete: bool,
    pub is_rest_day: bool,
    pub on_leave: bool,
    pub holiday: Option<HolidayType>,
}

impl DailyAttendanceOutcome {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            worked_minutes: 0,
            regular_minutes: 0,
            overtime_minutes: 0,
            excess_overtime_minutes: 0,
            night_diff_minutes: 0,
            late_minutes: 0,
            is_absent: false,
            is_incomplete: false,
            is_rest_day: false,
            on_leave: false,
            holiday: None,
        }
    }
}

/// Period totals reduced from daily outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceSummary {
    pub days_worked: u32,
    pub days_absent: u32,
    pub days_incomplete: u32,
    pub days_late: u32,
    pub regular_minutes: i64,
    pub overtime_minutes: i64,
    pub excess_overtime_minutes: i64,
    pub night_diff_minutes: i64,
    pub rest_day_minutes: i64,
    pub holiday_minutes: i64,
    pub late_minutes: i64,
}
