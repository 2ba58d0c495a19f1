use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::{AppResult, FieldError};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum WeekdayTag {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<Weekday> for WeekdayTag {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => WeekdayTag::Mon,
            Weekday::Tue => WeekdayTag::Tue,
            Weekday::Wed => WeekdayTag::Wed,
            Weekday::Thu => WeekdayTag::Thu,
            Weekday::Fri => WeekdayTag::Fri,
            Weekday::Sat => WeekdayTag::Sat,
            Weekday::Sun => WeekdayTag::Sun,
        }
    }
}

impl From<WeekdayTag> for Weekday {
    fn from(tag: WeekdayTag) -> Self {
        match tag {
            WeekdayTag::Mon => Weekday::Mon,
            WeekdayTag::Tue => Weekday::Tue,
            WeekdayTag::Wed => Weekday::Wed,
            WeekdayTag::Thu => Weekday::Thu,
            WeekdayTag::Fri => Weekday::Fri,
            WeekdayTag::Sat => Weekday::Sat,
            WeekdayTag::Sun => Weekday::Sun,
        }
    }
}

impl WeekdayTag {
    pub fn of(date: NaiveDate) -> Self {
        date.weekday().into()
    }
}

/// A time-of-day window. `end <= start` means the window crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Schedule-type specific configuration. Each variant carries exactly the
/// fields its type requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schedule_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleKind {
    Fixed {
        default_start: NaiveTime,
        default_end: NaiveTime,
    },
    Flexible {
        core_start: NaiveTime,
        core_end: NaiveTime,
        weekly_hours_target: Decimal,
        min_hours_per_day: Decimal,
        max_hours_per_day: Decimal,
        can_log_any_hours: bool,
    },
    Rotating {
        rotation_anchor: NaiveDate,
        rotation_length_days: u32,
        shift_groups: Vec<ShiftWindow>,
    },
    Hybrid {
        office_days: BTreeSet<WeekdayTag>,
        remote_days: BTreeSet<WeekdayTag>,
        office_hours: Option<ShiftWindow>,
    },
}

/// The single authoritative pay rate. The other two are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", content = "amount", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayRate {
    Monthly(Decimal),
    Daily(Decimal),
    Hourly(Decimal),
}

impl PayRate {
    pub fn amount(&self) -> Decimal {
        match *self {
            PayRate::Monthly(a) | PayRate::Daily(a) | PayRate::Hourly(a) => a,
        }
    }

    pub fn is_monthly(&self) -> bool {
        matches!(self, PayRate::Monthly(_))
    }

    /// Same basis, new amount.
    pub fn with_amount(&self, amount: Decimal) -> Self {
        match self {
            PayRate::Monthly(_) => PayRate::Monthly(amount),
            PayRate::Daily(_) => PayRate::Daily(amount),
            PayRate::Hourly(_) => PayRate::Hourly(amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateMultipliers {
    pub overtime_rate: Decimal,
    pub rest_day_rate: Decimal,
    pub holiday_rate: Decimal,
    pub special_holiday_rate: Decimal,
    pub double_holiday_rate: Decimal,
    /// Premium fraction paid on top of the hourly rate for night minutes.
    pub night_diff_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSchedule {
    pub kind: ScheduleKind,
    pub work_days: BTreeSet<WeekdayTag>,
    pub rest_days: BTreeSet<WeekdayTag>,
    pub night_shift_start: NaiveTime,
    pub night_shift_end: NaiveTime,
    pub rates: RateMultipliers,
    pub grace_period_minutes: i64,
    pub required_work_minutes: i64,
    pub max_regular_hours: Decimal,
    pub max_overtime_hours: Decimal,
    pub allow_late_deduction: bool,
    pub total_hours_per_week: Option<Decimal>,
    pub pay_rate: PayRate,
}

impl WorkSchedule {
    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        self.work_days.contains(&WeekdayTag::of(date))
    }

    /// Rejects schedules that cannot be priced or classified, reporting
    /// every offending field at once.
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();

        for day in self.work_days.intersection(&self.rest_days) {
            errors.push(FieldError::new(
                "work_days",
                format!("{day} is listed as both a work day and a rest day"),
            ));
        }

        if self.grace_period_minutes < 0 {
            errors.push(FieldError::new("grace_period_minutes", "must be zero or greater"));
        }
        if self.required_work_minutes <= 0 {
            errors.push(FieldError::new("required_work_minutes", "must be greater than zero"));
        }
        if self.max_overtime_hours < Decimal::ZERO {
            errors.push(FieldError::new("max_overtime_hours", "must be zero or greater"));
        }
        if Decimal::from(self.required_work_minutes) > self.max_regular_hours * Decimal::from(60) {
            errors.push(FieldError::new(
                "max_regular_hours",
                "must cover required_work_minutes",
            ));
        }
        if let Some(hours) = self.total_hours_per_week {
            if hours <= Decimal::ZERO {
                errors.push(FieldError::new("total_hours_per_week", "must be greater than zero"));
            }
        }
        if self.pay_rate.amount() <= Decimal::ZERO {
            errors.push(FieldError::new("pay_rate", "must be greater than zero"));
        }

        let multipliers = [
            ("overtime_rate", self.rates.overtime_rate),
            ("rest_day_rate", self.rates.rest_day_rate),
            ("holiday_rate", self.rates.holiday_rate),
            ("special_holiday_rate", self.rates.special_holiday_rate),
            ("double_holiday_rate", self.rates.double_holiday_rate),
            ("night_diff_rate", self.rates.night_diff_rate),
        ];
        for (field, value) in multipliers {
            if value <= Decimal::ZERO {
                errors.push(FieldError::new(field, "must be positive"));
            }
        }

        self.validate_kind(&mut errors);

        crate::error::AppError::check(errors)
    }

    fn validate_kind(&self, errors: &mut Vec<FieldError>) {
        match &self.kind {
            ScheduleKind::Fixed {
                default_start,
                default_end,
            } => {
                if default_start == default_end {
                    errors.push(FieldError::new("default_end", "must differ from default_start"));
                }
            }
            ScheduleKind::Flexible {
                core_start,
                core_end,
                weekly_hours_target,
                min_hours_per_day,
                max_hours_per_day,
                ..
            } => {
                if core_start >= core_end {
                    errors.push(FieldError::new("core_end", "must be after core_start"));
                }
                if *weekly_hours_target <= Decimal::ZERO {
                    errors.push(FieldError::new("weekly_hours_target", "must be greater than zero"));
                }
                if min_hours_per_day > max_hours_per_day {
                    errors.push(FieldError::new(
                        "min_hours_per_day",
                        "must not exceed max_hours_per_day",
                    ));
                }
            }
            ScheduleKind::Rotating {
                rotation_length_days,
                shift_groups,
                ..
            } => {
                if *rotation_length_days == 0 {
                    errors.push(FieldError::new("rotation_length_days", "must be at least 1"));
                }
                if shift_groups.is_empty() {
                    errors.push(FieldError::new("shift_groups", "at least one shift group is required"));
                }
                if shift_groups.iter().any(|g| g.start == g.end) {
                    errors.push(FieldError::new("shift_groups", "shift start must differ from end"));
                }
            }
            ScheduleKind::Hybrid {
                office_days,
                remote_days,
                ..
            } => {
                if office_days.is_empty() {
                    errors.push(FieldError::new("office_days", "must not be empty"));
                }
                if remote_days.is_empty() {
                    errors.push(FieldError::new("remote_days", "must not be empty"));
                }
                if office_days.intersection(remote_days).next().is_some() {
                    errors.push(FieldError::new(
                        "remote_days",
                        "must not share days with office_days",
                    ));
                }
                for (field, days) in [("office_days", office_days), ("remote_days", remote_days)] {
                    if let Some(day) = days.difference(&self.work_days).next() {
                        errors.push(FieldError::new(field, format!("{day} is not a work day")));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use rust_decimal_macros::dec;

    pub fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    pub fn weekdays() -> BTreeSet<WeekdayTag> {
        [
            WeekdayTag::Mon,
            WeekdayTag::Tue,
            WeekdayTag::Wed,
            WeekdayTag::Thu,
            WeekdayTag::Fri,
        ]
        .into_iter()
        .collect()
    }

    /// 09:00-18:00, Monday to Friday, 480 required minutes, monthly ₱22,000.
    pub fn office_schedule() -> WorkSchedule {
        WorkSchedule {
            kind: ScheduleKind::Fixed {
                default_start: hm(9, 0),
                default_end: hm(18, 0),
            },
            work_days: weekdays(),
            rest_days: [WeekdayTag::Sat, WeekdayTag::Sun].into_iter().collect(),
            night_shift_start: hm(22, 0),
            night_shift_end: hm(6, 0),
            rates: RateMultipliers {
                overtime_rate: dec!(1.25),
                rest_day_rate: dec!(1.30),
                holiday_rate: dec!(2.00),
                special_holiday_rate: dec!(1.30),
                double_holiday_rate: dec!(3.00),
                night_diff_rate: dec!(0.10),
            },
            grace_period_minutes: 10,
            required_work_minutes: 480,
            max_regular_hours: dec!(8),
            max_overtime_hours: dec!(4),
            allow_late_deduction: true,
            total_hours_per_week: None,
            pay_rate: PayRate::Monthly(dec!(22000)),
        }
    }
}
