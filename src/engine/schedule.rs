use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppResult;
use crate::model::compensation::{Allowance, Compensation};
use crate::model::schedule::{PayRate, RateMultipliers, ScheduleKind, ShiftWindow, WeekdayTag, WorkSchedule};

pub const STANDARD_WORKING_DAYS: Decimal = dec!(22);
pub const STANDARD_HOURS_PER_DAY: Decimal = dec!(8);
const WEEKS_PER_YEAR: Decimal = dec!(52);
const MONTHS_PER_YEAR: Decimal = dec!(12);

/// Monthly, daily and hourly equivalents of one authoritative pay rate.
/// Values are unrounded; rounding happens on line items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct RateTable {
    pub monthly: Decimal,
    pub daily: Decimal,
    pub hourly: Decimal,
}

impl RateTable {
    pub fn derive(pay_rate: PayRate, total_hours_per_week: Option<Decimal>) -> Self {
        let weekly_hourly = |monthly: Decimal| {
            total_hours_per_week.map(|hours| monthly * MONTHS_PER_YEAR / (WEEKS_PER_YEAR * hours))
        };

        match pay_rate {
            PayRate::Monthly(monthly) => {
                let daily = monthly / STANDARD_WORKING_DAYS;
                let hourly = weekly_hourly(monthly).unwrap_or(daily / STANDARD_HOURS_PER_DAY);
                RateTable { monthly, daily, hourly }
            }
            PayRate::Daily(daily) => {
                let monthly = daily * STANDARD_WORKING_DAYS;
                let hourly = weekly_hourly(monthly).unwrap_or(daily / STANDARD_HOURS_PER_DAY);
                RateTable { monthly, daily, hourly }
            }
            PayRate::Hourly(hourly) => {
                let daily = hourly * STANDARD_HOURS_PER_DAY;
                RateTable {
                    monthly: daily * STANDARD_WORKING_DAYS,
                    daily,
                    hourly,
                }
            }
        }
    }
}

/// The compensation in force on `date`. Overlapping records resolve to the
/// most recent `effective_date` (then the highest id).
pub fn resolve_compensation(compensations: &[Compensation], date: NaiveDate) -> Option<&Compensation> {
    compensations
        .iter()
        .filter(|c| c.covers(date))
        .max_by_key(|c| (c.effective_date, c.id))
}

/// A compensation record normalized for classification and pricing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchedule {
    pub compensation_id: u64,
    pub schedule: WorkSchedule,
    pub allowances: Vec<Allowance>,
    pub rates: RateTable,
}

impl ResolvedSchedule {
    /// Rejects a stored schedule that fails validation before anything is
    /// classified or priced against it.
    pub fn from_compensation(compensation: &Compensation) -> AppResult<Self> {
        compensation.schedule.validate()?;
        let schedule = compensation.schedule.clone();
        let rates = RateTable::derive(schedule.pay_rate, schedule.total_hours_per_week);
        Ok(Self {
            compensation_id: compensation.id,
            schedule,
            allowances: compensation.allowances.clone(),
            rates,
        })
    }

    pub fn multipliers(&self) -> &RateMultipliers {
        &self.schedule.rates
    }

    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        self.schedule.is_work_day(date)
    }

    pub fn is_monthly_rate(&self) -> bool {
        self.schedule.pay_rate.is_monthly()
    }

    /// `None` when the window is empty (start equals end).
    pub fn night_window(&self) -> Option<ShiftWindow> {
        let window = ShiftWindow {
            start: self.schedule.night_shift_start,
            end: self.schedule.night_shift_end,
        };
        (window.start != window.end).then_some(window)
    }

    /// Payable overtime cap in minutes.
    pub fn max_overtime_minutes(&self) -> i64 {
        minutes_from_hours(self.schedule.max_overtime_hours)
    }

    /// Scheduled start for lateness, or `None` when the day has no fixed
    /// start (flexible any-hours, hybrid remote days).
    pub fn expected_start(&self, date: NaiveDate) -> Option<NaiveTime> {
        match &self.schedule.kind {
            ScheduleKind::Fixed { default_start, .. } => Some(*default_start),
            ScheduleKind::Flexible {
                core_start,
                can_log_any_hours,
                ..
            } => (!can_log_any_hours).then_some(*core_start),
            ScheduleKind::Rotating {
                rotation_anchor,
                rotation_length_days,
                shift_groups,
            } => {
                if shift_groups.is_empty() || *rotation_length_days == 0 {
                    return None;
                }
                let cycle = (date - *rotation_anchor)
                    .num_days()
                    .div_euclid(i64::from(*rotation_length_days));
                let index = cycle.rem_euclid(shift_groups.len() as i64) as usize;
                Some(shift_groups[index].start)
            }
            ScheduleKind::Hybrid {
                office_days,
                office_hours,
                ..
            } => {
                if office_days.contains(&WeekdayTag::of(date)) {
                    office_hours.map(|w| w.start)
                } else {
                    None
                }
            }
        }
    }
}

fn minutes_from_hours(hours: Decimal) -> i64 {
    use rust_decimal::prelude::ToPrimitive;
    (hours * dec!(60)).floor().to_i64().unwrap_or(i64::MAX)
}
