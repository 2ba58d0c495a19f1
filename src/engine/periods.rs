use chrono::{Datelike, Days, Months, NaiveDate};

use crate::error::{AppError, AppResult, FieldError};
use crate::model::payroll_period::{NewPayrollPeriod, PeriodType};
use crate::model::schedule::WeekdayTag;

/// Longest range accepted in a single generation request.
const MAX_RANGE_DAYS: i64 = 731;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodRequest {
    pub organization_id: u64,
    pub period_type: PeriodType,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub pay_day_offset: i64,
    /// Anchor weekday for weekly and bi-weekly windows.
    pub week_start: WeekdayTag,
}

impl PeriodRequest {
    fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        if self.end < self.start {
            errors.push(FieldError::new("end_date", "must not precede start_date"));
        } else if (self.end - self.start).num_days() > MAX_RANGE_DAYS {
            errors.push(FieldError::new("end_date", "range may span at most two years"));
        }
        let min_offset = if self.period_type == PeriodType::Monthly { 0 } else { 1 };
        if self.pay_day_offset < min_offset {
            errors.push(FieldError::new(
                "pay_day_offset",
                format!("must be at least {min_offset} for {} periods", self.period_type),
            ));
        }
        AppError::check(errors)
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn invalid_range() -> AppError {
    AppError::field("end_date", "date range is outside the supported calendar")
}

fn last_of_month(first: NaiveDate) -> AppResult<NaiveDate> {
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(invalid_range)
}

fn add_days(date: NaiveDate, days: i64) -> AppResult<NaiveDate> {
    u64::try_from(days)
        .ok()
        .and_then(|d| date.checked_add_days(Days::new(d)))
        .ok_or_else(invalid_range)
}

/// Raw `(start, end)` windows of the requested type overlapping the range.
fn windows(request: &PeriodRequest) -> AppResult<Vec<(NaiveDate, NaiveDate)>> {
    let mut out = Vec::new();
    match request.period_type {
        PeriodType::Monthly | PeriodType::SemiMonthly => {
            let mut month = first_of_month(request.start);
            while month <= request.end {
                let last = last_of_month(month)?;
                if request.period_type == PeriodType::Monthly {
                    out.push((month, last));
                } else {
                    let fifteenth = add_days(month, 14)?;
                    out.push((month, fifteenth));
                    out.push((add_days(month, 15)?, last));
                }
                month = add_days(last, 1)?;
            }
        }
        PeriodType::BiWeekly | PeriodType::Weekly => {
            let length = if request.period_type == PeriodType::Weekly { 7 } else { 14 };
            let anchor: chrono::Weekday = request.week_start.into();
            let back = (request.start.weekday().num_days_from_monday() + 7
                - anchor.num_days_from_monday())
                % 7;
            let mut start = request
                .start
                .checked_sub_days(Days::new(u64::from(back)))
                .ok_or_else(invalid_range)?;
            while start <= request.end {
                let end = add_days(start, length - 1)?;
                out.push((start, end));
                start = add_days(end, 1)?;
            }
        }
    }
    out.retain(|(start, end)| *start <= request.end && request.start <= *end);
    Ok(out)
}

/// Generates the payroll windows overlapping `[start, end]` with their pay
/// dates. Monthly periods are paid `offset` days after the first of the
/// following month, every other type `offset` days after the window ends.
pub fn generate_periods(request: &PeriodRequest) -> AppResult<Vec<NewPayrollPeriod>> {
    request.validate()?;

    windows(request)?
        .into_iter()
        .map(|(start_date, end_date)| {
            let pay_date = match request.period_type {
                PeriodType::Monthly => add_days(add_days(end_date, 1)?, request.pay_day_offset)?,
                _ => add_days(end_date, request.pay_day_offset)?,
            };
            Ok(NewPayrollPeriod {
                organization_id: request.organization_id,
                period_type: request.period_type,
                start_date,
                end_date,
                pay_date,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn request(period_type: PeriodType, start: NaiveDate, end: NaiveDate, offset: i64) -> PeriodRequest {
        PeriodRequest {
            organization_id: 7,
            period_type,
            start,
            end,
            pay_day_offset: offset,
            week_start: WeekdayTag::Mon,
        }
    }

    fn bounds(periods: &[NewPayrollPeriod]) -> Vec<(NaiveDate, NaiveDate)> {
        periods.iter().map(|p| (p.start_date, p.end_date)).collect()
    }

    #[test]
    fn semi_monthly_january() {
        let periods =
            generate_periods(&request(PeriodType::SemiMonthly, d(2026, 1, 1), d(2026, 1, 31), 5)).unwrap();
        assert_eq!(
            bounds(&periods),
            vec![(d(2026, 1, 1), d(2026, 1, 15)), (d(2026, 1, 16), d(2026, 1, 31))]
        );
        assert_eq!(periods[0].pay_date, d(2026, 1, 20));
        assert_eq!(periods[1].pay_date, d(2026, 2, 5));
        assert_eq!(periods[0].period_number(), 1);
        assert_eq!(periods[1].period_number(), 2);
    }

    #[test]
    fn semi_monthly_february_in_leap_year() {
        let periods =
            generate_periods(&request(PeriodType::SemiMonthly, d(2028, 2, 10), d(2028, 2, 20), 1)).unwrap();
        assert_eq!(
            bounds(&periods),
            vec![(d(2028, 2, 1), d(2028, 2, 15)), (d(2028, 2, 16), d(2028, 2, 29))]
        );
    }

    #[test]
    fn monthly_pays_after_first_of_next_month() {
        let periods =
            generate_periods(&request(PeriodType::Monthly, d(2025, 11, 1), d(2026, 1, 31), 4)).unwrap();
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[1].start_date, d(2025, 12, 1));
        assert_eq!(periods[1].end_date, d(2025, 12, 31));
        assert_eq!(periods[1].pay_date, d(2026, 1, 5));
        assert_eq!(periods[2].year(), 2026);
        assert_eq!(periods[2].month(), 1);
    }

    #[test]
    fn weekly_windows_anchor_on_week_start() {
        // 2025-01-01 is a Wednesday
        let periods =
            generate_periods(&request(PeriodType::Weekly, d(2025, 1, 1), d(2025, 1, 14), 2)).unwrap();
        assert_eq!(
            bounds(&periods),
            vec![
                (d(2024, 12, 30), d(2025, 1, 5)),
                (d(2025, 1, 6), d(2025, 1, 12)),
                (d(2025, 1, 13), d(2025, 1, 19)),
            ]
        );
        assert_eq!(periods[0].pay_date, d(2025, 1, 7));

        let mut sunday = request(PeriodType::BiWeekly, d(2025, 1, 1), d(2025, 1, 20), 3);
        sunday.week_start = WeekdayTag::Sun;
        let periods = generate_periods(&sunday).unwrap();
        assert_eq!(
            bounds(&periods),
            vec![(d(2024, 12, 29), d(2025, 1, 11)), (d(2025, 1, 12), d(2025, 1, 25))]
        );
    }

    #[test]
    fn windows_never_overlap_and_pay_after_end() {
        for period_type in [PeriodType::Monthly, PeriodType::SemiMonthly, PeriodType::BiWeekly, PeriodType::Weekly] {
            let periods = generate_periods(&request(period_type, d(2025, 1, 1), d(2025, 12, 31), 3)).unwrap();
            for pair in periods.windows(2) {
                assert!(pair[0].end_date < pair[1].start_date);
            }
            assert!(periods.iter().all(|p| p.start_date < p.end_date && p.end_date < p.pay_date));
        }
    }

    #[test]
    fn rejects_bad_requests() {
        assert!(matches!(
            generate_periods(&request(PeriodType::Weekly, d(2025, 2, 1), d(2025, 1, 1), 1)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            generate_periods(&request(PeriodType::SemiMonthly, d(2025, 1, 1), d(2025, 1, 31), 0)),
            Err(AppError::Validation(_))
        ));
        assert!(generate_periods(&request(PeriodType::Monthly, d(2025, 1, 1), d(2025, 1, 31), 0)).is_ok());
        assert!(generate_periods(&request(PeriodType::Monthly, d(2020, 1, 1), d(2025, 1, 31), 0)).is_err());
    }
}
