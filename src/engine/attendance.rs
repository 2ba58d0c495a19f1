//! Turns one day of clock events into a [`DailyAttendanceOutcome`].
//!
//! Worked time is represented as half-open `[start, end)` segments (each
//! entry minus its breaks). Night differential is the exact intersection of
//! those segments with every occurrence of the night window, so the cost is
//! proportional to the number of calendar days an entry spans.

use chrono::{Days, NaiveDate, NaiveDateTime};

use super::schedule::ResolvedSchedule;
use crate::model::attendance::{AttendanceSummary, DailyAttendanceOutcome, HolidayType, TimeEntry};
use crate::model::schedule::ShiftWindow;

type Segment = (NaiveDateTime, NaiveDateTime);

/// Calendar facts about a day that are not part of the schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCalendar {
    pub holiday: Option<HolidayType>,
    pub on_leave: bool,
}

/// Worked segments of a closed entry: the clock interval minus breaks
/// clipped to it. Open entries have no segments.
fn worked_segments(entry: &TimeEntry) -> Vec<Segment> {
    let Some(clock_out) = entry.clock_out_at else {
        return Vec::new();
    };
    let clock_in = entry.clock_in_at;
    if clock_out <= clock_in {
        return Vec::new();
    }

    let mut breaks: Vec<Segment> = entry
        .breaks
        .iter()
        .map(|b| (b.start_at.max(clock_in), b.end_at.unwrap_or(clock_out).min(clock_out)))
        .filter(|(start, end)| start < end)
        .collect();
    breaks.sort();

    let mut segments = Vec::new();
    let mut cursor = clock_in;
    for (start, end) in breaks {
        if start > cursor {
            segments.push((cursor, start));
        }
        cursor = cursor.max(end);
    }
    if cursor < clock_out {
        segments.push((cursor, clock_out));
    }
    segments
}

fn segment_seconds(segments: &[Segment]) -> i64 {
    segments.iter().map(|(a, b)| (*b - *a).num_seconds()).sum()
}

/// Minutes a closed entry contributes, used for `total_work_minutes` on close.
pub fn entry_work_minutes(entry: &TimeEntry) -> i64 {
    segment_seconds(&worked_segments(entry)) / 60
}

fn overlap_seconds(a: Segment, b: Segment) -> i64 {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    if end > start { (end - start).num_seconds() } else { 0 }
}

/// Seconds of `segment` inside the night window. A window whose end is not
/// after its start wraps past midnight.
fn night_seconds(segment: Segment, window: ShiftWindow) -> i64 {
    let wraps = window.end <= window.start;
    let Some(mut day) = segment.0.date().checked_sub_days(Days::new(1)) else {
        return 0;
    };
    let last = segment.1.date();
    let mut total = 0;
    while day <= last {
        let open = day.and_time(window.start);
        let close = if wraps {
            match day.checked_add_days(Days::new(1)) {
                Some(next) => next.and_time(window.end),
                None => break,
            }
        } else {
            day.and_time(window.end)
        };
        total += overlap_seconds(segment, (open, close));
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    total
}

/// Classifies one calendar day. `entries` are the sessions whose
/// `work_date` is `date`; lateness is raw, grace is applied by the
/// deduction policy.
pub fn classify_day(
    date: NaiveDate,
    schedule: &ResolvedSchedule,
    calendar: DayCalendar,
    entries: &[&TimeEntry],
) -> DailyAttendanceOutcome {
    let mut outcome = DailyAttendanceOutcome::empty(date);
    let is_work_day = schedule.is_work_day(date);
    outcome.is_rest_day = !is_work_day;
    outcome.holiday = calendar.holiday;
    outcome.on_leave = calendar.on_leave;

    if entries.is_empty() {
        outcome.is_absent = is_work_day && calendar.holiday.is_none() && !calendar.on_leave;
        return outcome;
    }

    outcome.is_incomplete = entries.iter().any(|e| e.clock_out_at.is_none());

    let segments: Vec<Segment> = entries.iter().flat_map(|e| worked_segments(e)).collect();
    let worked = segment_seconds(&segments) / 60;
    let required = schedule.schedule.required_work_minutes;

    let raw_overtime = (worked - required).max(0);
    let overtime = raw_overtime.min(schedule.max_overtime_minutes());

    outcome.worked_minutes = worked;
    outcome.regular_minutes = worked - raw_overtime;
    outcome.overtime_minutes = overtime;
    outcome.excess_overtime_minutes = raw_overtime - overtime;

    if let Some(window) = schedule.night_window() {
        let seconds: i64 = segments.iter().map(|s| night_seconds(*s, window)).sum();
        outcome.night_diff_minutes = seconds / 60;
    }

    if is_work_day {
        if let (Some(expected), Some(first_in)) = (
            schedule.expected_start(date),
            entries.iter().map(|e| e.clock_in_at).min(),
        ) {
            outcome.late_minutes = (first_in - date.and_time(expected)).num_minutes().max(0);
        }
    }

    outcome
}

/// Reduces daily outcomes into period totals.
pub fn summarize(outcomes: &[DailyAttendanceOutcome]) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();
    for day in outcomes {
        if day.worked_minutes > 0 {
            summary.days_worked += 1;
        }
        if day.is_absent {
            summary.days_absent += 1;
        }
        if day.is_incomplete {
            summary.days_incomplete += 1;
        }
        if day.late_minutes > 0 {
            summary.days_late += 1;
        }
        if day.holiday.is_some() {
            summary.holiday_minutes += day.regular_minutes;
        } else if day.is_rest_day {
            summary.rest_day_minutes += day.regular_minutes;
        } else {
            summary.regular_minutes += day.regular_minutes;
        }
        summary.overtime_minutes += day.overtime_minutes;
        summary.excess_overtime_minutes += day.excess_overtime_minutes;
        summary.night_diff_minutes += day.night_diff_minutes;
        summary.late_minutes += day.late_minutes;
    }
    summary
}
