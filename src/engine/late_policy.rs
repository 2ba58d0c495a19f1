use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::schedule::RateTable;
use crate::model::late_policy::{DeductionMethod, LateDeductionPolicy, PolicyType};
use crate::utils::money::{minutes_to_hours, round_money};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySelection<'a> {
    pub policy: Option<&'a LateDeductionPolicy>,
    /// More than one policy shared the winning effective date.
    pub ambiguous: bool,
}

/// The policy of `policy_type` in force for the organization on `date`:
/// latest `effective_date` first, highest id on a tie.
pub fn select_policy(
    policies: &[LateDeductionPolicy],
    organization_id: u64,
    policy_type: PolicyType,
    date: NaiveDate,
) -> PolicySelection<'_> {
    let candidates: Vec<&LateDeductionPolicy> = policies
        .iter()
        .filter(|p| p.organization_id == organization_id)
        .filter(|p| p.policy_type == policy_type)
        .filter(|p| p.applies_on(date))
        .collect();

    let policy = candidates
        .iter()
        .copied()
        .max_by_key(|p| (p.effective_date, p.id));
    let ambiguous = policy.is_some_and(|winner| {
        candidates
            .iter()
            .filter(|p| p.effective_date == winner.effective_date)
            .count()
            > 1
    });

    PolicySelection { policy, ambiguous }
}

/// Prices one occurrence before any cap. Minutes under the policy threshold
/// are never billable.
pub fn occurrence_amount(policy: &LateDeductionPolicy, minutes: i64, rates: &RateTable) -> Decimal {
    if minutes < policy.threshold_minutes() {
        return Decimal::ZERO;
    }
    match policy.method {
        DeductionMethod::FixedAmount(amount) => amount,
        DeductionMethod::Percentage(rate) => rate / dec!(100) * rates.daily,
        DeductionMethod::HourlyRate(multiplier) => multiplier * rates.hourly * minutes_to_hours(minutes),
    }
}

/// Prices occurrences across one cutoff, clamping each day and the running
/// total to the policy's caps.
#[derive(Debug)]
pub struct CutoffDeductions<'a> {
    policy: &'a LateDeductionPolicy,
    total: Decimal,
}

impl<'a> CutoffDeductions<'a> {
    pub fn new(policy: &'a LateDeductionPolicy) -> Self {
        Self {
            policy,
            total: Decimal::ZERO,
        }
    }

    pub fn policy(&self) -> &'a LateDeductionPolicy {
        self.policy
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Finalized (rounded, clamped) deduction for one day.
    pub fn price_day(&mut self, minutes: i64, rates: &RateTable) -> Decimal {
        let mut amount = occurrence_amount(self.policy, minutes, rates);
        if let Some(cap) = self.policy.max_deduction_per_day {
            amount = amount.min(cap);
        }
        let mut amount = round_money(amount);
        if let Some(cap) = self.policy.max_deduction_per_cutoff {
            amount = amount.min((cap - self.total).max(Decimal::ZERO));
        }
        self.total += amount;
        amount
    }
}
