use chrono::NaiveDate;
use rust_decimal::Decimal;
use strum::IntoEnumIterator;

use crate::model::contribution::{ContributionKind, ContributionTier, TierFormula};
use crate::utils::money::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierLookup<'a> {
    Matched(&'a ContributionTier),
    /// A table exists but the income is under its lowest band.
    BelowTable,
    /// No tier of this kind is effective on the date.
    Missing,
}

/// Finds the band containing `income`. Bands are ordered by `min_salary`
/// and the band with the greatest minimum not above the income wins, so an
/// income always lands in exactly one band even across gaps such as
/// `250000` / `250001`.
pub fn select_tier<'a>(
    tiers: &'a [ContributionTier],
    organization_id: u64,
    kind: ContributionKind,
    income: Decimal,
    date: NaiveDate,
) -> TierLookup<'a> {
    let mut effective = tiers
        .iter()
        .filter(|t| t.organization_id == organization_id && t.kind == kind && t.effective_on(date))
        .peekable();
    if effective.peek().is_none() {
        return TierLookup::Missing;
    }

    effective
        .filter(|t| t.min_salary <= income)
        .max_by(|a, b| a.min_salary.cmp(&b.min_salary).then(a.id.cmp(&b.id)))
        .map_or(TierLookup::BelowTable, TierLookup::Matched)
}

/// Employee and employer amounts for `income` under `tier`, unrounded.
pub fn tier_amounts(tier: &ContributionTier, income: Decimal) -> (Decimal, Decimal) {
    let (employee, employer) = match tier.formula {
        TierFormula::Progressive {
            base_tax,
            rate,
            excess_over,
        } => {
            let excess = (income - excess_over.unwrap_or(tier.min_salary)).max(Decimal::ZERO);
            (base_tax + rate * excess, Decimal::ZERO)
        }
        TierFormula::Rate {
            employee_rate,
            employer_rate,
        } => {
            let within_band = match tier.max_salary {
                Some(max) => income.clamp(tier.min_salary, max),
                None => income.max(tier.min_salary),
            };
            (employee_rate * within_band, employer_rate * within_band)
        }
        TierFormula::Fixed {
            employee_amount,
            employer_amount,
        } => (employee_amount, employer_amount),
    };

    match tier.max_contribution {
        Some(cap) => (employee.min(cap), employer),
        None => (employee, employer),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionResult {
    pub kind: ContributionKind,
    pub tier_id: Option<u64>,
    pub base: Decimal,
    pub employee_amount: Decimal,
    pub employer_amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatutoryDeductions {
    pub results: Vec<ContributionResult>,
    /// Kinds with no table for the date; priced as zero.
    pub missing: Vec<ContributionKind>,
}

impl StatutoryDeductions {
    pub fn employee_total(&self) -> Decimal {
        self.results.iter().map(|r| r.employee_amount).sum()
    }
}

fn compute_one(
    tiers: &[ContributionTier],
    organization_id: u64,
    kind: ContributionKind,
    base: Decimal,
    date: NaiveDate,
    out: &mut StatutoryDeductions,
) {
    let (tier_id, employee, employer) = match select_tier(tiers, organization_id, kind, base, date) {
        TierLookup::Matched(tier) => {
            let (employee, employer) = tier_amounts(tier, base);
            (Some(tier.id), employee, employer)
        }
        TierLookup::BelowTable => (None, Decimal::ZERO, Decimal::ZERO),
        TierLookup::Missing => {
            out.missing.push(kind);
            return;
        }
    };
    out.results.push(ContributionResult {
        kind,
        tier_id,
        base,
        employee_amount: round_money(employee),
        employer_amount: round_money(employer),
    });
}

/// Prices withholding tax and the three contributions for one period.
/// When `contributions_reduce_taxable` is set the tax base is the taxable
/// income net of the employee contributions.
pub fn compute_statutory(
    tiers: &[ContributionTier],
    organization_id: u64,
    date: NaiveDate,
    taxable_income: Decimal,
    contributions_reduce_taxable: bool,
) -> StatutoryDeductions {
    let mut out = StatutoryDeductions::default();
    for kind in ContributionKind::iter().filter(|k| *k != ContributionKind::Tax) {
        compute_one(tiers, organization_id, kind, taxable_income, date, &mut out);
    }

    let tax_base = if contributions_reduce_taxable {
        (taxable_income - out.employee_total()).max(Decimal::ZERO)
    } else {
        taxable_income
    };
    compute_one(tiers, organization_id, ContributionKind::Tax, tax_base, date, &mut out);
    out
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use rust_decimal_macros::dec;

    pub fn tier(
        id: u64,
        kind: ContributionKind,
        min: Decimal,
        max: Option<Decimal>,
        formula: TierFormula,
    ) -> ContributionTier {
        ContributionTier {
            id,
            organization_id: 7,
            kind,
            min_salary: min,
            max_salary: max,
            formula,
            max_contribution: None,
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
        }
    }

    pub fn progressive(base_tax: Decimal, rate: Decimal, over: Decimal) -> TierFormula {
        TierFormula::Progressive {
            base_tax,
            rate,
            excess_over: Some(over),
        }
    }

    /// Annual brackets in the TRAIN-law shape.
    pub fn tax_table() -> Vec<ContributionTier> {
        use ContributionKind::Tax;
        vec![
            tier(1, Tax, dec!(0), Some(dec!(250000)), progressive(dec!(0), dec!(0), dec!(0))),
            tier(2, Tax, dec!(250001), Some(dec!(400000)), progressive(dec!(0), dec!(0.20), dec!(250000))),
            tier(3, Tax, dec!(400001), Some(dec!(800000)), progressive(dec!(30000), dec!(0.25), dec!(400000))),
            tier(4, Tax, dec!(800001), None, progressive(dec!(130000), dec!(0.30), dec!(800000))),
        ]
    }

    /// Flat-rate contribution tables for a semi-monthly cutoff.
    pub fn contribution_tables() -> Vec<ContributionTier> {
        use ContributionKind::*;
        vec![
            tier(10, Sss, dec!(0), Some(dec!(15000)), TierFormula::Rate {
                employee_rate: dec!(0.045),
                employer_rate: dec!(0.095),
            }),
            tier(11, Sss, dec!(15000.01), None, TierFormula::Fixed {
                employee_amount: dec!(675),
                employer_amount: dec!(1425),
            }),
            tier(20, Philhealth, dec!(0), None, TierFormula::Rate {
                employee_rate: dec!(0.025),
                employer_rate: dec!(0.025),
            }),
            tier(30, Pagibig, dec!(0), Some(dec!(1500)), TierFormula::Rate {
                employee_rate: dec!(0.01),
                employer_rate: dec!(0.02),
            }),
            ContributionTier {
                max_contribution: Some(dec!(100)),
                ..tier(31, Pagibig, dec!(1500.01), None, TierFormula::Rate {
                    employee_rate: dec!(0.02),
                    employer_rate: dec!(0.02),
                })
            },
        ]
    }
}
