use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Rounds a finalized peso amount to centavos, half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Hours and rates carried on line items keep four decimals.
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

pub fn minutes_to_hours(minutes: i64) -> Decimal {
    Decimal::from(minutes) / dec!(60)
}
