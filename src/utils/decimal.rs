//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round a decimal to a specific number of decimal places (half away from zero).
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncate toward zero at a specific number of decimal places.
///
/// Used wherever a derived amount must never exceed its source.
pub fn truncate_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

/// First term `a` of a geometric series with ratio `r` whose first `n`
/// terms sum to `total`: `a = total * (r - 1) / (r^n - 1)`.
///
/// `r == 1` is the degenerate linear case `total / n`; `n == 0` puts the
/// whole total into the first term.
pub fn geometric_first_term(total: Decimal, ratio: Decimal, n: u64) -> Decimal {
    if n == 0 {
        return total;
    }
    if ratio == Decimal::ONE {
        return total / Decimal::from(n);
    }
    let denominator = ratio.powu(n) - Decimal::ONE;
    if denominator.is_zero() {
        return total / Decimal::from(n);
    }
    total * (ratio - Decimal::ONE) / denominator
}

/// Convert a unit-interval float (from an RNG) to a decimal in `[0, 1)`.
pub fn unit_fraction(value: f64) -> Decimal {
    Decimal::from_f64(value.clamp(0.0, 1.0))
        .unwrap_or(Decimal::ZERO)
        .round_dp(12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_and_truncate() {
        assert_eq!(round_to_precision(dec!(1.23456), 4), dec!(1.2346));
        assert_eq!(round_to_precision(dec!(1.00005), 4), dec!(1.0001));
        assert_eq!(truncate_to_precision(dec!(1.23456), 4), dec!(1.2345));
        assert_eq!(truncate_to_precision(dec!(-1.23456), 2), dec!(-1.23));
    }

    #[test]
    fn test_geometric_first_term() {
        // 8000 spread over 4 terms halving each time: 4266.67, 2133.33, 1066.67, 533.33
        let a = geometric_first_term(dec!(8000), dec!(0.5), 4);
        assert_eq!(a.round_dp(2), dec!(4266.67));

        assert_eq!(geometric_first_term(dec!(90), Decimal::ONE, 3), dec!(30));
        assert_eq!(geometric_first_term(dec!(90), dec!(0.5), 0), dec!(90));
        assert_eq!(geometric_first_term(dec!(90), Decimal::ZERO, 5), dec!(90));
    }

    #[test]
    fn test_unit_fraction_bounds() {
        assert_eq!(unit_fraction(0.0), Decimal::ZERO);
        assert!(unit_fraction(0.999) < Decimal::ONE);
        assert_eq!(unit_fraction(-3.0), Decimal::ZERO);
    }
}
