//! Adapter layer: converts between the f64 negotiation math and the Decimal cost ledger.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal_macros::dec;

/// Convert f64 to Decimal (lossy but sufficient for simulation).
pub fn to_decimal(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or(Decimal::ZERO)
}

/// Convert Decimal to f64.
pub fn from_decimal(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Per-vehicle cost of traversing an edge of weight `weight` with `companions`
/// other vehicles in the platoon.
///
/// Solo vehicles pay the full weight. A platoon of `k + 1` vehicles shares
/// `w + w/3 * (k + 1)` evenly, i.e. each member pays `(w + w/3·(k+1)) / (k+1)`.
pub fn shared_cost(weight: Decimal, companions: usize) -> Decimal {
    if companions == 0 {
        return weight;
    }
    let members = Decimal::from(companions as u64 + 1);
    (weight + weight / dec!(3) * members) / members
}

/// Theoretical discount on an edge when travelled as a two-vehicle platoon.
pub fn pair_savings(weight: Decimal) -> Decimal {
    weight - shared_cost(weight, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_pays_full_weight() {
        assert_eq!(shared_cost(dec!(30), 0), dec!(30));
    }

    #[test]
    fn three_member_platoon_pays_twenty_on_thirty() {
        assert_eq!(shared_cost(dec!(30), 2), dec!(20));
    }

    #[test]
    fn pair_savings_on_ten() {
        // (10 + 10/3 * 2) / 2 = 8.333..., so savings ~ 1.6667
        let s = from_decimal(pair_savings(dec!(10)));
        assert!((s - 10.0 / 6.0).abs() < 1e-9, "savings {s}");
    }

    #[test]
    fn decimal_round_trip_keeps_precision() {
        assert!((from_decimal(to_decimal(0.125)) - 0.125).abs() < 1e-12);
    }
}
