// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Preference & Utility Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::adapter::{from_decimal, to_decimal};
use crate::config::{PreferenceConfig, UtilityConfig};
use crate::units;

// ---------------------------------------------------------------------------
// Preference
// ---------------------------------------------------------------------------

/// Kinematic bounds and consumable travel budgets of one vehicle.
///
/// Speeds are in blocks/step, accelerations in blocks/step². Budgets only ever
/// decrease and bottom out at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub min_speed: f64,
    pub max_speed: f64,
    pub max_accel: f64,
    pub max_decel: f64,
    remaining_time: u64,
    /// Metres.
    remaining_length: Decimal,
    remaining_cost: Decimal,
}

impl Preference {
    pub fn new(
        min_speed: f64,
        max_speed: f64,
        max_accel: f64,
        max_decel: f64,
        remaining_time: u64,
        remaining_length: Decimal,
        remaining_cost: Decimal,
    ) -> Self {
        Self {
            min_speed,
            max_speed,
            max_accel,
            max_decel,
            remaining_time,
            remaining_length: remaining_length.max(Decimal::ZERO),
            remaining_cost: remaining_cost.max(Decimal::ZERO),
        }
    }

    pub fn from_config(cfg: &PreferenceConfig) -> Self {
        Self::new(
            units::kmh_to_blocks_per_step(cfg.min_speed_kmh),
            units::kmh_to_blocks_per_step(cfg.max_speed_kmh),
            units::accel_to_blocks(cfg.max_accel),
            units::accel_to_blocks(cfg.max_decel),
            units::seconds_to_steps(cfg.max_time_s),
            to_decimal(cfg.max_length_m),
            to_decimal(cfg.max_cost),
        )
    }

    pub fn remaining_time(&self) -> u64 {
        self.remaining_time
    }

    pub fn remaining_length(&self) -> Decimal {
        self.remaining_length
    }

    pub fn remaining_cost(&self) -> Decimal {
        self.remaining_cost
    }

    pub fn consume_time(&mut self, ticks: u64) {
        self.remaining_time = self.remaining_time.saturating_sub(ticks);
    }

    pub fn consume_length(&mut self, meters: Decimal) {
        self.remaining_length = (self.remaining_length - meters.max(Decimal::ZERO)).max(Decimal::ZERO);
    }

    pub fn consume_cost(&mut self, cost: Decimal) {
        self.remaining_cost = (self.remaining_cost - cost.max(Decimal::ZERO)).max(Decimal::ZERO);
    }

    /// Whether a route with the given totals fits inside every remaining budget.
    pub fn can_afford(&self, cost: f64, length_m: f64, ticks: u64) -> bool {
        cost <= from_decimal(self.remaining_cost)
            && length_m <= from_decimal(self.remaining_length)
            && ticks <= self.remaining_time
    }

    /// Estimated steps to cover `length_m` at this vehicle's max speed.
    pub fn estimate_ticks(&self, length_m: f64) -> u64 {
        if self.max_speed <= 0.0 {
            return u64::MAX;
        }
        (units::meters_to_blocks(length_m) / self.max_speed).ceil() as u64
    }
}

/// Two vehicles can share a pace iff the fastest minimum stays strictly below
/// the slowest maximum.
pub fn speed_compatible(a: &Preference, b: &Preference) -> bool {
    a.min_speed.max(b.min_speed) < a.max_speed.min(b.max_speed)
}

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Linear generalized travel cost `alpha * cost + beta * length`.
///
/// Lower is better: a route is preferred when its utility value is smaller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Utility {
    pub alpha: f64,
    pub beta: f64,
}

impl Utility {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    pub fn from_config(cfg: &UtilityConfig) -> Self {
        Self::new(cfg.alpha, cfg.beta)
    }

    pub fn evaluate(&self, cost: f64, length_m: f64) -> f64 {
        self.alpha * cost + self.beta * length_m
    }

    /// Convert a utility difference into money at this vehicle's cost weight.
    pub fn to_money(&self, utility_delta: f64) -> f64 {
        utility_delta / self.alpha
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pref() -> Preference {
        Preference::new(1.0, 5.0, 1.0, 2.0, 100, dec!(1000), dec!(50))
    }

    #[test]
    fn budgets_bottom_out_at_zero() {
        let mut p = pref();
        p.consume_cost(dec!(80));
        p.consume_length(dec!(400));
        p.consume_time(150);
        assert_eq!(p.remaining_cost(), Decimal::ZERO);
        assert_eq!(p.remaining_length(), dec!(600));
        assert_eq!(p.remaining_time(), 0);
    }

    #[test]
    fn negative_consumption_is_ignored() {
        let mut p = pref();
        p.consume_cost(dec!(-10));
        assert_eq!(p.remaining_cost(), dec!(50));
    }

    #[test]
    fn affordability_checks_every_budget() {
        let p = pref();
        assert!(p.can_afford(50.0, 1000.0, 100));
        assert!(!p.can_afford(50.1, 10.0, 1));
        assert!(!p.can_afford(1.0, 1000.5, 1));
        assert!(!p.can_afford(1.0, 10.0, 101));
    }

    #[test]
    fn speed_compatibility_is_strict() {
        let a = Preference::new(2.0, 6.0, 1.0, 1.0, 0, dec!(0), dec!(0));
        let b = Preference::new(6.0, 9.0, 1.0, 1.0, 0, dec!(0), dec!(0));
        assert!(!speed_compatible(&a, &b));
        let c = Preference::new(5.0, 9.0, 1.0, 1.0, 0, dec!(0), dec!(0));
        assert!(speed_compatible(&a, &c));
    }

    #[test]
    fn utility_is_linear() {
        let u = Utility::new(2.0, 0.5);
        assert_eq!(u.evaluate(10.0, 4.0), 22.0);
        assert_eq!(u.to_money(22.0), 11.0);
    }
}
