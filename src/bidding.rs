// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Bidding Module
//
// Opponent modelling for alternating-offers haggling. The opponent's hidden
// reservation value is approximated by a sampled distribution; each candidate
// bid is scored by the share of samples whose time-dependent concession curve
// would admit it.

use std::fmt;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Beta, Cauchy, Distribution, Gamma, LogNormal, Normal};
use serde::{Deserialize, Serialize};

pub const CANDIDATE_BIDS: usize = 20;
pub const RV_SAMPLES: usize = 64;

const MIN_SPREAD: f64 = 0.05;
const RATE_STEP: f64 = 0.25;
const RATE_MIN: f64 = 0.25;
const RATE_MAX: f64 = 4.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BiddingError {
    #[error("{kind:?} distribution rejected centre {center} / spread {spread}: {reason}")]
    InvalidDistribution {
        kind: DistributionKind,
        center: f64,
        spread: f64,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Reservation value sampling
// ---------------------------------------------------------------------------

/// Shape of the belief over the opponent's reservation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistributionKind {
    #[default]
    Normal,
    LogNormal,
    Beta,
    Cauchy,
    Gamma,
}

fn draw<D: Distribution<f64>>(
    dist: D,
    n: usize,
    rng: &mut ChaCha8Rng,
    place: impl Fn(f64) -> f64,
) -> Vec<f64> {
    dist.sample_iter(rng).take(n).map(place).collect()
}

/// Draw `n` candidate reservation values around `center`.
///
/// Pure in its arguments: the same `(kind, center, spread, n, seed)` always
/// yields the same samples. Skewed shapes are re-centred so their median or
/// mean sits near `center` and their spread scales with `spread`.
pub fn sample_reservation_values(
    kind: DistributionKind,
    center: f64,
    spread: f64,
    n: usize,
    seed: u64,
) -> Result<Vec<f64>, BiddingError> {
    let invalid = |reason: String| BiddingError::InvalidDistribution { kind, center, spread, reason };
    if !(center.is_finite() && spread.is_finite() && spread > 0.0) {
        return Err(invalid("centre must be finite and spread positive".into()));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let samples = match kind {
        DistributionKind::Normal => {
            let d = Normal::new(center, spread).map_err(|e| invalid(e.to_string()))?;
            draw(d, n, &mut rng, |x| x)
        }
        DistributionKind::LogNormal => {
            // median 1
            let d = LogNormal::new(0.0, 0.5).map_err(|e| invalid(e.to_string()))?;
            draw(d, n, &mut rng, |x| center + spread * (x - 1.0))
        }
        DistributionKind::Beta => {
            // Beta(2, 2): mean 0.5, sd ~0.224
            let d = Beta::new(2.0, 2.0).map_err(|e| invalid(e.to_string()))?;
            draw(d, n, &mut rng, |x| center + spread * (x - 0.5) / 0.2236)
        }
        DistributionKind::Cauchy => {
            let d = Cauchy::new(center, spread).map_err(|e| invalid(e.to_string()))?;
            draw(d, n, &mut rng, |x| x)
        }
        DistributionKind::Gamma => {
            // Gamma(2, 1): mean 2, sd sqrt(2)
            let d = Gamma::new(2.0, 1.0).map_err(|e| invalid(e.to_string()))?;
            draw(d, n, &mut rng, |x| center + spread * (x - 2.0) / std::f64::consts::SQRT_2)
        }
    };
    Ok(samples)
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Side of a bilateral negotiation.
///
/// The initiator bids a net payment and wants it low; the acceptor bids the
/// buyout it demands and wants it high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Acceptor,
}

impl Role {
    /// Whether `a` is at least as good as `b` for this side.
    pub fn prefers(self, a: f64, b: f64) -> bool {
        match self {
            Role::Initiator => a <= b,
            Role::Acceptor => a >= b,
        }
    }

    /// Whether `bid` respects this side's reservation value.
    pub fn within(self, bid: f64, rv: f64) -> bool {
        self.prefers(bid, rv)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Acceptor => f.write_str("acceptor"),
        }
    }
}

// ---------------------------------------------------------------------------
// BiddingModule
// ---------------------------------------------------------------------------

/// Time-dependent concession threshold.
///
/// Starts at `first` and reaches `rv` at `tau = 1`. A rate above 1 concedes
/// early (conceder), below 1 holds out until late (boulware).
pub fn concession_threshold(first: f64, rv: f64, tau: f64, rate: f64) -> f64 {
    first + (rv - first) * tau.clamp(0.0, 1.0).powf(1.0 / rate)
}

#[derive(Debug, Clone, Serialize)]
pub struct BiddingModule {
    role: Role,
    deadline: u32,
    own_rv: f64,
    distribution: DistributionKind,
    /// Believed opponent concession rate.
    concession_rate: f64,
    opponent_first: Option<f64>,
}

impl BiddingModule {
    pub fn new(role: Role, deadline: u32, own_rv: f64, distribution: DistributionKind) -> Self {
        Self {
            role,
            deadline: deadline.max(1),
            own_rv,
            distribution,
            concession_rate: 1.0,
            opponent_first: None,
        }
    }

    pub fn role(&self) -> Role { self.role }
    pub fn own_rv(&self) -> f64 { self.own_rv }
    pub fn concession_rate(&self) -> f64 { self.concession_rate }
    pub fn opponent_first(&self) -> Option<f64> { self.opponent_first }

    fn elapsed(&self, round: u32) -> f64 {
        (round as f64 / self.deadline as f64).clamp(0.0, 1.0)
    }

    fn clamp_to_own_side(&self, bid: f64) -> f64 {
        match self.role {
            Role::Initiator => bid.min(self.own_rv),
            Role::Acceptor => bid.max(self.own_rv),
        }
    }

    /// Share of sampled opponent reservation values whose concession curve
    /// admits `bid` by the time the opponent answers.
    pub fn acceptance_probability(&self, bid: f64, samples: &[f64], round: u32) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let tau = self.elapsed(round + 1);
        let first = self.opponent_first.unwrap_or(bid);
        let admitted = samples
            .iter()
            .filter(|&&rv| {
                let threshold = concession_threshold(first, rv, tau, self.concession_rate);
                match self.role {
                    // opponent demand falls toward its rv
                    Role::Initiator => bid >= threshold,
                    // opponent offer rises toward its rv
                    Role::Acceptor => bid <= threshold,
                }
            })
            .count();
        admitted as f64 / samples.len() as f64
    }

    /// Pick the next counter-bid.
    ///
    /// Candidates run from the current aspiration toward the estimated
    /// opponent reservation value; the window narrows as `round` approaches
    /// the deadline.
    pub fn get_best_bid(
        &self,
        previous_bids: &[f64],
        round: u32,
        estimated_opponent_rv: f64,
        seed: u64,
    ) -> Result<f64, BiddingError> {
        let est = estimated_opponent_rv;
        let aspiration = previous_bids
            .last()
            .copied()
            .unwrap_or(2.0 * self.own_rv - est);
        let width = (est - aspiration).abs() * (1.0 - self.elapsed(round));
        let direction = if est >= aspiration { 1.0 } else { -1.0 };

        let spread = (est - self.own_rv).abs().max(MIN_SPREAD);
        let samples = sample_reservation_values(self.distribution, est, spread, RV_SAMPLES, seed)?;

        let candidates: Vec<f64> = (0..CANDIDATE_BIDS)
            .map(|i| {
                let step = i as f64 / (CANDIDATE_BIDS - 1) as f64;
                self.clamp_to_own_side(aspiration + direction * width * step)
            })
            .collect();

        let mut best: Option<(f64, f64)> = None;
        for &bid in &candidates {
            let p = self.acceptance_probability(bid, &samples, round);
            if p <= 0.0 {
                continue;
            }
            let score = p * (self.own_rv - bid);
            let better = match best {
                None => true,
                Some((s, _)) => match self.role {
                    Role::Initiator => score > s,
                    Role::Acceptor => score < s,
                },
            };
            if better {
                best = Some((score, bid));
            }
        }

        let bid = match best {
            Some((_, bid)) => bid,
            None => match self.role {
                Role::Initiator => candidates.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                Role::Acceptor => candidates.iter().copied().fold(f64::INFINITY, f64::min),
            },
        };
        Ok(bid)
    }

    /// Adapt the believed opponent concession rate after observing `opponent_bid`.
    ///
    /// Thresholds differ by role: 5%/10% as acceptor, 10%/100% as initiator.
    pub fn update_strategy(&mut self, opponent_bid: f64) {
        let Some(first) = self.opponent_first else {
            self.opponent_first = Some(opponent_bid);
            return;
        };
        let pct = (opponent_bid - first).abs() / first.abs().max(f64::EPSILON);
        let (low, high) = match self.role {
            Role::Acceptor => (0.05, 0.10),
            Role::Initiator => (0.10, 1.00),
        };
        if pct < low {
            self.concession_rate -= RATE_STEP;
        } else if pct > high {
            self.concession_rate += RATE_STEP;
        }
        self.concession_rate = self.concession_rate.clamp(RATE_MIN, RATE_MAX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_is_reproducible_per_seed() {
        for kind in [
            DistributionKind::Normal,
            DistributionKind::LogNormal,
            DistributionKind::Beta,
            DistributionKind::Cauchy,
            DistributionKind::Gamma,
        ] {
            let a = sample_reservation_values(kind, 1.0, 0.5, 32, 7).expect("test: sample");
            let b = sample_reservation_values(kind, 1.0, 0.5, 32, 7).expect("test: sample");
            assert_eq!(a, b, "{kind:?}");
            assert_eq!(a.len(), 32);
            assert!(a.iter().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn normal_samples_centre_on_estimate() {
        let s = sample_reservation_values(DistributionKind::Normal, 5.0, 0.1, 500, 1).expect("test: sample");
        let mean = s.iter().sum::<f64>() / s.len() as f64;
        assert!((mean - 5.0).abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn rejects_non_positive_spread() {
        let err = sample_reservation_values(DistributionKind::Normal, 1.0, 0.0, 4, 0);
        assert!(matches!(err, Err(BiddingError::InvalidDistribution { .. })));
    }

    #[test]
    fn threshold_runs_from_first_bid_to_reservation() {
        assert_eq!(concession_threshold(0.2, 1.0, 0.0, 1.0), 0.2);
        assert_eq!(concession_threshold(0.2, 1.0, 1.0, 3.0), 1.0);
        let boulware = concession_threshold(0.0, 1.0, 0.5, 0.5);
        let conceder = concession_threshold(0.0, 1.0, 0.5, 2.0);
        assert!(boulware < 0.5 && conceder > 0.5);
    }

    #[test]
    fn acceptance_probability_counts_admitting_samples() {
        let mut m = BiddingModule::new(Role::Acceptor, 4, 1.0, DistributionKind::Normal);
        m.update_strategy(0.2);
        // Last round: the modelled threshold equals each sampled rv.
        assert_eq!(m.acceptance_probability(1.5, &[1.0, 2.0], 3), 0.5);
        assert_eq!(m.acceptance_probability(2.5, &[1.0, 2.0], 3), 0.0);
        assert_eq!(m.acceptance_probability(0.1, &[1.0, 2.0], 3), 1.0);
    }

    #[test]
    fn best_bid_stays_on_own_side_of_reservation() {
        let mut acceptor = BiddingModule::new(Role::Acceptor, 6, 1.0, DistributionKind::Normal);
        acceptor.update_strategy(0.4);
        let mut initiator = BiddingModule::new(Role::Initiator, 6, 0.0, DistributionKind::Normal);
        initiator.update_strategy(0.8);
        for round in 0..6 {
            let a = acceptor.get_best_bid(&[], round, 0.7, round as u64).expect("test: bid");
            assert!(a >= 1.0, "acceptor bid {a}");
            let i = initiator.get_best_bid(&[-0.6], round, 0.4, round as u64).expect("test: bid");
            assert!(i <= 0.0, "initiator bid {i}");
        }
    }

    #[test]
    fn hopeless_round_falls_back_to_most_concessive_candidate() {
        let mut m = BiddingModule::new(Role::Acceptor, 100, 1.0, DistributionKind::Normal);
        m.update_strategy(0.2);
        let bid = m.get_best_bid(&[], 0, 0.6, 3).expect("test: bid");
        assert_eq!(bid, 1.0);
    }

    #[test]
    fn strategy_thresholds_depend_on_role() {
        let mut acceptor = BiddingModule::new(Role::Acceptor, 6, 0.0, DistributionKind::Normal);
        let mut initiator = BiddingModule::new(Role::Initiator, 6, 0.0, DistributionKind::Normal);
        for m in [&mut acceptor, &mut initiator] {
            m.update_strategy(1.0);
            m.update_strategy(1.07);
        }
        assert_eq!(acceptor.concession_rate(), 1.0);
        assert_eq!(initiator.concession_rate(), 0.75);

        acceptor.update_strategy(1.2);
        assert_eq!(acceptor.concession_rate(), 1.25);
        initiator.update_strategy(2.5);
        assert_eq!(initiator.concession_rate(), 1.0);
    }

    #[test]
    fn concession_rate_is_clamped() {
        let mut m = BiddingModule::new(Role::Initiator, 6, 0.0, DistributionKind::Normal);
        m.update_strategy(1.0);
        for _ in 0..20 {
            m.update_strategy(1.0);
        }
        assert_eq!(m.concession_rate(), RATE_MIN);
    }
}
