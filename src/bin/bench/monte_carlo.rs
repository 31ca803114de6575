// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Monte Carlo Infrastructure - N seeded runs per scenario, mean ± 95% CI

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use platoon_engine::PlatoonSimulation;

use crate::report::*;
use crate::scenarios::Scenario;

use std::time::Instant;

/// Run a single scenario iteration with a specific seed.
pub fn run_single(scenario: &Scenario, seed: u64) -> BenchResult {
    let start = Instant::now();
    let mut result = BenchResult {
        scenario: scenario.name.to_string(),
        seed,
        pass: false,
        ticks: 0,
        vehicles: scenario.vehicles as usize,
        completed: 0,
        groups_formed: 0,
        splits: 0,
        negotiations: 0,
        deals: 0,
        deal_rate: 0.0,
        mean_rounds: 0.0,
        mean_cost: 0.0,
        mean_end_utility: 0.0,
        platooned_share: 0.0,
        companions_symmetric: true,
        elapsed_ms: 0,
        error: None,
    };

    let mut sim = match PlatoonSimulation::from_config(scenario.config(seed)) {
        Ok(sim) => sim,
        Err(e) => {
            warn!(scenario = scenario.name, seed, error = %e, "scenario failed to build");
            result.error = Some(e.to_string());
            return result;
        }
    };
    if let Err(e) = sim.run_to_completion() {
        warn!(scenario = scenario.name, seed, error = %e, "run aborted");
        result.error = Some(e.to_string());
    }

    let reports = sim.reports();
    let log = sim.run_log();
    let n = reports.len().max(1) as f64;
    let total_duration: u64 = reports.iter().map(|r| r.total_duration).sum();
    let platooned: u64 = reports.iter().map(|r| r.platooned_ticks).sum();

    result.ticks = sim.current_tick();
    result.completed = sim.fleet().iter().filter(|v| v.is_completed()).count();
    result.groups_formed = log.groups_formed;
    result.splits = log.splits;
    result.negotiations = log.records().len();
    result.deals = log.deals();
    result.deal_rate = log.deal_rate();
    result.mean_rounds = log.mean_rounds();
    result.mean_cost = reports.iter().map(|r| r.total_cost).sum::<f64>() / n;
    result.mean_end_utility = reports.iter().map(|r| r.end_utility).sum::<f64>() / n;
    result.platooned_share = if total_duration == 0 { 0.0 } else { platooned as f64 / total_duration as f64 };
    result.companions_symmetric = sim.fleet().companions_symmetric();
    result.elapsed_ms = start.elapsed().as_millis();

    let criteria = &scenario.criteria;
    result.pass = result.error.is_none()
        && (!criteria.require_completion || result.completed == result.vehicles)
        && (!criteria.require_symmetry || result.companions_symmetric)
        && criteria.min_groups.map_or(true, |min| result.groups_formed >= min);

    debug!(
        scenario = scenario.name,
        seed,
        ticks = result.ticks,
        deals = result.deals,
        pass = result.pass,
        "run finished"
    );
    result
}

/// Run `n_runs` iterations; per-run seeds are drawn from `base_seed`.
pub fn run_monte_carlo(scenario: &Scenario, n_runs: usize, base_seed: u64) -> MonteCarloReport {
    let mut seeds = ChaCha8Rng::seed_from_u64(base_seed);
    let runs: Vec<BenchResult> = (0..n_runs)
        .map(|_| run_single(scenario, seeds.gen()))
        .collect();

    let collect = |f: fn(&BenchResult) -> f64| -> Stats {
        let samples: Vec<f64> = runs.iter().map(f).collect();
        Stats::from_samples(&samples)
    };

    let passed = runs.iter().filter(|r| r.pass).count();
    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs,
        pass_rate: if n_runs == 0 { 0.0 } else { passed as f64 / n_runs as f64 },
        groups_formed: collect(|r| r.groups_formed as f64),
        deal_rate: collect(|r| r.deal_rate),
        mean_rounds: collect(|r| r.mean_rounds),
        mean_cost: collect(|r| r.mean_cost),
        mean_end_utility: collect(|r| r.mean_end_utility),
        platooned_share: collect(|r| r.platooned_share),
        ticks: collect(|r| r.ticks as f64),
        elapsed_ms: collect(|r| r.elapsed_ms as f64),
        individual_runs: runs,
    }
}
