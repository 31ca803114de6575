// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Benchmark Report Types - structured output for offline analysis

use serde::Serialize;

// ─── Statistics (per-metric Monte Carlo aggregation) ────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let half_width = 1.96 * std_dev / (n as f64).sqrt(); // 95% CI
        Self {
            mean,
            std_dev,
            ci_lower: mean - half_width,
            ci_upper: mean + half_width,
            min: samples.iter().cloned().fold(f64::INFINITY, f64::min),
            max: samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }

    pub fn half_width(&self) -> f64 {
        (self.ci_upper - self.ci_lower) / 2.0
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub scenario: String,
    pub seed: u64,
    pub pass: bool,
    pub ticks: u64,
    pub vehicles: usize,
    pub completed: usize,
    pub groups_formed: u32,
    pub splits: u32,
    pub negotiations: usize,
    pub deals: usize,
    pub deal_rate: f64,
    pub mean_rounds: f64,
    pub mean_cost: f64,
    pub mean_end_utility: f64,
    pub platooned_share: f64,
    pub companions_symmetric: bool,
    pub elapsed_ms: u128,
    pub error: Option<String>,
}

// ─── Monte Carlo Report (per-scenario aggregation) ──────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub scenario_name: String,
    pub label: String,
    pub category: String,
    pub n_runs: usize,
    pub pass_rate: f64,
    pub groups_formed: Stats,
    pub deal_rate: Stats,
    pub mean_rounds: Stats,
    pub mean_cost: Stats,
    pub mean_end_utility: Stats,
    pub platooned_share: Stats,
    pub ticks: Stats,
    pub elapsed_ms: Stats,
    pub individual_runs: Vec<BenchResult>,
}

// ─── Protocol Comparison ────────────────────────────────────────────────────

/// Paired TILI vs AO figures for grids of the same shape.
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolComparison {
    pub grid: String,
    pub tili_deal_rate: f64,
    pub ao_deal_rate: f64,
    pub tili_mean_cost: f64,
    pub ao_mean_cost: f64,
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub n_runs_per_scenario: usize,
    pub base_seed: u64,
    pub summary: Summary,
    pub comparisons: Vec<ProtocolComparison>,
    pub scenarios: Vec<MonteCarloReport>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}
