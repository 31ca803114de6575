// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Benchmark Runner - Monte Carlo (N=30) over seeded commuter grids
//
// Usage:
//   cargo run --release --bin bench                     # Run all scenarios (30 runs each)
//   cargo run --release --bin bench -- --runs 5         # Quick mode (5 runs each)
//   cargo run --release --bin bench -- GRID_DENSE       # Filter by name
//   cargo run --release --bin bench -- --seed 42        # Custom base seed
//   cargo run --release --bin bench -- --json           # Print the JSON report to stdout
//   cargo run --release --bin bench -- --no-save        # Skip writing benchmark-results/
//   RUST_LOG=platoon_engine=debug cargo run --bin bench # Engine logs on stderr

mod monte_carlo;
mod report;
mod scenarios;

use report::*;
use scenarios::*;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    runs: usize,
    seed: u64,
    save: bool,
    json: bool,
    filter: Option<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        runs: 30,
        seed: 0,
        save: true,
        json: false,
        filter: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                if i < args.len() {
                    cli.runs = args[i].parse().unwrap_or(30);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().unwrap_or(0);
                }
            }
            "--no-save" => {
                cli.save = false;
            }
            "--json" => {
                cli.json = true;
            }
            arg if !arg.starts_with('-') => {
                cli.filter = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    cli
}

// ─── Protocol Comparison ────────────────────────────────────────────────────

/// Pair up `*_TILI` and `*_AO` reports that share a grid prefix.
fn compare_protocols(reports: &[MonteCarloReport]) -> Vec<ProtocolComparison> {
    reports
        .iter()
        .filter_map(|tili| {
            let grid = tili.scenario_name.strip_suffix("_TILI")?;
            let ao = reports.iter().find(|r| r.scenario_name == format!("{}_AO", grid))?;
            Some(ProtocolComparison {
                grid: grid.to_string(),
                tili_deal_rate: tili.deal_rate.mean,
                ao_deal_rate: ao.deal_rate.mean,
                tili_mean_cost: tili.mean_cost.mean,
                ao_mean_cost: ao.mean_cost.mean,
            })
        })
        .collect()
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();
    let all_scenarios = scenarios();

    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios.iter()
                .filter(|s| s.name.to_lowercase().contains(&f_lower)
                          || s.label.to_lowercase().contains(&f_lower)
                          || s.category.to_lowercase().contains(&f_lower))
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        std::process::exit(1);
    }

    println!("\n  Platoon Benchmark Runner v0.2.0");
    println!("  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {}", cli.runs, cli.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!("  {:<32} {:>5} {:>8} {:>11} {:>7} {:>11} {:>9} {:>7}",
        "Scenario", "Pass%", "Groups", "Deal%", "Rounds", "Cost", "Utility", "Time");
    println!("  {}", "-".repeat(98));

    let suite_start = Instant::now();
    let mut mc_reports = Vec::new();

    for scenario in &to_run {
        let report = monte_carlo::run_monte_carlo(scenario, cli.runs, cli.seed);

        let pass_pct = report.pass_rate * 100.0;
        let status = if report.pass_rate >= 1.0 { "PASS" } else { "FAIL" };

        println!("  {:<32} {:>4}% {:>8.1} {:>6.1}±{:<4.1} {:>7.2} {:>6.1}±{:<4.1} {:>9.2} {:>5.0}ms  {}",
            report.label,
            pass_pct as u32,
            report.groups_formed.mean,
            report.deal_rate.mean * 100.0,
            report.deal_rate.half_width() * 100.0,
            report.mean_rounds.mean,
            report.mean_cost.mean,
            report.mean_cost.half_width(),
            report.mean_end_utility.mean,
            report.elapsed_ms.mean,
            status,
        );

        mc_reports.push(report);
    }

    let suite_elapsed = suite_start.elapsed();
    let comparisons = compare_protocols(&mc_reports);

    // ─── Summary ────────────────────────────────────────────────────────

    let total = mc_reports.len();
    let passed = mc_reports.iter().filter(|r| r.pass_rate >= 1.0).count();
    let failed = total - passed;

    println!("  {}", "-".repeat(98));
    println!("  Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s\n",
        total, passed, failed, suite_elapsed.as_secs_f64());

    if !comparisons.is_empty() {
        println!("  Protocol comparison (mean deal rate / mean cost):");
        for c in &comparisons {
            println!("    {:<14} TILI {:>5.1}% / {:>7.2}   AO {:>5.1}% / {:>7.2}",
                c.grid,
                c.tili_deal_rate * 100.0, c.tili_mean_cost,
                c.ao_deal_rate * 100.0, c.ao_mean_cost);
        }
        println!();
    }

    // ─── Write JSON Report ──────────────────────────────────────────────

    if cli.save || cli.json {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let timestamp = format!("{}", ts);

        let report = BenchReport {
            timestamp: timestamp.clone(),
            version: "0.2.0",
            prng: "ChaCha8Rng",
            n_runs_per_scenario: cli.runs,
            base_seed: cli.seed,
            summary: Summary {
                total,
                passed,
                failed,
                pass_rate: passed as f64 / total as f64,
            },
            comparisons,
            scenarios: mc_reports,
        };

        let json = match serde_json::to_string_pretty(&report) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("  Failed to serialize report: {}", e);
                std::process::exit(1);
            }
        };
        if cli.json {
            println!("{}", json);
        }
        if cli.save {
            let dir = std::path::Path::new("benchmark-results");
            let path = dir.join(format!("bench-{}.json", timestamp));
            match std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, &json)) {
                Ok(()) => println!("  Results saved to: {}\n", path.display()),
                Err(e) => eprintln!("  Failed to write {}: {}", path.display(), e),
            }
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
