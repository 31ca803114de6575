// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Scenario Definitions - commuter grids under both negotiation protocols

use platoon_engine::config::SimConfig;
use platoon_engine::bidding::DistributionKind;
use platoon_engine::{MovementModel, ProtocolKind};

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub cols: u32,
    pub rows: u32,
    pub vehicles: u32,
    pub protocol: ProtocolKind,
    pub movement: MovementModel,
    pub distribution: DistributionKind,
    pub deadline: u32,
    pub criteria: PassCriteria,
}

pub struct PassCriteria {
    /// Every vehicle must reach its destination before the tick limit.
    pub require_completion: bool,
    /// Companion sets must be symmetric at the end of the run.
    pub require_symmetry: bool,
    pub min_groups: Option<u32>,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            require_completion: true,
            require_symmetry: true,
            min_groups: None,
        }
    }
}

impl Scenario {
    /// Concrete configuration for one Monte Carlo run.
    pub fn config(&self, seed: u64) -> SimConfig {
        let mut config = SimConfig::grid_scenario(self.cols, self.rows, self.vehicles, self.protocol, seed);
        config.movement = self.movement;
        config.distribution = self.distribution;
        config.deadline = self.deadline;
        config
    }
}

// ─── Scenario Table ─────────────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    use ProtocolKind::{AlternatingOffers as Ao, TakeItOrLeaveIt as Tili};

    let grid = |name: &'static str, label: &'static str, cols: u32, rows: u32, vehicles: u32, protocol: ProtocolKind| Scenario {
        name,
        label,
        category: "grid",
        cols,
        rows,
        vehicles,
        protocol,
        movement: MovementModel::Macro,
        distribution: DistributionKind::Normal,
        deadline: 6,
        criteria: PassCriteria::default(),
    };

    vec![
        grid("GRID_SMALL_TILI", "Small grid / TILI", 5, 3, 12, Tili),
        grid("GRID_SMALL_AO", "Small grid / AO", 5, 3, 12, Ao),
        grid("GRID_DENSE_TILI", "Dense grid / TILI", 8, 4, 60, Tili),
        grid("GRID_DENSE_AO", "Dense grid / AO", 8, 4, 60, Ao),
        Scenario {
            criteria: PassCriteria { min_groups: Some(1), ..PassCriteria::default() },
            ..grid("CORRIDOR_AO", "Single-row corridor / AO", 10, 1, 20, Ao)
        },
        Scenario {
            movement: MovementModel::Micro,
            category: "movement",
            ..grid("GRID_MICRO_AO", "Small grid / AO / micro", 5, 3, 12, Ao)
        },
        Scenario {
            deadline: 2,
            category: "deadline",
            ..grid("GRID_SHORT_DEADLINE", "Dense grid / AO / deadline 2", 8, 4, 60, Ao)
        },
        Scenario {
            deadline: 20,
            category: "deadline",
            ..grid("GRID_LONG_DEADLINE", "Dense grid / AO / deadline 20", 8, 4, 60, Ao)
        },
        Scenario {
            distribution: DistributionKind::LogNormal,
            category: "distribution",
            ..grid("GRID_LOGNORMAL", "Dense grid / AO / log-normal", 8, 4, 60, Ao)
        },
        Scenario {
            distribution: DistributionKind::Cauchy,
            category: "distribution",
            ..grid("GRID_CAUCHY", "Dense grid / AO / Cauchy", 8, 4, 60, Ao)
        },
    ]
}
