// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Configuration

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::bidding::DistributionKind;
use crate::types::{MovementModel, ProtocolKind};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("vehicle {vehicle}: {reason}")]
    InvalidVehicle { vehicle: String, reason: String },
    #[error("edge {edge}: {reason}")]
    InvalidEdge { edge: String, reason: String },
    #[error("alternating-offers deadline must be at least 1")]
    ZeroDeadline,
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoplightConfig {
    pub red: u32,
    pub green: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub name: String,
    pub from: String,
    pub to: String,
    pub weight: f64,
    pub length_m: f64,
    #[serde(default)]
    pub speed_limit_kmh: Option<f64>,
    #[serde(default)]
    pub flow: f64,
    #[serde(default)]
    pub stoplight: Option<StoplightConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub nodes: Vec<NodeConfig>,
    pub edges: Vec<EdgeConfig>,
}

impl NetworkConfig {
    pub fn grid_node(col: u32, row: u32) -> String {
        format!("n{}_{}", col, row)
    }

    /// Rectangular grid with edges in both directions between orthogonal
    /// neighbours. Every `light_every`-th node (0 = none) gets stoplights on
    /// its incoming edges, staggered by position.
    pub fn grid(cols: u32, rows: u32, weight: f64, length_m: f64, light_every: u32) -> Self {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                nodes.push(NodeConfig {
                    name: Self::grid_node(col, row),
                    x: col as f64,
                    y: row as f64,
                });
            }
        }
        let mut link = |a: (u32, u32), b: (u32, u32)| {
            let from = Self::grid_node(a.0, a.1);
            let to = Self::grid_node(b.0, b.1);
            let index = b.1 * cols + b.0;
            let stoplight = (light_every > 0 && index % light_every == 0).then(|| StoplightConfig {
                red: 3,
                green: 5,
                offset: index % 8,
            });
            edges.push(EdgeConfig {
                name: format!("{}>{}", from, to),
                from,
                to,
                weight,
                length_m,
                speed_limit_kmh: None,
                flow: 0.0,
                stoplight,
            });
        };
        for row in 0..rows {
            for col in 0..cols {
                if col + 1 < cols {
                    link((col, row), (col + 1, row));
                    link((col + 1, row), (col, row));
                }
                if row + 1 < rows {
                    link((col, row), (col, row + 1));
                    link((col, row + 1), (col, row));
                }
            }
        }
        Self { nodes, edges }
    }
}

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

/// Travel preferences in physical units; converted to blocks/steps on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceConfig {
    pub min_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub max_accel: f64,
    pub max_decel: f64,
    pub max_time_s: f64,
    pub max_length_m: f64,
    pub max_cost: f64,
}

impl Default for PreferenceConfig {
    fn default() -> Self {
        Self {
            min_speed_kmh: 20.0,
            max_speed_kmh: 90.0,
            max_accel: 2.5,
            max_decel: 4.5,
            max_time_s: 3_600.0,
            max_length_m: 50_000.0,
            max_cost: 1_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityConfig {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self { alpha: 1.0, beta: 0.001 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub name: String,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub via: Vec<String>,
    #[serde(default)]
    pub preference: PreferenceConfig,
    #[serde(default)]
    pub utility: UtilityConfig,
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

fn default_deadline() -> u32 { 6 }
fn default_max_ticks() -> u64 { 10_000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub protocol: ProtocolKind,
    #[serde(default = "default_deadline")]
    pub deadline: u32,
    #[serde(default)]
    pub movement: MovementModel,
    #[serde(default)]
    pub distribution: DistributionKind,
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
    pub network: NetworkConfig,
    pub vehicles: Vec<VehicleConfig>,
}

impl SimConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// West-to-east commuters on a `cols` x `rows` grid with stoplights on
    /// every fourth node. Origins, destinations, speed bounds and cost weights
    /// are drawn from `seed`.
    pub fn grid_scenario(cols: u32, rows: u32, vehicles: u32, protocol: ProtocolKind, seed: u64) -> Self {
        let cols = cols.max(2);
        let rows = rows.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let vehicles = (0..vehicles)
            .map(|i| VehicleConfig {
                name: format!("car{}", i),
                origin: NetworkConfig::grid_node(0, rng.gen_range(0..rows)),
                destination: NetworkConfig::grid_node(cols - 1, rng.gen_range(0..rows)),
                via: Vec::new(),
                preference: PreferenceConfig {
                    min_speed_kmh: rng.gen_range(10.0..40.0),
                    max_speed_kmh: rng.gen_range(60.0..110.0),
                    ..PreferenceConfig::default()
                },
                utility: UtilityConfig {
                    alpha: rng.gen_range(0.5..1.5),
                    beta: 0.001,
                },
            })
            .collect();
        Self {
            seed,
            protocol,
            deadline: default_deadline(),
            movement: MovementModel::Macro,
            distribution: DistributionKind::Normal,
            max_ticks: default_max_ticks(),
            network: NetworkConfig::grid(cols, rows, 10.0, 200.0, 4),
            vehicles,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline == 0 {
            return Err(ConfigError::ZeroDeadline);
        }
        for e in &self.network.edges {
            let bad = |reason: &str| ConfigError::InvalidEdge {
                edge: e.name.clone(),
                reason: reason.to_string(),
            };
            if !(e.weight.is_finite() && e.weight >= 0.0) {
                return Err(bad("weight must be finite and non-negative"));
            }
            if !(e.length_m.is_finite() && e.length_m > 0.0) {
                return Err(bad("length must be positive"));
            }
            if e.flow < 0.0 {
                return Err(bad("flow must be non-negative"));
            }
        }
        for v in &self.vehicles {
            let bad = |reason: &str| ConfigError::InvalidVehicle {
                vehicle: v.name.clone(),
                reason: reason.to_string(),
            };
            let p = &v.preference;
            if p.min_speed_kmh < 0.0 || p.max_speed_kmh <= p.min_speed_kmh {
                return Err(bad("max speed must exceed a non-negative min speed"));
            }
            if p.max_accel <= 0.0 || p.max_decel <= 0.0 {
                return Err(bad("acceleration bounds must be positive"));
            }
            if p.max_time_s < 0.0 || p.max_length_m < 0.0 || p.max_cost < 0.0 {
                return Err(bad("budgets must be non-negative"));
            }
            if !(v.utility.alpha > 0.0) || v.utility.beta < 0.0 {
                return Err(bad("utility needs alpha > 0 and beta >= 0"));
            }
        }
        Ok(())
    }
}
