// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Type Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Stable index of a vehicle in the fleet registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

impl VehicleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Road network node name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self { NodeId(s.to_string()) }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self { NodeId(s) }
}

/// Road network edge name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub String);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(s: &str) -> Self { EdgeId(s.to_string()) }
}

impl From<String> for EdgeId {
    fn from(s: String) -> Self { EdgeId(s) }
}

// ─── Location ────────────────────────────────────────────────────────────────

/// Where a vehicle currently is: waiting at a node or travelling an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    Node(NodeId),
    Edge(EdgeId),
}

impl Location {
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Self::Node(n) => Some(n),
            Self::Edge(_) => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(n) => write!(f, "{}", n),
            Self::Edge(e) => write!(f, "{}", e),
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Created = 0,
    Departed = 1,
    Arrived = 2,
    Formed = 3,
    Split = 4,
    Completed = 5,
}

/// Immutable audit record appended to a vehicle's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub subject: VehicleId,
    pub kind: EventKind,
    pub location: Location,
    pub timestep: u64,
    /// Companion snapshot, only present on `Formed`.
    #[serde(default)]
    pub companions: Option<Vec<VehicleId>>,
}

// ─── Protocol / Model selectors ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolKind {
    TakeItOrLeaveIt = 0,
    AlternatingOffers = 1,
}

impl Default for ProtocolKind {
    fn default() -> Self { ProtocolKind::AlternatingOffers }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TakeItOrLeaveIt => write!(f, "TILI"),
            Self::AlternatingOffers => write!(f, "AO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementModel {
    /// Per-vehicle acceleration up to its own bounds.
    Micro = 0,
    /// Segment speed derived from edge flow, clamped to vehicle bounds.
    Macro = 1,
}

impl Default for MovementModel {
    fn default() -> Self { MovementModel::Macro }
}

// ─── VehicleSnapshot ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub name: String,
    pub location: Location,
    pub position: f64,
    /// Blocks per step.
    pub speed: f64,
    pub speed_kmh: f64,
    pub platooning: bool,
    pub companions: Vec<VehicleId>,
    pub precedence: usize,
    pub completed: bool,
    pub remaining_cost: f64,
    pub remaining_length: f64,
    pub remaining_time: u64,
}

// ─── TickResult ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TickResult {
    pub tick: u64,
    pub arrivals: u32,
    pub groups_formed: u32,
    pub negotiations_opened: u32,
    pub deals: u32,
    pub completed: u32,
    pub vehicles: Vec<VehicleSnapshot>,
}

// ─── VehicleReport ───────────────────────────────────────────────────────────

/// Final per-vehicle figures handed to the reporting sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleReport {
    pub name: String,
    pub total_cost: f64,
    pub total_length: f64,
    /// Ticks from first departure to completion.
    pub total_duration: u64,
    pub duration_s: f64,
    pub end_utility: f64,
    pub buyout_balance: f64,
    pub platooned_ticks: u64,
}
