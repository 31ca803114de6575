// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Simulation Core
//
// Tick order: stoplights and movement, edge-end handling, platoon matching,
// then negotiation for every crowd still travelling alone. Tick 0 is a
// staging tick: nothing moves, so vehicles sharing an origin can coordinate
// before their first departure.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use wasm_bindgen::prelude::*;

use crate::config::{ConfigError, SimConfig};
use crate::edge_end::{check_loners, handle_edge_ends};
use crate::fleet::Fleet;
use crate::matcher::{faces_red, find_crowds, match_platoons};
use crate::network::{LightState, NetworkError, RoadGraph, RoutingService};
use crate::preference::{Preference, Utility};
use crate::protocol::{negotiate_crowd, NegotiationContext, ProtocolError};
use crate::telemetry::RunLog;
use crate::types::*;
use crate::vehicle::Vehicle;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("vehicle {vehicle} cannot be routed: {source}")]
    Unroutable {
        vehicle: String,
        #[source]
        source: NetworkError,
    },
}

// ─── PlatoonSimulation struct ────────────────────────────────────────────────

#[wasm_bindgen]
pub struct PlatoonSimulation {
    pub(crate) config: SimConfig,
    pub(crate) network: RoadGraph,
    pub(crate) fleet: Fleet,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) log: RunLog,
    pub(crate) current_tick: u64,
    pub(crate) next_offer_id: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct MovementOutcome {
    arrivals: u32,
    completed: u32,
}

// ─── Internal Logic (Testable, pure Rust) ────────────────────────────────────

impl PlatoonSimulation {
    pub fn from_config(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let network = RoadGraph::from_config(&config.network)?;

        let mut fleet = Fleet::new();
        for vc in &config.vehicles {
            let origin = NodeId::from(vc.origin.as_str());
            let destination = NodeId::from(vc.destination.as_str());
            let via: Vec<NodeId> = vc.via.iter().map(|n| NodeId::from(n.as_str())).collect();
            let route = network
                .route_via(&origin, &via, &destination)
                .map_err(|source| SimError::Unroutable { vehicle: vc.name.clone(), source })?;
            let vehicle = Vehicle::new(
                fleet.next_id(),
                vc.name.clone(),
                origin,
                destination,
                Preference::from_config(&vc.preference),
                Utility::from_config(&vc.utility),
                0,
            );
            fleet.add(vehicle, route);
        }

        info!(
            vehicles = fleet.len(),
            protocol = %config.protocol,
            movement = ?config.movement,
            seed = config.seed,
            "simulation ready"
        );
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            network,
            fleet,
            log: RunLog::new(),
            current_tick: 0,
            next_offer_id: 0,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SimError> {
        Self::from_config(SimConfig::from_json(json)?)
    }

    pub fn config(&self) -> &SimConfig { &self.config }
    pub fn network(&self) -> &RoadGraph { &self.network }
    pub fn fleet(&self) -> &Fleet { &self.fleet }
    pub fn run_log(&self) -> &RunLog { &self.log }
    pub fn current_tick(&self) -> u64 { self.current_tick }

    pub fn is_finished(&self) -> bool {
        self.fleet.iter().all(Vehicle::is_completed)
    }

    pub fn tick_core(&mut self) -> Result<TickResult, SimError> {
        let t = self.current_tick;

        // 1. Movement (skipped on the staging tick)
        let moved = if t == 0 { MovementOutcome::default() } else { self.move_vehicles(t)? };

        // 2. Edge-end handling
        let edge_end = if moved.arrivals > 0 || t == 0 {
            handle_edge_ends(&mut self.fleet, t)
        } else {
            Default::default()
        };
        self.log.splits += edge_end.splits;
        self.log.completions += edge_end.completed + moved.completed;

        // 3. Platoon matching
        let matched = match_platoons(&mut self.fleet, &self.network, t);
        self.log.groups_formed += matched.groups.len() as u32;

        // 4. Negotiation
        let crowds = find_crowds(&self.fleet);
        let mut sessions = 0;
        let mut deals = 0;
        if !crowds.is_empty() {
            let mut ctx = NegotiationContext {
                fleet: &mut self.fleet,
                network: &self.network,
                log: &mut self.log,
                rng: &mut self.rng,
                distribution: self.config.distribution,
                tick: t,
                next_offer_id: &mut self.next_offer_id,
            };
            for crowd in &crowds {
                let out = negotiate_crowd(&mut ctx, self.config.protocol, self.config.deadline, crowd)?;
                sessions += out.sessions;
                deals += out.deals;
            }
        }

        debug!(
            tick = t,
            arrivals = moved.arrivals,
            formed = matched.groups.len(),
            sessions,
            deals,
            "tick complete"
        );
        self.current_tick += 1;

        Ok(TickResult {
            tick: t,
            arrivals: moved.arrivals,
            groups_formed: matched.groups.len() as u32,
            negotiations_opened: sessions,
            deals,
            completed: edge_end.completed + moved.completed,
            vehicles: self.snapshots(),
        })
    }

    /// Tick until every vehicle completes or the tick limit is hit.
    pub fn run_to_completion(&mut self) -> Result<u64, SimError> {
        while !self.is_finished() && self.current_tick < self.config.max_ticks {
            self.tick_core()?;
        }
        if !self.is_finished() {
            warn!(ticks = self.current_tick, "tick limit reached before all vehicles completed");
        }
        Ok(self.current_tick)
    }

    pub fn reports(&self) -> Vec<VehicleReport> {
        self.fleet.iter().map(Vehicle::report).collect()
    }

    pub fn snapshots(&self) -> Vec<VehicleSnapshot> {
        self.fleet.iter().map(Vehicle::snapshot).collect()
    }

    fn move_vehicles(&mut self, t: u64) -> Result<MovementOutcome, SimError> {
        self.network.advance_stoplights();
        let mut outcome = MovementOutcome::default();
        let ids: Vec<VehicleId> = self.fleet.ids().collect();

        // Every vehicle at a node commits to holding or departing before
        // anyone moves, so a platoon is checked as a whole.
        let mut at_node: BTreeMap<VehicleId, (NodeId, Option<EdgeId>)> = BTreeMap::new();
        for &id in &ids {
            let vehicle = self.fleet.get(id);
            if vehicle.is_completed() {
                continue;
            }
            let Some(node) = vehicle.at_node().cloned() else { continue };
            if check_loners(&mut self.fleet, id, t) {
                self.log.splits += 1;
            }
            let Some(next) = self.fleet.next_edge(id).cloned() else {
                self.fleet.get_mut(id).complete(&node, t);
                outcome.completed += 1;
                continue;
            };
            if faces_red(&self.fleet, &self.network, id) {
                self.fleet.get_mut(id).hold();
                at_node.insert(id, (node, None));
                continue;
            }
            self.fleet.pop_next_edge(id);
            self.fleet.get_mut(id).depart(&next, t);
            at_node.insert(id, (node, Some(next)));
        }
        self.separate_stragglers(&at_node, t);

        for id in ids {
            if self.advance_on_edge(id, t)? {
                outcome.arrivals += 1;
            }
        }
        Ok(outcome)
    }

    /// Unlink companions that did not leave onto the same edge this tick:
    /// held at a red light, or still on the previous edge. A vehicle left
    /// with nobody is split at the node it just decided at.
    fn separate_stragglers(&mut self, at_node: &BTreeMap<VehicleId, (NodeId, Option<EdgeId>)>, t: u64) {
        for (&id, (_, moved)) in at_node {
            let strays: Vec<VehicleId> = self
                .fleet
                .get(id)
                .companions()
                .iter()
                .copied()
                .filter(|c| at_node.get(c).map(|(_, e)| e) != Some(moved))
                .collect();
            for c in strays {
                debug!(vehicle = %id, companion = %c, tick = t, "platoon members separated");
                self.fleet.unlink(id, c);
            }
        }
        for (&id, (node, _)) in at_node {
            if self.fleet.get(id).is_loner() {
                self.fleet.detach(id, node, t);
                self.log.splits += 1;
            }
        }
    }

    /// Move one step along the current edge; true when the edge end is reached.
    fn advance_on_edge(&mut self, id: VehicleId, t: u64) -> Result<bool, SimError> {
        let Location::Edge(edge_id) = self.fleet.get(id).location().clone() else {
            return Ok(false);
        };
        let edge = self
            .network
            .edge_by_name(&edge_id)
            .ok_or(NetworkError::UnknownEdge(edge_id))?;
        let length = edge.length_blocks();
        let vehicle = self.fleet.get_mut(id);

        match self.config.movement {
            MovementModel::Micro => {
                let remaining = length - vehicle.position();
                let red_ahead = edge.light() == Some(LightState::Red) && remaining <= vehicle.target_speed();
                if red_ahead {
                    vehicle.brake();
                } else {
                    vehicle.move_micro();
                }
            }
            MovementModel::Macro => {
                vehicle.move_macro(edge.segment_speed());
            }
        }
        vehicle.count_platooned_tick();

        if vehicle.position() >= length {
            vehicle.arrive(edge, t);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EdgeConfig, NetworkConfig, NodeConfig, VehicleConfig};

    fn corridor(protocol: ProtocolKind) -> SimConfig {
        let node = |name: &str| NodeConfig { name: name.into(), x: 0.0, y: 0.0 };
        let edge = |name: &str, from: &str, to: &str| EdgeConfig {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            weight: 30.0,
            length_m: 100.0,
            speed_limit_kmh: None,
            flow: 0.0,
            stoplight: None,
        };
        let car = |name: &str| VehicleConfig {
            name: name.into(),
            origin: "a".into(),
            destination: "c".into(),
            via: Vec::new(),
            preference: Default::default(),
            utility: Default::default(),
        };
        SimConfig {
            seed: 3,
            protocol,
            deadline: 6,
            movement: MovementModel::Macro,
            distribution: Default::default(),
            max_ticks: 500,
            network: NetworkConfig {
                nodes: vec![node("a"), node("b"), node("c")],
                edges: vec![edge("ab", "a", "b"), edge("bc", "b", "c")],
            },
            vehicles: vec![car("x"), car("y"), car("z")],
        }
    }

    #[test]
    fn staging_tick_forms_platoon_without_moving() {
        let mut sim = PlatoonSimulation::from_config(corridor(ProtocolKind::AlternatingOffers)).expect("test: sim");
        let r = sim.tick_core().expect("test: tick");
        assert_eq!(r.tick, 0);
        assert_eq!(r.arrivals, 0);
        assert_eq!(r.groups_formed, 1);
        assert!(r.vehicles.iter().all(|v| v.companions.len() == 2));
        assert!(r.vehicles.iter().all(|v| v.position == 0.0));
    }

    #[test]
    fn platoon_shares_cost_to_destination() {
        let mut sim = PlatoonSimulation::from_config(corridor(ProtocolKind::AlternatingOffers)).expect("test: sim");
        sim.run_to_completion().expect("test: run");
        assert!(sim.is_finished());
        for report in sim.reports() {
            // two edges of weight 30 at the three-member rate of 20 each
            assert_eq!(report.total_cost, 40.0);
            assert_eq!(report.total_length, 200.0);
            assert!(report.platooned_ticks > 0);
        }
        assert!(sim.fleet().companions_symmetric());
    }

    #[test]
    fn slow_starter_drops_out_when_the_platoon_moves_on() {
        let mut cfg = corridor(ProtocolKind::AlternatingOffers);
        cfg.movement = MovementModel::Micro;
        cfg.vehicles[0].preference.max_accel = 0.5;
        let mut sim = PlatoonSimulation::from_config(cfg).expect("test: sim");

        let (x, y, z) = (VehicleId(0), VehicleId(1), VehicleId(2));
        let mut y_left_b = None;
        while !sim.is_finished() && sim.current_tick() < 500 {
            let r = sim.tick_core().expect("test: tick");
            assert!(sim.fleet().companions_symmetric());
            let y_at = sim.fleet().get(y).location().clone();
            if y_left_b.is_none() && y_at == Location::Edge(EdgeId::from("bc")) {
                y_left_b = Some(r.tick);
                assert!(sim.fleet().get(x).companions().is_empty(), "x still linked while on ab");
                assert!(sim.fleet().get(y).companions().contains(&z));
            }
        }
        assert!(sim.is_finished());
        assert!(y_left_b.is_some());
        let bc = EdgeId::from("bc");
        let left = |id: VehicleId| {
            sim.fleet()
                .get(id)
                .events()
                .iter()
                .find(|e| e.kind == EventKind::Departed && e.location == Location::Edge(bc.clone()))
                .map(|e| e.timestep)
        };
        assert_eq!(left(y), left(z));
        assert!(left(x) > left(y));
        // y and z share bc as a pair
        assert_eq!(sim.reports()[1].total_cost, sim.reports()[2].total_cost);
    }

    #[test]
    fn unknown_destination_is_reported() {
        let mut cfg = corridor(ProtocolKind::TakeItOrLeaveIt);
        cfg.vehicles[0].destination = "nowhere".into();
        let err = PlatoonSimulation::from_config(cfg).err().expect("test: error");
        assert!(matches!(err, SimError::Unroutable { .. }), "got {err}");
    }

    #[test]
    fn origin_equal_to_destination_completes_on_staging_tick() {
        let mut cfg = corridor(ProtocolKind::TakeItOrLeaveIt);
        cfg.vehicles[0].destination = "a".into();
        let mut sim = PlatoonSimulation::from_config(cfg).expect("test: sim");
        let r = sim.tick_core().expect("test: tick");
        assert_eq!(r.completed, 1);
        assert!(r.vehicles[0].completed);
    }
}
