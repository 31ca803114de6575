// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Vehicle Agent

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::adapter::{from_decimal, shared_cost};
use crate::network::Edge;
use crate::preference::{Preference, Utility};
use crate::types::*;
use crate::units;

// ─── Vehicle ─────────────────────────────────────────────────────────────────

/// One autonomous agent travelling the road network.
///
/// Companion links are plain ids; the `Fleet` keeps them symmetric.
#[derive(Debug, Clone, Serialize)]
pub struct Vehicle {
    id: VehicleId,
    name: String,
    origin: NodeId,
    destination: NodeId,
    location: Location,
    /// Blocks travelled on the current edge; zero while at a node.
    position: f64,
    speed: f64,
    acceleration: f64,
    preference: Preference,
    utility: Utility,
    events: Vec<Event>,
    companions: BTreeSet<VehicleId>,
    platooning: bool,
    precedence: usize,
    /// Platoon pace cap in blocks/step.
    pace: Option<f64>,
    last_edge: Option<EdgeId>,
    last_arrival: u64,
    total_cost: Decimal,
    total_length: Decimal,
    /// Buyouts received minus buyouts paid.
    buyout_balance: f64,
    departed_at: Option<u64>,
    completed_at: Option<u64>,
    platooned_ticks: u64,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        name: impl Into<String>,
        origin: NodeId,
        destination: NodeId,
        preference: Preference,
        utility: Utility,
        t: u64,
    ) -> Self {
        let mut v = Self {
            id,
            name: name.into(),
            location: Location::Node(origin.clone()),
            origin,
            destination,
            position: 0.0,
            speed: 0.0,
            acceleration: 0.0,
            preference,
            utility,
            events: Vec::new(),
            companions: BTreeSet::new(),
            platooning: false,
            precedence: 0,
            pace: None,
            last_edge: None,
            last_arrival: t,
            total_cost: Decimal::ZERO,
            total_length: Decimal::ZERO,
            buyout_balance: 0.0,
            departed_at: None,
            completed_at: None,
            platooned_ticks: 0,
        };
        v.log(EventKind::Created, t, None);
        v
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn id(&self) -> VehicleId { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn origin(&self) -> &NodeId { &self.origin }
    pub fn destination(&self) -> &NodeId { &self.destination }
    pub fn location(&self) -> &Location { &self.location }
    pub fn position(&self) -> f64 { self.position }
    pub fn speed(&self) -> f64 { self.speed }
    pub fn acceleration(&self) -> f64 { self.acceleration }
    pub fn preference(&self) -> &Preference { &self.preference }
    pub fn utility(&self) -> &Utility { &self.utility }
    pub fn events(&self) -> &[Event] { &self.events }
    pub fn companions(&self) -> &BTreeSet<VehicleId> { &self.companions }
    pub fn is_platooning(&self) -> bool { self.platooning }
    pub fn precedence(&self) -> usize { self.precedence }
    pub fn pace(&self) -> Option<f64> { self.pace }
    pub fn last_edge(&self) -> Option<&EdgeId> { self.last_edge.as_ref() }
    pub fn total_cost(&self) -> Decimal { self.total_cost }
    pub fn total_length(&self) -> Decimal { self.total_length }
    pub fn buyout_balance(&self) -> f64 { self.buyout_balance }

    pub fn at_node(&self) -> Option<&NodeId> {
        self.location.node()
    }

    pub fn at_destination(&self) -> bool {
        self.at_node() == Some(&self.destination)
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn has_event(&self, kind: EventKind) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }

    /// Formed with no later Split, yet nobody left to travel with.
    pub fn is_loner(&self) -> bool {
        let last = self
            .events
            .iter()
            .rev()
            .find(|e| matches!(e.kind, EventKind::Formed | EventKind::Split));
        matches!(last, Some(e) if e.kind == EventKind::Formed) && self.companions.is_empty()
    }

    /// Own max speed, capped by the platoon pace.
    pub fn target_speed(&self) -> f64 {
        match self.pace {
            Some(p) => p.min(self.preference.max_speed),
            None => self.preference.max_speed,
        }
    }

    // ─── Movement ────────────────────────────────────────────────────────────

    /// Accelerate (or decelerate) toward the target speed within own bounds.
    pub fn move_micro(&mut self) -> f64 {
        let target = self.target_speed();
        self.acceleration = if self.speed < target {
            self.preference.max_accel.min(target - self.speed)
        } else {
            -self.preference.max_decel.min(self.speed - target)
        };
        self.speed = (self.speed + self.acceleration).max(0.0);
        self.position += self.speed;
        self.speed
    }

    pub fn brake(&mut self) -> f64 {
        self.acceleration = -self.preference.max_decel.min(self.speed);
        self.speed = (self.speed + self.acceleration).max(0.0);
        self.position += self.speed;
        self.speed
    }

    /// Adopt the segment speed, never above own target speed.
    pub fn move_macro(&mut self, segment_speed: f64) -> f64 {
        let next = segment_speed.min(self.target_speed()).max(0.0);
        self.acceleration = next - self.speed;
        self.speed = next;
        self.position += self.speed;
        self.speed
    }

    /// Stand still at a node (e.g. held by a red light).
    pub fn hold(&mut self) {
        self.acceleration = -self.speed;
        self.speed = 0.0;
    }

    pub fn count_platooned_tick(&mut self) {
        if !self.companions.is_empty() {
            self.platooned_ticks += 1;
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    pub fn depart(&mut self, edge: &EdgeId, t: u64) {
        self.location = Location::Edge(edge.clone());
        self.position = 0.0;
        self.departed_at.get_or_insert(t);
        self.log(EventKind::Departed, t, None);
    }

    /// Reach the end of `edge`. The only place budgets are consumed.
    pub fn arrive(&mut self, edge: &Edge, t: u64) {
        let cost = shared_cost(edge.weight, self.companions.len());
        self.preference.consume_length(edge.length);
        self.preference.consume_cost(cost);
        self.preference.consume_time(t.saturating_sub(self.last_arrival));
        self.total_length += edge.length;
        self.total_cost += cost;
        self.last_arrival = t;
        self.last_edge = Some(edge.id.clone());
        self.location = Location::Node(edge.target.clone());
        self.position = 0.0;
        self.log(EventKind::Arrived, t, None);
    }

    pub fn complete(&mut self, node: &NodeId, t: u64) {
        self.location = Location::Node(node.clone());
        self.position = 0.0;
        self.speed = 0.0;
        self.completed_at = Some(t);
        self.log(EventKind::Completed, t, None);
    }

    /// Join a platoon; the event keeps a snapshot of the companions.
    pub fn form(&mut self, node: &NodeId, t: u64, companions: &[VehicleId]) {
        self.companions = companions.iter().copied().filter(|&c| c != self.id).collect();
        self.platooning = true;
        let snapshot = self.companions.iter().copied().collect();
        self.log_at(EventKind::Formed, Location::Node(node.clone()), t, Some(snapshot));
    }

    pub fn split(&mut self, node: &NodeId, t: u64) {
        self.companions.clear();
        self.platooning = false;
        self.pace = None;
        self.precedence = 0;
        self.log_at(EventKind::Split, Location::Node(node.clone()), t, None);
    }

    pub(crate) fn remove_companion(&mut self, other: VehicleId) {
        self.companions.remove(&other);
    }

    pub(crate) fn set_pace(&mut self, pace: Option<f64>) {
        self.pace = pace;
    }

    pub(crate) fn set_precedence(&mut self, rank: usize) {
        self.precedence = rank;
    }

    pub(crate) fn credit_buyout(&mut self, amount: f64) {
        self.buyout_balance += amount;
    }

    fn log(&mut self, kind: EventKind, t: u64, companions: Option<Vec<VehicleId>>) {
        let location = self.location.clone();
        self.log_at(kind, location, t, companions);
    }

    fn log_at(&mut self, kind: EventKind, location: Location, t: u64, companions: Option<Vec<VehicleId>>) {
        self.events.push(Event { subject: self.id, kind, location, timestep: t, companions });
    }

    // ─── Reporting ───────────────────────────────────────────────────────────

    pub fn report(&self) -> VehicleReport {
        let total_cost = from_decimal(self.total_cost);
        let total_length = from_decimal(self.total_length);
        let start = self.departed_at.unwrap_or(0);
        let end = self.completed_at.unwrap_or(self.last_arrival);
        let total_duration = end.saturating_sub(start);
        VehicleReport {
            name: self.name.clone(),
            total_cost,
            total_length,
            total_duration,
            duration_s: units::steps_to_seconds(total_duration),
            end_utility: self.utility.evaluate(total_cost - self.buyout_balance, total_length),
            buyout_balance: self.buyout_balance,
            platooned_ticks: self.platooned_ticks,
        }
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            id: self.id,
            name: self.name.clone(),
            location: self.location.clone(),
            position: self.position,
            speed: self.speed,
            speed_kmh: units::blocks_per_step_to_kmh(self.speed),
            platooning: self.platooning,
            companions: self.companions.iter().copied().collect(),
            precedence: self.precedence,
            completed: self.is_completed(),
            remaining_cost: from_decimal(self.preference.remaining_cost()),
            remaining_length: from_decimal(self.preference.remaining_length()),
            remaining_time: self.preference.remaining_time(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UNBOUNDED_SPEED;
    use rust_decimal_macros::dec;

    fn vehicle(id: u32) -> Vehicle {
        Vehicle::new(
            VehicleId(id),
            format!("car{id}"),
            NodeId::from("a"),
            NodeId::from("b"),
            Preference::new(0.5, 4.0, 1.0, 2.0, 100, dec!(1000), dec!(100)),
            Utility::new(1.0, 0.0),
            0,
        )
    }

    fn edge(weight: Decimal) -> Edge {
        Edge {
            id: EdgeId::from("ab"),
            source: NodeId::from("a"),
            target: NodeId::from("b"),
            weight,
            length: dec!(250),
            capacity: UNBOUNDED_SPEED,
            flow: 0.0,
            stoplight: None,
        }
    }

    #[test]
    fn created_event_is_first() {
        let v = vehicle(0);
        assert_eq!(v.events().len(), 1);
        assert_eq!(v.events()[0].kind, EventKind::Created);
    }

    #[test]
    fn micro_movement_respects_accel_and_max() {
        let mut v = vehicle(0);
        assert_eq!(v.move_micro(), 1.0);
        assert_eq!(v.move_micro(), 2.0);
        v.move_micro();
        v.move_micro();
        assert_eq!(v.move_micro(), 4.0, "capped at max speed");
        assert_eq!(v.position(), 1.0 + 2.0 + 3.0 + 4.0 + 4.0);
    }

    #[test]
    fn brake_never_reverses() {
        let mut v = vehicle(0);
        v.move_micro();
        assert_eq!(v.brake(), 0.0);
        assert_eq!(v.brake(), 0.0);
    }

    #[test]
    fn macro_movement_clamps_to_own_max() {
        let mut v = vehicle(0);
        assert_eq!(v.move_macro(UNBOUNDED_SPEED), 4.0);
        assert_eq!(v.move_macro(1.5), 1.5);
    }

    #[test]
    fn pace_caps_target_speed() {
        let mut v = vehicle(0);
        v.set_pace(Some(2.5));
        assert_eq!(v.move_macro(UNBOUNDED_SPEED), 2.5);
    }

    #[test]
    fn solo_arrival_consumes_full_weight() {
        let mut v = vehicle(0);
        v.depart(&EdgeId::from("ab"), 1);
        v.arrive(&edge(dec!(30)), 6);
        assert_eq!(v.total_cost(), dec!(30));
        assert_eq!(v.preference().remaining_cost(), dec!(70));
        assert_eq!(v.preference().remaining_length(), dec!(750));
        assert_eq!(v.preference().remaining_time(), 94);
        assert_eq!(v.at_node(), Some(&NodeId::from("b")));
    }

    #[test]
    fn platoon_arrival_uses_shared_cost() {
        let mut v = vehicle(0);
        v.form(&NodeId::from("a"), 0, &[VehicleId(1), VehicleId(2)]);
        v.depart(&EdgeId::from("ab"), 1);
        v.arrive(&edge(dec!(30)), 2);
        assert_eq!(v.total_cost(), dec!(20));
    }

    #[test]
    fn form_snapshots_companions() {
        let mut v = vehicle(0);
        v.form(&NodeId::from("a"), 3, &[VehicleId(0), VehicleId(4)]);
        let formed = v.events().last().expect("test: event");
        assert_eq!(formed.kind, EventKind::Formed);
        assert_eq!(formed.companions, Some(vec![VehicleId(4)]));
        v.remove_companion(VehicleId(4));
        assert_eq!(v.events().last().and_then(|e| e.companions.clone()), Some(vec![VehicleId(4)]));
    }

    #[test]
    fn loner_after_partners_leave() {
        let mut v = vehicle(0);
        v.form(&NodeId::from("a"), 0, &[VehicleId(1)]);
        assert!(!v.is_loner());
        v.remove_companion(VehicleId(1));
        assert!(v.is_loner());
        v.split(&NodeId::from("a"), 1);
        assert!(!v.is_loner());
        assert!(!v.is_platooning());
    }

    #[test]
    fn report_includes_buyouts_in_end_utility() {
        let mut v = vehicle(0);
        v.depart(&EdgeId::from("ab"), 0);
        v.arrive(&edge(dec!(10)), 4);
        v.credit_buyout(2.5);
        v.complete(&NodeId::from("b"), 4);
        let r = v.report();
        assert_eq!(r.total_cost, 10.0);
        assert_eq!(r.end_utility, 7.5);
        assert_eq!(r.total_duration, 4);
        assert_eq!(r.duration_s, 4.0);
    }

    #[test]
    fn snapshot_reports_speed_in_kmh() {
        let mut v = vehicle(0);
        v.move_micro();
        v.move_micro();
        // 2 blocks/step = 10 m/s
        assert!((v.snapshot().speed_kmh - 36.0).abs() < 1e-9);
    }
}
