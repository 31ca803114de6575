// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Fleet Registry
//
// Central owner of every vehicle and its pending route. Companion sets hold
// ids only and are mutated exclusively through `form_group` / `detach`, which
// keeps `A ∈ companions(B) ⇔ B ∈ companions(A)`.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::types::{EdgeId, NodeId, VehicleId};
use crate::vehicle::Vehicle;

#[derive(Debug, Clone, Default)]
pub struct Fleet {
    vehicles: Vec<Vehicle>,
    routes: BTreeMap<VehicleId, VecDeque<EdgeId>>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> VehicleId {
        VehicleId(self.vehicles.len() as u32)
    }

    /// Register a vehicle built with `next_id()`.
    pub fn add(&mut self, vehicle: Vehicle, route: Vec<EdgeId>) -> VehicleId {
        let id = vehicle.id();
        debug_assert_eq!(id, self.next_id(), "vehicles must be registered in id order");
        self.routes.insert(id, route.into());
        self.vehicles.push(vehicle);
        id
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.vehicles.iter().map(Vehicle::id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.iter()
    }

    pub fn get(&self, id: VehicleId) -> &Vehicle {
        &self.vehicles[id.index()]
    }

    pub fn get_mut(&mut self, id: VehicleId) -> &mut Vehicle {
        &mut self.vehicles[id.index()]
    }

    pub fn find(&self, name: &str) -> Option<VehicleId> {
        self.vehicles.iter().find(|v| v.name() == name).map(Vehicle::id)
    }

    // ─── Routes ──────────────────────────────────────────────────────────────

    pub fn route(&self, id: VehicleId) -> Vec<EdgeId> {
        self.routes.get(&id).map(|r| r.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn next_edge(&self, id: VehicleId) -> Option<&EdgeId> {
        self.routes.get(&id).and_then(|r| r.front())
    }

    pub fn pop_next_edge(&mut self, id: VehicleId) -> Option<EdgeId> {
        self.routes.get_mut(&id).and_then(VecDeque::pop_front)
    }

    pub fn replace_route(&mut self, id: VehicleId, route: Vec<EdgeId>) {
        self.routes.insert(id, route.into());
    }

    pub fn clear_route(&mut self, id: VehicleId) {
        self.routes.insert(id, VecDeque::new());
    }

    // ─── Companionship ───────────────────────────────────────────────────────

    /// Make `members` one platoon at `node`. Members already linked to others
    /// are split from their old grouping first.
    pub fn form_group(&mut self, members: &[VehicleId], node: &NodeId, t: u64) {
        for &id in members {
            if self.get(id).is_platooning() {
                self.detach(id, node, t);
            }
        }
        let pace = members
            .iter()
            .map(|&id| self.get(id).preference().max_speed)
            .fold(f64::INFINITY, f64::min);
        for &id in members {
            let v = self.get_mut(id);
            v.form(node, t, members);
            v.set_pace(Some(pace));
        }
        self.recompute_precedence(members);
        debug!(node = %node, tick = t, members = ?members, "platoon formed");
    }

    /// Split `id` and drop it from every former companion's set.
    pub fn detach(&mut self, id: VehicleId, node: &NodeId, t: u64) {
        let former: Vec<VehicleId> = self.get(id).companions().iter().copied().collect();
        self.get_mut(id).split(node, t);
        for &c in &former {
            self.get_mut(c).remove_companion(id);
        }
        for &c in &former {
            let mut group: Vec<VehicleId> = self.get(c).companions().iter().copied().collect();
            group.push(c);
            self.recompute_precedence(&group);
        }
        debug!(vehicle = %id, node = %node, tick = t, "vehicle split");
    }

    /// Drop the mutual link between `a` and `b`, leaving their other
    /// companions untouched.
    pub fn unlink(&mut self, a: VehicleId, b: VehicleId) {
        self.get_mut(a).remove_companion(b);
        self.get_mut(b).remove_companion(a);
        for id in [a, b] {
            let mut group: Vec<VehicleId> = self.get(id).companions().iter().copied().collect();
            group.push(id);
            self.recompute_precedence(&group);
        }
        debug!(a = %a, b = %b, "companions separated");
    }

    /// Rank platoon members by id; rank 0 leads.
    fn recompute_precedence(&mut self, members: &[VehicleId]) {
        let mut ordered = members.to_vec();
        ordered.sort();
        ordered.dedup();
        for (rank, id) in ordered.into_iter().enumerate() {
            self.get_mut(id).set_precedence(rank);
        }
    }

    /// Every companion link has its mirror.
    pub fn companions_symmetric(&self) -> bool {
        self.vehicles.iter().all(|v| {
            v.companions()
                .iter()
                .all(|&c| self.get(c).companions().contains(&v.id()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::{Preference, Utility};
    use crate::types::EventKind;
    use rust_decimal_macros::dec;

    fn fleet(n: u32) -> Fleet {
        let mut f = Fleet::new();
        for i in 0..n {
            let v = Vehicle::new(
                f.next_id(),
                format!("car{i}"),
                NodeId::from("a"),
                NodeId::from("z"),
                Preference::new(0.5, 2.0 + i as f64, 1.0, 1.0, 100, dec!(100), dec!(100)),
                Utility::new(1.0, 0.0),
                0,
            );
            f.add(v, vec![EdgeId::from("e1"), EdgeId::from("e2")]);
        }
        f
    }

    #[test]
    fn form_group_links_everyone_and_sets_pace() {
        let mut f = fleet(3);
        let ids = [VehicleId(0), VehicleId(1), VehicleId(2)];
        f.form_group(&ids, &NodeId::from("a"), 1);
        assert!(f.companions_symmetric());
        for id in ids {
            assert_eq!(f.get(id).companions().len(), 2);
            assert_eq!(f.get(id).pace(), Some(2.0));
        }
        assert_eq!(f.get(VehicleId(0)).precedence(), 0);
        assert_eq!(f.get(VehicleId(2)).precedence(), 2);
    }

    #[test]
    fn detach_keeps_symmetry() {
        let mut f = fleet(3);
        f.form_group(&[VehicleId(0), VehicleId(1), VehicleId(2)], &NodeId::from("a"), 1);
        f.detach(VehicleId(0), &NodeId::from("b"), 2);
        assert!(f.companions_symmetric());
        assert!(f.get(VehicleId(0)).companions().is_empty());
        assert_eq!(f.get(VehicleId(1)).companions().len(), 1);
        assert_eq!(f.get(VehicleId(1)).precedence(), 0);
        assert_eq!(f.get(VehicleId(2)).precedence(), 1);
    }

    #[test]
    fn unlink_drops_one_pair_only() {
        let mut f = fleet(3);
        f.form_group(&[VehicleId(0), VehicleId(1), VehicleId(2)], &NodeId::from("a"), 1);
        f.unlink(VehicleId(0), VehicleId(2));
        assert!(f.companions_symmetric());
        assert_eq!(f.get(VehicleId(0)).companions().iter().copied().collect::<Vec<_>>(), vec![VehicleId(1)]);
        assert_eq!(f.get(VehicleId(1)).companions().len(), 2);
        assert_eq!(f.get(VehicleId(2)).precedence(), 1);
        f.unlink(VehicleId(1), VehicleId(2));
        assert!(f.get(VehicleId(2)).is_loner());
    }

    #[test]
    fn regrouping_splits_old_platoon_first() {
        let mut f = fleet(3);
        f.form_group(&[VehicleId(0), VehicleId(1)], &NodeId::from("a"), 1);
        f.form_group(&[VehicleId(1), VehicleId(2)], &NodeId::from("a"), 2);
        assert!(f.companions_symmetric());
        assert!(f.get(VehicleId(0)).companions().is_empty());
        assert!(f.get(VehicleId(0)).is_loner());
        let kinds: Vec<EventKind> = f.get(VehicleId(1)).events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Created, EventKind::Formed, EventKind::Split, EventKind::Formed]);
    }

    #[test]
    fn routes_are_popped_in_order() {
        let mut f = fleet(1);
        assert_eq!(f.next_edge(VehicleId(0)), Some(&EdgeId::from("e1")));
        assert_eq!(f.pop_next_edge(VehicleId(0)), Some(EdgeId::from("e1")));
        f.replace_route(VehicleId(0), vec![EdgeId::from("x")]);
        assert_eq!(f.route(VehicleId(0)), vec![EdgeId::from("x")]);
    }
}
