// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Edge-End Handler
//
// Runs after movement. Detects platoons whose members are about to take
// different edges, completes vehicles that reached their destination and
// clears out vehicles left alone after their partners split away.

use tracing::debug;

use crate::fleet::Fleet;
use crate::types::{EventKind, VehicleId};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEndOutcome {
    pub splits: u32,
    pub completed: u32,
}

/// A platooning member at a node whose next edge differs from some companion's.
fn diverges(fleet: &Fleet, id: VehicleId) -> bool {
    let own = fleet.next_edge(id);
    fleet
        .get(id)
        .companions()
        .iter()
        .any(|&c| fleet.next_edge(c) != own)
}

pub fn handle_edge_ends(fleet: &mut Fleet, t: u64) -> EdgeEndOutcome {
    let mut outcome = EdgeEndOutcome::default();
    let ids: Vec<VehicleId> = fleet.ids().collect();

    for &id in &ids {
        let v = fleet.get(id);
        let Some(node) = v.at_node().cloned() else { continue };
        if !v.is_platooning() || v.at_destination() || v.is_completed() {
            continue;
        }
        if diverges(fleet, id) {
            debug!(vehicle = %id, node = %node, tick = t, "platoon member diverges");
            fleet.detach(id, &node, t);
            outcome.splits += 1;
        }
    }

    for &id in &ids {
        let v = fleet.get(id);
        if !v.at_destination() || v.has_event(EventKind::Completed) {
            continue;
        }
        let node = v.destination().clone();
        if v.is_platooning() {
            fleet.detach(id, &node, t);
            outcome.splits += 1;
        }
        fleet.clear_route(id);
        fleet.get_mut(id).complete(&node, t);
        debug!(vehicle = %id, node = %node, tick = t, "vehicle completed");
        outcome.completed += 1;
    }
    outcome
}

/// Split a vehicle still marked as formed whose companions have all left.
/// Called right before the vehicle departs again.
pub fn check_loners(fleet: &mut Fleet, id: VehicleId, t: u64) -> bool {
    let v = fleet.get(id);
    if !v.is_loner() {
        return false;
    }
    let Some(node) = v.at_node().cloned() else { return false };
    fleet.detach(id, &node, t);
    debug!(vehicle = %id, node = %node, tick = t, "loner split");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Edge;
    use crate::preference::{Preference, Utility};
    use crate::types::{EdgeId, NodeId};
    use crate::units::UNBOUNDED_SPEED;
    use crate::vehicle::Vehicle;
    use rust_decimal_macros::dec;

    fn edge(id: &str, from: &str, to: &str) -> Edge {
        Edge {
            id: EdgeId::from(id),
            source: NodeId::from(from),
            target: NodeId::from(to),
            weight: dec!(6),
            length: dec!(50),
            capacity: UNBOUNDED_SPEED,
            flow: 0.0,
            stoplight: None,
        }
    }

    fn fleet(routes: &[(&str, &[&str])]) -> Fleet {
        let mut f = Fleet::new();
        for (dest, route) in routes {
            let v = Vehicle::new(
                f.next_id(),
                format!("car{}", f.len()),
                NodeId::from("a"),
                NodeId::from(*dest),
                Preference::new(1.0, 5.0, 1.0, 1.0, 100, dec!(1000), dec!(100)),
                Utility::new(1.0, 0.0),
                0,
            );
            f.add(v, route.iter().map(|&e| EdgeId::from(e)).collect());
        }
        f
    }

    /// Move every vehicle along `ab` together.
    fn travel_ab(f: &mut Fleet, t: u64) {
        let ab = edge("ab", "a", "b");
        for id in f.ids().collect::<Vec<_>>() {
            let e = f.pop_next_edge(id).expect("test: route");
            f.get_mut(id).depart(&e, t);
            f.get_mut(id).arrive(&ab, t + 1);
        }
    }

    #[test]
    fn diverging_routes_split_the_platoon() {
        let mut f = fleet(&[("c", &["ab", "bc"]), ("d", &["ab", "bd"])]);
        f.form_group(&[VehicleId(0), VehicleId(1)], &NodeId::from("a"), 0);
        travel_ab(&mut f, 1);

        let out = handle_edge_ends(&mut f, 2);
        assert_eq!(out.splits, 1);
        assert!(f.companions_symmetric());
        assert!(f.get(VehicleId(0)).companions().is_empty());
        assert!(f.get(VehicleId(1)).companions().is_empty());
        assert!(!f.get(VehicleId(0)).is_platooning());
        // The partner is stranded until it next departs.
        assert!(f.get(VehicleId(1)).is_loner());
        assert!(check_loners(&mut f, VehicleId(1), 2));
        assert!(!f.get(VehicleId(1)).is_platooning());
    }

    #[test]
    fn shared_next_edge_keeps_platoon() {
        let mut f = fleet(&[("c", &["ab", "bc"]), ("c", &["ab", "bc"])]);
        f.form_group(&[VehicleId(0), VehicleId(1)], &NodeId::from("a"), 0);
        travel_ab(&mut f, 1);
        let out = handle_edge_ends(&mut f, 2);
        assert_eq!(out, EdgeEndOutcome::default());
        assert_eq!(f.get(VehicleId(0)).companions().len(), 1);
    }

    #[test]
    fn arrival_at_destination_completes_and_splits() {
        let mut f = fleet(&[("b", &["ab"]), ("c", &["ab", "bc"])]);
        f.form_group(&[VehicleId(0), VehicleId(1)], &NodeId::from("a"), 0);
        travel_ab(&mut f, 1);
        let out = handle_edge_ends(&mut f, 2);
        assert_eq!(out.completed, 1);
        assert!(f.get(VehicleId(0)).is_completed());
        assert!(f.companions_symmetric());
        assert!(f.get(VehicleId(1)).companions().is_empty());

        let again = handle_edge_ends(&mut f, 3);
        assert_eq!(again.completed, 0, "completion is logged once");
    }

    #[test]
    fn check_loners_ignores_solo_vehicles() {
        let mut f = fleet(&[("b", &["ab"])]);
        assert!(!check_loners(&mut f, VehicleId(0), 0));
        assert_eq!(f.get(VehicleId(0)).events().len(), 1);
    }
}
