// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Platoon Matcher
//
// Runs once per tick after edge-end handling. Co-located vehicles that share
// their next edge are clustered, split by speed compatibility and stoplight
// cohort, and every resulting group of two or more is formed into a platoon.
// Vehicles are always visited in id order, so the partition is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::fleet::Fleet;
use crate::network::{LightState, RoutingService};
use crate::types::{EdgeId, NodeId, VehicleId};

/// Summary of one matching pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MatchOutcome {
    pub groups: Vec<Vec<VehicleId>>,
    /// Clusters skipped because they already travel together.
    pub intact: usize,
}

/// A set of co-located vehicles that may open a negotiation session.
#[derive(Debug, Clone, PartialEq)]
pub struct Crowd {
    pub anchor: NodeId,
    pub members: Vec<VehicleId>,
}

/// At a node, still travelling, and with somewhere left to go.
pub fn is_eligible(fleet: &Fleet, id: VehicleId) -> bool {
    let v = fleet.get(id);
    v.at_node().is_some() && !v.is_completed() && !v.at_destination() && fleet.next_edge(id).is_some()
}

/// True when the vehicle's last traversed edge ends in a red light.
pub fn faces_red(fleet: &Fleet, network: &dyn RoutingService, id: VehicleId) -> bool {
    fleet
        .get(id)
        .last_edge()
        .and_then(|e| network.edge_by_name(e))
        .and_then(|e| e.light())
        == Some(LightState::Red)
}

/// Group eligible vehicles by node, in id order within each node.
fn clusters_by_node(fleet: &Fleet) -> BTreeMap<NodeId, Vec<VehicleId>> {
    let mut clusters: BTreeMap<NodeId, Vec<VehicleId>> = BTreeMap::new();
    for id in fleet.ids() {
        if !is_eligible(fleet, id) {
            continue;
        }
        if let Some(node) = fleet.get(id).at_node() {
            clusters.entry(node.clone()).or_default().push(id);
        }
    }
    clusters
}

/// Every member already platoons with exactly the rest of the cluster.
pub fn is_intact(fleet: &Fleet, cluster: &[VehicleId]) -> bool {
    cluster.iter().all(|&id| {
        let v = fleet.get(id);
        let others: BTreeSet<VehicleId> = cluster.iter().copied().filter(|&o| o != id).collect();
        v.is_platooning() && *v.companions() == others
    })
}

/// Peel off speed-compatible sub-platoons.
///
/// The threshold is the highest minimum speed of the remaining members; those
/// whose maximum speed is strictly above it form one sub-platoon and the rest
/// are partitioned again.
pub fn partition_by_speed(fleet: &Fleet, cluster: &[VehicleId]) -> Vec<Vec<VehicleId>> {
    let mut rest = cluster.to_vec();
    let mut parts = Vec::new();
    while rest.len() >= 2 {
        let threshold = rest
            .iter()
            .map(|&id| fleet.get(id).preference().min_speed)
            .fold(f64::NEG_INFINITY, f64::max);
        let (fast, slow): (Vec<VehicleId>, Vec<VehicleId>) = rest
            .iter()
            .partition(|&&id| fleet.get(id).preference().max_speed > threshold);
        if fast.is_empty() {
            break;
        }
        parts.push(fast);
        rest = slow;
    }
    parts
}

/// Split into the red cohort and the green/no-light cohort.
pub fn partition_by_light(
    fleet: &Fleet,
    network: &dyn RoutingService,
    group: &[VehicleId],
) -> [Vec<VehicleId>; 2] {
    let (red, other): (Vec<VehicleId>, Vec<VehicleId>) =
        group.iter().partition(|&&id| faces_red(fleet, network, id));
    [red, other]
}

/// One matching pass over the whole fleet at tick `t`.
pub fn match_platoons(fleet: &mut Fleet, network: &dyn RoutingService, t: u64) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    let mut consumed: BTreeSet<VehicleId> = BTreeSet::new();

    for (node, members) in clusters_by_node(fleet) {
        let mut by_edge: BTreeMap<EdgeId, Vec<VehicleId>> = BTreeMap::new();
        for id in members {
            if consumed.contains(&id) {
                continue;
            }
            if let Some(edge) = fleet.next_edge(id) {
                by_edge.entry(edge.clone()).or_default().push(id);
            }
        }

        for (edge, cluster) in by_edge {
            if cluster.len() < 2 {
                continue;
            }
            if is_intact(fleet, &cluster) {
                outcome.intact += 1;
                consumed.extend(cluster.iter().copied());
                continue;
            }
            for part in partition_by_speed(fleet, &cluster) {
                for cohort in partition_by_light(fleet, network, &part) {
                    if cohort.len() < 2 {
                        continue;
                    }
                    debug!(node = %node, edge = %edge, size = cohort.len(), "matched platoon");
                    fleet.form_group(&cohort, &node, t);
                    consumed.extend(cohort.iter().copied());
                    outcome.groups.push(cohort);
                }
            }
        }
    }
    outcome
}

/// Co-located eligible vehicles that are not platooning, per node.
pub fn find_crowds(fleet: &Fleet) -> Vec<Crowd> {
    clusters_by_node(fleet)
        .into_iter()
        .filter_map(|(anchor, members)| {
            let members: Vec<VehicleId> = members
                .into_iter()
                .filter(|&id| !fleet.get(id).is_platooning())
                .collect();
            (members.len() >= 2).then_some(Crowd { anchor, members })
        })
        .collect()
}
