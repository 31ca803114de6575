// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Road Network & Routing Service
//
// The negotiation core only sees the `RoutingService` trait. `RoadGraph` is the
// in-process implementation used by the simulation driver, the bench and tests.

use std::collections::BTreeMap;

use petgraph::algo::astar;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::adapter::{from_decimal, to_decimal};
use crate::config::NetworkConfig;
use crate::types::{EdgeId, NodeId};
use crate::units;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown edge {0}")]
    UnknownEdge(EdgeId),
    #[error("duplicate node {0}")]
    DuplicateNode(NodeId),
    #[error("duplicate edge {0}")]
    DuplicateEdge(EdgeId),
    #[error("edge {0} has a negative weight")]
    NegativeWeight(EdgeId),
    #[error("no route from {from} to {to}")]
    NoRoute { from: NodeId, to: NodeId },
}

// ---------------------------------------------------------------------------
// Stoplight
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightState {
    Red,
    Green,
}

/// Two-state timer guarding the end of an edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stoplight {
    state: LightState,
    time_left: u32,
    red_duration: u32,
    green_duration: u32,
}

impl Stoplight {
    /// Start green; `offset` ticks are skipped so neighbouring lights can be staggered.
    pub fn new(red_duration: u32, green_duration: u32, offset: u32) -> Self {
        let mut light = Self {
            state: LightState::Green,
            time_left: green_duration.max(1),
            red_duration: red_duration.max(1),
            green_duration: green_duration.max(1),
        };
        for _ in 0..offset {
            light.advance();
        }
        light
    }

    pub fn state(&self) -> LightState {
        self.state
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn advance(&mut self) {
        if self.time_left > 1 {
            self.time_left -= 1;
            return;
        }
        self.state = match self.state {
            LightState::Red => LightState::Green,
            LightState::Green => LightState::Red,
        };
        self.time_left = match self.state {
            LightState::Red => self.red_duration,
            LightState::Green => self.green_duration,
        };
    }
}

// ---------------------------------------------------------------------------
// Graph types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Travel cost charged on arrival.
    pub weight: Decimal,
    /// Length in metres.
    pub length: Decimal,
    /// Segment capacity in blocks/step.
    pub capacity: f64,
    /// Background vehicles entering per step.
    pub flow: f64,
    pub stoplight: Option<Stoplight>,
}

impl Edge {
    pub fn length_blocks(&self) -> f64 {
        units::meters_to_blocks(from_decimal(self.length)).max(1.0)
    }

    pub fn light(&self) -> Option<LightState> {
        self.stoplight.as_ref().map(Stoplight::state)
    }

    pub fn segment_speed(&self) -> f64 {
        units::segment_speed(self.capacity, self.flow)
    }
}

// ---------------------------------------------------------------------------
// RoutingService
// ---------------------------------------------------------------------------

/// Narrow routing interface consumed by the negotiation core.
pub trait RoutingService {
    /// Deterministic shortest path as an ordered edge list.
    fn route(&self, from: &NodeId, to: &NodeId) -> Result<Vec<EdgeId>, NetworkError>;

    fn edge_by_name(&self, id: &EdgeId) -> Option<&Edge>;

    fn node_by_name(&self, id: &NodeId) -> Option<&Node>;

    /// Shortest path visiting every waypoint in order.
    fn route_via(
        &self,
        from: &NodeId,
        via: &[NodeId],
        to: &NodeId,
    ) -> Result<Vec<EdgeId>, NetworkError> {
        let mut legs = Vec::new();
        let mut cursor = from;
        for waypoint in via.iter().chain(std::iter::once(to)) {
            legs.extend(self.route(cursor, waypoint)?);
            cursor = waypoint;
        }
        Ok(legs)
    }

    /// Sum of edge weights along `route` (solo cost).
    fn route_cost(&self, route: &[EdgeId]) -> Result<Decimal, NetworkError> {
        route.iter().try_fold(Decimal::ZERO, |acc, id| {
            self.edge_by_name(id)
                .map(|e| acc + e.weight)
                .ok_or_else(|| NetworkError::UnknownEdge(id.clone()))
        })
    }

    /// Route starting with `edge`, then the shortest path from its target to `to`.
    fn route_through_edge(&self, edge: &EdgeId, to: &NodeId) -> Result<Vec<EdgeId>, NetworkError> {
        let e = self
            .edge_by_name(edge)
            .ok_or_else(|| NetworkError::UnknownEdge(edge.clone()))?;
        let mut route = vec![edge.clone()];
        route.extend(self.route(&e.target, to)?);
        Ok(route)
    }
}

// ---------------------------------------------------------------------------
// RoadGraph
// ---------------------------------------------------------------------------

/// Directed road network. Names map to petgraph indices; edges loaded from
/// config are inserted in name order so equal-cost searches always settle the
/// same way.
#[derive(Debug, Clone, Default)]
pub struct RoadGraph {
    graph: DiGraph<Node, Edge>,
    node_index: BTreeMap<NodeId, NodeIndex>,
    edge_index: BTreeMap<EdgeId, EdgeIndex>,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let mut graph = Self::new();
        for n in &config.nodes {
            graph.add_node(Node { id: NodeId::from(n.name.as_str()), x: n.x, y: n.y })?;
        }
        let mut edges: Vec<_> = config.edges.iter().collect();
        edges.sort_by(|a, b| a.name.cmp(&b.name));
        for e in edges {
            let capacity = e
                .speed_limit_kmh
                .map(units::kmh_to_blocks_per_step)
                .unwrap_or(units::UNBOUNDED_SPEED);
            graph.add_edge(Edge {
                id: EdgeId::from(e.name.as_str()),
                source: NodeId::from(e.from.as_str()),
                target: NodeId::from(e.to.as_str()),
                weight: to_decimal(e.weight),
                length: to_decimal(e.length_m),
                capacity,
                flow: e.flow,
                stoplight: e
                    .stoplight
                    .as_ref()
                    .map(|s| Stoplight::new(s.red, s.green, s.offset)),
            })?;
        }
        Ok(graph)
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), NetworkError> {
        if self.node_index.contains_key(&node.id) {
            return Err(NetworkError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        let ix = self.graph.add_node(node);
        self.node_index.insert(id, ix);
        Ok(())
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<(), NetworkError> {
        if self.edge_index.contains_key(&edge.id) {
            return Err(NetworkError::DuplicateEdge(edge.id));
        }
        if edge.weight < Decimal::ZERO {
            return Err(NetworkError::NegativeWeight(edge.id));
        }
        let source = self.index_of(&edge.source)?;
        let target = self.index_of(&edge.target)?;
        let id = edge.id.clone();
        let ix = self.graph.add_edge(source, target, edge);
        self.edge_index.insert(id, ix);
        Ok(())
    }

    fn index_of(&self, id: &NodeId) -> Result<NodeIndex, NetworkError> {
        self.node_index
            .get(id)
            .copied()
            .ok_or_else(|| NetworkError::UnknownNode(id.clone()))
    }

    /// Nodes in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.node_index.values().map(|&ix| &self.graph[ix])
    }

    /// Edges in name order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edge_index.values().map(|&ix| &self.graph[ix])
    }

    /// Tick every stoplight once. Called by the driver before movement.
    pub fn advance_stoplights(&mut self) {
        for edge in self.graph.edge_weights_mut() {
            if let Some(light) = edge.stoplight.as_mut() {
                light.advance();
            }
        }
    }

    /// Cheapest edge between two adjacent nodes, ties broken by name.
    fn cheapest_between(&self, a: NodeIndex, b: NodeIndex) -> Option<&Edge> {
        self.graph
            .edges_connecting(a, b)
            .map(|e| e.weight())
            .min_by(|x, y| x.weight.cmp(&y.weight).then_with(|| x.id.cmp(&y.id)))
    }
}

impl RoutingService for RoadGraph {
    fn route(&self, from: &NodeId, to: &NodeId) -> Result<Vec<EdgeId>, NetworkError> {
        let start = self.index_of(from)?;
        let goal = self.index_of(to)?;
        if start == goal {
            return Ok(Vec::new());
        }

        // Zero heuristic: plain Dijkstra over the Decimal weights.
        let (_, path) = astar(
            &self.graph,
            start,
            |n| n == goal,
            |e| e.weight().weight,
            |_| Decimal::ZERO,
        )
        .ok_or_else(|| NetworkError::NoRoute { from: from.clone(), to: to.clone() })?;

        path.windows(2)
            .map(|hop| {
                self.cheapest_between(hop[0], hop[1])
                    .map(|e| e.id.clone())
                    .ok_or_else(|| NetworkError::NoRoute { from: from.clone(), to: to.clone() })
            })
            .collect()
    }

    fn edge_by_name(&self, id: &EdgeId) -> Option<&Edge> {
        self.edge_index.get(id).map(|&ix| &self.graph[ix])
    }

    fn node_by_name(&self, id: &NodeId) -> Option<&Node> {
        self.node_index.get(id).map(|&ix| &self.graph[ix])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn edge(id: &str, from: &str, to: &str, weight: Decimal) -> Edge {
        Edge {
            id: EdgeId::from(id),
            source: NodeId::from(from),
            target: NodeId::from(to),
            weight,
            length: dec!(100),
            capacity: units::UNBOUNDED_SPEED,
            flow: 0.0,
            stoplight: None,
        }
    }

    fn diamond() -> RoadGraph {
        let mut g = RoadGraph::new();
        for n in ["a", "b", "c", "d"] {
            g.add_node(Node { id: NodeId::from(n), x: 0.0, y: 0.0 }).expect("test: node");
        }
        g.add_edge(edge("ab", "a", "b", dec!(1))).expect("test: edge");
        g.add_edge(edge("bd", "b", "d", dec!(5))).expect("test: edge");
        g.add_edge(edge("ac", "a", "c", dec!(2))).expect("test: edge");
        g.add_edge(edge("cd", "c", "d", dec!(2))).expect("test: edge");
        g
    }

    #[test]
    fn finds_cheapest_path() {
        let g = diamond();
        let path = g.route(&NodeId::from("a"), &NodeId::from("d")).expect("test: route");
        assert_eq!(path, vec![EdgeId::from("ac"), EdgeId::from("cd")]);
        assert_eq!(g.route_cost(&path).expect("test: cost"), dec!(4));
    }

    #[test]
    fn route_to_self_is_empty() {
        let g = diamond();
        let path = g.route(&NodeId::from("b"), &NodeId::from("b")).expect("test: route");
        assert!(path.is_empty());
    }

    #[test]
    fn unreachable_node_is_no_route() {
        let g = diamond();
        let err = g.route(&NodeId::from("d"), &NodeId::from("a"));
        assert!(matches!(err, Err(NetworkError::NoRoute { .. })), "got {err:?}");
    }

    #[test]
    fn via_stitches_legs() {
        let g = diamond();
        let path = g
            .route_via(&NodeId::from("a"), &[NodeId::from("b")], &NodeId::from("d"))
            .expect("test: route");
        assert_eq!(path, vec![EdgeId::from("ab"), EdgeId::from("bd")]);
    }

    #[test]
    fn through_edge_prefixes_edge() {
        let g = diamond();
        let path = g
            .route_through_edge(&EdgeId::from("ab"), &NodeId::from("d"))
            .expect("test: route");
        assert_eq!(path, vec![EdgeId::from("ab"), EdgeId::from("bd")]);
    }

    #[test]
    fn equal_cost_paths_ignore_config_order() {
        use crate::config::{EdgeConfig, NodeConfig};
        let edge_cfg = |name: &str, from: &str, to: &str| EdgeConfig {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            weight: 1.0,
            length_m: 100.0,
            speed_limit_kmh: None,
            flow: 0.0,
            stoplight: None,
        };
        let nodes: Vec<NodeConfig> = ["s", "x", "y", "t"]
            .iter()
            .map(|&n| NodeConfig { name: n.into(), x: 0.0, y: 0.0 })
            .collect();
        let mut edges = vec![
            edge_cfg("s-y", "s", "y"),
            edge_cfg("s-x", "s", "x"),
            edge_cfg("x-t", "x", "t"),
            edge_cfg("y-t", "y", "t"),
        ];
        let forward = RoadGraph::from_config(&NetworkConfig { nodes: nodes.clone(), edges: edges.clone() })
            .expect("test: graph");
        edges.reverse();
        let backward = RoadGraph::from_config(&NetworkConfig { nodes, edges }).expect("test: graph");

        let (s, t) = (NodeId::from("s"), NodeId::from("t"));
        let first = forward.route(&s, &t).expect("test: route");
        assert_eq!(first.len(), 2);
        assert_eq!(forward.route_cost(&first).expect("test: cost"), dec!(2));
        assert_eq!(backward.route(&s, &t).expect("test: route"), first);
        for _ in 0..5 {
            assert_eq!(forward.route(&s, &t).expect("test: route"), first);
        }
    }

    #[test]
    fn parallel_edges_pick_the_cheaper_one() {
        let mut g = diamond();
        g.add_edge(edge("ab-fast", "a", "b", dec!(0.5))).expect("test: edge");
        let path = g
            .route_via(&NodeId::from("a"), &[NodeId::from("b")], &NodeId::from("d"))
            .expect("test: route");
        assert_eq!(path, vec![EdgeId::from("ab-fast"), EdgeId::from("bd")]);
    }

    #[test]
    fn route_cost_rejects_unknown_edges() {
        let g = diamond();
        let err = g.route_cost(&[EdgeId::from("ab"), EdgeId::from("zz")]);
        assert!(matches!(err, Err(NetworkError::UnknownEdge(_))));
    }

    #[test]
    fn stoplight_cycles_between_states() {
        let mut light = Stoplight::new(2, 3, 0);
        assert_eq!(light.state(), LightState::Green);
        assert_eq!(light.time_left(), 3);
        light.advance();
        light.advance();
        light.advance();
        assert_eq!(light.state(), LightState::Red);
        assert_eq!(light.time_left(), 2);
        light.advance();
        light.advance();
        assert_eq!(light.state(), LightState::Green);
    }

    #[test]
    fn rejects_edges_to_unknown_nodes() {
        let mut g = RoadGraph::new();
        g.add_node(Node { id: NodeId::from("a"), x: 0.0, y: 0.0 }).expect("test: node");
        let err = g.add_edge(edge("az", "a", "z", dec!(1)));
        assert!(matches!(err, Err(NetworkError::UnknownNode(_))));
    }
}
