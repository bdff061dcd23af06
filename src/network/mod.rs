// This file is part of Velopolis-Core.
// Copyright © 2025 André de Palma, Lucas Javaudin
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The static cycling network: nodes, directed edges and the precomputed
//! caches the router and the kinematic model feed on.
//!
//! Edge attributes form an open vocabulary: every attribute name seen in the
//! scenario is canonicalized to a small integer [`AttrId`] once at load time
//! and edges store a dense vector indexed by it, so the hot paths never touch
//! strings. `length` participates in the vocabulary like any other attribute
//! so that the router can treat all of them uniformly.
pub mod state;

use hashbrown::HashMap;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::ScenarioError;
use crate::scenario::{EdgeRecord, NodeRecord};

pub const ATTR_LENGTH: &str = "length";
pub const ATTR_GRADE: &str = "grade";
pub const ATTR_SAFETY: &str = "safety";
pub const ATTR_LIGHTING: &str = "lighting";

/// Per-bike footprint used for the capacity precompute, in meters.
const BIKE_FOOTPRINT_M: f64 = 2.5;

/// Palette of node colors; cyclists inherit the color of their origin.
const NODE_COLOR_PALETTE: [&str; 20] = [
    "#CC0000", "#006666", "#003366", "#006600", "#CC6600", "#660066", "#006633", "#CC9900",
    "#663399", "#003399", "#CC3300", "#009900", "#990000", "#4B0082", "#2F4F2F", "#8B4513",
    "#800080", "#191970", "#2E8B57", "#8B0000",
];

/// Canonical id of an edge attribute.
pub type AttrId = usize;

/// The canonicalized attribute vocabulary of one network.
#[derive(Clone, Debug, Default)]
pub struct AttrVocabulary {
    names: Vec<String>,
    index: HashMap<String, AttrId>,
}

impl AttrVocabulary {
    fn intern(&mut self, name: &str) -> AttrId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_owned());
        self.index.insert(name.to_owned(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<AttrId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: AttrId) -> &str {
        &self.names[id]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A node of the cycling network.
#[derive(Clone, Debug)]
pub struct CycleNode {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// One directed cycle-path segment.
#[derive(Clone, Debug)]
pub struct CycleEdge {
    /// Physical length in meters, > 0.
    pub length_m: f64,
    /// Congestion-free capacity in bicycles: `floor(length / 2.5)`.
    pub capacity: usize,
    /// Dense attribute storage indexed by [`AttrId`]; `None` when the
    /// scenario did not set the attribute on this edge.
    attrs: Vec<Option<f64>>,
}

impl CycleEdge {
    pub fn attr(&self, id: AttrId) -> Option<f64> {
        self.attrs.get(id).copied().flatten()
    }
}

/// The static network: a directed graph plus the load-time caches.
#[derive(Clone, Debug)]
pub struct CycleNetwork {
    graph: DiGraph<CycleNode, CycleEdge>,
    node_index: HashMap<String, NodeIndex>,
    vocabulary: AttrVocabulary,
    /// Per-attribute `(min, max)` over all directed edges, on the routing
    /// value (grade is ranged on its magnitude).
    ranges: Vec<Option<(f64, f64)>>,
    /// Rank of each node in the lexicographic order of node ids, used for
    /// deterministic tie-breaking in the router.
    lex_rank: Vec<u32>,
    length_attr: AttrId,
    grade_attr: Option<AttrId>,
    safety_attr: Option<AttrId>,
    lighting_attr: Option<AttrId>,
}

impl CycleNetwork {
    /// Builds the network from scenario records. The records are assumed to
    /// have passed [`Scenario::validate`](crate::scenario::Scenario::validate);
    /// node references are still checked so the constructor alone can never
    /// produce a broken graph.
    pub fn from_records(
        nodes: &[NodeRecord],
        edges: &[EdgeRecord],
    ) -> Result<Self, ScenarioError> {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut node_index = HashMap::with_capacity(nodes.len());
        for record in nodes {
            let index = graph.add_node(CycleNode {
                id: record.id.clone(),
                x: record.x,
                y: record.y,
            });
            node_index.insert(record.id.clone(), index);
        }

        // Intern `length` first, then the scenario attributes in sorted
        // order: attribute ids, and with them every float summation over
        // attributes, must not depend on hash-map iteration order.
        let mut vocabulary = AttrVocabulary::default();
        let length_attr = vocabulary.intern(ATTR_LENGTH);
        let mut names: Vec<&str> = edges
            .iter()
            .flat_map(|record| record.attrs.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        for name in names {
            vocabulary.intern(name);
        }

        let lookup = |id: &str| -> Result<NodeIndex, ScenarioError> {
            node_index
                .get(id)
                .copied()
                .ok_or_else(|| ScenarioError::UnknownNode {
                    id: id.to_owned(),
                    context: "an edge",
                })
        };
        for record in edges {
            let origin = lookup(&record.origin)?;
            let destination = lookup(&record.destination)?;
            let mut attrs = vec![None; vocabulary.len()];
            attrs[length_attr] = Some(record.length);
            for (name, &value) in &record.attrs {
                // The vocabulary already holds every attribute name.
                if let Some(id) = vocabulary.id(name) {
                    attrs[id] = Some(value);
                }
            }
            let edge = CycleEdge {
                length_m: record.length,
                capacity: (record.length / BIKE_FOOTPRINT_M).floor() as usize,
                attrs,
            };
            if record.bidirectional {
                // A single record for both directions materializes two
                // directed edges with independent attribute copies.
                graph.add_edge(destination, origin, edge.clone());
            }
            graph.add_edge(origin, destination, edge);
        }

        let grade_attr = vocabulary.id(ATTR_GRADE);
        let mut network = CycleNetwork {
            lex_rank: lex_ranks(&graph),
            ranges: Vec::new(),
            node_index,
            grade_attr,
            safety_attr: vocabulary.id(ATTR_SAFETY),
            lighting_attr: vocabulary.id(ATTR_LIGHTING),
            length_attr,
            vocabulary,
            graph,
        };
        network.ranges = network.compute_ranges();
        Ok(network)
    }

    /// Precomputes, once, the `(min, max)` range of every attribute over all
    /// directed edges, on the routing values.
    fn compute_ranges(&self) -> Vec<Option<(f64, f64)>> {
        let mut ranges: Vec<Option<(f64, f64)>> = vec![None; self.vocabulary.len()];
        for edge in self.graph.edge_weights() {
            for attr in 0..self.vocabulary.len() {
                if let Some(value) = self.routing_value(edge, attr) {
                    let entry = ranges[attr].get_or_insert((value, value));
                    entry.0 = entry.0.min(value);
                    entry.1 = entry.1.max(value);
                }
            }
        }
        ranges
    }

    /// The value of an attribute as seen by the router: grade contributes
    /// its magnitude (a profile weighting grade dislikes steepness in either
    /// direction), every other attribute its raw value.
    pub fn routing_value(&self, edge: &CycleEdge, attr: AttrId) -> Option<f64> {
        let raw = edge.attr(attr)?;
        if Some(attr) == self.grade_attr {
            Some(raw.abs())
        } else {
            Some(raw)
        }
    }

    pub fn graph(&self) -> &DiGraph<CycleNode, CycleEdge> {
        &self.graph
    }

    pub fn nb_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn nb_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, index: NodeIndex) -> &CycleNode {
        &self.graph[index]
    }

    pub fn node_by_id(&self, id: &str) -> Option<NodeIndex> {
        self.node_index.get(id).copied()
    }

    pub fn edge(&self, index: EdgeIndex) -> &CycleEdge {
        &self.graph[index]
    }

    pub fn endpoints(&self, edge: EdgeIndex) -> (NodeIndex, NodeIndex) {
        self.graph
            .edge_endpoints(edge)
            .expect("edge index out of bounds")
    }

    /// The directed edge from `u` to `v`, if any.
    pub fn find_edge(&self, u: NodeIndex, v: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(u, v)
    }

    /// Outgoing `(edge, target)` pairs of a node.
    pub fn outgoing(&self, node: NodeIndex) -> impl Iterator<Item = (EdgeIndex, NodeIndex)> + '_ {
        self.graph.edges(node).map(|e| (e.id(), e.target()))
    }

    pub fn vocabulary(&self) -> &AttrVocabulary {
        &self.vocabulary
    }

    pub fn length_attr(&self) -> AttrId {
        self.length_attr
    }

    pub fn range(&self, attr: AttrId) -> Option<(f64, f64)> {
        self.ranges.get(attr).copied().flatten()
    }

    pub fn lex_rank(&self, node: NodeIndex) -> u32 {
        self.lex_rank[node.index()]
    }

    /// Grade of an edge in percent, if set.
    pub fn grade(&self, edge: &CycleEdge) -> Option<f64> {
        self.grade_attr.and_then(|id| edge.attr(id))
    }

    pub fn safety(&self, edge: &CycleEdge) -> Option<f64> {
        self.safety_attr.and_then(|id| edge.attr(id))
    }

    pub fn lighting(&self, edge: &CycleEdge) -> Option<f64> {
        self.lighting_attr.and_then(|id| edge.attr(id))
    }

    /// The display color of a node (cyclists born there inherit it).
    pub fn node_color(&self, node: NodeIndex) -> &'static str {
        NODE_COLOR_PALETTE[node.index() % NODE_COLOR_PALETTE.len()]
    }
}

fn lex_ranks(graph: &DiGraph<CycleNode, CycleEdge>) -> Vec<u32> {
    let mut order: Vec<NodeIndex> = graph.node_indices().collect();
    order.sort_by(|a, b| graph[*a].id.cmp(&graph[*b].id));
    let mut ranks = vec![0u32; graph.node_count()];
    for (rank, node) in order.into_iter().enumerate() {
        ranks[node.index()] = rank as u32;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, x: f64, y: f64) -> NodeRecord {
        NodeRecord {
            id: id.into(),
            x,
            y,
        }
    }

    fn edge(o: &str, d: &str, length: f64, attrs: &[(&str, f64)]) -> EdgeRecord {
        EdgeRecord {
            origin: o.into(),
            destination: d.into(),
            length,
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            bidirectional: false,
        }
    }

    #[test]
    fn capacity_is_floored_footprint() {
        let network = CycleNetwork::from_records(
            &[node("A", 0.0, 0.0), node("B", 1.0, 0.0)],
            &[edge("A", "B", 100.0, &[]), edge("B", "A", 2.0, &[])],
        )
        .unwrap();
        let ab = network.find_edge(
            network.node_by_id("A").unwrap(),
            network.node_by_id("B").unwrap(),
        );
        assert_eq!(network.edge(ab.unwrap()).capacity, 40);
        let ba = network.find_edge(
            network.node_by_id("B").unwrap(),
            network.node_by_id("A").unwrap(),
        );
        // 2.0 / 2.5 floors to zero.
        assert_eq!(network.edge(ba.unwrap()).capacity, 0);
    }

    #[test]
    fn bidirectional_record_materializes_two_edges() {
        let mut record = edge("A", "B", 50.0, &[("grade", 5.0)]);
        record.bidirectional = true;
        let network =
            CycleNetwork::from_records(&[node("A", 0.0, 0.0), node("B", 1.0, 0.0)], &[record])
                .unwrap();
        assert_eq!(network.nb_edges(), 2);
        let a = network.node_by_id("A").unwrap();
        let b = network.node_by_id("B").unwrap();
        assert!(network.find_edge(a, b).is_some());
        assert!(network.find_edge(b, a).is_some());
    }

    #[test]
    fn ranges_use_grade_magnitude() {
        let network = CycleNetwork::from_records(
            &[node("A", 0.0, 0.0), node("B", 1.0, 0.0)],
            &[
                edge("A", "B", 100.0, &[("grade", -8.0)]),
                edge("B", "A", 200.0, &[("grade", 3.0)]),
            ],
        )
        .unwrap();
        let grade = network.vocabulary().id(ATTR_GRADE).unwrap();
        assert_eq!(network.range(grade), Some((3.0, 8.0)));
        let length = network.length_attr();
        assert_eq!(network.range(length), Some((100.0, 200.0)));
    }

    #[test]
    fn lex_ranks_follow_node_ids() {
        let network = CycleNetwork::from_records(
            &[node("C", 0.0, 0.0), node("A", 1.0, 0.0), node("B", 2.0, 0.0)],
            &[edge("C", "A", 10.0, &[])],
        )
        .unwrap();
        let rank = |id: &str| network.lex_rank(network.node_by_id(id).unwrap());
        assert!(rank("A") < rank("B"));
        assert!(rank("B") < rank("C"));
    }

    #[test]
    fn missing_attributes_read_as_none() {
        let network = CycleNetwork::from_records(
            &[node("A", 0.0, 0.0), node("B", 1.0, 0.0)],
            &[edge("A", "B", 100.0, &[("safety", 7.0)])],
        )
        .unwrap();
        let e = network.edge(EdgeIndex::new(0));
        assert_eq!(network.safety(e), Some(7.0));
        assert_eq!(network.lighting(e), None);
        assert_eq!(network.grade(e), None);
    }
}
