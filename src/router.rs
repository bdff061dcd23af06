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

//! Composite-weight routing.
//!
//! For a given profile, every attribute the profile weights is normalized to
//! `[1, 10]` over the whole edge set, inverted where smaller raw values are
//! preferred, and summed with the profile's importances into one scalar
//! weight per directed edge. Routes are then plain Dijkstra over those
//! weights, with ties broken by the lexicographic order of node ids so that
//! results never depend on insertion order. Results are memoized per
//! `(profile, origin, destination)` in a bounded LRU cache.
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use hashbrown::HashMap;
use ordered_float::OrderedFloat;
use petgraph::graph::NodeIndex;
use rayon::prelude::*;

use crate::network::CycleNetwork;
use crate::population::{Population, Profile};

/// Composite weights are clamped to this minimum so Dijkstra never sees a
/// non-positive edge cost.
const WEIGHT_EPSILON: f64 = 1e-9;

/// Upper bound on the number of memoized routes.
const CACHE_CAPACITY: usize = 4096;

type RouteKey = (u32, NodeIndex, NodeIndex);

#[derive(Clone, Debug)]
struct CacheEntry {
    /// `None` caches the fact that the pair is unreachable.
    route: Option<Arc<[NodeIndex]>>,
    last_used: u64,
}

/// The routing engine: per-profile composite weights plus the route cache.
#[derive(Debug, Default)]
pub struct Router {
    /// Profile id -> composite weight per directed edge.
    weights: HashMap<u32, Arc<Vec<f64>>>,
    cache: HashMap<RouteKey, CacheEntry>,
    clock: u64,
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    /// The memoized route from `origin` to `destination` under the
    /// profile's composite weights, computing and caching it on a miss.
    /// `None` means the pair is not connected.
    pub fn route(
        &mut self,
        network: &CycleNetwork,
        profile: &Profile,
        origin: NodeIndex,
        destination: NodeIndex,
    ) -> Option<Arc<[NodeIndex]>> {
        self.clock += 1;
        let key = (profile.id, origin, destination);
        if let Some(entry) = self.cache.get_mut(&key) {
            entry.last_used = self.clock;
            return entry.route.clone();
        }
        let weights = self.weights_for(network, profile);
        let (_, prev) = shortest_paths_from(network, &weights, origin);
        let route = reconstruct(&prev, origin, destination);
        self.insert(key, route.clone());
        route
    }

    /// Pre-computes routes for every profile and origin in parallel, up to
    /// the cache bound. Run once at load time; the event loop then mostly
    /// hits the cache.
    pub fn warm_up(&mut self, network: &CycleNetwork, population: &Population) {
        for profile in population.profiles() {
            self.weights_for(network, profile);
        }
        let jobs: Vec<(&Profile, NodeIndex)> = population
            .profiles()
            .iter()
            .flat_map(|p| network.graph().node_indices().map(move |o| (p, o)))
            .collect();
        let weights_by_profile = &self.weights;
        let routes: Vec<(RouteKey, Option<Arc<[NodeIndex]>>)> = jobs
            .par_iter()
            .flat_map_iter(|&(profile, origin)| {
                let weights = weights_by_profile[&profile.id].clone();
                let (_, prev) = shortest_paths_from(network, &weights, origin);
                network
                    .graph()
                    .node_indices()
                    .filter(move |&d| d != origin)
                    .map(move |destination| {
                        (
                            (profile.id, origin, destination),
                            reconstruct(&prev, origin, destination),
                        )
                    })
                    .collect::<Vec<_>>()
                    .into_iter()
            })
            .collect();
        for (key, route) in routes {
            if self.cache.len() >= CACHE_CAPACITY {
                break;
            }
            self.clock += 1;
            self.insert(key, route);
        }
    }

    /// Composite weights of a profile, computed once per profile.
    fn weights_for(&mut self, network: &CycleNetwork, profile: &Profile) -> Arc<Vec<f64>> {
        self.weights
            .entry(profile.id)
            .or_insert_with(|| Arc::new(composite_weights(network, profile)))
            .clone()
    }

    fn insert(&mut self, key: RouteKey, route: Option<Arc<[NodeIndex]>>) {
        if self.cache.len() >= CACHE_CAPACITY {
            // Evict the least-recently-used entry. A linear scan is fine:
            // eviction is rare relative to lookups at this capacity.
            if let Some(victim) = self
                .cache
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| *k)
            {
                self.cache.remove(&victim);
            }
        }
        self.cache.insert(
            key,
            CacheEntry {
                route,
                last_used: self.clock,
            },
        );
    }
}

/// The composite weight of every directed edge for one profile.
///
/// Attributes are normalized to `[1, 10]` over the whole edge set (the
/// midpoint `5.5` when the range is degenerate or the edge lacks the
/// attribute) and combined into a *cost*: smaller-preferred attributes
/// (length, grade magnitude) keep the increasing normalization, while
/// higher-is-better attributes (safety, lighting) are inverted (`11 - n`)
/// so an attractive edge is always a cheap edge. Non-positive sums (possible
/// with negative importances) are clamped to a small epsilon.
pub fn composite_weights(network: &CycleNetwork, profile: &Profile) -> Vec<f64> {
    let graph = network.graph();
    let mut weights = Vec::with_capacity(graph.edge_count());
    for edge in graph.edge_weights() {
        let mut total = 0.0;
        for w in &profile.weights {
            let normalized = match (network.range(w.attr), network.routing_value(edge, w.attr)) {
                (Some((min, max)), Some(value)) if max > min => {
                    1.0 + 9.0 * (value - min) / (max - min)
                }
                _ => 5.5,
            };
            let cost = if w.prefer_smaller {
                normalized
            } else {
                11.0 - normalized
            };
            total += w.importance * cost;
        }
        weights.push(if total > 0.0 { total } else { WEIGHT_EPSILON });
    }
    weights
}

/// Single-source Dijkstra over precomputed edge weights.
///
/// Heap entries carry the lexicographic rank of the node as a secondary key,
/// which makes the settle order, and therefore tie-breaking between
/// equal-cost paths, deterministic.
fn shortest_paths_from(
    network: &CycleNetwork,
    weights: &[f64],
    origin: NodeIndex,
) -> (Vec<f64>, Vec<Option<NodeIndex>>) {
    let n = network.nb_nodes();
    let mut dist = vec![f64::INFINITY; n];
    let mut prev: Vec<Option<NodeIndex>> = vec![None; n];
    dist[origin.index()] = 0.0;

    let mut heap = BinaryHeap::new();
    heap.push(Reverse((OrderedFloat(0.0), network.lex_rank(origin), origin)));
    while let Some(Reverse((OrderedFloat(cost), _, node))) = heap.pop() {
        if cost > dist[node.index()] {
            // Stale entry.
            continue;
        }
        for (edge, neighbor) in network.outgoing(node) {
            let candidate = cost + weights[edge.index()];
            if candidate < dist[neighbor.index()] {
                dist[neighbor.index()] = candidate;
                prev[neighbor.index()] = Some(node);
                heap.push(Reverse((
                    OrderedFloat(candidate),
                    network.lex_rank(neighbor),
                    neighbor,
                )));
            }
        }
    }
    (dist, prev)
}

/// Rebuilds the node sequence from a predecessor array. `None` when the
/// destination was never reached.
fn reconstruct(
    prev: &[Option<NodeIndex>],
    origin: NodeIndex,
    destination: NodeIndex,
) -> Option<Arc<[NodeIndex]>> {
    if origin == destination {
        return Some(vec![origin].into());
    }
    prev[destination.index()]?;
    let mut nodes = vec![destination];
    let mut cursor = destination;
    while let Some(previous) = prev[cursor.index()] {
        nodes.push(previous);
        cursor = previous;
    }
    if cursor != origin {
        return None;
    }
    nodes.reverse();
    Some(nodes.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{EdgeRecord, NodeRecord};

    fn node(id: &str) -> NodeRecord {
        NodeRecord {
            id: id.into(),
            x: 0.0,
            y: 0.0,
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

    fn length_profile() -> Profile {
        Profile {
            id: 0,
            probability: 1.0,
            weights: vec![crate::population::ProfileWeight {
                attr: 0, // length is always attribute 0
                importance: 1.0,
                prefer_smaller: true,
            }],
        }
    }

    #[test]
    fn shortest_route_prefers_lower_total_weight() {
        // A -> B directly (length 300) or via C (100 + 100).
        let network = CycleNetwork::from_records(
            &[node("A"), node("B"), node("C")],
            &[
                edge("A", "B", 300.0, &[]),
                edge("A", "C", 100.0, &[]),
                edge("C", "B", 100.0, &[]),
            ],
        )
        .unwrap();
        let mut router = Router::new();
        let a = network.node_by_id("A").unwrap();
        let b = network.node_by_id("B").unwrap();
        let c = network.node_by_id("C").unwrap();
        let route = router.route(&network, &length_profile(), a, b).unwrap();
        assert_eq!(route.as_ref(), &[a, c, b]);
    }

    #[test]
    fn unreachable_pairs_return_none_and_are_cached() {
        let network = CycleNetwork::from_records(
            &[node("A"), node("B"), node("C")],
            &[edge("A", "B", 100.0, &[])],
        )
        .unwrap();
        let mut router = Router::new();
        let a = network.node_by_id("A").unwrap();
        let c = network.node_by_id("C").unwrap();
        assert!(router.route(&network, &length_profile(), a, c).is_none());
        // Second query hits the cached miss.
        assert!(router.route(&network, &length_profile(), a, c).is_none());
        assert_eq!(router.cache.len(), 1);
    }

    #[test]
    fn equal_cost_ties_break_lexicographically() {
        // Two equal-cost two-hop paths A -> (M or N) -> B; the path through
        // the lexicographically smaller intermediate must win.
        let network = CycleNetwork::from_records(
            &[node("A"), node("N"), node("M"), node("B")],
            &[
                edge("A", "N", 100.0, &[]),
                edge("N", "B", 100.0, &[]),
                edge("A", "M", 100.0, &[]),
                edge("M", "B", 100.0, &[]),
            ],
        )
        .unwrap();
        let mut router = Router::new();
        let a = network.node_by_id("A").unwrap();
        let b = network.node_by_id("B").unwrap();
        let m = network.node_by_id("M").unwrap();
        let route = router.route(&network, &length_profile(), a, b).unwrap();
        assert_eq!(route.as_ref(), &[a, m, b]);
    }

    #[test]
    fn normalization_is_order_preserving() {
        let network = CycleNetwork::from_records(
            &[node("A"), node("B"), node("C")],
            &[
                edge("A", "B", 100.0, &[("safety", 2.0)]),
                edge("B", "C", 200.0, &[("safety", 6.0)]),
                edge("C", "A", 400.0, &[("safety", 10.0)]),
            ],
        )
        .unwrap();
        let profile = length_profile();
        let weights = composite_weights(&network, &profile);
        // Longer edges cost more, and the normalization endpoints are hit.
        assert!(weights[0] < weights[1]);
        assert!(weights[1] < weights[2]);
        assert!((weights[0] - 1.0).abs() < 1e-12);
        assert!((weights[2] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn safety_profile_takes_the_safe_detour() {
        // Direct edge is short but unsafe; the detour is long but safe.
        let network = CycleNetwork::from_records(
            &[node("A"), node("B"), node("C")],
            &[
                edge("A", "B", 100.0, &[("safety", 5.0)]),
                edge("A", "C", 100.0, &[("safety", 9.0)]),
                edge("C", "B", 100.0, &[("safety", 9.0)]),
            ],
        )
        .unwrap();
        let safety_attr = network.vocabulary().id("safety").unwrap();
        let profile = Profile {
            id: 1,
            probability: 1.0,
            weights: vec![crate::population::ProfileWeight {
                attr: safety_attr,
                importance: 1.0,
                prefer_smaller: false,
            }],
        };
        let mut router = Router::new();
        let a = network.node_by_id("A").unwrap();
        let b = network.node_by_id("B").unwrap();
        let c = network.node_by_id("C").unwrap();
        let route = router.route(&network, &profile, a, b).unwrap();
        assert_eq!(route.as_ref(), &[a, c, b]);
    }

    #[test]
    fn warm_up_fills_the_cache() {
        let network = CycleNetwork::from_records(
            &[node("A"), node("B"), node("C")],
            &[
                edge("A", "B", 100.0, &[]),
                edge("B", "C", 100.0, &[]),
                edge("C", "A", 100.0, &[]),
            ],
        )
        .unwrap();
        let scenario = {
            let mut s = crate::scenario::tests::minimal();
            s.profiles = vec![];
            s
        };
        let population = Population::from_scenario(&scenario, &network);
        let mut router = Router::new();
        router.warm_up(&network, &population);
        // 3 origins x 2 destinations for the single default profile.
        assert_eq!(router.cache.len(), 6);
    }
}
