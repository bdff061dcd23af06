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

//! Online statistics and the post-run result arrays.
//!
//! Counts are exact; nothing is sampled. Cyclist records are committed when
//! their process terminates (completion, stop-drain or forced failure);
//! [`build_results`] merges them with the still-live cyclists so the result
//! arrays are coherent at any point of the run.
use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;
use petgraph::graph::NodeIndex;
use serde_derive::Serialize;

use crate::cyclist::{Cyclist, CyclistArena, CyclistId, CyclistState};
use crate::network::state::{NetworkState, TransitRecord};
use crate::network::CycleNetwork;

use super::Status;

/// Counters for the error paths that do not abort a run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Diagnostics {
    /// Cyclists discarded because their origin-destination pair is not
    /// connected for their profile.
    pub discarded_unreachable: u64,
    /// Trip continuations that failed and were forcibly completed.
    pub agent_failures: u64,
    /// O-D rows that had to be re-normalized on load.
    pub od_rows_normalized: u32,
}

/// Running min/mean/max over a stream of values.
#[derive(Clone, Copy, Debug, Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    fn summary(&self) -> Option<Summary> {
        if self.count == 0 {
            return None;
        }
        Some(Summary {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.sum / self.count as f64,
        })
    }
}

/// Aggregate view of one metric over completed cyclists.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// The statistics maintained online during a run.
#[derive(Debug)]
pub struct RunningStats {
    pub diagnostics: Diagnostics,
    arrivals_by_origin: Vec<u64>,
    route_counts: HashMap<Arc<[NodeIndex]>, u64>,
    records: Vec<CyclistRecord>,
    trip_time: Accumulator,
    speed: Accumulator,
    nb_completed: u64,
}

impl RunningStats {
    pub fn new(nb_nodes: usize) -> Self {
        RunningStats {
            diagnostics: Diagnostics::default(),
            arrivals_by_origin: vec![0; nb_nodes],
            route_counts: HashMap::new(),
            records: Vec::new(),
            trip_time: Accumulator::default(),
            speed: Accumulator::default(),
            nb_completed: 0,
        }
    }

    pub fn record_arrival(&mut self, origin: NodeIndex) {
        self.arrivals_by_origin[origin.index()] += 1;
    }

    pub fn record_route(&mut self, route: Arc<[NodeIndex]>) {
        *self.route_counts.entry(route).or_insert(0) += 1;
    }

    /// Commits the final record of a cyclist whose process terminated.
    pub fn commit(&mut self, cyclist: &Cyclist, network: &CycleNetwork) {
        if cyclist.state == CyclistState::Completed {
            self.nb_completed += 1;
            if let Some(total) = cyclist.total_time_secs {
                self.trip_time.push(total);
            }
            if let Some(speed) = cyclist.observed_speed() {
                self.speed.push(speed);
            }
        }
        self.records.push(CyclistRecord::from_cyclist(cyclist, network));
    }

    pub fn nb_completed(&self) -> u64 {
        self.nb_completed
    }

    pub fn route_count(&self, route: &[NodeIndex]) -> u64 {
        self.route_counts.get(route).copied().unwrap_or(0)
    }
}

/// Final record of one cyclist.
#[derive(Clone, Debug, Serialize)]
pub struct CyclistRecord {
    pub id: CyclistId,
    pub origin: String,
    pub destination: String,
    pub profile: u32,
    pub route: Vec<String>,
    /// Base speed drawn at birth, m/s.
    pub base_speed_ms: f64,
    pub start_time_secs: f64,
    pub per_edge_secs: Vec<f64>,
    pub total_distance_m: f64,
    /// Set for completed trips only.
    pub total_time_secs: Option<f64>,
    /// `total_distance / total_time`, for completed trips with a positive
    /// duration.
    pub observed_speed_ms: Option<f64>,
    pub state: CyclistState,
}

impl CyclistRecord {
    fn from_cyclist(cyclist: &Cyclist, network: &CycleNetwork) -> Self {
        CyclistRecord {
            id: cyclist.id,
            origin: network.node(cyclist.origin).id.clone(),
            destination: network.node(cyclist.destination).id.clone(),
            profile: cyclist.profile_id,
            route: cyclist
                .route
                .iter()
                .map(|&n| network.node(n).id.clone())
                .collect(),
            base_speed_ms: cyclist.base_speed_ms,
            start_time_secs: cyclist.start_time_secs,
            per_edge_secs: cyclist.per_edge_secs.clone(),
            total_distance_m: cyclist.total_distance_m,
            total_time_secs: cyclist.total_time_secs,
            observed_speed_ms: cyclist.observed_speed(),
            state: cyclist.state,
        }
    }
}

/// Post-run record of one directed edge.
#[derive(Clone, Debug, Serialize)]
pub struct EdgeRecordOut {
    pub origin: String,
    pub destination: String,
    pub length_m: f64,
    pub capacity: usize,
    /// Total number of entries over the run.
    pub entries: u64,
    /// Chronological enter/exit log.
    pub log: Vec<TransitRecord>,
}

/// Usage count of one distinct route.
#[derive(Clone, Debug, Serialize)]
pub struct RouteRecordOut {
    pub nodes: Vec<String>,
    pub count: u64,
}

/// Arrivals generated at one origin.
#[derive(Clone, Debug, Serialize)]
pub struct OriginRecordOut {
    pub node: String,
    pub arrivals: u64,
}

/// Aggregates over the whole run.
#[derive(Clone, Debug, Serialize)]
pub struct Aggregates {
    pub nb_generated: u64,
    pub nb_completed: u64,
    pub trip_time_secs: Option<Summary>,
    pub observed_speed_ms: Option<Summary>,
}

/// Everything the core reports after (or during) a run.
#[derive(Clone, Debug, Serialize)]
pub struct SimulationResults {
    pub clock_secs: f64,
    pub status: Status,
    pub cyclists: Vec<CyclistRecord>,
    pub edges: Vec<EdgeRecordOut>,
    pub routes: Vec<RouteRecordOut>,
    pub origins: Vec<OriginRecordOut>,
    pub aggregates: Aggregates,
    pub diagnostics: Diagnostics,
}

/// Builds the result arrays from the online statistics and the live state.
pub fn build_results(
    stats: &RunningStats,
    network: &CycleNetwork,
    state: &NetworkState,
    cyclists: &CyclistArena,
    clock_secs: f64,
    status: Status,
) -> SimulationResults {
    let mut records = stats.records.clone();
    // Cyclists still being simulated have no committed record yet.
    records.extend(
        cyclists
            .iter_active()
            .map(|c| CyclistRecord::from_cyclist(c, network)),
    );
    records.sort_by_key(|r| r.id);

    let edges = network
        .graph()
        .edge_indices()
        .map(|edge| {
            let (u, v) = network.endpoints(edge);
            EdgeRecordOut {
                origin: network.node(u).id.clone(),
                destination: network.node(v).id.clone(),
                length_m: network.edge(edge).length_m,
                capacity: network.edge(edge).capacity,
                entries: state.entries(edge),
                log: state.transit_log(edge).to_vec(),
            }
        })
        .collect();

    let mut routes: Vec<RouteRecordOut> = stats
        .route_counts
        .iter()
        .map(|(nodes, &count)| RouteRecordOut {
            nodes: nodes.iter().map(|&n| network.node(n).id.clone()).collect(),
            count,
        })
        .collect();
    // Hash-map iteration order must not leak into the results.
    routes.sort_by(|a, b| a.nodes.cmp(&b.nodes));

    let origins = stats
        .arrivals_by_origin
        .iter()
        .enumerate()
        .map(|(index, &arrivals)| OriginRecordOut {
            node: network.node(NodeIndex::new(index)).id.clone(),
            arrivals,
        })
        .collect();

    SimulationResults {
        clock_secs,
        status,
        cyclists: records,
        edges,
        routes,
        origins,
        aggregates: Aggregates {
            nb_generated: cyclists.nb_created(),
            nb_completed: stats.nb_completed,
            trip_time_secs: stats.trip_time.summary(),
            observed_speed_ms: stats.speed.summary(),
        },
        diagnostics: stats.diagnostics.clone(),
    }
}

/// A read-only view of the live state, for rendering.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub time_secs: f64,
    pub status: Status,
    pub active: Vec<ActiveCyclist>,
    pub edges: Vec<EdgeOccupancy>,
    pub counters: SnapshotCounters,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActiveCyclist {
    pub id: CyclistId,
    pub x: f64,
    pub y: f64,
    pub color: String,
    pub route: String,
    pub trail: Vec<(f64, f64)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EdgeOccupancy {
    pub origin: String,
    pub destination: String,
    pub occupancy: usize,
    pub capacity: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct SnapshotCounters {
    pub generated: u64,
    pub active: usize,
    pub completed: u64,
    pub discarded: u64,
}

pub fn build_snapshot(
    stats: &RunningStats,
    network: &CycleNetwork,
    state: &NetworkState,
    cyclists: &CyclistArena,
    time_secs: f64,
    status: Status,
) -> Snapshot {
    let active: Vec<ActiveCyclist> = cyclists
        .iter_active()
        .map(|c| ActiveCyclist {
            id: c.id,
            x: c.position.0,
            y: c.position.1,
            color: c.color.to_owned(),
            route: format!(
                "{} -> {}",
                network.node(c.origin).id,
                network.node(c.destination).id
            ),
            trail: c.trail().to_vec(),
        })
        .sorted_by_key(|c| c.id)
        .collect();

    let edges = network
        .graph()
        .edge_indices()
        .map(|edge| {
            let (u, v) = network.endpoints(edge);
            EdgeOccupancy {
                origin: network.node(u).id.clone(),
                destination: network.node(v).id.clone(),
                occupancy: state.occupancy(edge),
                capacity: network.edge(edge).capacity,
            }
        })
        .collect();

    Snapshot {
        time_secs,
        status,
        active,
        edges,
        counters: SnapshotCounters {
            generated: cyclists.nb_created(),
            active: cyclists.nb_active(),
            completed: stats.nb_completed,
            discarded: stats.diagnostics.discarded_unreachable,
        },
    }
}
