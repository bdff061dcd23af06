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

//! Mutable per-run state of the network: the per-direction occupancy index
//! and the per-edge transit log.
//!
//! A cyclist is a member of exactly one directed edge at any time while it is
//! traversing the network; the two directions of a segment are independent
//! entries. The index is only ever mutated by the currently-running
//! continuation, so no synchronization is involved.
use hashbrown::HashSet;
use petgraph::graph::EdgeIndex;
use serde_derive::Serialize;

use crate::cyclist::CyclistId;
use crate::kinematics;

/// Direction of one transit-log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitKind {
    Enter,
    Exit,
}

/// One entry of a directed edge's transit log.
#[derive(Clone, Debug, Serialize)]
pub struct TransitRecord {
    pub time_secs: f64,
    pub kind: TransitKind,
    pub cyclist: CyclistId,
}

/// The per-run state of one directed edge.
#[derive(Clone, Debug, Default)]
pub struct EdgeState {
    occupants: HashSet<CyclistId>,
    entries: u64,
    log: Vec<TransitRecord>,
}

/// Mutable network state, indexed like the network's edges.
#[derive(Clone, Debug)]
pub struct NetworkState {
    edges: Vec<EdgeState>,
}

impl NetworkState {
    pub fn new(nb_edges: usize) -> Self {
        NetworkState {
            edges: vec![EdgeState::default(); nb_edges],
        }
    }

    /// Registers a cyclist on a directed edge.
    pub fn enter(&mut self, edge: EdgeIndex, cyclist: CyclistId, now: f64) {
        let state = &mut self.edges[edge.index()];
        let inserted = state.occupants.insert(cyclist);
        debug_assert!(inserted, "cyclist {cyclist:?} entered {edge:?} twice");
        state.entries += 1;
        state.log.push(TransitRecord {
            time_secs: now,
            kind: TransitKind::Enter,
            cyclist,
        });
    }

    /// Removes a cyclist from a directed edge.
    pub fn exit(&mut self, edge: EdgeIndex, cyclist: CyclistId, now: f64) {
        let state = &mut self.edges[edge.index()];
        let removed = state.occupants.remove(&cyclist);
        debug_assert!(removed, "cyclist {cyclist:?} exited {edge:?} without entering");
        state.log.push(TransitRecord {
            time_secs: now,
            kind: TransitKind::Exit,
            cyclist,
        });
    }

    /// Number of cyclists currently on a directed edge.
    pub fn occupancy(&self, edge: EdgeIndex) -> usize {
        self.edges[edge.index()].occupants.len()
    }

    /// The current density factor of a directed edge.
    pub fn density_factor(&self, edge: EdgeIndex, capacity: usize) -> f64 {
        kinematics::density_factor(self.occupancy(edge), capacity)
    }

    /// Total entry count of a directed edge since the run started.
    pub fn entries(&self, edge: EdgeIndex) -> u64 {
        self.edges[edge.index()].entries
    }

    pub fn transit_log(&self, edge: EdgeIndex) -> &[TransitRecord] {
        &self.edges[edge.index()].log
    }

    /// Sum of all occupancy sets; equals the number of cyclists currently
    /// traversing an edge.
    pub fn total_occupancy(&self) -> usize {
        self.edges.iter().map(|e| e.occupants.len()).sum()
    }

    /// Removes a cyclist from whichever edge holds it, if any. Used when a
    /// continuation failed and its edge is no longer known.
    pub fn force_remove(&mut self, cyclist: CyclistId, now: f64) -> Option<EdgeIndex> {
        let position = self
            .edges
            .iter()
            .position(|e| e.occupants.contains(&cyclist))?;
        let edge = EdgeIndex::new(position);
        self.exit(edge, cyclist, now);
        Some(edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupancy_tracks_enters_and_exits() {
        let mut state = NetworkState::new(2);
        let edge = EdgeIndex::new(0);
        state.enter(edge, CyclistId(1), 0.0);
        state.enter(edge, CyclistId(2), 1.0);
        assert_eq!(state.occupancy(edge), 2);
        assert_eq!(state.total_occupancy(), 2);
        state.exit(edge, CyclistId(1), 5.0);
        assert_eq!(state.occupancy(edge), 1);
        assert_eq!(state.entries(edge), 2);
        // Entries never decrease.
        state.exit(edge, CyclistId(2), 6.0);
        assert_eq!(state.entries(edge), 2);
        assert_eq!(state.total_occupancy(), 0);
    }

    #[test]
    fn transit_log_alternates_per_cyclist() {
        let mut state = NetworkState::new(1);
        let edge = EdgeIndex::new(0);
        state.enter(edge, CyclistId(7), 0.0);
        state.exit(edge, CyclistId(7), 2.5);
        let log = state.transit_log(edge);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].kind, TransitKind::Enter);
        assert_eq!(log[1].kind, TransitKind::Exit);
        assert!(log[0].time_secs < log[1].time_secs);
    }
}
