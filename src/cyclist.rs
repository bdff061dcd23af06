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

//! The cyclist entity and its slot arena.
//!
//! Cyclists live in a dense vector and reference themselves by slot index;
//! completed slots go back to a free queue and may be recycled once a
//! retention window has passed, which keeps allocation churn flat in long
//! runs. Identity is carried by the monotonic [`CyclistId`], never by the
//! slot.
use std::collections::VecDeque;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use serde_derive::Serialize;

/// Monotonic cyclist identifier, unique over a whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CyclistId(pub u64);

/// Position of a cyclist in the arena. Only valid until the slot is
/// recycled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotIndex(pub usize);

/// Trip state of a cyclist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclistState {
    Pending,
    Active,
    Completed,
}

/// Position used once a cyclist leaves the visible region.
pub const OFFSCREEN: (f64, f64) = (-1000.0, -1000.0);

/// Cap on the trajectory ring kept for visualization.
const TRAIL_CAP: usize = 50;

/// One simulated cyclist.
#[derive(Clone, Debug)]
pub struct Cyclist {
    pub id: CyclistId,
    pub profile_id: u32,
    pub origin: NodeIndex,
    pub destination: NodeIndex,
    /// The route as an ordered node sequence, shared with the route cache.
    pub route: Arc<[NodeIndex]>,
    /// Index of the edge currently being traversed:
    /// `(route[cursor], route[cursor + 1])`.
    pub edge_cursor: usize,
    /// Base speed drawn at birth, m/s.
    pub base_speed_ms: f64,
    pub position: (f64, f64),
    pub state: CyclistState,
    pub start_time_secs: f64,
    /// Elapsed time on each completed edge, in route order.
    pub per_edge_secs: Vec<f64>,
    pub total_distance_m: f64,
    /// Set on completion only.
    pub total_time_secs: Option<f64>,
    /// Bounded ring of recent positions.
    trail: Vec<(f64, f64)>,
    /// Display color, inherited from the origin node.
    pub color: &'static str,
    retired: bool,
}

impl Cyclist {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: CyclistId,
        profile_id: u32,
        origin: NodeIndex,
        destination: NodeIndex,
        route: Arc<[NodeIndex]>,
        base_speed_ms: f64,
        start_position: (f64, f64),
        start_time_secs: f64,
        color: &'static str,
    ) -> Self {
        let nb_edges = route.len().saturating_sub(1);
        Cyclist {
            id,
            profile_id,
            origin,
            destination,
            route,
            edge_cursor: 0,
            base_speed_ms,
            position: start_position,
            state: CyclistState::Pending,
            start_time_secs,
            per_edge_secs: Vec::with_capacity(nb_edges),
            total_distance_m: 0.0,
            total_time_secs: None,
            trail: Vec::new(),
            color,
            retired: false,
        }
    }

    /// Endpoints of the edge currently being traversed.
    pub fn current_leg(&self) -> (NodeIndex, NodeIndex) {
        (
            self.route[self.edge_cursor],
            self.route[self.edge_cursor + 1],
        )
    }

    /// `true` when the current edge is the last one of the route.
    pub fn on_last_edge(&self) -> bool {
        self.edge_cursor + 2 == self.route.len()
    }

    /// Appends a position to the trajectory ring, thinning the ring to its
    /// most recent half when the cap is reached.
    pub fn push_trail(&mut self, position: (f64, f64)) {
        if self.trail.len() >= TRAIL_CAP {
            self.trail.drain(..TRAIL_CAP / 2);
        }
        self.trail.push(position);
    }

    pub fn trail(&self) -> &[(f64, f64)] {
        &self.trail
    }

    /// Marks the trip finished: position moves off-screen and the total
    /// time is frozen.
    pub fn complete(&mut self, now: f64) {
        self.state = CyclistState::Completed;
        self.total_time_secs = Some(now - self.start_time_secs);
        self.position = OFFSCREEN;
    }

    /// `true` once the slot has been released back to the arena.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Observed average speed over the whole trip, for completed cyclists
    /// with a positive duration.
    pub fn observed_speed(&self) -> Option<f64> {
        match self.total_time_secs {
            Some(t) if t > 0.0 => Some(self.total_distance_m / t),
            _ => None,
        }
    }
}

/// Dense arena of cyclists with retention-window slot recycling.
#[derive(Debug)]
pub struct CyclistArena {
    slots: Vec<Cyclist>,
    /// Retired slots, oldest first, each with its retirement time.
    free: VecDeque<(f64, SlotIndex)>,
    retention_secs: f64,
    next_id: u64,
    nb_active: usize,
}

impl CyclistArena {
    pub fn new(retention_secs: f64) -> Self {
        CyclistArena {
            slots: Vec::new(),
            free: VecDeque::new(),
            retention_secs,
            next_id: 0,
            nb_active: 0,
        }
    }

    /// The next identity to be assigned.
    pub fn next_id(&mut self) -> CyclistId {
        let id = CyclistId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Places a cyclist in the arena, reusing the oldest retired slot once
    /// its retention window has elapsed.
    pub fn insert(&mut self, cyclist: Cyclist, now: f64) -> SlotIndex {
        debug_assert_eq!(cyclist.state, CyclistState::Active);
        self.nb_active += 1;
        if let Some(&(retired_at, slot)) = self.free.front() {
            if now - retired_at >= self.retention_secs {
                self.free.pop_front();
                self.slots[slot.0] = cyclist;
                return slot;
            }
        }
        let slot = SlotIndex(self.slots.len());
        self.slots.push(cyclist);
        slot
    }

    pub fn get(&self, slot: SlotIndex) -> &Cyclist {
        &self.slots[slot.0]
    }

    pub fn get_mut(&mut self, slot: SlotIndex) -> &mut Cyclist {
        &mut self.slots[slot.0]
    }

    /// Releases a slot back to the free queue. The cyclist's record must
    /// already have been committed to the statistics.
    pub fn retire(&mut self, slot: SlotIndex, now: f64) {
        let cyclist = &mut self.slots[slot.0];
        debug_assert!(!cyclist.retired, "slot {slot:?} retired twice");
        cyclist.retired = true;
        self.nb_active -= 1;
        self.free.push_back((now, slot));
    }

    /// Number of cyclists currently being simulated.
    pub fn nb_active(&self) -> usize {
        self.nb_active
    }

    /// Total number of cyclists created over the run.
    pub fn nb_created(&self) -> u64 {
        self.next_id
    }

    /// Live cyclists in state Active, for the snapshot.
    pub fn iter_active(&self) -> impl Iterator<Item = &Cyclist> {
        self.slots
            .iter()
            .filter(|c| !c.retired && c.state == CyclistState::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cyclist(id: CyclistId, now: f64) -> Cyclist {
        let route: Arc<[NodeIndex]> = vec![NodeIndex::new(0), NodeIndex::new(1)].into();
        let mut cyclist = Cyclist::new(
            id,
            0,
            NodeIndex::new(0),
            NodeIndex::new(1),
            route,
            5.0,
            (0.0, 0.0),
            now,
            "#CC0000",
        );
        cyclist.state = CyclistState::Active;
        cyclist
    }

    #[test]
    fn trail_ring_is_bounded() {
        let mut cyclist = test_cyclist(CyclistId(0), 0.0);
        for i in 0..200 {
            cyclist.push_trail((i as f64, 0.0));
        }
        assert!(cyclist.trail().len() <= TRAIL_CAP);
        // The most recent point is always retained.
        assert_eq!(cyclist.trail().last(), Some(&(199.0, 0.0)));
    }

    #[test]
    fn slots_are_recycled_after_retention() {
        let mut arena = CyclistArena::new(10.0);
        let id0 = arena.next_id();
        let slot0 = arena.insert(test_cyclist(id0, 0.0), 0.0);
        arena.get_mut(slot0).complete(5.0);
        arena.retire(slot0, 5.0);
        assert_eq!(arena.nb_active(), 0);

        // Within the retention window a fresh slot is allocated.
        let id1 = arena.next_id();
        let slot1 = arena.insert(test_cyclist(id1, 7.0), 7.0);
        assert_ne!(slot0, slot1);

        // After the window the retired slot is reused.
        let id2 = arena.next_id();
        let slot2 = arena.insert(test_cyclist(id2, 20.0), 20.0);
        assert_eq!(slot0, slot2);
        assert_eq!(arena.get(slot2).id, CyclistId(2));
        assert_eq!(arena.nb_created(), 3);
    }

    #[test]
    fn completion_freezes_totals() {
        let mut cyclist = test_cyclist(CyclistId(3), 10.0);
        cyclist.total_distance_m = 100.0;
        cyclist.complete(30.0);
        assert_eq!(cyclist.state, CyclistState::Completed);
        assert_eq!(cyclist.total_time_secs, Some(20.0));
        assert_eq!(cyclist.position, OFFSCREEN);
        assert_eq!(cyclist.observed_speed(), Some(5.0));
    }
}
