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

//! Event trait and event priority queue.
//!
//! The scheduler is single-threaded and cooperative: continuations are
//! sequential and concurrency arises solely from interleaving at the
//! suspension points, which are the timed events in this queue. Events with
//! equal time are dispatched in insertion order (the sequence number is the
//! tie-break), and the clock only moves when an event is popped.
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;

use anyhow::Result;
use hashbrown::HashSet;
use ordered_float::OrderedFloat;

use crate::cyclist::{CyclistArena, SlotIndex};
use crate::network::state::NetworkState;
use crate::network::CycleNetwork;
use crate::population::Population;
use crate::rng::{Distribution, RandomStreams};
use crate::router::Router;
use crate::scenario::KinematicsRecord;
use crate::simulation::results::RunningStats;

/// Everything a continuation may read or mutate while it runs.
///
/// The only mutable shared state of the whole core lives behind this struct,
/// and only the currently-running continuation holds it.
pub struct EventContext<'a> {
    pub network: &'a CycleNetwork,
    pub state: &'a mut NetworkState,
    pub population: &'a Population,
    pub router: &'a mut Router,
    pub cyclists: &'a mut CyclistArena,
    pub streams: &'a mut RandomStreams,
    pub stats: &'a mut RunningStats,
    pub kinematics: &'a KinematicsRecord,
    /// Per-node inter-arrival distribution, node-indexed.
    pub distributions: &'a [Distribution],
    /// Handle of the pending arrival event of each generator, refreshed on
    /// every reschedule so the termination process can cancel them.
    pub arrival_handles: &'a mut Vec<EventHandle>,
    /// The cooperative stop flag raised by the termination process.
    pub stop: &'a mut bool,
}

/// A resumable continuation scheduled at a point in simulated time.
pub trait Event: Debug {
    /// Resumes the continuation. Scheduling a follow-up event (usually
    /// `self` with an advanced time) is how a continuation suspends.
    fn execute(self: Box<Self>, ctx: &mut EventContext, queue: &mut EventQueue) -> Result<()>;

    /// The time at which the event fires.
    fn time(&self) -> f64;

    /// The cyclist this continuation belongs to, if any. Used to force the
    /// cyclist out of the simulation when the continuation fails.
    fn cyclist(&self) -> Option<SlotIndex> {
        None
    }
}

/// Handle to a scheduled event, usable for logical cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventHandle(u64);

/// An entry of the [`EventQueue`].
//
// The time is cached next to the box so the heap never goes through the
// vtable to order entries.
struct EventEntry {
    time: OrderedFloat<f64>,
    seq: u64,
    event: Box<dyn Event>,
}

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for EventEntry {}

impl Ord for EventEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the binary heap pops in chronological order, FIFO
        // among entries with equal time.
        (self.time, self.seq).cmp(&(other.time, other.seq)).reverse()
    }
}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Debug for EventEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEntry")
            .field("time", &self.time.0)
            .field("seq", &self.seq)
            .field("event", &self.event)
            .finish()
    }
}

/// Time-ordered event queue; the sole owner of the simulation clock.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<EventEntry>,
    cancelled: HashSet<u64>,
    next_seq: u64,
    now: f64,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue::default()
    }

    /// The current simulated time, in seconds.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Enqueues an event at its own `time()`, which must not lie in the
    /// past.
    pub fn push(&mut self, event: Box<dyn Event>) -> EventHandle {
        let time = event.time();
        debug_assert!(time >= self.now, "event scheduled in the past: {event:?}");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(EventEntry {
            time: OrderedFloat(time.max(self.now)),
            seq,
            event,
        });
        EventHandle(seq)
    }

    /// Logically cancels a scheduled event; popping it later is a silent
    /// no-op.
    pub fn cancel(&mut self, handle: EventHandle) {
        self.cancelled.insert(handle.0);
    }

    /// Time of the next live event, pruning cancelled entries from the top.
    pub fn next_time(&mut self) -> Option<f64> {
        while let Some(entry) = self.heap.peek() {
            if self.cancelled.remove(&entry.seq) {
                self.heap.pop();
            } else {
                return Some(entry.time.0);
            }
        }
        None
    }

    /// Pops the earliest live event and advances the clock to its time.
    /// Returns `None`, with the clock unchanged, when the queue is drained.
    pub fn pop(&mut self) -> Option<Box<dyn Event>> {
        self.next_time()?;
        let entry = self.heap.pop()?;
        self.now = entry.time.0;
        Some(entry.event)
    }

    /// Number of entries still queued, cancelled ones included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoopEvent {
        time: f64,
        // Read back through the Debug representation only.
        #[allow(dead_code)]
        tag: u32,
    }

    impl Event for NoopEvent {
        fn execute(self: Box<Self>, _: &mut EventContext, _: &mut EventQueue) -> Result<()> {
            Ok(())
        }
        fn time(&self) -> f64 {
            self.time
        }
    }

    fn noop(time: f64, tag: u32) -> Box<dyn Event> {
        Box::new(NoopEvent { time, tag })
    }

    fn tag_of(event: Box<dyn Event>) -> u32 {
        // Events are opaque; recover the tag through Debug.
        format!("{event:?}")
            .split("tag: ")
            .nth(1)
            .and_then(|s| s.trim_end_matches(" }").parse().ok())
            .unwrap()
    }

    #[test]
    fn pops_in_chronological_order() {
        let mut queue = EventQueue::new();
        queue.push(noop(2.0, 0));
        queue.push(noop(1.0, 1));
        queue.push(noop(4.0, 2));
        assert_eq!(queue.pop().unwrap().time(), 1.0);
        assert_eq!(queue.now(), 1.0);
        queue.push(noop(3.0, 3));
        assert_eq!(queue.pop().unwrap().time(), 2.0);
        assert_eq!(queue.pop().unwrap().time(), 3.0);
        assert_eq!(queue.pop().unwrap().time(), 4.0);
        assert!(queue.pop().is_none());
        // Draining leaves the clock where the last event put it.
        assert_eq!(queue.now(), 4.0);
    }

    #[test]
    fn equal_times_dispatch_in_insertion_order() {
        let mut queue = EventQueue::new();
        for tag in 0..5 {
            queue.push(noop(1.0, tag));
        }
        for tag in 0..5 {
            assert_eq!(tag_of(queue.pop().unwrap()), tag);
        }
    }

    #[test]
    fn cancelled_events_are_silently_skipped() {
        let mut queue = EventQueue::new();
        let keep = queue.push(noop(1.0, 0));
        let drop = queue.push(noop(2.0, 1));
        queue.push(noop(3.0, 2));
        queue.cancel(drop);
        assert_eq!(queue.pop().unwrap().time(), 1.0);
        assert_eq!(queue.pop().unwrap().time(), 3.0);
        assert!(queue.pop().is_none());
        // Cancelling an already-popped handle is harmless.
        queue.cancel(keep);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn next_time_skips_cancelled_heads() {
        let mut queue = EventQueue::new();
        let first = queue.push(noop(1.0, 0));
        queue.push(noop(5.0, 1));
        queue.cancel(first);
        assert_eq!(queue.next_time(), Some(5.0));
    }
}
